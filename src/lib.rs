//! # EcoLink Backend
//!
//! Carbon-credit marketplace backend: project submission → verification →
//! credit issuance → marketplace listing, plus purchases, wallet top-ups
//! through a hosted payment gateway, and credit retirement.
//!
//! | Concern      | Module        |
//! |--------------|---------------|
//! | Lifecycle    | [`workflow`]  |
//! | Bookkeeping  | [`ledger`]    |
//! | Marketplace  | [`marketplace`] |
//! | Retirement   | [`retirement`] |
//! | Payments     | [`payments`], [`wallet`] |
//! | REST surface | [`api`]       |

pub mod api;
pub mod config;
pub mod db;
pub mod defaults;
pub mod errors;
pub mod ledger;
pub mod marketplace;
pub mod models;
pub mod notify;
pub mod payments;
pub mod projects;
pub mod retirement;
pub mod wallet;
pub mod workflow;
