//! Record and status types stored in the database.
//!
//! Statuses are persisted as snake_case TEXT; the enums derive
//! [`sqlx::Type`] so they bind/decode directly.

use serde::{Deserialize, Serialize};

/// An authenticated caller, as established by the identity provider.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    /// Whether the caller is on the configured verifier list.
    pub admin: bool,
}

// ─────────────────────────────────────────────────────────
// Statuses
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    SoldOut,
    Cancelled,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::SoldOut => "sold_out",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentMethod {
    Wallet,
    Checkout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CheckoutPurpose {
    WalletTopup,
    Purchase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Pending,
    Completed,
    Failed,
}

// ─────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub expected_impact: String,
    pub status: ProjectStatus,
    /// Declared credit cap; when present, issued credits never exceed it.
    pub estimated_credits: Option<i64>,
    pub credit_price: Option<f64>,
    pub verification_notes: Option<String>,
    pub rejection_suggestions: Option<String>,
    pub verified_by: Option<String>,
    pub verified_at: Option<i64>,
    pub user_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CreditLedgerEntry {
    pub id: i64,
    pub project_id: i64,
    pub total_credits: i64,
    pub available_credits: i64,
    pub price_per_credit: f64,
    pub currency: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Listing {
    pub id: i64,
    pub credit_ledger_id: i64,
    pub seller_id: String,
    pub quantity: i64,
    pub price_per_credit: f64,
    pub status: ListingStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A listing joined with its project, for marketplace browse responses.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ListingWithProject {
    pub id: i64,
    pub credit_ledger_id: i64,
    pub seller_id: String,
    pub quantity: i64,
    pub price_per_credit: f64,
    pub status: ListingStatus,
    pub project_id: i64,
    pub project_title: String,
    pub project_category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Purchase {
    pub id: i64,
    pub listing_id: i64,
    pub buyer_id: String,
    pub quantity: i64,
    pub price_per_credit: f64,
    pub total_amount: f64,
    pub payment_method: PaymentMethod,
    pub checkout_session_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PortfolioHolding {
    pub id: i64,
    pub user_id: String,
    pub project_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Retirement {
    pub id: i64,
    pub user_id: String,
    pub project_id: i64,
    pub quantity: i64,
    pub reason: String,
    pub certificate_code: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CheckoutSession {
    pub id: String,
    pub user_id: String,
    pub purpose: CheckoutPurpose,
    pub amount: f64,
    pub listing_id: Option<i64>,
    pub quantity: Option<i64>,
    pub status: CheckoutStatus,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

// ─────────────────────────────────────────────────────────
// Inputs
// ─────────────────────────────────────────────────────────

/// Submission payload for a new project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub expected_impact: String,
    pub estimated_credits: Option<i64>,
    pub credit_price: Option<f64>,
}

/// Owner edits allowed while a project is still pending.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub expected_impact: Option<String>,
    pub estimated_credits: Option<i64>,
    pub credit_price: Option<f64>,
}
