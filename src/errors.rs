//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EcoLinkError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A duplicate row was detected where the workflow expected to create
    /// one.  Recovered internally by re-fetching the winner's row; surfaced
    /// only when no deterministic recovery exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error("Insufficient wallet funds")]
    InsufficientFunds,

    #[error("Payment provider error: {0}")]
    ExternalService(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EcoLinkError>;
