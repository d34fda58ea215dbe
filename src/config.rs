//! Application configuration loaded from environment variables.

use crate::errors::{EcoLinkError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Base URL of the hosted payment-checkout provider
    pub payment_api_url: String,
    /// API key sent as a bearer token to the payment provider
    pub payment_api_key: String,
    /// Shared secret expected in the payment webhook signature header
    pub webhook_secret: String,
    /// User ids allowed to review/approve/reject projects (comma-separated)
    pub verifier_ids: Vec<String>,
    /// Currency code used for ledgers and checkout sessions
    pub currency: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./ecolink.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| EcoLinkError::Config("Invalid API_PORT".to_string()))?,
            payment_api_url: env_var("PAYMENT_API_URL")
                .unwrap_or_else(|_| "https://api.checkout.example/v1".to_string()),
            payment_api_key: env_var("PAYMENT_API_KEY").map_err(|_| {
                EcoLinkError::Config("PAYMENT_API_KEY environment variable is required".to_string())
            })?,
            webhook_secret: env_var("WEBHOOK_SECRET").map_err(|_| {
                EcoLinkError::Config("WEBHOOK_SECRET environment variable is required".to_string())
            })?,
            verifier_ids: env_var("VERIFIER_IDS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            currency: env_var("CURRENCY").unwrap_or_else(|_| "USD".to_string()),
        })
    }

    /// Whether `user_id` may perform verifier (review/approve/reject) actions.
    pub fn is_verifier(&self, user_id: &str) -> bool {
        self.verifier_ids.iter().any(|v| v == user_id)
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| EcoLinkError::Config(format!("Missing env var: {key}")))
}
