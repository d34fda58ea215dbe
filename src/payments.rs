//! Hosted payment-checkout provider client and checkout-session plumbing.
//!
//! The provider is consumed, never reimplemented: we create a checkout
//! session for an amount plus line items, then ask for the payment status
//! keyed by session id (or receive it via the webhook).  Provider errors
//! are surfaced verbatim, and a write is never assumed to have succeeded
//! without checking the returned error field.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::{info, warn};

use crate::errors::{EcoLinkError, Result};
use crate::models::{CheckoutPurpose, CheckoutSession, CheckoutStatus};
use crate::{marketplace, wallet};

// ─────────────────────────────────────────────────────────
// Gateway contract
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: i64,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub amount: f64,
    pub currency: String,
    /// Opaque reference echoed back by the provider (project/listing info).
    pub reference: String,
    pub line_items: Vec<LineItem>,
}

/// A session as created by the provider; `url` is the hosted checkout page.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentStatus {
    Paid,
    Pending,
    Failed(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &CheckoutRequest) -> Result<ProviderSession>;
    async fn payment_status(&self, session_id: &str) -> Result<PaymentStatus>;
}

// ─────────────────────────────────────────────────────────
// Hosted checkout provider (REST)
// ─────────────────────────────────────────────────────────

pub struct HostedCheckout {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    error: Option<ProviderError>,
    id: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionStatusResponse {
    error: Option<ProviderError>,
    status: Option<String>,
    failure_reason: Option<String>,
}

impl HostedCheckout {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HostedCheckout {
    async fn create_session(&self, request: &CheckoutRequest) -> Result<ProviderSession> {
        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body: CreateSessionResponse = response.json().await?;

        // Check the error field before touching the result.
        if let Some(err) = body.error {
            return Err(EcoLinkError::ExternalService(err.message));
        }
        if !status.is_success() {
            return Err(EcoLinkError::ExternalService(format!(
                "checkout session creation returned HTTP {status}"
            )));
        }
        match (body.id, body.url) {
            (Some(id), Some(url)) => Ok(ProviderSession { id, url }),
            _ => Err(EcoLinkError::ExternalService(
                "checkout session response was missing id or url".to_string(),
            )),
        }
    }

    async fn payment_status(&self, session_id: &str) -> Result<PaymentStatus> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{session_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        let body: SessionStatusResponse = response.json().await?;

        if let Some(err) = body.error {
            return Err(EcoLinkError::ExternalService(err.message));
        }
        if !status.is_success() {
            return Err(EcoLinkError::ExternalService(format!(
                "session status returned HTTP {status}"
            )));
        }
        match body.status.as_deref() {
            Some("paid") | Some("complete") => Ok(PaymentStatus::Paid),
            Some("pending") | Some("open") => Ok(PaymentStatus::Pending),
            Some("failed") | Some("expired") => Ok(PaymentStatus::Failed(
                body.failure_reason
                    .unwrap_or_else(|| "payment failed".to_string()),
            )),
            other => Err(EcoLinkError::ExternalService(format!(
                "unrecognised session status {other:?}"
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Checkout-session rows
// ─────────────────────────────────────────────────────────

const SESSION_COLUMNS: &str =
    "id, user_id, purpose, amount, listing_id, quantity, status, created_at, completed_at";

pub async fn get_session<'e, E>(exec: E, session_id: &str) -> Result<CheckoutSession>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {SESSION_COLUMNS} FROM checkout_sessions WHERE id = ?1");
    sqlx::query_as::<_, CheckoutSession>(&sql)
        .bind(session_id)
        .fetch_optional(exec)
        .await?
        .ok_or(EcoLinkError::NotFound("checkout session"))
}

/// A checkout handed to the caller: the pending row plus the provider's
/// hosted payment page.
#[derive(Debug, Clone, Serialize)]
pub struct StartedCheckout {
    pub session: CheckoutSession,
    pub checkout_url: String,
}

/// Create a provider session and record it as pending.  No ledger, listing,
/// or wallet mutation happens here.
pub async fn start_session(
    pool: &SqlitePool,
    gateway: &dyn PaymentGateway,
    user_id: &str,
    purpose: CheckoutPurpose,
    request: &CheckoutRequest,
    listing_id: Option<i64>,
    quantity: Option<i64>,
) -> Result<StartedCheckout> {
    let provider = gateway.create_session(request).await?;

    sqlx::query(
        r#"
        INSERT INTO checkout_sessions
            (id, user_id, purpose, amount, listing_id, quantity, status, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&provider.id)
    .bind(user_id)
    .bind(purpose)
    .bind(request.amount)
    .bind(listing_id)
    .bind(quantity)
    .bind(CheckoutStatus::Pending)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;

    info!(
        "Checkout session {} opened for {user_id} ({:.2} {})",
        provider.id, request.amount, request.currency
    );

    let session = get_session(pool, &provider.id).await?;
    Ok(StartedCheckout {
        session,
        checkout_url: provider.url,
    })
}

async fn mark_failed(pool: &SqlitePool, session_id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE checkout_sessions SET status = ?1, completed_at = ?2 \
         WHERE id = ?3 AND status = ?4",
    )
    .bind(CheckoutStatus::Failed)
    .bind(Utc::now().timestamp())
    .bind(session_id)
    .bind(CheckoutStatus::Pending)
    .execute(pool)
    .await?;
    Ok(())
}

/// Confirm a checkout session against the provider and, on confirmed
/// payment, settle its effects in one transaction.
///
/// Idempotent for completed sessions: confirming again returns the stored
/// row without re-applying effects.  No mutation of any kind happens
/// before the provider reports the payment as paid.
pub async fn confirm(
    pool: &SqlitePool,
    gateway: &dyn PaymentGateway,
    session_id: &str,
) -> Result<CheckoutSession> {
    let session = get_session(pool, session_id).await?;
    match session.status {
        CheckoutStatus::Completed => return Ok(session),
        CheckoutStatus::Failed => {
            return Err(EcoLinkError::ExternalService(
                "payment session already failed".to_string(),
            ))
        }
        CheckoutStatus::Pending => {}
    }

    match gateway.payment_status(session_id).await? {
        PaymentStatus::Paid => {}
        PaymentStatus::Pending => {
            return Err(EcoLinkError::ExternalService(
                "payment has not completed".to_string(),
            ))
        }
        PaymentStatus::Failed(reason) => {
            warn!("Checkout session {session_id} failed at the provider: {reason}");
            mark_failed(pool, session_id).await?;
            return Err(EcoLinkError::ExternalService(reason));
        }
    }

    let mut tx = pool.begin().await?;

    // Claim the pending session inside the settlement transaction.  Of two
    // concurrent confirmers (client callback plus provider webhook) exactly
    // one flips pending → completed; the loser applies nothing and returns
    // the row the winner settled.
    let claimed = sqlx::query(
        "UPDATE checkout_sessions SET status = ?1, completed_at = ?2 \
         WHERE id = ?3 AND status = ?4",
    )
    .bind(CheckoutStatus::Completed)
    .bind(Utc::now().timestamp())
    .bind(session_id)
    .bind(CheckoutStatus::Pending)
    .execute(&mut *tx)
    .await?;
    if claimed.rows_affected() == 0 {
        tx.rollback().await?;
        let current = get_session(pool, session_id).await?;
        return match current.status {
            CheckoutStatus::Completed => Ok(current),
            _ => Err(EcoLinkError::ExternalService(
                "payment session already failed".to_string(),
            )),
        };
    }

    match session.purpose {
        CheckoutPurpose::WalletTopup => {
            wallet::apply_topup(&mut *tx, &session).await?;
        }
        CheckoutPurpose::Purchase => {
            marketplace::settle_checkout(&mut tx, &session).await?;
        }
    }
    tx.commit().await?;

    info!("Checkout session {session_id} settled");
    get_session(pool, session_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_session_response_parses_success_and_error() {
        let ok: CreateSessionResponse =
            serde_json::from_str(r#"{"id":"cs_123","url":"https://pay.example/cs_123"}"#).unwrap();
        assert!(ok.error.is_none());
        assert_eq!(ok.id.as_deref(), Some("cs_123"));

        let err: CreateSessionResponse =
            serde_json::from_str(r#"{"error":{"message":"card declined"}}"#).unwrap();
        assert_eq!(err.error.unwrap().message, "card declined");
    }

    #[test]
    fn status_response_parses_failure_reason() {
        let body: SessionStatusResponse = serde_json::from_str(
            r#"{"status":"failed","failure_reason":"insufficient funds on card"}"#,
        )
        .unwrap();
        assert_eq!(body.status.as_deref(), Some("failed"));
        assert_eq!(
            body.failure_reason.as_deref(),
            Some("insufficient funds on card")
        );
    }
}
