//! Wallet — spendable funds, topped up through the payment gateway.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::errors::{EcoLinkError, Result};
use crate::models::{CheckoutPurpose, CheckoutSession};
use crate::payments::{self, CheckoutRequest, LineItem, PaymentGateway, StartedCheckout};

/// Current balance; a missing wallet row is a zero balance.
pub async fn balance(pool: &SqlitePool, user_id: &str) -> Result<f64> {
    let row: Option<(f64,)> = sqlx::query_as("SELECT balance FROM wallets WHERE user_id = ?1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(b,)| b).unwrap_or(0.0))
}

/// Open a hosted-checkout session to add funds.  The wallet is only
/// credited when the session is confirmed paid.
pub async fn begin_topup(
    pool: &SqlitePool,
    gateway: &dyn PaymentGateway,
    user_id: &str,
    amount: f64,
    currency: &str,
) -> Result<StartedCheckout> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(EcoLinkError::Validation(
            "top-up amount must be a positive number".to_string(),
        ));
    }

    let request = CheckoutRequest {
        amount,
        currency: currency.to_string(),
        reference: format!("wallet:{user_id}"),
        line_items: vec![LineItem {
            name: "EcoLink wallet top-up".to_string(),
            quantity: 1,
            unit_price: amount,
        }],
    };

    payments::start_session(
        pool,
        gateway,
        user_id,
        CheckoutPurpose::WalletTopup,
        &request,
        None,
        None,
    )
    .await
}

/// Credit a confirmed top-up session to its wallet.  Called by
/// [`payments::confirm`] inside its transaction.
pub(crate) async fn apply_topup(
    conn: &mut SqliteConnection,
    session: &CheckoutSession,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO wallets (user_id, balance, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (user_id)
            DO UPDATE SET balance = balance + excluded.balance,
                          updated_at = excluded.updated_at
        "#,
    )
    .bind(&session.user_id)
    .bind(session.amount)
    .bind(Utc::now().timestamp())
    .execute(conn)
    .await?;
    Ok(())
}
