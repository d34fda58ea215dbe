//! Best-effort notifications.
//!
//! Email delivery is stubbed: a notification row is recorded and the
//! message is logged.  Call sites use [`best_effort`] so a notifier
//! failure can never fail the primary operation.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::errors::Result;

pub async fn send(
    pool: &SqlitePool,
    user_id: &str,
    kind: &str,
    subject: &str,
    body: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO notifications (user_id, kind, subject, body, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(user_id)
    .bind(kind)
    .bind(subject)
    .bind(body)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;
    info!("Notification queued for {user_id}: [{kind}] {subject}");
    Ok(())
}

/// Fire-and-forget wrapper: failures are logged, never propagated.
pub async fn best_effort(pool: &SqlitePool, user_id: &str, kind: &str, subject: &str, body: &str) {
    if let Err(e) = send(pool, user_id, kind, subject, body).await {
        warn!("Notification [{kind}] for {user_id} failed (ignored): {e}");
    }
}
