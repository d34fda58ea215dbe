//! Retirement — permanent removal of owned credits as a claimed offset.
//!
//! Retirement records are append-only: they are the audit trail behind
//! offset certificates and are never updated or deleted.

use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};

use crate::errors::{EcoLinkError, Result};
use crate::models::{PortfolioHolding, Retirement};

const RETIREMENT_COLUMNS: &str =
    "id, user_id, project_id, quantity, reason, certificate_code, created_at";

/// Retire `qty` of the caller's credits for a project.
///
/// Fails with `InsufficientCredits` if the caller's holding is smaller than
/// `qty`; on failure the holding is untouched.
pub async fn retire(
    pool: &SqlitePool,
    user_id: &str,
    project_id: i64,
    qty: i64,
    reason: &str,
) -> Result<Retirement> {
    if qty <= 0 {
        return Err(EcoLinkError::Validation(
            "retirement quantity must be greater than zero".to_string(),
        ));
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(EcoLinkError::Validation(
            "retirement reason is required".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    // Guarded decrement: a missing holding is a zero balance.
    let decremented = sqlx::query(
        r#"
        UPDATE portfolio_holdings
        SET    quantity = quantity - ?1
        WHERE  user_id = ?2 AND project_id = ?3 AND quantity >= ?1
        "#,
    )
    .bind(qty)
    .bind(user_id)
    .bind(project_id)
    .execute(&mut *tx)
    .await?;
    if decremented.rows_affected() == 0 {
        return Err(EcoLinkError::InsufficientCredits);
    }

    let now = Utc::now().timestamp();
    let inserted = sqlx::query(
        r#"
        INSERT INTO retirements
            (user_id, project_id, quantity, reason, certificate_code, created_at)
        VALUES (?1, ?2, ?3, ?4, '', ?5)
        "#,
    )
    .bind(user_id)
    .bind(project_id)
    .bind(qty)
    .bind(reason)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    let id = inserted.last_insert_rowid();

    // Certificate codes embed the row id, so they are assigned post-insert.
    sqlx::query("UPDATE retirements SET certificate_code = ?1 WHERE id = ?2")
        .bind(format!("ECO-RET-{id:06}"))
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let sql = format!("SELECT {RETIREMENT_COLUMNS} FROM retirements WHERE id = ?1");
    let retirement = sqlx::query_as::<_, Retirement>(&sql)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(retirement)
}

/// The caller's audit/certificate trail, oldest first.
pub async fn retirements_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Retirement>> {
    let sql = format!(
        "SELECT {RETIREMENT_COLUMNS} FROM retirements WHERE user_id = ?1 ORDER BY created_at ASC, id ASC"
    );
    let rows = sqlx::query_as::<_, Retirement>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// The caller's owned-credit holding for a project (0 when absent).
pub async fn holding<'e, E>(exec: E, user_id: &str, project_id: i64) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<PortfolioHolding> = sqlx::query_as(
        "SELECT id, user_id, project_id, quantity FROM portfolio_holdings \
         WHERE user_id = ?1 AND project_id = ?2",
    )
    .bind(user_id)
    .bind(project_id)
    .fetch_optional(exec)
    .await?;
    Ok(row.map(|h| h.quantity).unwrap_or(0))
}
