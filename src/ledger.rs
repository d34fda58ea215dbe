//! Credit ledger bookkeeping.
//!
//! `available_credits` is only ever adjusted relative to its current value
//! with guarded single-statement UPDATEs; it is never re-derived once set.
//! Callers running inside a transaction pass `&mut *tx`.

use chrono::Utc;
use sqlx::{SqliteConnection, SqliteExecutor};

use crate::errors::{EcoLinkError, Result};
use crate::models::CreditLedgerEntry;

const LEDGER_COLUMNS: &str = "id, project_id, total_credits, available_credits, \
     price_per_credit, currency, created_at, updated_at";

pub async fn get<'e, E>(exec: E, id: i64) -> Result<CreditLedgerEntry>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {LEDGER_COLUMNS} FROM credit_ledger WHERE id = ?1");
    sqlx::query_as::<_, CreditLedgerEntry>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await?
        .ok_or(EcoLinkError::NotFound("credit ledger entry"))
}

pub async fn get_by_project<'e, E>(exec: E, project_id: i64) -> Result<Option<CreditLedgerEntry>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {LEDGER_COLUMNS} FROM credit_ledger WHERE project_id = ?1");
    Ok(sqlx::query_as::<_, CreditLedgerEntry>(&sql)
        .bind(project_id)
        .fetch_optional(exec)
        .await?)
}

/// Increase `available_credits` by `qty`, clamped so it never exceeds
/// `total_credits`.
pub async fn increase_available(conn: &mut SqliteConnection, id: i64, qty: i64) -> Result<()> {
    if qty <= 0 {
        return Err(EcoLinkError::Validation(
            "credit quantity must be greater than zero".to_string(),
        ));
    }
    let result = sqlx::query(
        r#"
        UPDATE credit_ledger
        SET    available_credits = MIN(total_credits, available_credits + ?1),
               updated_at = ?2
        WHERE  id = ?3
        "#,
    )
    .bind(qty)
    .bind(Utc::now().timestamp())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EcoLinkError::NotFound("credit ledger entry"));
    }
    Ok(())
}

/// Decrease `available_credits` by `qty`.  Refuses to go negative: zero
/// rows affected with the row present signals `InsufficientCredits`.
pub async fn decrease_available(conn: &mut SqliteConnection, id: i64, qty: i64) -> Result<()> {
    if qty <= 0 {
        return Err(EcoLinkError::Validation(
            "credit quantity must be greater than zero".to_string(),
        ));
    }
    let result = sqlx::query(
        r#"
        UPDATE credit_ledger
        SET    available_credits = available_credits - ?1,
               updated_at = ?2
        WHERE  id = ?3 AND available_credits >= ?1
        "#,
    )
    .bind(qty)
    .bind(Utc::now().timestamp())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM credit_ledger WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        return Err(match exists {
            Some(_) => EcoLinkError::InsufficientCredits,
            None => EcoLinkError::NotFound("credit ledger entry"),
        });
    }
    Ok(())
}
