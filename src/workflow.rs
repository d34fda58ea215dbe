//! Workflow orchestrator — project lifecycle and idempotent credit
//! generation.
//!
//! `approve` runs the whole status-transition → ledger → listing sequence
//! inside one database transaction.  Generation is idempotent: re-running
//! it (a retry, or a concurrent approval) never creates a second ledger
//! entry or a second active listing.  Races are resolved with
//! `INSERT ... ON CONFLICT DO NOTHING` followed by a compensating re-fetch
//! of the winner's row — not a lock.

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::defaults;
use crate::errors::{EcoLinkError, Result};
use crate::models::{
    CreditLedgerEntry, Listing, ListingStatus, NewProject, Project, ProjectStatus, Session,
};
use crate::{marketplace, notify, projects};

/// Everything a successful approval produces.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalOutcome {
    pub project: Project,
    pub ledger: CreditLedgerEntry,
    pub listing: Listing,
}

// ─────────────────────────────────────────────────────────
// Submission
// ─────────────────────────────────────────────────────────

/// Validate and store a new submission with status = pending.
///
/// Validation failures are reported before any database write.  The
/// submission notification is best-effort and never fails the call.
pub async fn submit(pool: &SqlitePool, user_id: &str, input: &NewProject) -> Result<Project> {
    validate_submission(input)?;

    let id = projects::insert(pool, user_id, input).await?;
    let project = projects::get(pool, id).await?;

    notify::best_effort(
        pool,
        user_id,
        "project_submitted",
        "Project submission received",
        &format!("Your project \"{}\" is pending verification.", project.title),
    )
    .await;

    Ok(project)
}

fn validate_submission(input: &NewProject) -> Result<()> {
    let required = [
        ("title", &input.title),
        ("description", &input.description),
        ("category", &input.category),
        ("location", &input.location),
        ("expected_impact", &input.expected_impact),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(EcoLinkError::Validation(format!("{field} is required")));
        }
    }
    if let Some(credits) = input.estimated_credits {
        if credits <= 0 {
            return Err(EcoLinkError::Validation(
                "estimated_credits must be greater than zero".to_string(),
            ));
        }
    }
    if let Some(price) = input.credit_price {
        if !price.is_finite() || price <= 0.0 {
            return Err(EcoLinkError::Validation(
                "credit_price must be a positive number".to_string(),
            ));
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Review / decision transitions
// ─────────────────────────────────────────────────────────

/// Move a pending project into review.
pub async fn start_review(
    pool: &SqlitePool,
    session: Option<&Session>,
    project_id: i64,
) -> Result<Project> {
    let session = session.ok_or(EcoLinkError::AuthenticationRequired)?;
    let project = projects::get(pool, project_id).await?;
    match project.status {
        ProjectStatus::Pending | ProjectStatus::UnderReview => {}
        other => {
            return Err(EcoLinkError::InvalidTransition {
                from: other.as_str().to_string(),
                to: ProjectStatus::UnderReview.as_str().to_string(),
            })
        }
    }
    sqlx::query("UPDATE projects SET status = ?1, verified_by = ?2, updated_at = ?3 WHERE id = ?4")
        .bind(ProjectStatus::UnderReview)
        .bind(&session.user_id)
        .bind(Utc::now().timestamp())
        .bind(project_id)
        .execute(pool)
        .await?;
    projects::get(pool, project_id).await
}

/// Approve a project and issue its credits.
///
/// The transition, the ledger entry, and the listing are committed
/// atomically; the approval notification happens after commit and is
/// best-effort.  Re-approving an already approved project is legal and
/// returns the existing ledger/listing rows.
pub async fn approve(
    pool: &SqlitePool,
    session: Option<&Session>,
    project_id: i64,
    notes: Option<&str>,
) -> Result<ApprovalOutcome> {
    let session = session.ok_or(EcoLinkError::AuthenticationRequired)?;

    let mut tx = pool.begin().await?;

    let project = projects::get(&mut *tx, project_id).await?;
    match project.status {
        ProjectStatus::Pending | ProjectStatus::UnderReview | ProjectStatus::Approved => {}
        ProjectStatus::Rejected => {
            return Err(EcoLinkError::InvalidTransition {
                from: ProjectStatus::Rejected.as_str().to_string(),
                to: ProjectStatus::Approved.as_str().to_string(),
            })
        }
    }

    let now = Utc::now().timestamp();
    sqlx::query(
        r#"
        UPDATE projects
        SET    status = ?1, verification_notes = ?2, verified_by = ?3,
               verified_at = ?4, updated_at = ?4
        WHERE  id = ?5
        "#,
    )
    .bind(ProjectStatus::Approved)
    .bind(notes)
    .bind(&session.user_id)
    .bind(now)
    .bind(project_id)
    .execute(&mut *tx)
    .await?;

    let project = projects::get(&mut *tx, project_id).await?;
    let ledger = fetch_or_create_ledger(&mut tx, &project).await?;
    let listing = fetch_or_create_listing(&mut tx, &project, &ledger).await?;

    tx.commit().await?;

    notify::best_effort(
        pool,
        &project.user_id,
        "project_approved",
        "Project approved",
        &format!(
            "\"{}\" was approved: {} credits listed at {} {} each.",
            project.title, listing.quantity, ledger.price_per_credit, ledger.currency
        ),
    )
    .await;

    Ok(ApprovalOutcome {
        project,
        ledger,
        listing,
    })
}

/// Reject a project, storing the verifier's notes and suggestions.
pub async fn reject(
    pool: &SqlitePool,
    session: Option<&Session>,
    project_id: i64,
    notes: Option<&str>,
    suggestions: Option<&str>,
) -> Result<Project> {
    let session = session.ok_or(EcoLinkError::AuthenticationRequired)?;

    let project = projects::get(pool, project_id).await?;
    match project.status {
        ProjectStatus::Pending | ProjectStatus::UnderReview | ProjectStatus::Rejected => {}
        ProjectStatus::Approved => {
            return Err(EcoLinkError::InvalidTransition {
                from: ProjectStatus::Approved.as_str().to_string(),
                to: ProjectStatus::Rejected.as_str().to_string(),
            })
        }
    }

    let now = Utc::now().timestamp();
    sqlx::query(
        r#"
        UPDATE projects
        SET    status = ?1, verification_notes = ?2, rejection_suggestions = ?3,
               verified_by = ?4, verified_at = ?5, updated_at = ?5
        WHERE  id = ?6
        "#,
    )
    .bind(ProjectStatus::Rejected)
    .bind(notes)
    .bind(suggestions)
    .bind(&session.user_id)
    .bind(now)
    .bind(project_id)
    .execute(pool)
    .await?;

    let project = projects::get(pool, project_id).await?;

    notify::best_effort(
        pool,
        &project.user_id,
        "project_rejected",
        "Project rejected",
        &format!("\"{}\" was not approved this time.", project.title),
    )
    .await;

    Ok(project)
}

// ─────────────────────────────────────────────────────────
// Idempotent credit generation
// ─────────────────────────────────────────────────────────

/// Issued quantity and unit price for a project: declared values win,
/// category defaults fill only what is missing.
fn issuance_terms(project: &Project) -> (i64, f64) {
    let (default_credits, default_price) = defaults::for_category(&project.category);
    (
        project.estimated_credits.unwrap_or(default_credits),
        project.credit_price.unwrap_or(default_price),
    )
}

async fn fetch_or_create_ledger(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    project: &Project,
) -> Result<CreditLedgerEntry> {
    let (total, price) = issuance_terms(project);

    if let Some(existing) = crate::ledger::get_by_project(&mut **tx, project.id).await? {
        return reconcile_ledger(&mut **tx, existing, project).await;
    }

    let now = Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO credit_ledger
            (project_id, total_credits, available_credits, price_per_credit,
             currency, created_at, updated_at)
        VALUES (?1, ?2, ?2, ?3, 'USD', ?4, ?4)
        ON CONFLICT (project_id) DO NOTHING
        "#,
    )
    .bind(project.id)
    .bind(total)
    .bind(price)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    // Ours, or the concurrent winner's.
    crate::ledger::get_by_project(&mut **tx, project.id)
        .await?
        .ok_or_else(|| {
            EcoLinkError::Conflict("ledger insert raced and no row was found".to_string())
        })
}

/// Move an existing entry's price and total toward the project's declared
/// values.  `available` is clamped so it never exceeds the (possibly
/// lowered) total, and credits are never re-derived from scratch.
async fn reconcile_ledger(
    conn: &mut SqliteConnection,
    entry: CreditLedgerEntry,
    project: &Project,
) -> Result<CreditLedgerEntry> {
    let new_total = project.estimated_credits.unwrap_or(entry.total_credits);
    let new_price = project.credit_price.unwrap_or(entry.price_per_credit);
    let new_available = entry.available_credits.min(new_total);

    if new_total == entry.total_credits
        && new_price == entry.price_per_credit
        && new_available == entry.available_credits
    {
        return Ok(entry);
    }

    sqlx::query(
        r#"
        UPDATE credit_ledger
        SET    total_credits = ?1, available_credits = ?2,
               price_per_credit = ?3, updated_at = ?4
        WHERE  id = ?5
        "#,
    )
    .bind(new_total)
    .bind(new_available)
    .bind(new_price)
    .bind(Utc::now().timestamp())
    .bind(entry.id)
    .execute(&mut *conn)
    .await?;

    crate::ledger::get(&mut *conn, entry.id).await
}

async fn fetch_or_create_listing(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    project: &Project,
    ledger: &CreditLedgerEntry,
) -> Result<Listing> {
    if let Some(existing) = marketplace::get_active_for_ledger(&mut **tx, ledger.id).await? {
        return Ok(existing);
    }

    // Sold through: reopening an active listing with nothing to sell would
    // break the sold_out-iff-zero invariant, so a re-approval returns the
    // latest historical listing instead.
    if ledger.available_credits == 0 {
        if let Some(latest) = marketplace::latest_for_ledger(&mut **tx, ledger.id).await? {
            return Ok(latest);
        }
    }

    let status = if ledger.available_credits > 0 {
        ListingStatus::Active
    } else {
        ListingStatus::SoldOut
    };

    let now = Utc::now().timestamp();
    // The partial unique index on (credit_ledger_id) WHERE active turns a
    // concurrent duplicate into a no-op we recover from by re-fetching.
    sqlx::query(
        r#"
        INSERT INTO listings
            (credit_ledger_id, seller_id, quantity, price_per_credit, status,
             created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(ledger.id)
    .bind(&project.user_id)
    .bind(ledger.available_credits)
    .bind(ledger.price_per_credit)
    .bind(status)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    let created = match status {
        ListingStatus::Active => marketplace::get_active_for_ledger(&mut **tx, ledger.id).await?,
        _ => marketplace::latest_for_ledger(&mut **tx, ledger.id).await?,
    };
    created.ok_or_else(|| {
        EcoLinkError::Conflict("listing insert raced and no row was found".to_string())
    })
}
