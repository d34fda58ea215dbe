//! Project store — CRUD helpers over the `projects` table.
//!
//! Status and verification fields are written only by the workflow
//! orchestrator (`workflow`); the helpers here cover submission storage,
//! owner edits while pending, and deletion rules.

use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};

use crate::errors::{EcoLinkError, Result};
use crate::models::{NewProject, Project, ProjectStatus, ProjectUpdate, Session};

const PROJECT_COLUMNS: &str = "id, title, description, category, location, expected_impact, \
     status, estimated_credits, credit_price, verification_notes, rejection_suggestions, \
     verified_by, verified_at, user_id, created_at, updated_at";

/// Fetch a project by id.  Absence is a distinct `NotFound`, not an error.
pub async fn get<'e, E>(exec: E, id: i64) -> Result<Project>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
    sqlx::query_as::<_, Project>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await?
        .ok_or(EcoLinkError::NotFound("project"))
}

/// Insert a submission with status = pending.  Validation happens in the
/// orchestrator before this is called.
pub async fn insert<'e, E>(exec: E, user_id: &str, input: &NewProject) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let now = Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        INSERT INTO projects
            (title, description, category, location, expected_impact, status,
             estimated_credits, credit_price, user_id, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        "#,
    )
    .bind(input.title.trim())
    .bind(input.description.trim())
    .bind(input.category.trim())
    .bind(input.location.trim())
    .bind(input.expected_impact.trim())
    .bind(ProjectStatus::Pending)
    .bind(input.estimated_credits)
    .bind(input.credit_price)
    .bind(user_id)
    .bind(now)
    .execute(exec)
    .await?;
    Ok(result.last_insert_rowid())
}

/// List projects, optionally filtered by status, newest first.
pub async fn list(pool: &SqlitePool, status: Option<ProjectStatus>) -> Result<Vec<Project>> {
    let rows = match status {
        Some(status) => {
            let sql = format!(
                "SELECT {PROJECT_COLUMNS} FROM projects WHERE status = ?1 ORDER BY created_at DESC, id DESC"
            );
            sqlx::query_as::<_, Project>(&sql)
                .bind(status)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql =
                format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at DESC, id DESC");
            sqlx::query_as::<_, Project>(&sql).fetch_all(pool).await?
        }
    };
    Ok(rows)
}

/// List all projects owned by `user_id`, newest first.
pub async fn list_for_owner(pool: &SqlitePool, user_id: &str) -> Result<Vec<Project>> {
    let sql = format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
    );
    let rows = sqlx::query_as::<_, Project>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Owner edit, allowed only while the project is still pending.
pub async fn update_pending(
    pool: &SqlitePool,
    session: &Session,
    id: i64,
    update: &ProjectUpdate,
) -> Result<Project> {
    let project = get(pool, id).await?;
    if project.user_id != session.user_id {
        return Err(EcoLinkError::Validation(
            "only the project owner may edit it".to_string(),
        ));
    }
    if project.status != ProjectStatus::Pending {
        return Err(EcoLinkError::Validation(
            "only pending projects can be edited".to_string(),
        ));
    }
    if let Some(credits) = update.estimated_credits {
        if credits <= 0 {
            return Err(EcoLinkError::Validation(
                "estimated_credits must be greater than zero".to_string(),
            ));
        }
    }
    if let Some(price) = update.credit_price {
        if !price.is_finite() || price <= 0.0 {
            return Err(EcoLinkError::Validation(
                "credit_price must be a positive number".to_string(),
            ));
        }
    }

    sqlx::query(
        r#"
        UPDATE projects SET
            title             = COALESCE(?1, title),
            description       = COALESCE(?2, description),
            category          = COALESCE(?3, category),
            location          = COALESCE(?4, location),
            expected_impact   = COALESCE(?5, expected_impact),
            estimated_credits = COALESCE(?6, estimated_credits),
            credit_price      = COALESCE(?7, credit_price),
            updated_at        = ?8
        WHERE id = ?9
        "#,
    )
    .bind(update.title.as_deref().map(str::trim))
    .bind(update.description.as_deref().map(str::trim))
    .bind(update.category.as_deref().map(str::trim))
    .bind(update.location.as_deref().map(str::trim))
    .bind(update.expected_impact.as_deref().map(str::trim))
    .bind(update.estimated_credits)
    .bind(update.credit_price)
    .bind(Utc::now().timestamp())
    .bind(id)
    .execute(pool)
    .await?;

    get(pool, id).await
}

/// Delete a project.  Owners may delete while pending; verifiers (admin)
/// may delete at any status.  Ledger and listing rows cascade, so a project
/// with recorded purchases refuses deletion: buyers' holdings and the
/// purchase trail must outlive the seller's listing.
pub async fn delete(pool: &SqlitePool, session: &Session, id: i64) -> Result<()> {
    let project = get(pool, id).await?;
    let owner_delete = project.user_id == session.user_id
        && project.status == ProjectStatus::Pending;
    if !owner_delete && !session.admin {
        return Err(EcoLinkError::Validation(
            "only the owner of a pending project or an admin may delete it".to_string(),
        ));
    }

    let (sold,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM   purchases pu
        JOIN   listings l ON l.id = pu.listing_id
        JOIN   credit_ledger c ON c.id = l.credit_ledger_id
        WHERE  c.project_id = ?1
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await?;
    if sold > 0 {
        return Err(EcoLinkError::Validation(
            "projects with recorded purchases cannot be deleted".to_string(),
        ));
    }

    sqlx::query("DELETE FROM projects WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
