//! Project lifecycle: submission, review, approval with idempotent credit
//! generation, rejection, and deletion cascades.

mod common;

use common::{approved_project, count, fund_wallet, new_project, test_pool, verifier};
use ecolink::errors::EcoLinkError;
use ecolink::models::{ListingStatus, ProjectStatus, Session};
use ecolink::{ledger, marketplace, projects, retirement, workflow};

#[tokio::test]
async fn submit_creates_pending_project_with_no_credit_rows() {
    let pool = test_pool().await;

    let project = workflow::submit(&pool, "alice", &new_project("Forestry"))
        .await
        .unwrap();

    assert_eq!(project.status, ProjectStatus::Pending);
    assert_eq!(project.user_id, "alice");
    assert!(project.verified_by.is_none());
    assert!(ledger::get_by_project(&pool, project.id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM listings").await, 0);
}

#[tokio::test]
async fn submission_validation_fails_before_any_write() {
    let pool = test_pool().await;

    let mut input = new_project("Forestry");
    input.title = "   ".to_string();
    let err = workflow::submit(&pool, "alice", &input).await.unwrap_err();
    assert!(matches!(err, EcoLinkError::Validation(_)));

    let mut input = new_project("Forestry");
    input.credit_price = Some(0.0);
    let err = workflow::submit(&pool, "alice", &input).await.unwrap_err();
    assert!(matches!(err, EcoLinkError::Validation(_)));

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM projects").await, 0);
}

#[tokio::test]
async fn approve_requires_an_authenticated_session() {
    let pool = test_pool().await;
    let project = workflow::submit(&pool, "alice", &new_project("Forestry"))
        .await
        .unwrap();

    let err = workflow::approve(&pool, None, project.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EcoLinkError::AuthenticationRequired));

    let reloaded = projects::get(&pool, project.id).await.unwrap();
    assert_eq!(reloaded.status, ProjectStatus::Pending);
}

#[tokio::test]
async fn approve_applies_category_defaults() {
    let pool = test_pool().await;
    let outcome = approved_project(&pool, "alice", "Renewable Energy").await;

    assert_eq!(outcome.project.status, ProjectStatus::Approved);
    assert_eq!(outcome.project.verified_by.as_deref(), Some("verifier-1"));
    assert!(outcome.project.verified_at.is_some());

    assert_eq!(outcome.ledger.total_credits, 500);
    assert_eq!(outcome.ledger.available_credits, 500);
    assert_eq!(outcome.ledger.price_per_credit, 20.0);

    assert_eq!(outcome.listing.quantity, 500);
    assert_eq!(outcome.listing.price_per_credit, 20.0);
    assert_eq!(outcome.listing.seller_id, "alice");
}

#[tokio::test]
async fn unknown_category_falls_back_to_default_terms() {
    let pool = test_pool().await;
    let outcome = approved_project(&pool, "alice", "Blue Carbon").await;
    assert_eq!(outcome.ledger.total_credits, 500);
    assert_eq!(outcome.ledger.price_per_credit, 15.0);
}

#[tokio::test]
async fn approve_prefers_declared_cap_and_price() {
    let pool = test_pool().await;
    let mut input = new_project("Forestry");
    input.estimated_credits = Some(2500);
    input.credit_price = Some(9.75);
    let project = workflow::submit(&pool, "alice", &input).await.unwrap();

    let outcome = workflow::approve(&pool, Some(&verifier()), project.id, None)
        .await
        .unwrap();
    assert_eq!(outcome.ledger.total_credits, 2500);
    assert_eq!(outcome.ledger.price_per_credit, 9.75);
    assert_eq!(outcome.listing.quantity, 2500);
}

#[tokio::test]
async fn approving_twice_creates_no_duplicate_rows() {
    let pool = test_pool().await;
    let first = approved_project(&pool, "alice", "Renewable Energy").await;

    // A retry (or a concurrent second approval) must return the same rows.
    let second = workflow::approve(&pool, Some(&verifier()), first.project.id, None)
        .await
        .unwrap();

    assert_eq!(second.ledger.id, first.ledger.id);
    assert_eq!(second.listing.id, first.listing.id);
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM credit_ledger").await,
        1
    );
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM listings WHERE status = 'active'").await,
        1
    );
}

#[tokio::test]
async fn reapproval_after_sellout_does_not_reopen_the_listing() {
    let pool = test_pool().await;
    let outcome = approved_project(&pool, "alice", "Renewable Energy").await;

    fund_wallet(&pool, "bob", 20_000.0).await;
    marketplace::purchase_with_wallet(&pool, "bob", outcome.listing.id, 500)
        .await
        .unwrap();

    // All credits are sold; a second approval must not put a zero-quantity
    // active listing back on the market.
    let second = workflow::approve(&pool, Some(&verifier()), outcome.project.id, None)
        .await
        .unwrap();

    assert_eq!(second.listing.id, outcome.listing.id);
    assert_eq!(second.listing.status, ListingStatus::SoldOut);
    assert_eq!(second.listing.quantity, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM listings").await, 1);
    assert!(marketplace::active_listings(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn reapproval_reconciles_ledger_toward_declared_values() {
    let pool = test_pool().await;
    let outcome = approved_project(&pool, "alice", "Forestry").await;
    assert_eq!(outcome.ledger.total_credits, 1000);

    // The owner's declared cap changed after issuance; re-approval moves the
    // ledger toward it without re-deriving credits from scratch.
    sqlx::query("UPDATE projects SET estimated_credits = 800 WHERE id = ?1")
        .bind(outcome.project.id)
        .execute(&pool)
        .await
        .unwrap();

    let second = workflow::approve(&pool, Some(&verifier()), outcome.project.id, None)
        .await
        .unwrap();
    assert_eq!(second.ledger.id, outcome.ledger.id);
    assert_eq!(second.ledger.total_credits, 800);
    assert!(second.ledger.available_credits <= 800);
}

#[tokio::test]
async fn start_review_then_approve() {
    let pool = test_pool().await;
    let project = workflow::submit(&pool, "alice", &new_project("Agriculture"))
        .await
        .unwrap();

    let reviewed = workflow::start_review(&pool, Some(&verifier()), project.id)
        .await
        .unwrap();
    assert_eq!(reviewed.status, ProjectStatus::UnderReview);

    let outcome = workflow::approve(&pool, Some(&verifier()), project.id, None)
        .await
        .unwrap();
    assert_eq!(outcome.project.status, ProjectStatus::Approved);
    assert_eq!(outcome.ledger.total_credits, 750);
}

#[tokio::test]
async fn reject_stores_notes_and_blocks_later_approval() {
    let pool = test_pool().await;
    let project = workflow::submit(&pool, "alice", &new_project("Forestry"))
        .await
        .unwrap();

    let rejected = workflow::reject(
        &pool,
        Some(&verifier()),
        project.id,
        Some("no land tenure evidence"),
        Some("attach the registry extract"),
    )
    .await
    .unwrap();
    assert_eq!(rejected.status, ProjectStatus::Rejected);
    assert_eq!(
        rejected.verification_notes.as_deref(),
        Some("no land tenure evidence")
    );
    assert_eq!(
        rejected.rejection_suggestions.as_deref(),
        Some("attach the registry extract")
    );

    let err = workflow::approve(&pool, Some(&verifier()), project.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EcoLinkError::InvalidTransition { .. }));
}

#[tokio::test]
async fn rejecting_an_approved_project_is_an_invalid_transition() {
    let pool = test_pool().await;
    let outcome = approved_project(&pool, "alice", "Forestry").await;

    let err = workflow::reject(&pool, Some(&verifier()), outcome.project.id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EcoLinkError::InvalidTransition { .. }));
}

#[tokio::test]
async fn owner_edits_are_pending_only() {
    let pool = test_pool().await;
    let owner = Session {
        user_id: "alice".to_string(),
        admin: false,
    };
    let outcome = approved_project(&pool, "alice", "Forestry").await;

    let update = ecolink::models::ProjectUpdate {
        title: Some("New title".to_string()),
        ..Default::default()
    };
    let err = projects::update_pending(&pool, &owner, outcome.project.id, &update)
        .await
        .unwrap_err();
    assert!(matches!(err, EcoLinkError::Validation(_)));
}

#[tokio::test]
async fn admin_delete_cascades_to_ledger_and_listing() {
    let pool = test_pool().await;
    let outcome = approved_project(&pool, "alice", "Forestry").await;

    projects::delete(&pool, &verifier(), outcome.project.id)
        .await
        .unwrap();

    assert!(matches!(
        projects::get(&pool, outcome.project.id).await,
        Err(EcoLinkError::NotFound(_))
    ));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM credit_ledger").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM listings").await, 0);
}

#[tokio::test]
async fn projects_with_recorded_purchases_refuse_deletion() {
    let pool = test_pool().await;
    let outcome = approved_project(&pool, "alice", "Renewable Energy").await;

    fund_wallet(&pool, "bob", 20_000.0).await;
    marketplace::purchase_with_wallet(&pool, "bob", outcome.listing.id, 200)
        .await
        .unwrap();

    // Deleting the project would cascade away bob's holdings and the
    // purchase record while his retirement certificates survive.
    let err = projects::delete(&pool, &verifier(), outcome.project.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EcoLinkError::Validation(_)));

    projects::get(&pool, outcome.project.id).await.unwrap();
    assert_eq!(
        retirement::holding(&pool, "bob", outcome.project.id)
            .await
            .unwrap(),
        200
    );
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM purchases").await, 1);
}

#[tokio::test]
async fn owner_may_delete_only_while_pending() {
    let pool = test_pool().await;
    let owner = Session {
        user_id: "alice".to_string(),
        admin: false,
    };
    let outcome = approved_project(&pool, "alice", "Forestry").await;

    let err = projects::delete(&pool, &owner, outcome.project.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EcoLinkError::Validation(_)));
}

#[tokio::test]
async fn lifecycle_records_best_effort_notifications() {
    let pool = test_pool().await;
    approved_project(&pool, "alice", "Forestry").await;

    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM notifications WHERE kind = 'project_submitted'"
        )
        .await,
        1
    );
    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM notifications WHERE kind = 'project_approved'"
        )
        .await,
        1
    );
}
