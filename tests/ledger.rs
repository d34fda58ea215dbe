//! Credit ledger bookkeeping invariants.

mod common;

use common::{approved_project, test_pool};
use ecolink::errors::EcoLinkError;
use ecolink::ledger;

#[tokio::test]
async fn increase_clamps_available_to_the_declared_cap() {
    let pool = test_pool().await;
    let outcome = approved_project(&pool, "alice", "Renewable Energy").await;
    let mut conn = pool.acquire().await.unwrap();

    ledger::decrease_available(&mut conn, outcome.ledger.id, 100)
        .await
        .unwrap();
    // Asking for far more back than was taken must stop at total_credits.
    ledger::increase_available(&mut conn, outcome.ledger.id, 10_000)
        .await
        .unwrap();

    let entry = ledger::get(&mut *conn, outcome.ledger.id).await.unwrap();
    assert_eq!(entry.available_credits, entry.total_credits);
    assert_eq!(entry.total_credits, 500);
}

#[tokio::test]
async fn decrease_never_goes_negative() {
    let pool = test_pool().await;
    let outcome = approved_project(&pool, "alice", "Renewable Energy").await;
    let mut conn = pool.acquire().await.unwrap();

    let err = ledger::decrease_available(&mut conn, outcome.ledger.id, 501)
        .await
        .unwrap_err();
    assert!(matches!(err, EcoLinkError::InsufficientCredits));

    let entry = ledger::get(&mut *conn, outcome.ledger.id).await.unwrap();
    assert_eq!(entry.available_credits, 500);
}

#[tokio::test]
async fn zero_and_negative_quantities_are_rejected() {
    let pool = test_pool().await;
    let outcome = approved_project(&pool, "alice", "Forestry").await;
    let mut conn = pool.acquire().await.unwrap();

    assert!(matches!(
        ledger::increase_available(&mut conn, outcome.ledger.id, 0).await,
        Err(EcoLinkError::Validation(_))
    ));
    assert!(matches!(
        ledger::decrease_available(&mut conn, outcome.ledger.id, -5).await,
        Err(EcoLinkError::Validation(_))
    ));
}

#[tokio::test]
async fn missing_entry_is_not_found() {
    let pool = test_pool().await;
    let mut conn = pool.acquire().await.unwrap();

    assert!(matches!(
        ledger::decrease_available(&mut conn, 9999, 1).await,
        Err(EcoLinkError::NotFound(_))
    ));
}
