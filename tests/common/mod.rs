#![allow(dead_code)]

//! Shared fixtures for the integration tests: in-memory database pools,
//! sample submissions, and a deterministic payment gateway.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use ecolink::errors::Result;
use ecolink::models::{NewProject, Session};
use ecolink::payments::{
    self, CheckoutRequest, PaymentGateway, PaymentStatus, ProviderSession,
};
use ecolink::wallet;
use ecolink::workflow::{self, ApprovalOutcome};

/// A fresh in-memory database with the real migrations applied.
/// One connection only — each `:memory:` connection is its own database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

/// A file-backed database for tests that need more than one connection,
/// e.g. genuinely concurrent transactions.  The file is removed on drop.
pub struct SharedDb {
    pub pool: SqlitePool,
    path: PathBuf,
}

impl Drop for SharedDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        let _ = std::fs::remove_file(self.path.with_extension("db-wal"));
        let _ = std::fs::remove_file(self.path.with_extension("db-shm"));
    }
}

pub async fn shared_db(tag: &str) -> SharedDb {
    let path = std::env::temp_dir().join(format!("ecolink-{tag}-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .expect("file-backed pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    SharedDb { pool, path }
}

pub fn new_project(category: &str) -> NewProject {
    NewProject {
        title: "Solar Microgrid".to_string(),
        description: "Village-scale solar generation replacing diesel".to_string(),
        category: category.to_string(),
        location: "Kisumu".to_string(),
        expected_impact: "800 tCO2e avoided per year".to_string(),
        estimated_credits: None,
        credit_price: None,
    }
}

pub fn verifier() -> Session {
    Session {
        user_id: "verifier-1".to_string(),
        admin: true,
    }
}

/// Submit and approve a project in one go.
pub async fn approved_project(
    pool: &SqlitePool,
    owner: &str,
    category: &str,
) -> ApprovalOutcome {
    let project = workflow::submit(pool, owner, &new_project(category))
        .await
        .expect("submit");
    workflow::approve(pool, Some(&verifier()), project.id, Some("verified on site"))
        .await
        .expect("approve")
}

/// A gateway that mints predictable session ids and reports a configurable
/// payment status.  Ids are drawn from a process-wide counter so sessions
/// from different gateway instances never collide in the same database.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

pub struct TestGateway {
    status: Mutex<PaymentStatus>,
}

impl TestGateway {
    pub fn paying() -> Self {
        Self::with_status(PaymentStatus::Paid)
    }

    pub fn with_status(status: PaymentStatus) -> Self {
        Self {
            status: Mutex::new(status),
        }
    }

    pub fn set_status(&self, status: PaymentStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl PaymentGateway for TestGateway {
    async fn create_session(&self, _request: &CheckoutRequest) -> Result<ProviderSession> {
        let n = SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderSession {
            id: format!("cs_test_{n}"),
            url: format!("https://pay.test/cs_test_{n}"),
        })
    }

    async fn payment_status(&self, _session_id: &str) -> Result<PaymentStatus> {
        Ok(self.status.lock().unwrap().clone())
    }
}

/// Put funds on a wallet via the full top-up flow.
pub async fn fund_wallet(pool: &SqlitePool, user_id: &str, amount: f64) {
    let gateway = TestGateway::paying();
    let started = wallet::begin_topup(pool, &gateway, user_id, amount, "USD")
        .await
        .expect("begin topup");
    payments::confirm(pool, &gateway, &started.session.id)
        .await
        .expect("confirm topup");
}

pub async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    let row: (i64,) = sqlx::query_as(sql).fetch_one(pool).await.expect("count");
    row.0
}
