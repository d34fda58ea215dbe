//! Marketplace — listing lifecycle and purchase settlement.
//!
//! A listing only ever moves `active → sold_out` (quantity hits exactly 0)
//! or `active → cancelled`; terminal states never reactivate.  Settlement
//! runs inside a transaction and touches nothing until payment is assured
//! (wallet debit in the same transaction, or a provider-confirmed checkout
//! session).

use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool, Transaction};

use crate::errors::{EcoLinkError, Result};
use crate::models::{
    CheckoutPurpose, CheckoutSession, Listing, ListingStatus, ListingWithProject, PaymentMethod,
    Purchase, Session,
};
use crate::payments::{CheckoutRequest, LineItem, PaymentGateway, StartedCheckout};
use crate::{ledger, payments, projects};

const LISTING_COLUMNS: &str = "id, credit_ledger_id, seller_id, quantity, price_per_credit, \
     status, created_at, updated_at";

const PURCHASE_COLUMNS: &str = "id, listing_id, buyer_id, quantity, price_per_credit, \
     total_amount, payment_method, checkout_session_id, created_at";

// ─────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────

pub async fn get<'e, E>(exec: E, id: i64) -> Result<Listing>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?1");
    sqlx::query_as::<_, Listing>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await?
        .ok_or(EcoLinkError::NotFound("listing"))
}

/// The single active listing for a ledger entry, if any.
pub async fn get_active_for_ledger<'e, E>(exec: E, ledger_id: i64) -> Result<Option<Listing>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {LISTING_COLUMNS} FROM listings WHERE credit_ledger_id = ?1 AND status = ?2"
    );
    Ok(sqlx::query_as::<_, Listing>(&sql)
        .bind(ledger_id)
        .bind(ListingStatus::Active)
        .fetch_optional(exec)
        .await?)
}

/// The most recent listing for a ledger entry regardless of status, if any.
pub async fn latest_for_ledger<'e, E>(exec: E, ledger_id: i64) -> Result<Option<Listing>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {LISTING_COLUMNS} FROM listings WHERE credit_ledger_id = ?1 \
         ORDER BY created_at DESC, id DESC LIMIT 1"
    );
    Ok(sqlx::query_as::<_, Listing>(&sql)
        .bind(ledger_id)
        .fetch_optional(exec)
        .await?)
}

/// All active listings joined with their project, for marketplace browsing.
pub async fn active_listings(pool: &SqlitePool) -> Result<Vec<ListingWithProject>> {
    let rows = sqlx::query_as::<_, ListingWithProject>(
        r#"
        SELECT l.id, l.credit_ledger_id, l.seller_id, l.quantity, l.price_per_credit,
               l.status, p.id AS project_id, p.title AS project_title,
               p.category AS project_category
        FROM   listings l
        JOIN   credit_ledger c ON c.id = l.credit_ledger_id
        JOIN   projects p ON p.id = c.project_id
        WHERE  l.status = ?1
        ORDER  BY l.created_at DESC, l.id DESC
        "#,
    )
    .bind(ListingStatus::Active)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Purchases made by `buyer_id`, newest first.
pub async fn purchases_for_buyer(pool: &SqlitePool, buyer_id: &str) -> Result<Vec<Purchase>> {
    let sql = format!(
        "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE buyer_id = ?1 ORDER BY created_at DESC, id DESC"
    );
    let rows = sqlx::query_as::<_, Purchase>(&sql)
        .bind(buyer_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────

/// Cancel an active listing.  Only the seller may cancel; terminal states
/// refuse.
pub async fn cancel(pool: &SqlitePool, session: &Session, listing_id: i64) -> Result<Listing> {
    let listing = get(pool, listing_id).await?;
    if listing.seller_id != session.user_id && !session.admin {
        return Err(EcoLinkError::Validation(
            "only the seller may cancel a listing".to_string(),
        ));
    }
    if listing.status != ListingStatus::Active {
        return Err(EcoLinkError::InvalidTransition {
            from: listing.status.as_str().to_string(),
            to: ListingStatus::Cancelled.as_str().to_string(),
        });
    }
    sqlx::query("UPDATE listings SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4")
        .bind(ListingStatus::Cancelled)
        .bind(Utc::now().timestamp())
        .bind(listing_id)
        .bind(ListingStatus::Active)
        .execute(pool)
        .await?;
    get(pool, listing_id).await
}

// ─────────────────────────────────────────────────────────
// Purchases
// ─────────────────────────────────────────────────────────

fn validate_quantity(qty: i64) -> Result<()> {
    if qty <= 0 {
        return Err(EcoLinkError::Validation(
            "purchase quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Buy `qty` credits, paying from the buyer's wallet.  Debit, listing
/// decrement, purchase record, and portfolio credit commit together or
/// not at all.
pub async fn purchase_with_wallet(
    pool: &SqlitePool,
    buyer_id: &str,
    listing_id: i64,
    qty: i64,
) -> Result<Purchase> {
    validate_quantity(qty)?;

    let mut tx = pool.begin().await?;

    let listing = get(&mut *tx, listing_id).await?;
    // Reject on listing state before touching the wallet so a dead listing
    // never reports as a funds problem.
    if listing.status != ListingStatus::Active {
        return Err(EcoLinkError::Validation(
            "listing is not active".to_string(),
        ));
    }
    if qty > listing.quantity {
        return Err(EcoLinkError::InsufficientCredits);
    }
    let total = qty as f64 * listing.price_per_credit;

    // Guarded debit: a missing wallet row is a zero balance.
    let debited = sqlx::query(
        "UPDATE wallets SET balance = balance - ?1, updated_at = ?2 WHERE user_id = ?3 AND balance >= ?1",
    )
    .bind(total)
    .bind(Utc::now().timestamp())
    .bind(buyer_id)
    .execute(&mut *tx)
    .await?;
    if debited.rows_affected() == 0 {
        return Err(EcoLinkError::InsufficientFunds);
    }

    let purchase =
        settle_purchase(&mut tx, buyer_id, listing_id, qty, PaymentMethod::Wallet, None).await?;
    tx.commit().await?;
    Ok(purchase)
}

/// Open a hosted-checkout session for a purchase.  Nothing is reserved or
/// mutated; settlement happens at confirmation, which re-validates the
/// remaining quantity.
pub async fn begin_checkout_purchase(
    pool: &SqlitePool,
    gateway: &dyn PaymentGateway,
    buyer_id: &str,
    listing_id: i64,
    qty: i64,
) -> Result<StartedCheckout> {
    validate_quantity(qty)?;

    let listing = get(pool, listing_id).await?;
    if listing.status != ListingStatus::Active {
        return Err(EcoLinkError::Validation(
            "listing is not active".to_string(),
        ));
    }
    if qty > listing.quantity {
        return Err(EcoLinkError::InsufficientCredits);
    }

    let entry = ledger::get(pool, listing.credit_ledger_id).await?;
    let project = projects::get(pool, entry.project_id).await?;
    let total = qty as f64 * listing.price_per_credit;

    let request = CheckoutRequest {
        amount: total,
        currency: entry.currency.clone(),
        reference: format!("listing:{listing_id}"),
        line_items: vec![LineItem {
            name: format!("{} carbon credits — {}", qty, project.title),
            quantity: qty,
            unit_price: listing.price_per_credit,
        }],
    };

    payments::start_session(
        pool,
        gateway,
        buyer_id,
        CheckoutPurpose::Purchase,
        &request,
        Some(listing_id),
        Some(qty),
    )
    .await
}

/// Settle a provider-confirmed purchase session.  Called by
/// [`payments::confirm`] inside its transaction.
pub(crate) async fn settle_checkout(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    session: &CheckoutSession,
) -> Result<Purchase> {
    let (listing_id, qty) = match (session.listing_id, session.quantity) {
        (Some(listing_id), Some(qty)) => (listing_id, qty),
        _ => {
            return Err(EcoLinkError::Validation(
                "checkout session is missing purchase details".to_string(),
            ))
        }
    };
    settle_purchase(
        tx,
        &session.user_id,
        listing_id,
        qty,
        PaymentMethod::Checkout,
        Some(&session.id),
    )
    .await
}

/// The shared settlement step: decrement the listing (flipping to sold_out
/// at exactly 0), mirror the decrement on the project's credit ledger,
/// record the purchase, and credit the buyer's portfolio.  Runs inside the
/// caller's transaction; payment is already assured at this point.
async fn settle_purchase(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    buyer_id: &str,
    listing_id: i64,
    qty: i64,
    method: PaymentMethod,
    checkout_session_id: Option<&str>,
) -> Result<Purchase> {
    validate_quantity(qty)?;
    let now = Utc::now().timestamp();

    let decremented = sqlx::query(
        r#"
        UPDATE listings
        SET    quantity = quantity - ?1, updated_at = ?2
        WHERE  id = ?3 AND status = ?4 AND quantity >= ?1
        "#,
    )
    .bind(qty)
    .bind(now)
    .bind(listing_id)
    .bind(ListingStatus::Active)
    .execute(&mut **tx)
    .await?;

    if decremented.rows_affected() == 0 {
        let listing = get(&mut **tx, listing_id).await?;
        return Err(if listing.status != ListingStatus::Active {
            EcoLinkError::Validation("listing is not active".to_string())
        } else {
            EcoLinkError::InsufficientCredits
        });
    }

    // sold_out exactly when the remaining quantity reaches 0.
    sqlx::query(
        "UPDATE listings SET status = ?1 WHERE id = ?2 AND quantity = 0 AND status = ?3",
    )
    .bind(ListingStatus::SoldOut)
    .bind(listing_id)
    .bind(ListingStatus::Active)
    .execute(&mut **tx)
    .await?;

    let listing = get(&mut **tx, listing_id).await?;
    ledger::decrease_available(&mut **tx, listing.credit_ledger_id, qty).await?;
    let entry = ledger::get(&mut **tx, listing.credit_ledger_id).await?;

    let total = qty as f64 * listing.price_per_credit;
    let inserted = sqlx::query(
        r#"
        INSERT INTO purchases
            (listing_id, buyer_id, quantity, price_per_credit, total_amount,
             payment_method, checkout_session_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(listing_id)
    .bind(buyer_id)
    .bind(qty)
    .bind(listing.price_per_credit)
    .bind(total)
    .bind(method)
    .bind(checkout_session_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    let purchase_id = inserted.last_insert_rowid();

    sqlx::query(
        r#"
        INSERT INTO portfolio_holdings (user_id, project_id, quantity)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (user_id, project_id)
            DO UPDATE SET quantity = quantity + excluded.quantity
        "#,
    )
    .bind(buyer_id)
    .bind(entry.project_id)
    .bind(qty)
    .execute(&mut **tx)
    .await?;

    let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = ?1");
    let purchase = sqlx::query_as::<_, Purchase>(&sql)
        .bind(purchase_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(purchase)
}
