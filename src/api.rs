//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::errors::{EcoLinkError, Result};
use crate::models::{NewProject, PaymentMethod, ProjectStatus, ProjectUpdate, Session};
use crate::payments::PaymentGateway;
use crate::{marketplace, payments, projects, retirement, wallet, workflow};

pub struct ApiState {
    pub pool: SqlitePool,
    pub gateway: Arc<dyn PaymentGateway>,
    pub config: Config,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/projects", post(create_project).get(list_projects))
        .route("/my/projects", get(my_projects))
        .route(
            "/projects/:id",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/projects/:id/review", post(review_project))
        .route("/projects/:id/approve", post(approve_project))
        .route("/projects/:id/reject", post(reject_project))
        .route("/listings", get(list_listings))
        .route("/listings/:id", get(get_listing))
        .route("/listings/:id/cancel", post(cancel_listing))
        .route("/listings/:id/purchase", post(purchase_listing))
        .route("/payments/confirm", post(confirm_payment))
        .route("/payments/webhook", post(payment_webhook))
        .route("/wallet", get(wallet_balance))
        .route("/wallet/topup", post(wallet_topup))
        .route("/retirements", post(create_retirement).get(list_retirements))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct ProjectsQuery {
    status: Option<ProjectStatus>,
}

#[derive(Deserialize)]
struct ApproveBody {
    notes: Option<String>,
}

#[derive(Deserialize)]
struct RejectBody {
    notes: Option<String>,
    suggestions: Option<String>,
}

#[derive(Deserialize)]
struct PurchaseBody {
    quantity: i64,
    payment_method: PaymentMethod,
}

#[derive(Deserialize)]
struct SessionBody {
    session_id: String,
}

#[derive(Deserialize)]
struct TopupBody {
    amount: f64,
}

#[derive(Deserialize)]
struct RetireBody {
    project_id: i64,
    quantity: i64,
    reason: String,
}

// ─────────────────────────────────────────────────────────
// Session extraction and error mapping
// ─────────────────────────────────────────────────────────

/// The identity provider is external; callers present their user id in the
/// `x-user-id` header.  Verifier (admin) status comes from config.
fn session_from_headers(config: &Config, headers: &HeaderMap) -> Result<Session> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(EcoLinkError::AuthenticationRequired)?
        .to_string();
    let admin = config.is_verifier(&user_id);
    Ok(Session { user_id, admin })
}

fn verifier_session(config: &Config, headers: &HeaderMap) -> Result<Session> {
    let session = session_from_headers(config, headers)?;
    if !session.admin {
        return Err(EcoLinkError::AuthenticationRequired);
    }
    Ok(session)
}

fn status_for(error: &EcoLinkError) -> StatusCode {
    match error {
        EcoLinkError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        EcoLinkError::NotFound(_) => StatusCode::NOT_FOUND,
        EcoLinkError::Validation(_) | EcoLinkError::InvalidTransition { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EcoLinkError::Conflict(_)
        | EcoLinkError::InsufficientCredits
        | EcoLinkError::InsufficientFunds => StatusCode::CONFLICT,
        EcoLinkError::ExternalService(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T: Serialize>(result: Result<T>, ok: StatusCode) -> Response {
    match result {
        Ok(value) => (ok, Json(json!(value))).into_response(),
        Err(e) => (
            status_for(&e),
            Json(json!(ErrorResponse {
                error: e.to_string()
            })),
        )
            .into_response(),
    }
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /projects` — submit a project for verification.
async fn create_project(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(input): Json<NewProject>,
) -> Response {
    let result = match session_from_headers(&state.config, &headers) {
        Ok(session) => workflow::submit(&state.pool, &session.user_id, &input).await,
        Err(e) => Err(e),
    };
    reply(result, StatusCode::CREATED)
}

/// `GET /projects?status=` — list projects, optionally by status.
async fn list_projects(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ProjectsQuery>,
) -> Response {
    reply(projects::list(&state.pool, query.status).await, StatusCode::OK)
}

/// `GET /my/projects` — the caller's own submissions.
async fn my_projects(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let result = match session_from_headers(&state.config, &headers) {
        Ok(session) => projects::list_for_owner(&state.pool, &session.user_id).await,
        Err(e) => Err(e),
    };
    reply(result, StatusCode::OK)
}

/// `GET /projects/:id`
async fn get_project(State(state): State<Arc<ApiState>>, Path(id): Path<i64>) -> Response {
    reply(projects::get(&state.pool, id).await, StatusCode::OK)
}

/// `PATCH /projects/:id` — owner edit while pending.
async fn update_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(update): Json<ProjectUpdate>,
) -> Response {
    let result = match session_from_headers(&state.config, &headers) {
        Ok(session) => projects::update_pending(&state.pool, &session, id, &update).await,
        Err(e) => Err(e),
    };
    reply(result, StatusCode::OK)
}

/// `DELETE /projects/:id` — owner (pending) or admin (any status).
async fn delete_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let result = match session_from_headers(&state.config, &headers) {
        Ok(session) => projects::delete(&state.pool, &session, id).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => reply::<()>(Err(e), StatusCode::NO_CONTENT),
    }
}

/// `POST /projects/:id/review` — move a pending project into review.
async fn review_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let result = match verifier_session(&state.config, &headers) {
        Ok(session) => workflow::start_review(&state.pool, Some(&session), id).await,
        Err(e) => Err(e),
    };
    reply(result, StatusCode::OK)
}

/// `POST /projects/:id/approve` — approve and issue credits.
async fn approve_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<ApproveBody>,
) -> Response {
    let result = match verifier_session(&state.config, &headers) {
        Ok(session) => {
            workflow::approve(&state.pool, Some(&session), id, body.notes.as_deref()).await
        }
        Err(e) => Err(e),
    };
    reply(result, StatusCode::OK)
}

/// `POST /projects/:id/reject`
async fn reject_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<RejectBody>,
) -> Response {
    let result = match verifier_session(&state.config, &headers) {
        Ok(session) => {
            workflow::reject(
                &state.pool,
                Some(&session),
                id,
                body.notes.as_deref(),
                body.suggestions.as_deref(),
            )
            .await
        }
        Err(e) => Err(e),
    };
    reply(result, StatusCode::OK)
}

/// `GET /listings` — active marketplace listings with project info.
async fn list_listings(State(state): State<Arc<ApiState>>) -> Response {
    reply(marketplace::active_listings(&state.pool).await, StatusCode::OK)
}

/// `GET /listings/:id`
async fn get_listing(State(state): State<Arc<ApiState>>, Path(id): Path<i64>) -> Response {
    reply(marketplace::get(&state.pool, id).await, StatusCode::OK)
}

/// `POST /listings/:id/cancel` — seller cancels an active listing.
async fn cancel_listing(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let result = match session_from_headers(&state.config, &headers) {
        Ok(session) => marketplace::cancel(&state.pool, &session, id).await,
        Err(e) => Err(e),
    };
    reply(result, StatusCode::OK)
}

/// `POST /listings/:id/purchase` — buy credits from the wallet, or open a
/// hosted-checkout session.
async fn purchase_listing(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<PurchaseBody>,
) -> Response {
    let session = match session_from_headers(&state.config, &headers) {
        Ok(session) => session,
        Err(e) => return reply::<()>(Err(e), StatusCode::OK),
    };
    match body.payment_method {
        PaymentMethod::Wallet => reply(
            marketplace::purchase_with_wallet(&state.pool, &session.user_id, id, body.quantity)
                .await,
            StatusCode::OK,
        ),
        PaymentMethod::Checkout => reply(
            marketplace::begin_checkout_purchase(
                &state.pool,
                state.gateway.as_ref(),
                &session.user_id,
                id,
                body.quantity,
            )
            .await,
            StatusCode::OK,
        ),
    }
}

/// `POST /payments/confirm` — payment callback keyed by session id.
async fn confirm_payment(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<SessionBody>,
) -> Response {
    reply(
        payments::confirm(&state.pool, state.gateway.as_ref(), &body.session_id).await,
        StatusCode::OK,
    )
}

/// `POST /payments/webhook` — asynchronous provider notification.  The
/// signature header must match the configured shared secret.
async fn payment_webhook(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<SessionBody>,
) -> Response {
    let signature = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if signature != state.config.webhook_secret {
        return reply::<()>(Err(EcoLinkError::AuthenticationRequired), StatusCode::OK);
    }
    reply(
        payments::confirm(&state.pool, state.gateway.as_ref(), &body.session_id).await,
        StatusCode::OK,
    )
}

/// `GET /wallet`
async fn wallet_balance(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let result = match session_from_headers(&state.config, &headers) {
        Ok(session) => wallet::balance(&state.pool, &session.user_id)
            .await
            .map(|balance| json!({ "balance": balance })),
        Err(e) => Err(e),
    };
    reply(result, StatusCode::OK)
}

/// `POST /wallet/topup` — open a checkout session to add funds.
async fn wallet_topup(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<TopupBody>,
) -> Response {
    let result = match session_from_headers(&state.config, &headers) {
        Ok(session) => {
            wallet::begin_topup(
                &state.pool,
                state.gateway.as_ref(),
                &session.user_id,
                body.amount,
                &state.config.currency,
            )
            .await
        }
        Err(e) => Err(e),
    };
    reply(result, StatusCode::CREATED)
}

/// `POST /retirements` — retire owned credits as a claimed offset.
async fn create_retirement(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<RetireBody>,
) -> Response {
    let result = match session_from_headers(&state.config, &headers) {
        Ok(session) => {
            retirement::retire(
                &state.pool,
                &session.user_id,
                body.project_id,
                body.quantity,
                &body.reason,
            )
            .await
        }
        Err(e) => Err(e),
    };
    reply(result, StatusCode::CREATED)
}

/// `GET /retirements` — the caller's certificate trail.
async fn list_retirements(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let result = match session_from_headers(&state.config, &headers) {
        Ok(session) => retirement::retirements_for_user(&state.pool, &session.user_id).await,
        Err(e) => Err(e),
    };
    reply(result, StatusCode::OK)
}
