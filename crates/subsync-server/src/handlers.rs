use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use subsync_billing::{PaymentEvent, ReconcileSummary, WebhookOutcome, apply_payment_event};

use crate::auth::OwnerAuth;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Ready when the store answers a cheap query.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub summary: ReconcileSummary,
}

impl From<ReconcileSummary> for SyncResponse {
    fn from(summary: ReconcileSummary) -> Self {
        Self {
            success: true,
            message: summary.message(),
            summary,
        }
    }
}

/// POST /api/subscriptions/sync
pub async fn sync_subscriptions(
    State(state): State<AppState>,
    OwnerAuth(owner): OwnerAuth,
) -> Result<Json<SyncResponse>, ApiError> {
    let summary = state.reconciler.reconcile_owner(&owner.owner_id).await?;
    Ok(Json(summary.into()))
}

/// POST /webhooks/payments
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let Some(expected) = state.webhook.token.as_deref() else {
        return Err(ApiError::not_found("payment webhook is not enabled"));
    };

    let presented = headers
        .get(state.webhook.header.as_str())
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !token_matches(presented, expected) {
        tracing::warn!(header = %state.webhook.header, "Rejected payment webhook with bad token");
        return Err(ApiError::unauthorized("invalid webhook token"));
    }

    let event: PaymentEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid payment event: {e}")))?;

    let outcome = apply_payment_event(state.store.as_ref(), &event).await?;
    Ok(Json(outcome))
}

fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
