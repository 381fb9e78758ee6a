//! HTTP API Request Handlers
//!
//! Handlers that map control API requests onto [`Orchestrator`] calls.

mod campaigns;
mod system;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use super::types::ErrorResponse;
use crate::campaign::{CampaignError, Orchestrator};
use crate::storage::StoreError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub started_at: Instant,
}

pub use campaigns::{
    cancel_campaign, create_campaign, get_campaign, get_dataset, list_campaigns, list_iterations,
    list_recoveries, reset_recovery,
};
pub use system::{health, prometheus_metrics};

/// Count every request that reaches the API
pub async fn count_requests(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    state.orchestrator.metrics().http_requests.inc();
    next.run(request).await
}

/// Map a campaign error onto a status code and JSON body
pub(crate) fn error_response(err: CampaignError) -> Response {
    let (status, body) = match &err {
        CampaignError::NotFound(_) | CampaignError::Store(StoreError::NotFound { .. }) => {
            (StatusCode::NOT_FOUND, ErrorResponse::not_found(err.to_string()))
        }
        CampaignError::InvalidRequest(_) | CampaignError::Pagination(_) => {
            (StatusCode::BAD_REQUEST, ErrorResponse::bad_request(err.to_string()))
        }
        CampaignError::InvalidTransition { .. }
        | CampaignError::IterationInFlight { .. }
        | CampaignError::Store(StoreError::Conflict(_)) => {
            (StatusCode::CONFLICT, ErrorResponse::conflict(err.to_string()))
        }
        CampaignError::Vendor(_) => {
            error!("Vendor error in API request: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("VENDOR_ERROR", err.to_string()),
            )
        }
        CampaignError::Store(_) => {
            error!("Storage error in API request: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::internal_error(err.to_string()),
            )
        }
    };
    (status, Json(body)).into_response()
}
