//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use super::{error_response, AppState};
use crate::campaign::{CampaignError, Orchestrator};
use crate::consolidation::{self as export, ExportFormat};
use crate::daemon::http::types::*;
use crate::types::{Campaign, CampaignId};

fn detail(orchestrator: &Orchestrator, campaign: Campaign) -> Result<CampaignDetail, CampaignError> {
    let progress = orchestrator.progress(campaign.id)?;
    Ok(CampaignDetail { campaign, progress })
}

/// Declare a new campaign; the first iteration launches on the next poll
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> Response {
    let orchestrator = &state.orchestrator;
    let result = async {
        let campaign = orchestrator.create_campaign(request.into()).await?;
        detail(orchestrator, campaign)
    }
    .await;

    match result {
        Ok(detail) => {
            info!(campaign = detail.campaign.id, "Campaign created via API");
            (StatusCode::CREATED, Json(detail)).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn list_campaigns(State(state): State<AppState>) -> Response {
    let orchestrator = &state.orchestrator;
    let result = orchestrator
        .store()
        .list_campaigns()
        .map_err(CampaignError::from)
        .and_then(|campaigns| {
            campaigns
                .into_iter()
                .map(|c| detail(orchestrator, c))
                .collect::<Result<Vec<_>, _>>()
        });

    match result {
        Ok(details) => (StatusCode::OK, Json(details)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_campaign(State(state): State<AppState>, Path(id): Path<CampaignId>) -> Response {
    let orchestrator = &state.orchestrator;
    match orchestrator.campaign(id).and_then(|c| detail(orchestrator, c)) {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn list_iterations(State(state): State<AppState>, Path(id): Path<CampaignId>) -> Response {
    match state.orchestrator.iterations(id) {
        Ok(iterations) => {
            let summaries: Vec<IterationSummary> = iterations.iter().map(IterationSummary::from).collect();
            (StatusCode::OK, Json(summaries)).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn list_recoveries(State(state): State<AppState>, Path(id): Path<CampaignId>) -> Response {
    let orchestrator = &state.orchestrator;
    let result = orchestrator
        .campaign(id)
        .and_then(|_| orchestrator.store().list_recoveries(id).map_err(Into::into));

    match result {
        Ok(ops) => (StatusCode::OK, Json(ops)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Stop launching new iterations for a campaign
pub async fn cancel_campaign(State(state): State<AppState>, Path(id): Path<CampaignId>) -> Response {
    let orchestrator = &state.orchestrator;
    let result = async {
        let campaign = orchestrator.cancel(id).await?;
        detail(orchestrator, campaign)
    }
    .await;

    match result {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Clear the recovery counter and the attention flag
pub async fn reset_recovery(State(state): State<AppState>, Path(id): Path<CampaignId>) -> Response {
    let orchestrator = &state.orchestrator;
    let result = async {
        let campaign = orchestrator.reset_recovery_attempts(id).await?;
        detail(orchestrator, campaign)
    }
    .await;

    match result {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Consolidated dataset as JSON (default) or CSV
pub async fn get_dataset(
    State(state): State<AppState>,
    Path(id): Path<CampaignId>,
    Query(query): Query<DatasetQuery>,
) -> Response {
    let format = match query.format.as_deref().map(str::parse::<ExportFormat>) {
        None => ExportFormat::Json,
        Some(Ok(format)) => format,
        Some(Err(msg)) => {
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse::bad_request(msg))).into_response()
        }
    };

    let dataset = match state.orchestrator.dataset(id) {
        Ok(dataset) => dataset,
        Err(e) => return error_response(e),
    };

    match format {
        ExportFormat::Json => (StatusCode::OK, Json(export::to_json(&dataset))).into_response(),
        ExportFormat::Csv => match export::to_csv(&dataset) {
            Ok(body) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, format.content_type().to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"campaign-{}.csv\"", id),
                    ),
                ],
                body,
            )
                .into_response(),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal_error(format!("CSV export failed: {}", e))),
            )
                .into_response(),
        },
    }
}
