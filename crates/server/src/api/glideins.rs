//! Glidein API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use corral_core::{CreateGlideinRequest, Glidein, ResourceFilter};

use super::handlers::{api_error, clamp_limit, ApiError};
use super::sites::{CredentialBody, HistoryResponse, MessageResponse};
use crate::state::AppState;

/// Request body for removing a glidein
#[derive(Debug, Deserialize)]
pub struct RemoveGlideinBody {
    #[serde(default)]
    pub force: bool,
}

/// Query parameters for listing glideins
#[derive(Debug, Deserialize)]
pub struct ListGlideinsParams {
    pub owner: Option<String>,
    pub site_id: Option<i64>,
    pub state: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListGlideinsResponse {
    pub glideins: Vec<Glidein>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn create_glidein(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateGlideinRequest>,
) -> Result<(StatusCode, Json<Glidein>), ApiError> {
    let glidein = state
        .orchestrator()
        .create_glidein(request)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(glidein)))
}

pub async fn list_glideins(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListGlideinsParams>,
) -> Result<Json<ListGlideinsResponse>, ApiError> {
    let limit = clamp_limit(params.limit);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = ResourceFilter::new().with_limit(limit).with_offset(offset);
    if let Some(owner) = params.owner {
        filter = filter.with_owner(owner);
    }
    if let Some(site_id) = params.site_id {
        filter = filter.with_site(site_id);
    }
    if let Some(glidein_state) = params.state {
        filter = filter.with_state(glidein_state.to_uppercase());
    }

    let glideins = state
        .orchestrator()
        .list_glideins(&filter)
        .map_err(api_error)?;
    Ok(Json(ListGlideinsResponse {
        glideins,
        limit,
        offset,
    }))
}

pub async fn get_glidein(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Glidein>, ApiError> {
    state
        .orchestrator()
        .get_glidein(id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn submit_glidein(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<CredentialBody>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state
        .orchestrator()
        .submit_glidein(id, &body.into_credential())
        .await
        .map_err(api_error)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: format!("Glidein {} submitted", id),
        }),
    ))
}

pub async fn remove_glidein(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<RemoveGlideinBody>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state
        .orchestrator()
        .remove_glidein(id, body.force)
        .map_err(api_error)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: format!("Glidein {} removal requested", id),
        }),
    ))
}

pub async fn glidein_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state
        .orchestrator()
        .glidein_history(&[id])
        .map_err(api_error)?;
    Ok(Json(HistoryResponse { history }))
}
