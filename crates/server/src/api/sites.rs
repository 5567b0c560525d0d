//! Site API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use corral_core::{CorralError, CreateSiteRequest, Credential, HistoryEntry, ResourceFilter, Site};

use super::handlers::{api_error, clamp_limit, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// A delegated proxy as sent by clients.
#[derive(Debug, Deserialize)]
pub struct CredentialBody {
    /// PEM encoded proxy certificate chain
    pub credential: String,
    pub expires_at: DateTime<Utc>,
}

impl CredentialBody {
    pub fn into_credential(self) -> Credential {
        Credential::new(self.credential.into_bytes(), self.expires_at)
    }
}

/// Request body for removing a site
#[derive(Debug, Deserialize)]
pub struct RemoveSiteBody {
    #[serde(default)]
    pub force: bool,
    /// Replaces the stored credential for the uninstall job
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Query parameters for listing sites
#[derive(Debug, Deserialize)]
pub struct ListSitesParams {
    pub owner: Option<String>,
    pub state: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListSitesResponse {
    pub sites: Vec<Site>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_site(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSiteRequest>,
) -> Result<(StatusCode, Json<Site>), ApiError> {
    let site = state
        .orchestrator()
        .create_site(request)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(site)))
}

pub async fn list_sites(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListSitesParams>,
) -> Result<Json<ListSitesResponse>, ApiError> {
    let limit = clamp_limit(params.limit);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = ResourceFilter::new().with_limit(limit).with_offset(offset);
    if let Some(owner) = params.owner {
        filter = filter.with_owner(owner);
    }
    if let Some(site_state) = params.state {
        filter = filter.with_state(site_state.to_uppercase());
    }

    let sites = state.orchestrator().list_sites(&filter).map_err(api_error)?;
    Ok(Json(ListSitesResponse {
        sites,
        limit,
        offset,
    }))
}

pub async fn get_site(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Site>, ApiError> {
    state
        .orchestrator()
        .get_site(id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn submit_site(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<CredentialBody>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state
        .orchestrator()
        .submit_site(id, &body.into_credential())
        .await
        .map_err(api_error)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: format!("Site {} submitted", id),
        }),
    ))
}

pub async fn remove_site(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<RemoveSiteBody>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let credential = match (body.credential, body.expires_at) {
        (Some(data), Some(expires_at)) => Some(Credential::new(data.into_bytes(), expires_at)),
        (None, None) => None,
        _ => {
            return Err(api_error(CorralError::validation(
                "credential and expires_at must be given together",
            )))
        }
    };

    state
        .orchestrator()
        .remove_site(id, body.force, credential.as_ref())
        .await
        .map_err(api_error)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: format!("Site {} removal requested", id),
        }),
    ))
}

pub async fn site_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state.orchestrator().site_history(&[id]).map_err(api_error)?;
    Ok(Json(HistoryResponse { history }))
}
