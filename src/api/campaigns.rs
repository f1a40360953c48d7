//! Campaign admin endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::auth::UserId;
use crate::errors::AppError;
use crate::models::{Campaign, CreateCampaignRequest};
use crate::AppState;

/// POST /api/campaigns - Create a campaign. The creator is always part
/// of the user list.
pub async fn create_campaign(
    State(state): State<AppState>,
    user: UserId,
    Json(mut request): Json<CreateCampaignRequest>,
) -> ApiResult<Campaign> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Campaign name is required".to_string()));
    }
    if !request.users.iter().any(|u| *u == user.0) {
        request.users.push(user.0.clone());
    }

    let campaign = state.repo.create_campaign(&request).await?;
    success(campaign)
}

/// GET /api/campaigns/:id - Fetch a campaign.
pub async fn get_campaign(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<String>,
) -> ApiResult<Campaign> {
    let campaign = state.repo.authorize(&id, &user.0).await?;
    success(campaign)
}
