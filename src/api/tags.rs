//! People tag endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::auth::UserId;
use crate::errors::AppError;
use crate::models::{CreateTagRequest, PeopleTag};
use crate::AppState;

/// GET /api/campaigns/:id/tags - List a campaign's tags.
pub async fn list_tags(
    State(state): State<AppState>,
    user: UserId,
    Path(campaign_id): Path<String>,
) -> ApiResult<Vec<PeopleTag>> {
    state.repo.authorize(&campaign_id, &user.0).await?;
    let tags = state.repo.list_tags(&campaign_id).await?;
    success(tags)
}

/// POST /api/campaigns/:id/tags - Create a tag.
pub async fn create_tag(
    State(state): State<AppState>,
    user: UserId,
    Path(campaign_id): Path<String>,
    Json(request): Json<CreateTagRequest>,
) -> ApiResult<PeopleTag> {
    state.repo.authorize(&campaign_id, &user.0).await?;

    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Tag name is required".to_string()));
    }

    let tag = state.repo.create_tag(&campaign_id, name).await?;
    success(tag)
}
