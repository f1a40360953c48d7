//! People tag model: a campaign-scoped label.

use serde::{Deserialize, Serialize};

/// A name scoped to a campaign, used for filtering and labeling people.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeopleTag {
    pub id: String,
    pub campaign_id: String,
    pub name: String,
    pub created_at: String,
}

/// Request body for creating a tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTagRequest {
    pub name: String,
}
