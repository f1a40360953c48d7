//! Campaign model: the tenant boundary owning people and tags.

use serde::{Deserialize, Serialize};

/// A campaign with its list of authorized users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    /// User ids allowed to operate on this campaign's people.
    pub users: Vec<String>,
    pub created_at: String,
}

impl Campaign {
    /// Whether the given user may operate on this campaign.
    pub fn allows(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u == user_id)
    }
}

/// Request body for creating a campaign.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    pub name: String,
    #[serde(default)]
    pub users: Vec<String>,
}
