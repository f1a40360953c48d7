//! Public form endpoints.
//!
//! These routes sit outside the service-key layer: the public signup
//! form and the zipcode helper are called straight from browsers. A
//! person reached through a known `form_id` may update their own data;
//! fresh submissions go through recaptcha when a secret is configured.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::{people::index_best_effort, success, ApiResult};
use crate::errors::AppError;
use crate::external::ZipcodeInfo;
use crate::models::{Address, CreatePersonRequest, FormIdResponse, PersonSource};
use crate::AppState;

/// Body of `POST /api/form/submit`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmission {
    /// Required for fresh submissions; ignored when `form_id` is set.
    #[serde(default)]
    pub campaign_id: Option<String>,
    /// Private form id of an existing person updating their own data.
    #[serde(default)]
    pub form_id: Option<String>,
    #[serde(default)]
    pub recaptcha: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub cellphone: Option<String>,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
    #[serde(default)]
    pub supporter: Option<bool>,
    #[serde(default)]
    pub volunteer: Option<bool>,
    #[serde(default)]
    pub mobilizer: Option<bool>,
    #[serde(default)]
    pub donor: Option<bool>,
}

impl FormSubmission {
    /// Map the posted fields onto `campaign_meta` paths.
    fn meta_updates(&self) -> Vec<(String, Value)> {
        let mut updates: Vec<(String, Value)> = Vec::new();
        let mut text = |path: &str, field: &Option<String>| {
            if let Some(value) = field.as_deref().filter(|v| !v.trim().is_empty()) {
                updates.push((path.to_string(), Value::String(value.to_string())));
            }
        };
        text("contact.email", &self.email);
        text("contact.cellphone", &self.cellphone);
        text("basic_info.birthday", &self.birthday);

        if let Some(skills) = self.skills.as_ref().filter(|s| !s.is_empty()) {
            updates.push((
                "basic_info.skills".to_string(),
                Value::Array(skills.iter().cloned().map(Value::String).collect()),
            ));
        }
        if let Some(address) = &self.address {
            if let Ok(value) = serde_json::to_value(address) {
                updates.push(("basic_info.address".to_string(), value));
            }
        }

        let mut flag = |key: &str, field: Option<bool>| {
            if let Some(value) = field {
                updates.push((key.to_string(), Value::Bool(value)));
            }
        };
        flag("supporter", self.supporter);
        flag("volunteer", self.volunteer);
        flag("mobilizer", self.mobilizer);
        flag("donor", self.donor);

        updates
    }
}

/// Body of `POST /api/form/connect-facebook`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectFacebookRequest {
    pub campaign_id: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ZipcodeParams {
    #[serde(default)]
    pub country: Option<String>,
    pub zipcode: String,
}

/// POST /api/form/submit - Public form submission.
///
/// With a `form_id` the matching person is updated in place and the id
/// is rotated, so a leaked link only works once. Without one a new
/// person is created for the campaign, behind recaptcha when enabled.
pub async fn submit_form(
    State(state): State<AppState>,
    Json(submission): Json<FormSubmission>,
) -> ApiResult<FormIdResponse> {
    let updates = submission.meta_updates();

    let mut location = None;
    if let Some(address) = &submission.address {
        location = state.external.geocode(address).await;
    }

    if let Some(form_id) = submission.form_id.as_deref().filter(|f| !f.is_empty()) {
        let person = state
            .repo
            .find_by_form_id(form_id)
            .await?
            .ok_or_else(|| AppError::Validation("Unauthorized request".to_string()))?;

        let name = submission
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&person.name)
            .to_string();

        let updated = state
            .repo
            .apply_form_submission(&person, &name, &updates, location)
            .await?;
        let rotated = state.repo.generate_form_id(&updated.id).await?;

        index_best_effort(&state, &updated).await;
        return success(FormIdResponse {
            form_id: rotated,
            filled_form: true,
        });
    }

    let campaign_id = submission
        .campaign_id
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("Campaign is required".to_string()))?;
    state
        .repo
        .get_campaign(campaign_id)
        .await?
        .ok_or_else(|| AppError::Validation("This campaign does not exist".to_string()))?;

    if state.config.recaptcha_secret.is_some() {
        let token = submission
            .recaptcha
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Validation("Make sure you are not a robot".to_string()))?;
        if !state.external.verify_recaptcha(token).await? {
            return Err(AppError::Validation("Invalid recaptcha".to_string()));
        }
    }

    let name = submission
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Name is required".to_string()))?;

    let person = state
        .repo
        .create_person(
            &CreatePersonRequest {
                campaign_id: campaign_id.to_string(),
                name: name.to_string(),
                facebook_id: None,
                campaign_meta: None,
            },
            PersonSource::Form,
        )
        .await?;
    let updated = state
        .repo
        .apply_form_submission(&person, name, &updates, location)
        .await?;
    let form_id = state.repo.generate_form_id(&updated.id).await?;

    index_best_effort(&state, &updated).await;
    success(FormIdResponse {
        form_id,
        filled_form: true,
    })
}

/// POST /api/form/connect-facebook - Link the form session to a Facebook
/// profile and hand back a form id for the follow-up submit.
pub async fn connect_facebook(
    State(state): State<AppState>,
    Json(request): Json<ConnectFacebookRequest>,
) -> ApiResult<FormIdResponse> {
    state
        .repo
        .get_campaign(&request.campaign_id)
        .await?
        .ok_or_else(|| AppError::Validation("This campaign does not exist".to_string()))?;

    let profile = state
        .external
        .fetch_facebook_profile(&request.access_token)
        .await?;

    let person = state
        .repo
        .upsert_facebook_person(
            &request.campaign_id,
            &profile.id,
            &profile.name,
            profile.email.as_deref(),
        )
        .await?;

    let form_id = match &person.form_id {
        Some(existing) => existing.clone(),
        None => state.repo.generate_form_id(&person.id).await?,
    };

    index_best_effort(&state, &person).await;
    success(FormIdResponse {
        form_id,
        filled_form: person.filled_form,
    })
}

/// GET /api/zipcode - Resolve a zipcode to address parts.
pub async fn resolve_zipcode(
    State(state): State<AppState>,
    Query(params): Query<ZipcodeParams>,
) -> ApiResult<ZipcodeInfo> {
    if params.zipcode.trim().is_empty() {
        return Err(AppError::Validation("Zipcode is required".to_string()));
    }
    let country = params.country.as_deref().unwrap_or("BR");
    let info = state.external.resolve_zipcode(country, &params.zipcode).await;
    success(info)
}
