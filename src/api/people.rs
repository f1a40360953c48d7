//! People API endpoints: search, metadata, duplicates, merge, CSV
//! transfer.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{success, ApiResult};
use crate::auth::UserId;
use crate::errors::AppError;
use crate::models::{
    meta, CreatePersonRequest, DuplicateMatches, FormIdResponse, MergeRequest, MetaSectionRequest,
    Person, PersonSource, UpdatePersonMetaRequest,
};
use crate::search::{build_search_query, PersonQuery, PersonSort, SearchOptions, SearchPlan};
use crate::AppState;

/// Upper bound on full-text candidates fed into the storage filter.
const TEXT_CANDIDATE_LIMIT: usize = 10_000;

/// Request body for `POST /api/people/search` and its count variant.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub campaign_id: String,
    #[serde(default)]
    pub query: PersonQuery,
    #[serde(default)]
    pub options: SearchOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonIdResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct FormIdParams {
    #[serde(default)]
    pub regenerate: Option<bool>,
}

/// POST /api/people/search - Paged people search.
pub async fn search_people(
    State(state): State<AppState>,
    user: UserId,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Vec<Person>> {
    state.repo.authorize(&request.campaign_id, &user.0).await?;
    let plan = build_search_query(&request.campaign_id, &request.query, &request.options)?;
    let people = run_search(&state, &plan).await?;
    success(people)
}

/// POST /api/people/search/count - Total matches for a search.
pub async fn count_search(
    State(state): State<AppState>,
    user: UserId,
    Json(request): Json<SearchRequest>,
) -> ApiResult<i64> {
    state.repo.authorize(&request.campaign_id, &user.0).await?;
    let plan = build_search_query(&request.campaign_id, &request.query, &request.options)?;

    let count = match text_candidates(&state, &plan)? {
        Some(ids) if ids.is_empty() => 0,
        Some(ids) => {
            state
                .repo
                .count_people(&plan.selector, Some(ids.as_slice()))
                .await?
        }
        None => state.repo.count_people(&plan.selector, None).await?,
    };
    success(count)
}

/// Full-text candidate ids for a plan, in relevance order. `None` when
/// the plan has no text term.
fn text_candidates(state: &AppState, plan: &SearchPlan) -> Result<Option<Vec<String>>, AppError> {
    let Some(term) = &plan.selector.text_term else {
        return Ok(None);
    };
    let hits = state
        .search
        .search(&plan.selector.campaign_id, term, TEXT_CANDIDATE_LIMIT)?;
    Ok(Some(hits.into_iter().map(|h| h.person_id).collect()))
}

/// Execute a search plan against the index and the database.
///
/// Relevance ordering lives in the index, so for that sort the rows come
/// back unordered from storage and are re-ranked by hit position here.
/// Every other sort is applied by storage directly.
async fn run_search(state: &AppState, plan: &SearchPlan) -> Result<Vec<Person>, AppError> {
    let candidates = text_candidates(state, plan)?;

    if let Some(ids) = candidates {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        if plan.sort == Some(PersonSort::TextScore) {
            let rows = state
                .repo
                .query_people(&plan.selector, Some(ids.as_slice()), None, 0, ids.len() as u32)
                .await?;
            let rank = |person: &Person| ids.iter().position(|id| *id == person.id);
            let mut ranked: Vec<(usize, Person)> = rows
                .into_iter()
                .filter_map(|p| rank(&p).map(|r| (r, p)))
                .collect();
            ranked.sort_by_key(|(r, _)| *r);
            return Ok(ranked
                .into_iter()
                .map(|(_, p)| p)
                .skip(plan.skip as usize)
                .take(plan.limit as usize)
                .collect());
        }

        return state
            .repo
            .query_people(
                &plan.selector,
                Some(ids.as_slice()),
                plan.sort.as_ref(),
                plan.skip,
                plan.limit,
            )
            .await;
    }

    state
        .repo
        .query_people(&plan.selector, None, plan.sort.as_ref(), plan.skip, plan.limit)
        .await
}

/// POST /api/people - Create a person by hand.
pub async fn create_person(
    State(state): State<AppState>,
    user: UserId,
    Json(request): Json<CreatePersonRequest>,
) -> ApiResult<Person> {
    state.repo.authorize(&request.campaign_id, &user.0).await?;

    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let person = state
        .repo
        .create_person(&request, PersonSource::Manual)
        .await?;
    index_best_effort(&state, &person).await;
    success(person)
}

/// GET /api/people/:id - Fetch one person.
pub async fn get_person(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<String>,
) -> ApiResult<Person> {
    let person = state.repo.require_person(&id).await?;
    state.repo.authorize(&person.campaign_id, &user.0).await?;
    success(person)
}

/// PUT /api/people/:id/meta - Set one metadata key.
///
/// Also makes sure the person carries a form id, so the private form
/// link can be handed out right after tagging someone.
pub async fn update_person_meta(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<String>,
    Json(request): Json<UpdatePersonMetaRequest>,
) -> ApiResult<Person> {
    let person = state.repo.require_person(&id).await?;
    state.repo.authorize(&person.campaign_id, &user.0).await?;

    if request.meta_key.trim().is_empty() {
        return Err(AppError::Validation("Meta key is required".to_string()));
    }
    if !request.meta_value.is_string() && !request.meta_value.is_boolean() {
        return Err(AppError::Validation(
            "Meta value must be a string or a boolean".to_string(),
        ));
    }
    let mut updated = state
        .repo
        .update_campaign_meta(
            &person,
            &[(request.meta_key.clone(), request.meta_value.clone())],
        )
        .await?;

    if updated.form_id.is_none() {
        updated.form_id = Some(state.repo.generate_form_id(&updated.id).await?);
    }

    index_best_effort(&state, &updated).await;
    success(updated)
}

/// PUT /api/people/:id/meta/:section - Replace one metadata section.
pub async fn update_meta_section(
    State(state): State<AppState>,
    user: UserId,
    Path((id, section)): Path<(String, String)>,
    Json(request): Json<MetaSectionRequest>,
) -> ApiResult<Person> {
    let person = state.repo.require_person(&id).await?;
    state.repo.authorize(&person.campaign_id, &user.0).await?;

    if !meta::META_SECTIONS.iter().any(|s| s.key == section) {
        return Err(AppError::Validation(format!(
            "Unknown meta section: {}",
            section
        )));
    }

    // Address changes get geocoded best-effort; a failed lookup keeps
    // the previous location.
    let mut location = None;
    if let Some(address) = request.data.get("address") {
        if let Ok(address) = serde_json::from_value(address.clone()) {
            location = state.external.geocode(&address).await;
        }
    }

    let updated = state
        .repo
        .replace_meta_section(&person, &section, &request.data, location)
        .await?;
    index_best_effort(&state, &updated).await;
    success(updated)
}

/// GET /api/campaigns/:id/people/by-facebook/:facebook_id - Resolve the
/// internal person id behind a social account.
pub async fn person_id_from_facebook(
    State(state): State<AppState>,
    user: UserId,
    Path((campaign_id, facebook_id)): Path<(String, String)>,
) -> ApiResult<PersonIdResponse> {
    state.repo.authorize(&campaign_id, &user.0).await?;

    let person = state
        .repo
        .find_by_facebook(&campaign_id, &facebook_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Person not found".to_string()))?;
    success(PersonIdResponse { id: person.id })
}

/// GET /api/people/:id/form-id - Fetch (or rotate) the private form id.
pub async fn person_form_id(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<String>,
    Query(params): Query<FormIdParams>,
) -> ApiResult<FormIdResponse> {
    let person = state.repo.require_person(&id).await?;
    state.repo.authorize(&person.campaign_id, &user.0).await?;

    let form_id = match (&person.form_id, params.regenerate.unwrap_or(false)) {
        (Some(existing), false) => existing.clone(),
        _ => state.repo.generate_form_id(&person.id).await?,
    };

    success(FormIdResponse {
        form_id,
        filled_form: person.filled_form,
    })
}

/// DELETE /api/people/:id - Remove a person.
pub async fn delete_person(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let person = state.repo.require_person(&id).await?;
    state.repo.authorize(&person.campaign_id, &user.0).await?;

    state.repo.delete_person(&id).await?;
    if let Err(e) = state.search.remove_person(&id).await {
        tracing::warn!("Failed to remove person {} from search index: {}", id, e);
    }
    success(())
}

/// GET /api/people/:id/duplicates - Candidate duplicates grouped by
/// matching criterion.
pub async fn find_duplicates(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<String>,
) -> ApiResult<DuplicateMatches> {
    let person = state.repo.require_person(&id).await?;
    state.repo.authorize(&person.campaign_id, &user.0).await?;

    let matches = state.repo.find_duplicates(&person).await?;
    success(matches)
}

/// POST /api/people/:id/merge - Fold duplicate people into a target.
pub async fn merge_people(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<String>,
    Json(request): Json<MergeRequest>,
) -> ApiResult<Person> {
    let target = state.repo.require_person(&id).await?;
    state.repo.authorize(&target.campaign_id, &user.0).await?;

    if request.merged.get("id").and_then(Value::as_str) != Some(id.as_str()) {
        return Err(AppError::Validation(
            "Merged document does not match the target person".to_string(),
        ));
    }
    if request.from.is_empty() {
        return Err(AppError::Validation(
            "No people to merge from".to_string(),
        ));
    }

    let mut sources = Vec::with_capacity(request.from.len());
    for source_id in &request.from {
        if *source_id == id {
            return Err(AppError::Validation(
                "Cannot merge a person into itself".to_string(),
            ));
        }
        let source = state.repo.require_person(source_id).await?;
        if source.campaign_id != target.campaign_id {
            return Err(AppError::not_allowed());
        }
        sources.push(source);
    }

    let facebook_ids = meta::distinct_facebook_ids(&target, &sources, &request.merged);
    if facebook_ids.len() > 1 {
        return Err(AppError::Validation(
            "Cannot merge people linked to different Facebook profiles".to_string(),
        ));
    }

    let outcome = meta::compute_merge(&target, &sources, &request.merged);
    let updated = state
        .repo
        .apply_merge(&target, &outcome, &request.from, request.remove)
        .await?;

    index_best_effort(&state, &updated).await;
    if request.remove {
        for source in &sources {
            if let Err(e) = state.search.remove_person(&source.id).await {
                tracing::warn!(
                    "Failed to remove merged person {} from search index: {}",
                    source.id,
                    e
                );
            }
        }
    }

    success(updated)
}

/// GET /api/campaigns/:id/people/export - All people as CSV.
pub async fn export_people(
    State(state): State<AppState>,
    user: UserId,
    Path(campaign_id): Path<String>,
) -> Result<Response, AppError> {
    state.repo.authorize(&campaign_id, &user.0).await?;

    let people = state.repo.list_people(&campaign_id).await?;
    let csv = crate::transfer::export_csv(&people)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"people.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

/// POST /api/campaigns/:id/people/import - Bulk import mapped rows.
///
/// Rows are deduplicated by contact email: a matching person gets the
/// mapped meta merged in, everything else is created fresh.
pub async fn import_people(
    State(state): State<AppState>,
    user: UserId,
    Path(campaign_id): Path<String>,
    Json(request): Json<crate::transfer::ImportRequest>,
) -> ApiResult<crate::transfer::ImportSummary> {
    state.repo.authorize(&campaign_id, &user.0).await?;

    let mut summary = crate::transfer::ImportSummary::default();
    for row in &request.data {
        let record = crate::transfer::map_row(row, &request.config, request.default_values.as_ref());

        let existing = match record.email() {
            Some(email) => state.repo.find_by_contact_email(&campaign_id, email).await?,
            None => None,
        };

        if let Some(person) = existing {
            let updated = state
                .repo
                .update_campaign_meta(&person, &record.meta_paths())
                .await?;
            index_best_effort(&state, &updated).await;
            summary.updated += 1;
            continue;
        }

        let Some(name) = record
            .name
            .clone()
            .or_else(|| record.email().map(String::from))
        else {
            summary.skipped += 1;
            continue;
        };

        let create = CreatePersonRequest {
            campaign_id: campaign_id.clone(),
            name,
            facebook_id: record.facebook_id.clone(),
            campaign_meta: record
                .meta
                .as_object()
                .filter(|m| !m.is_empty())
                .map(|_| record.meta.clone()),
        };
        let person = state.repo.create_person(&create, PersonSource::Import).await?;
        index_best_effort(&state, &person).await;
        summary.created += 1;
    }

    success(summary)
}

/// Index a person, logging instead of failing the request. The database
/// is the source of truth and the index is rebuilt at startup.
pub(super) async fn index_best_effort(state: &AppState, person: &Person) {
    if let Err(e) = state.search.index_person(person).await {
        tracing::warn!("Failed to index person {}: {}", person.id, e);
    }
}
