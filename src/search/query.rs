//! Search query construction.
//!
//! Translates the client's free-form query and options objects into a
//! `(selector, options)` pair consumed directly by the storage layer.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::models::PersonSource;

/// Hard cap on the result page size.
pub const MAX_SEARCH_LIMIT: u32 = 50;

/// Page size when the caller does not ask for one.
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

/// Free-form query part of a people search.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonQuery {
    /// Free-text term, resolved through the full-text index.
    #[serde(default)]
    pub q: Option<String>,
    /// `account` narrows to people linked to the target account,
    /// `import` narrows to imported people.
    #[serde(default)]
    pub account_filter: Option<String>,
    /// Pass-through filters; only `campaignMeta.*` keys are honored.
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

/// Options part of a people search.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    #[serde(default)]
    pub skip: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub sort: Option<String>,
    /// Target social account id for engagement sorts and account filters.
    #[serde(default)]
    pub facebook_id: Option<String>,
}

/// Engagement count field available for sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountField {
    Likes,
    Comments,
}

impl CountField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountField::Likes => "likes",
            CountField::Comments => "comments",
        }
    }
}

/// Sort document applied by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonSort {
    /// Ascending by name.
    Name,
    /// Descending by a per-account engagement tally.
    Counts { facebook_id: String, field: CountField },
    /// Descending by last interaction date.
    LastInteraction,
    /// Descending by full-text relevance (only valid with a text term).
    TextScore,
}

/// Filters applied by the storage layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonSelector {
    pub campaign_id: String,
    pub text_term: Option<String>,
    /// Restrict to people whose `facebook_accounts` contains this id.
    pub facebook_account: Option<String>,
    pub source: Option<PersonSource>,
    /// Dotted `campaign_meta` paths (prefix already stripped) and the
    /// value they must equal.
    pub meta_filters: Vec<(String, Value)>,
}

/// The `(selector, options)` pair handed to the repository.
#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub selector: PersonSelector,
    pub sort: Option<PersonSort>,
    pub skip: u32,
    pub limit: u32,
}

/// Build the storage-layer query for a people search.
///
/// Engagement and interaction sorts need a target account id; asking for
/// one without it is a caller error. A free-text term without an explicit
/// sort falls back to relevance ordering.
pub fn build_search_query(
    campaign_id: &str,
    query: &PersonQuery,
    options: &SearchOptions,
) -> Result<SearchPlan, AppError> {
    let skip = options.skip.unwrap_or(0);
    let limit = options
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .min(MAX_SEARCH_LIMIT);

    let mut sort = match options.sort.as_deref() {
        None | Some("") => None,
        Some("name") => Some(PersonSort::Name),
        Some(key @ ("comments" | "likes")) => {
            let facebook_id = options.facebook_id.clone().ok_or_else(|| {
                AppError::Validation(format!("facebookId is required for '{}' sort", key))
            })?;
            let field = if key == "likes" {
                CountField::Likes
            } else {
                CountField::Comments
            };
            Some(PersonSort::Counts { facebook_id, field })
        }
        Some("lastInteraction") => {
            if options.facebook_id.is_none() {
                return Err(AppError::Validation(
                    "facebookId is required for 'lastInteraction' sort".to_string(),
                ));
            }
            Some(PersonSort::LastInteraction)
        }
        Some(other) => {
            return Err(AppError::Validation(format!(
                "Invalid sort key '{}'",
                other
            )));
        }
    };

    let mut selector = PersonSelector {
        campaign_id: campaign_id.to_string(),
        ..Default::default()
    };

    let text_term = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    if text_term.is_some() && sort.is_none() {
        sort = Some(PersonSort::TextScore);
    }
    selector.text_term = text_term;

    match query.account_filter.as_deref() {
        Some("account") => {
            // Without a target account the filter cannot apply.
            if let Some(facebook_id) = &options.facebook_id {
                selector.facebook_account = Some(facebook_id.clone());
            }
        }
        Some("import") => {
            selector.source = Some(PersonSource::Import);
        }
        _ => {}
    }

    for (key, value) in &query.props {
        if let Some(meta_path) = key.strip_prefix("campaignMeta.") {
            if !value.is_null() {
                selector
                    .meta_filters
                    .push((meta_path.to_string(), value.clone()));
            }
        }
    }

    Ok(SearchPlan {
        selector,
        sort,
        skip,
        limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(value: Value) -> PersonQuery {
        serde_json::from_value(value).unwrap()
    }

    fn options(value: Value) -> SearchOptions {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn limit_is_clamped_to_maximum() {
        let plan =
            build_search_query("c1", &query(json!({})), &options(json!({ "limit": 500 }))).unwrap();
        assert_eq!(plan.limit, MAX_SEARCH_LIMIT);

        let plan = build_search_query("c1", &query(json!({})), &options(json!({}))).unwrap();
        assert_eq!(plan.limit, DEFAULT_SEARCH_LIMIT);
        assert_eq!(plan.skip, 0);
    }

    #[test]
    fn name_sort_maps_to_ascending_name() {
        let plan =
            build_search_query("c1", &query(json!({})), &options(json!({ "sort": "name" })))
                .unwrap();
        assert_eq!(plan.sort, Some(PersonSort::Name));
    }

    #[test]
    fn engagement_sort_requires_account_id() {
        let err = build_search_query(
            "c1",
            &query(json!({})),
            &options(json!({ "sort": "comments" })),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let plan = build_search_query(
            "c1",
            &query(json!({})),
            &options(json!({ "sort": "likes", "facebookId": "acc-1" })),
        )
        .unwrap();
        assert_eq!(
            plan.sort,
            Some(PersonSort::Counts {
                facebook_id: "acc-1".to_string(),
                field: CountField::Likes
            })
        );
    }

    #[test]
    fn last_interaction_sort_requires_account_id() {
        let err = build_search_query(
            "c1",
            &query(json!({})),
            &options(json!({ "sort": "lastInteraction" })),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn unknown_sort_key_is_rejected() {
        let err = build_search_query(
            "c1",
            &query(json!({})),
            &options(json!({ "sort": "bogus" })),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn text_term_falls_back_to_relevance_sort() {
        let plan =
            build_search_query("c1", &query(json!({ "q": "maria" })), &options(json!({})))
                .unwrap();
        assert_eq!(plan.sort, Some(PersonSort::TextScore));
        assert_eq!(plan.selector.text_term.as_deref(), Some("maria"));

        // An explicit sort wins over relevance.
        let plan = build_search_query(
            "c1",
            &query(json!({ "q": "maria" })),
            &options(json!({ "sort": "name" })),
        )
        .unwrap();
        assert_eq!(plan.sort, Some(PersonSort::Name));
    }

    #[test]
    fn blank_text_term_is_ignored() {
        let plan =
            build_search_query("c1", &query(json!({ "q": "   " })), &options(json!({})))
                .unwrap();
        assert!(plan.selector.text_term.is_none());
        assert!(plan.sort.is_none());
    }

    #[test]
    fn account_filter_narrows_to_linked_account() {
        let plan = build_search_query(
            "c1",
            &query(json!({ "accountFilter": "account" })),
            &options(json!({ "facebookId": "acc-9" })),
        )
        .unwrap();
        assert_eq!(plan.selector.facebook_account.as_deref(), Some("acc-9"));

        // Dropped when no target account is given.
        let plan = build_search_query(
            "c1",
            &query(json!({ "accountFilter": "account" })),
            &options(json!({})),
        )
        .unwrap();
        assert!(plan.selector.facebook_account.is_none());
    }

    #[test]
    fn import_filter_narrows_to_imported_source() {
        let plan = build_search_query(
            "c1",
            &query(json!({ "accountFilter": "import" })),
            &options(json!({})),
        )
        .unwrap();
        assert_eq!(plan.selector.source, Some(PersonSource::Import));
    }

    #[test]
    fn only_campaign_meta_props_are_honored() {
        let plan = build_search_query(
            "c1",
            &query(json!({
                "campaignMeta.supporter": true,
                "campaignId": "other-campaign",
                "source": "import"
            })),
            &options(json!({})),
        )
        .unwrap();

        assert_eq!(
            plan.selector.meta_filters,
            vec![("supporter".to_string(), json!(true))]
        );
        assert_eq!(plan.selector.campaign_id, "c1");
        assert!(plan.selector.source.is_none());
    }
}
