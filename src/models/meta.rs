//! The campaign metadata model: known flag keys, section layout, and the
//! merge document computation for folding duplicate people together.

use serde_json::{Map, Value};

use crate::models::Person;

/// Boolean flags toggled directly on `campaign_meta`.
pub const META_FLAGS: &[&str] = &[
    "supporter",
    "volunteer",
    "mobilizer",
    "donor",
    "influencer",
    "voter",
    "non-voter",
    "troll",
];

/// One section of structured metadata fields.
pub struct MetaSection {
    pub key: &'static str,
    pub fields: &'static [&'static str],
}

/// Sections of the metadata bag with their known fields. Drives which
/// field paths participate in a merge.
pub const META_SECTIONS: &[MetaSection] = &[
    MetaSection {
        key: "basic_info",
        fields: &["birthday", "address", "skills", "occupation", "gender"],
    },
    MetaSection {
        key: "contact",
        fields: &["email", "cellphone", "telephone"],
    },
    MetaSection {
        key: "social_networks",
        fields: &["twitter", "instagram"],
    },
];

/// Field paths taken from the edited document during a merge: `name`,
/// the top-level flags and every known meta section field.
pub fn merge_field_paths() -> Vec<String> {
    let mut fields = vec!["name".to_string()];
    for flag in META_FLAGS {
        fields.push(format!("campaignMeta.{}", flag));
    }
    for section in META_SECTIONS {
        for field in section.fields {
            fields.push(format!("campaignMeta.{}.{}", section.key, field));
        }
    }
    fields
}

/// The computed outcome of merging duplicate people into a target.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub name: Option<String>,
    pub facebook_id: Option<String>,
    pub counts: Option<Map<String, Value>>,
    pub facebook_accounts: Option<Vec<String>>,
    pub last_interaction_date: Option<String>,
    /// Dotted meta paths (without the `campaignMeta.` prefix) to set.
    pub meta_updates: Vec<(String, Value)>,
}

/// Compute the merged state for a target person.
///
/// Auto-fields (`facebookId`, `counts`, `facebookAccounts`,
/// `lastInteractionDate`) are unioned across the source people in order,
/// then overridden by the edited document. Merge fields are taken from
/// the edited document when non-empty.
pub fn compute_merge(target: &Person, sources: &[Person], merged: &Value) -> MergeOutcome {
    let mut outcome = MergeOutcome {
        facebook_id: target.facebook_id.clone(),
        counts: target.counts.clone(),
        facebook_accounts: target.facebook_accounts.clone(),
        last_interaction_date: target.last_interaction_date.clone(),
        ..Default::default()
    };

    for source in sources {
        if let Some(fb) = &source.facebook_id {
            outcome.facebook_id.get_or_insert_with(|| fb.clone());
        }
        if let Some(counts) = &source.counts {
            let entry = outcome.counts.get_or_insert_with(Map::new);
            for (account, tally) in counts {
                entry.entry(account.clone()).or_insert_with(|| tally.clone());
            }
        }
        if let Some(accounts) = &source.facebook_accounts {
            let entry = outcome.facebook_accounts.get_or_insert_with(Vec::new);
            for account in accounts {
                if !entry.contains(account) {
                    entry.push(account.clone());
                }
            }
        }
        if let Some(date) = &source.last_interaction_date {
            let keep_existing = outcome
                .last_interaction_date
                .as_deref()
                .is_some_and(|current| current >= date.as_str());
            if !keep_existing {
                outcome.last_interaction_date = Some(date.clone());
            }
        }
    }

    // Edited document wins over anything accumulated from the sources.
    if let Some(fb) = merged.get("facebookId").and_then(|v| v.as_str()) {
        outcome.facebook_id = Some(fb.to_string());
    }
    if let Some(counts) = merged.get("counts").and_then(|v| v.as_object()) {
        outcome.counts = Some(counts.clone());
    }
    if let Some(accounts) = merged.get("facebookAccounts").and_then(|v| v.as_array()) {
        outcome.facebook_accounts = Some(
            accounts
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
        );
    }
    if let Some(date) = merged.get("lastInteractionDate").and_then(|v| v.as_str()) {
        outcome.last_interaction_date = Some(date.to_string());
    }

    for path in merge_field_paths() {
        let Some(value) = lookup_path(merged, &path) else {
            continue;
        };
        if value.is_null() || value.as_str().is_some_and(str::is_empty) {
            continue;
        }
        if path == "name" {
            if let Some(name) = value.as_str() {
                outcome.name = Some(name.to_string());
            }
        } else if let Some(meta_path) = path.strip_prefix("campaignMeta.") {
            outcome
                .meta_updates
                .push((meta_path.to_string(), value.clone()));
        }
    }

    outcome
}

/// Distinct facebook ids across the target, the sources, and the edited
/// document. More than one means the merge must be rejected.
pub fn distinct_facebook_ids(target: &Person, sources: &[Person], merged: &Value) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let mut push = |id: Option<&str>| {
        if let Some(id) = id {
            if !id.is_empty() && !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        }
    };
    push(target.facebook_id.as_deref());
    for source in sources {
        push(source.facebook_id.as_deref());
    }
    push(merged.get("facebookId").and_then(|v| v.as_str()));
    ids
}

/// Set a dotted path inside a meta bag, creating intermediate objects
/// and replacing non-object intermediates.
pub fn set_meta_path(meta: &mut Value, path: &str, value: Value) {
    fn set_inner(obj: &mut Map<String, Value>, parts: &[&str], value: Value) {
        match parts {
            [] => {}
            [last] => {
                obj.insert((*last).to_string(), value);
            }
            [head, rest @ ..] => {
                let entry = obj
                    .entry((*head).to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                if let Value::Object(map) = entry {
                    set_inner(map, rest, value);
                }
            }
        }
    }

    if !meta.is_object() {
        *meta = Value::Object(Map::new());
    }
    if let Value::Object(map) = meta {
        let parts: Vec<&str> = path.split('.').collect();
        set_inner(map, &parts, value);
    }
}

fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
