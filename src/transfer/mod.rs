//! CSV export and import for people.
//!
//! Export lifts `campaign_meta` keys to the top level and flattens nested
//! values to dotted key paths; the header is the union of keys across all
//! rows in first-seen order. Import maps caller-declared columns onto
//! person fields and meta paths.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::models::Person;

/// Request body for a bulk import.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub config: ImportConfig,
    /// Parsed rows, one object per CSV line keyed by column name.
    pub data: Vec<Map<String, Value>>,
    #[serde(default)]
    pub default_values: Option<ImportDefaults>,
}

/// Column mapping: CSV column name → import target.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportConfig {
    pub columns: HashMap<String, String>,
}

/// Values applied to every imported row.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDefaults {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Meta flags (`supporter`, `donor`, ...) applied wholesale.
    #[serde(default)]
    pub labels: Option<Map<String, Value>>,
}

/// Outcome counts for a bulk import.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Where one CSV column lands on a person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    Name,
    FacebookId,
    /// Dotted `campaign_meta` path.
    Meta(String),
    Skip,
}

/// Parse a column target. Shorthand contact fields expand to their
/// section path; anything else is taken as a meta path verbatim.
pub fn parse_target(target: &str) -> ImportTarget {
    match target {
        "" | "skip" => ImportTarget::Skip,
        "name" => ImportTarget::Name,
        "facebookId" => ImportTarget::FacebookId,
        "email" => ImportTarget::Meta("contact.email".to_string()),
        "cellphone" => ImportTarget::Meta("contact.cellphone".to_string()),
        other => ImportTarget::Meta(other.to_string()),
    }
}

/// One row mapped onto person fields, ready for upsert.
#[derive(Debug, Clone, Default)]
pub struct ImportedRecord {
    pub name: Option<String>,
    pub facebook_id: Option<String>,
    pub meta: Value,
}

impl ImportedRecord {
    /// Contact email, the import dedup key.
    pub fn email(&self) -> Option<&str> {
        self.meta
            .get("contact")
            .and_then(|c| c.get("email"))
            .and_then(|v| v.as_str())
    }

    /// Meta bag as dotted-path updates, for merging into an existing
    /// person. Arrays and scalars are leaves; only objects recurse.
    pub fn meta_paths(&self) -> Vec<(String, Value)> {
        fn walk(value: &Value, prefix: &str, out: &mut Vec<(String, Value)>) {
            match value {
                Value::Object(map) => {
                    for (key, child) in map {
                        walk(child, &join_path(prefix, key), out);
                    }
                }
                leaf => out.push((prefix.to_string(), leaf.clone())),
            }
        }

        let mut paths = Vec::new();
        if self.meta.is_object() {
            walk(&self.meta, "", &mut paths);
        }
        paths
    }
}

/// Map one CSV row onto a record using the column config and defaults.
pub fn map_row(
    row: &Map<String, Value>,
    config: &ImportConfig,
    defaults: Option<&ImportDefaults>,
) -> ImportedRecord {
    let mut record = ImportedRecord {
        meta: Value::Object(Map::new()),
        ..Default::default()
    };

    for (column, target) in &config.columns {
        let Some(value) = row.get(column) else {
            continue;
        };
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Null => continue,
            other => other.to_string(),
        };
        if text.is_empty() {
            continue;
        }

        match parse_target(target) {
            ImportTarget::Name => record.name = Some(text),
            ImportTarget::FacebookId => record.facebook_id = Some(text),
            ImportTarget::Meta(path) => {
                crate::models::meta::set_meta_path(&mut record.meta, &path, Value::String(text));
            }
            ImportTarget::Skip => {}
        }
    }

    if let Some(defaults) = defaults {
        if let Some(tags) = &defaults.tags {
            if !tags.is_empty() {
                crate::models::meta::set_meta_path(
                    &mut record.meta,
                    "tags",
                    Value::Array(tags.iter().cloned().map(Value::String).collect()),
                );
            }
        }
        if let Some(labels) = &defaults.labels {
            for (key, value) in labels {
                crate::models::meta::set_meta_path(&mut record.meta, key, value.clone());
            }
        }
    }

    record
}

/// Render all people of a campaign as CSV.
pub fn export_csv(people: &[Person]) -> Result<String, AppError> {
    let mut header: Vec<String> = Vec::new();
    let mut rows: Vec<HashMap<String, String>> = Vec::new();

    for person in people {
        let flat = flatten_person(person);
        for (key, _) in &flat {
            if !header.contains(key) {
                header.push(key.clone());
            }
        }
        rows.push(flat.into_iter().collect());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for row in &rows {
        let record: Vec<&str> = header
            .iter()
            .map(|key| row.get(key).map(String::as_str).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV error: {}", e)))
}

/// Flatten one person for export: `name`, `facebookId`, then the meta
/// bag lifted to the top level with dotted key paths.
pub fn flatten_person(person: &Person) -> Vec<(String, String)> {
    let mut flat = vec![("name".to_string(), person.name.clone())];
    if let Some(facebook_id) = &person.facebook_id {
        flat.push(("facebookId".to_string(), facebook_id.clone()));
    }
    if let Some(meta) = &person.campaign_meta {
        flatten_value(meta, "", &mut |key, value| {
            flat.push((key.to_string(), value.to_string()));
        });
    }
    flat
}

/// Walk a JSON value depth-first, emitting `(dotted.path, text)` leaves.
/// Array elements get numeric path segments.
fn flatten_value(value: &Value, prefix: &str, emit: &mut dyn FnMut(&str, &str)) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = join_path(prefix, key);
                flatten_value(child, &path, emit);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                let path = join_path(prefix, &i.to_string());
                flatten_value(child, &path, emit);
            }
        }
        Value::Null => {}
        Value::String(s) => emit(prefix, s),
        other => emit(prefix, &other.to_string()),
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PersonSource;
    use serde_json::json;

    fn person(name: &str, meta: Option<Value>) -> Person {
        Person {
            id: "p1".to_string(),
            campaign_id: "c1".to_string(),
            name: name.to_string(),
            facebook_id: None,
            campaign_meta: meta,
            counts: None,
            facebook_accounts: None,
            source: PersonSource::Manual,
            form_id: None,
            filled_form: false,
            last_interaction_date: None,
            location: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn flatten_lifts_meta_to_dotted_paths() {
        let p = person(
            "Ana",
            Some(json!({
                "supporter": true,
                "contact": { "email": "ana@example.com" },
                "basic_info": { "skills": ["design", "video"] }
            })),
        );

        let flat = flatten_person(&p);
        let get = |key: &str| {
            flat.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("name"), Some("Ana"));
        assert_eq!(get("supporter"), Some("true"));
        assert_eq!(get("contact.email"), Some("ana@example.com"));
        assert_eq!(get("basic_info.skills.0"), Some("design"));
        assert_eq!(get("basic_info.skills.1"), Some("video"));
    }

    #[test]
    fn export_header_is_union_in_first_seen_order() {
        let people = vec![
            person("Ana", Some(json!({ "contact": { "email": "a@x.com" } }))),
            person("Bia", Some(json!({ "supporter": true }))),
        ];

        let output = export_csv(&people).unwrap();
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("name,contact.email,supporter"));
        assert_eq!(lines.next(), Some("Ana,a@x.com,"));
        assert_eq!(lines.next(), Some("Bia,,true"));
    }

    #[test]
    fn map_row_applies_column_targets_and_defaults() {
        let config = ImportConfig {
            columns: [
                ("Full name".to_string(), "name".to_string()),
                ("E-mail".to_string(), "email".to_string()),
                ("Town".to_string(), "basic_info.city".to_string()),
                ("Ignored".to_string(), "skip".to_string()),
            ]
            .into_iter()
            .collect(),
        };
        let defaults = ImportDefaults {
            tags: Some(vec!["tag-1".to_string()]),
            labels: Some(
                json!({ "supporter": true })
                    .as_object()
                    .unwrap()
                    .clone(),
            ),
        };
        let row = json!({
            "Full name": "Carlos Lima",
            "E-mail": " carlos@example.com ",
            "Town": "Recife",
            "Ignored": "whatever"
        });

        let record = map_row(row.as_object().unwrap(), &config, Some(&defaults));

        assert_eq!(record.name.as_deref(), Some("Carlos Lima"));
        assert_eq!(record.email(), Some("carlos@example.com"));
        assert_eq!(
            record.meta,
            json!({
                "contact": { "email": "carlos@example.com" },
                "basic_info": { "city": "Recife" },
                "tags": ["tag-1"],
                "supporter": true
            })
        );
    }

    #[test]
    fn empty_cells_are_skipped() {
        let config = ImportConfig {
            columns: [("E-mail".to_string(), "email".to_string())]
                .into_iter()
                .collect(),
        };
        let row = json!({ "E-mail": "  " });

        let record = map_row(row.as_object().unwrap(), &config, None);
        assert!(record.email().is_none());
    }
}
