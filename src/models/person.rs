//! Person model: one contact record per campaign.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a person record entered the system.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PersonSource {
    Manual,
    Form,
    Import,
    Facebook,
}

impl PersonSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonSource::Manual => "manual",
            PersonSource::Form => "form",
            PersonSource::Import => "import",
            PersonSource::Facebook => "facebook",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(PersonSource::Manual),
            "form" => Some(PersonSource::Form),
            "import" => Some(PersonSource::Import),
            "facebook" => Some(PersonSource::Facebook),
            _ => None,
        }
    }
}

/// A contact tracked by a campaign.
///
/// `campaign_meta` is a free-form JSON bag: boolean flags such as
/// `supporter` or `donor` at the top level, plus nested sections
/// (`contact`, `basic_info`, ...) holding structured fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub campaign_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_meta: Option<Value>,
    /// Per-account engagement tallies keyed by social account id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook_accounts: Option<Vec<String>>,
    pub source: PersonSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
    #[serde(default)]
    pub filled_form: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_interaction_date: Option<String>,
    /// `[lat, lon]` resolved from the address, when geocoding succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<[f64; 2]>,
    pub created_at: String,
    pub updated_at: String,
}

impl Person {
    /// Read a single `campaign_meta` value by dotted key path.
    pub fn meta(&self, key_path: &str) -> Option<&Value> {
        let mut current = self.campaign_meta.as_ref()?;
        for part in key_path.split('.') {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Contact email, when present in the meta bag.
    pub fn contact_email(&self) -> Option<&str> {
        self.meta("contact.email").and_then(|v| v.as_str())
    }
}

/// A postal address as collected by the public form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zipcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighbourhood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
}

impl Address {
    /// One-line rendering used as the geocoder query string.
    pub fn as_query(&self) -> String {
        let fields = [
            &self.street,
            &self.number,
            &self.neighbourhood,
            &self.city,
            &self.region,
            &self.zipcode,
        ];
        let parts: Vec<&str> = fields
            .into_iter()
            .filter_map(|f| f.as_deref())
            .filter(|s| !s.is_empty())
            .collect();
        let mut query = parts.join(", ");
        if !self.country.is_empty() {
            if !query.is_empty() {
                query.push_str(", ");
            }
            query.push_str(&self.country);
        }
        query
    }
}

/// Request body for manual person entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePersonRequest {
    pub campaign_id: String,
    pub name: String,
    #[serde(default)]
    pub facebook_id: Option<String>,
    #[serde(default)]
    pub campaign_meta: Option<Value>,
}

/// Request body for setting one meta key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePersonMetaRequest {
    pub meta_key: String,
    /// String or boolean.
    pub meta_value: Value,
}

/// Request body for replacing a whole meta section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaSectionRequest {
    pub data: Map<String, Value>,
}

/// Response for `form-id` lookups.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormIdResponse {
    pub form_id: String,
    pub filled_form: bool,
}

/// Request body for merging duplicate people.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    /// The edited target document, as the caller wants it to end up.
    pub merged: Value,
    /// Ids of the duplicate people to fold into the target.
    pub from: Vec<String>,
    /// Delete the source people after merging.
    pub remove: bool,
}

/// Duplicate candidates grouped by the criterion that matched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateMatches {
    pub facebook: Vec<Person>,
    pub name: Vec<Person>,
    pub email: Vec<Person>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_with_meta(meta: Value) -> Person {
        Person {
            id: "p1".to_string(),
            campaign_id: "c1".to_string(),
            name: "Ana".to_string(),
            facebook_id: None,
            campaign_meta: Some(meta),
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
    fn meta_lookup_by_dotted_path() {
        let person = person_with_meta(json!({
            "supporter": true,
            "contact": { "email": "ana@example.com" }
        }));

        assert_eq!(person.meta("supporter"), Some(&json!(true)));
        assert_eq!(person.contact_email(), Some("ana@example.com"));
        assert!(person.meta("contact.cellphone").is_none());
        assert!(person.meta("missing.path").is_none());
    }

    #[test]
    fn address_query_skips_empty_parts() {
        let address = Address {
            country: "BR".to_string(),
            zipcode: Some("01310-100".to_string()),
            region: None,
            city: Some("São Paulo".to_string()),
            neighbourhood: Some("".to_string()),
            street: Some("Av. Paulista".to_string()),
            number: Some("1000".to_string()),
            complement: None,
        };
        assert_eq!(
            address.as_query(),
            "Av. Paulista, 1000, São Paulo, 01310-100, BR"
        );
    }

    #[test]
    fn source_round_trip() {
        for source in ["manual", "form", "import", "facebook"] {
            assert_eq!(PersonSource::parse(source).unwrap().as_str(), source);
        }
        assert!(PersonSource::parse("unknown").is_none());
    }
}
