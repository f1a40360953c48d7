//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity. JSON
//! columns hold the free-form bags (`campaign_meta`, `counts`,
//! `facebook_accounts`, `location`).

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::errors::AppError;
use crate::models::meta::{set_meta_path, MergeOutcome};
use crate::models::{
    Campaign, CreateCampaignRequest, CreatePersonRequest, DuplicateMatches, PeopleTag, Person,
    PersonSource,
};
use crate::search::{CountField, PersonSelector, PersonSort};

const PERSON_COLUMNS: &str = "id, campaign_id, name, facebook_id, campaign_meta, counts, \
     facebook_accounts, source, form_id, filled_form, last_interaction_date, location, \
     created_at, updated_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== CAMPAIGN OPERATIONS ====================

    /// Create a new campaign.
    pub async fn create_campaign(
        &self,
        request: &CreateCampaignRequest,
    ) -> Result<Campaign, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let users_json = serde_json::to_string(&request.users)?;

        sqlx::query("INSERT INTO campaigns (id, name, users, created_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(&request.name)
            .bind(&users_json)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        Ok(Campaign {
            id,
            name: request.name.clone(),
            users: request.users.clone(),
            created_at: now,
        })
    }

    /// Get a campaign by ID.
    pub async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, AppError> {
        let row = sqlx::query("SELECT id, name, users, created_at FROM campaigns WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(campaign_from_row))
    }

    /// Fetch a campaign and verify the user may operate on it.
    ///
    /// Every person and tag operation goes through this check.
    pub async fn authorize(&self, campaign_id: &str, user_id: &str) -> Result<Campaign, AppError> {
        let campaign = self
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("This campaign does not exist".to_string()))?;

        if !campaign.allows(user_id) {
            return Err(AppError::not_allowed());
        }

        Ok(campaign)
    }

    // ==================== PERSON OPERATIONS ====================

    /// Get a person by ID.
    pub async fn get_person(&self, id: &str) -> Result<Option<Person>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM people WHERE id = ?",
            PERSON_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(person_from_row).transpose()
    }

    /// Create a new person.
    pub async fn create_person(
        &self,
        request: &CreatePersonRequest,
        source: PersonSource,
    ) -> Result<Person, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let meta_json = request
            .campaign_meta
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO people (id, campaign_id, name, facebook_id, campaign_meta, source, \
             filled_form, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(&request.campaign_id)
        .bind(&request.name)
        .bind(&request.facebook_id)
        .bind(&meta_json)
        .bind(source.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.require_person(&id).await
    }

    /// Delete a person.
    pub async fn delete_person(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM people WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Person {} not found", id)));
        }

        Ok(())
    }

    /// List all people of a campaign, ordered by name.
    pub async fn list_people(&self, campaign_id: &str) -> Result<Vec<Person>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM people WHERE campaign_id = ? ORDER BY name",
            PERSON_COLUMNS
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(person_from_row).collect()
    }

    /// List all people across campaigns (used to rebuild the search index).
    pub async fn list_all_people(&self) -> Result<Vec<Person>, AppError> {
        let rows = sqlx::query(&format!("SELECT {} FROM people", PERSON_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(person_from_row).collect()
    }

    /// Find a person by campaign and facebook id.
    pub async fn find_by_facebook(
        &self,
        campaign_id: &str,
        facebook_id: &str,
    ) -> Result<Option<Person>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM people WHERE campaign_id = ? AND facebook_id = ?",
            PERSON_COLUMNS
        ))
        .bind(campaign_id)
        .bind(facebook_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(person_from_row).transpose()
    }

    /// Find a person by its public form id.
    pub async fn find_by_form_id(&self, form_id: &str) -> Result<Option<Person>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM people WHERE form_id = ?",
            PERSON_COLUMNS
        ))
        .bind(form_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(person_from_row).transpose()
    }

    /// Find a person in a campaign by contact email (import dedup key).
    pub async fn find_by_contact_email(
        &self,
        campaign_id: &str,
        email: &str,
    ) -> Result<Option<Person>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM people WHERE campaign_id = ? \
             AND json_extract(campaign_meta, '$.\"contact\".\"email\"') = ?",
            PERSON_COLUMNS
        ))
        .bind(campaign_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(person_from_row).transpose()
    }

    /// Upsert a person keyed by `(campaign_id, facebook_id)`.
    pub async fn upsert_facebook_person(
        &self,
        campaign_id: &str,
        facebook_id: &str,
        name: &str,
        email: Option<&str>,
    ) -> Result<Person, AppError> {
        let now = Utc::now().to_rfc3339();

        match self.find_by_facebook(campaign_id, facebook_id).await? {
            Some(person) => {
                let mut meta = person
                    .campaign_meta
                    .clone()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                if let Some(email) = email {
                    set_meta_path(&mut meta, "contact.email", Value::String(email.to_string()));
                }
                sqlx::query(
                    "UPDATE people SET name = ?, campaign_meta = ?, updated_at = ? WHERE id = ?",
                )
                .bind(name)
                .bind(serde_json::to_string(&meta)?)
                .bind(&now)
                .bind(&person.id)
                .execute(&self.pool)
                .await?;

                self.require_person(&person.id).await
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                let mut meta = Value::Object(Map::new());
                if let Some(email) = email {
                    set_meta_path(&mut meta, "contact.email", Value::String(email.to_string()));
                }
                sqlx::query(
                    "INSERT INTO people (id, campaign_id, name, facebook_id, campaign_meta, \
                     source, filled_form, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
                )
                .bind(&id)
                .bind(campaign_id)
                .bind(name)
                .bind(facebook_id)
                .bind(serde_json::to_string(&meta)?)
                .bind(PersonSource::Facebook.as_str())
                .bind(&now)
                .bind(&now)
                .execute(&self.pool)
                .await?;

                self.require_person(&id).await
            }
        }
    }

    /// Generate and store a fresh form id for a person, returning it.
    pub async fn generate_form_id(&self, person_id: &str) -> Result<String, AppError> {
        let form_id = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query("UPDATE people SET form_id = ?, updated_at = ? WHERE id = ?")
            .bind(&form_id)
            .bind(&now)
            .bind(person_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Person {} not found",
                person_id
            )));
        }

        Ok(form_id)
    }

    /// Apply a set of dotted-path updates to a person's meta bag.
    pub async fn update_campaign_meta(
        &self,
        person: &Person,
        updates: &[(String, Value)],
    ) -> Result<Person, AppError> {
        let mut meta = person
            .campaign_meta
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        for (path, value) in updates {
            set_meta_path(&mut meta, path, value.clone());
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE people SET campaign_meta = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&meta)?)
            .bind(&now)
            .bind(&person.id)
            .execute(&self.pool)
            .await?;

        self.require_person(&person.id).await
    }

    /// Replace one whole section of a person's meta bag, optionally
    /// storing a geocoded location alongside.
    pub async fn replace_meta_section(
        &self,
        person: &Person,
        section: &str,
        data: &Map<String, Value>,
        location: Option<[f64; 2]>,
    ) -> Result<Person, AppError> {
        let mut meta = person
            .campaign_meta
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        set_meta_path(&mut meta, section, Value::Object(data.clone()));

        let location_json = location.map(|l| serde_json::to_string(&l)).transpose()?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE people SET campaign_meta = ?, location = COALESCE(?, location), \
             updated_at = ? WHERE id = ?",
        )
        .bind(serde_json::to_string(&meta)?)
        .bind(&location_json)
        .bind(&now)
        .bind(&person.id)
        .execute(&self.pool)
        .await?;

        self.require_person(&person.id).await
    }

    /// Apply a public form submission to an existing person.
    pub async fn apply_form_submission(
        &self,
        person: &Person,
        name: &str,
        updates: &[(String, Value)],
        location: Option<[f64; 2]>,
    ) -> Result<Person, AppError> {
        let mut meta = person
            .campaign_meta
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        for (path, value) in updates {
            set_meta_path(&mut meta, path, value.clone());
        }

        let location_json = location.map(|l| serde_json::to_string(&l)).transpose()?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE people SET name = ?, campaign_meta = ?, filled_form = 1, \
             location = COALESCE(?, location), updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(serde_json::to_string(&meta)?)
        .bind(&location_json)
        .bind(&now)
        .bind(&person.id)
        .execute(&self.pool)
        .await?;

        self.require_person(&person.id).await
    }

    /// Apply a computed merge to the target person; optionally delete the
    /// source people in the same transaction.
    pub async fn apply_merge(
        &self,
        target: &Person,
        outcome: &MergeOutcome,
        from: &[String],
        remove: bool,
    ) -> Result<Person, AppError> {
        let mut meta = target
            .campaign_meta
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        for (path, value) in &outcome.meta_updates {
            set_meta_path(&mut meta, path, value.clone());
        }

        let name = outcome.name.as_deref().unwrap_or(&target.name);
        let counts_json = outcome
            .counts
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let accounts_json = outcome
            .facebook_accounts
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE people SET name = ?, facebook_id = ?, counts = ?, facebook_accounts = ?, \
             last_interaction_date = ?, campaign_meta = ?, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(&outcome.facebook_id)
        .bind(&counts_json)
        .bind(&accounts_json)
        .bind(&outcome.last_interaction_date)
        .bind(serde_json::to_string(&meta)?)
        .bind(&now)
        .bind(&target.id)
        .execute(&mut *tx)
        .await?;

        if remove && !from.is_empty() {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM people WHERE campaign_id = ");
            qb.push_bind(&target.campaign_id);
            qb.push(" AND id IN (");
            let mut sep = qb.separated(", ");
            for id in from {
                sep.push_bind(id);
            }
            qb.push(")");
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        self.require_person(&target.id).await
    }

    /// Find duplicate candidates for a person within its campaign,
    /// grouped by the matched criterion.
    pub async fn find_duplicates(&self, person: &Person) -> Result<DuplicateMatches, AppError> {
        let mut matches = DuplicateMatches::default();

        if let Some(facebook_id) = &person.facebook_id {
            let rows = sqlx::query(&format!(
                "SELECT {} FROM people WHERE campaign_id = ? AND facebook_id = ? AND id != ?",
                PERSON_COLUMNS
            ))
            .bind(&person.campaign_id)
            .bind(facebook_id)
            .bind(&person.id)
            .fetch_all(&self.pool)
            .await?;
            matches.facebook = rows.iter().map(person_from_row).collect::<Result<_, _>>()?;
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM people WHERE campaign_id = ? AND name = ? COLLATE NOCASE AND id != ?",
            PERSON_COLUMNS
        ))
        .bind(&person.campaign_id)
        .bind(&person.name)
        .bind(&person.id)
        .fetch_all(&self.pool)
        .await?;
        matches.name = rows.iter().map(person_from_row).collect::<Result<_, _>>()?;

        if let Some(email) = person.contact_email() {
            let rows = sqlx::query(&format!(
                "SELECT {} FROM people WHERE campaign_id = ? \
                 AND json_extract(campaign_meta, '$.\"contact\".\"email\"') = ? AND id != ?",
                PERSON_COLUMNS
            ))
            .bind(&person.campaign_id)
            .bind(email)
            .bind(&person.id)
            .fetch_all(&self.pool)
            .await?;
            matches.email = rows.iter().map(person_from_row).collect::<Result<_, _>>()?;
        }

        Ok(matches)
    }

    // ==================== SEARCH EXECUTION ====================

    /// Run a selector against the people table.
    ///
    /// `ids` restricts to full-text candidates when a text term was
    /// present; relevance ordering is then applied by the caller.
    pub async fn query_people(
        &self,
        selector: &PersonSelector,
        ids: Option<&[String]>,
        sort: Option<&PersonSort>,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<Person>, AppError> {
        let mut qb = self.selector_query(
            &format!("SELECT {} FROM people", PERSON_COLUMNS),
            selector,
            ids,
        );

        match sort {
            Some(PersonSort::Name) => {
                qb.push(" ORDER BY name COLLATE NOCASE ASC");
            }
            Some(PersonSort::Counts { facebook_id, field }) => {
                qb.push(" ORDER BY COALESCE(json_extract(counts, ");
                qb.push_bind(counts_json_path(facebook_id, *field));
                qb.push("), 0) DESC");
            }
            Some(PersonSort::LastInteraction) => {
                qb.push(" ORDER BY last_interaction_date DESC");
            }
            // Relevance ordering happens outside SQL; everything else
            // falls back to newest-first for deterministic pages.
            Some(PersonSort::TextScore) | None => {
                qb.push(" ORDER BY created_at DESC");
            }
        }

        qb.push(" LIMIT ");
        qb.push_bind(limit as i64);
        qb.push(" OFFSET ");
        qb.push_bind(skip as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(person_from_row).collect()
    }

    /// Count people matching a selector.
    pub async fn count_people(
        &self,
        selector: &PersonSelector,
        ids: Option<&[String]>,
    ) -> Result<i64, AppError> {
        let mut qb = self.selector_query("SELECT COUNT(*) AS total FROM people", selector, ids);
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.get("total"))
    }

    fn selector_query<'a>(
        &self,
        head: &str,
        selector: &'a PersonSelector,
        ids: Option<&'a [String]>,
    ) -> QueryBuilder<'a, Sqlite> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(head);
        qb.push(" WHERE campaign_id = ");
        qb.push_bind(&selector.campaign_id);

        if let Some(ids) = ids {
            qb.push(" AND id IN (");
            let mut sep = qb.separated(", ");
            for id in ids {
                sep.push_bind(id);
            }
            qb.push(")");
        }

        if let Some(account) = &selector.facebook_account {
            qb.push(
                " AND EXISTS (SELECT 1 FROM json_each(people.facebook_accounts) \
                 WHERE json_each.value = ",
            );
            qb.push_bind(account);
            qb.push(")");
        }

        if let Some(source) = selector.source {
            qb.push(" AND source = ");
            qb.push_bind(source.as_str());
        }

        for (path, value) in &selector.meta_filters {
            qb.push(" AND json_extract(campaign_meta, ");
            qb.push_bind(meta_json_path(path));
            qb.push(") = ");
            match value {
                Value::Bool(b) => {
                    qb.push_bind(*b as i64);
                }
                Value::String(s) => {
                    qb.push_bind(s.as_str());
                }
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        qb.push_bind(i);
                    } else {
                        qb.push_bind(n.as_f64().unwrap_or_default());
                    }
                }
                other => {
                    qb.push_bind(other.to_string());
                }
            }
        }

        qb
    }

    // ==================== TAG OPERATIONS ====================

    /// List all tags of a campaign.
    pub async fn list_tags(&self, campaign_id: &str) -> Result<Vec<PeopleTag>, AppError> {
        let rows = sqlx::query(
            "SELECT id, campaign_id, name, created_at FROM people_tags \
             WHERE campaign_id = ? ORDER BY name",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(tag_from_row).collect())
    }

    /// Create a new tag.
    pub async fn create_tag(&self, campaign_id: &str, name: &str) -> Result<PeopleTag, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO people_tags (id, campaign_id, name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(campaign_id)
        .bind(name)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(PeopleTag {
            id,
            campaign_id: campaign_id.to_string(),
            name: name.to_string(),
            created_at: now,
        })
    }

    /// Fetch a person or fail with a not-found error.
    pub async fn require_person(&self, id: &str) -> Result<Person, AppError> {
        self.get_person(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Person {} not found", id)))
    }
}

// Helper functions for row conversion and JSON paths

fn campaign_from_row(row: &sqlx::sqlite::SqliteRow) -> Campaign {
    let users_str: String = row.get("users");
    Campaign {
        id: row.get("id"),
        name: row.get("name"),
        users: serde_json::from_str(&users_str).unwrap_or_default(),
        created_at: row.get("created_at"),
    }
}

fn tag_from_row(row: &sqlx::sqlite::SqliteRow) -> PeopleTag {
    PeopleTag {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

fn person_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Person, AppError> {
    let filled_form: i32 = row.get("filled_form");
    let meta_str: Option<String> = row.get("campaign_meta");
    let counts_str: Option<String> = row.get("counts");
    let accounts_str: Option<String> = row.get("facebook_accounts");
    let location_str: Option<String> = row.get("location");
    let source_str: String = row.get("source");

    let source = PersonSource::parse(&source_str)
        .ok_or_else(|| AppError::Database(format!("Unknown person source '{}'", source_str)))?;

    Ok(Person {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        name: row.get("name"),
        facebook_id: row.get("facebook_id"),
        campaign_meta: meta_str.as_deref().and_then(|s| serde_json::from_str(s).ok()),
        counts: counts_str.as_deref().and_then(|s| serde_json::from_str(s).ok()),
        facebook_accounts: accounts_str
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok()),
        source,
        form_id: row.get("form_id"),
        filled_form: filled_form != 0,
        last_interaction_date: row.get("last_interaction_date"),
        location: location_str
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok()),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// SQLite JSON path for a dotted meta key, e.g. `contact.email` →
/// `$."contact"."email"`.
fn meta_json_path(path: &str) -> String {
    let quoted: Vec<String> = path.split('.').map(|p| format!("\"{}\"", p)).collect();
    format!("$.{}", quoted.join("."))
}

/// SQLite JSON path for a per-account engagement tally.
fn counts_json_path(facebook_id: &str, field: CountField) -> String {
    format!("$.\"{}\".\"{}\"", facebook_id, field.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_paths_quote_every_segment() {
        assert_eq!(meta_json_path("supporter"), "$.\"supporter\"");
        assert_eq!(meta_json_path("contact.email"), "$.\"contact\".\"email\"");
        assert_eq!(
            counts_json_path("acc-1", CountField::Comments),
            "$.\"acc-1\".\"comments\""
        );
    }
}
