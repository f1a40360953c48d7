//! Tantivy-based search index module.
//!
//! Mirrors people into a full-text index over name and contact email,
//! scoped per campaign. The database stays the source of truth; the index
//! is rebuilt from it at startup.

pub mod query;

pub use query::*;

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::Person;

/// Name matches count for more than contact email matches.
const BOOST_NAME: f32 = 5.0;
const BOOST_EMAIL: f32 = 2.0;

/// Search result with person id and relevance score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub person_id: String,
    pub score: f32,
}

/// Search index schema fields.
struct SearchFields {
    person_id: Field,
    campaign_id: Field,
    name: Field,
    email: Field,
}

/// Tantivy search index for people.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        // Define schema
        let mut schema_builder = Schema::builder();
        let person_id = schema_builder.add_text_field("person_id", STRING | STORED);
        let campaign_id = schema_builder.add_text_field("campaign_id", STRING);
        let name = schema_builder.add_text_field("name", TEXT | STORED);
        let email = schema_builder.add_text_field("email", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            person_id,
            campaign_id,
            name,
            email,
        };

        // Try to open existing index or create new one
        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from people.
    pub async fn rebuild(&self, people: &[Person]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        // Clear existing index
        writer.delete_all_documents()?;

        for person in people {
            let doc = self.create_document(person);
            writer.add_document(doc)?;
        }

        writer.commit()?;

        // Reload reader to see new documents
        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} people", people.len());
        Ok(())
    }

    /// Index a single person.
    pub async fn index_person(&self, person: &Person) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        // Delete existing document if any
        let term = Term::from_field_text(self.fields.person_id, &person.id);
        writer.delete_term(term);

        let doc = self.create_document(person);
        writer.add_document(doc)?;
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Remove a person from the index.
    pub async fn remove_person(&self, person_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = Term::from_field_text(self.fields.person_id, person_id);
        writer.delete_term(term);
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Search for people in one campaign matching the text term, ordered
    /// by relevance.
    pub fn search(
        &self,
        campaign_id: &str,
        term: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, AppError> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        // Boosted per-field queries combined with OR semantics
        let mut should: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();
        let field_queries = [
            (self.fields.name, BOOST_NAME),
            (self.fields.email, BOOST_EMAIL),
        ];
        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(term) {
                let boosted = BoostQuery::new(field_query, boost);
                should.push((Occur::Should, Box::new(boosted)));
            }
        }

        if should.is_empty() {
            return Err(AppError::Search(format!("Invalid search query: {}", term)));
        }

        // Results must come from the requested campaign
        let campaign_query = TermQuery::new(
            Term::from_field_text(self.fields.campaign_id, campaign_id),
            IndexRecordOption::Basic,
        );
        let combined = BooleanQuery::new(vec![
            (
                Occur::Must,
                Box::new(campaign_query) as Box<dyn tantivy::query::Query>,
            ),
            (Occur::Must, Box::new(BooleanQuery::new(should))),
        ]);

        let top_docs = searcher
            .search(&combined, &TopDocs::with_limit(limit))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results: Vec<SearchHit> = top_docs
            .into_iter()
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let person_id = doc.get_first(self.fields.person_id)?.as_str()?.to_string();
                Some(SearchHit { person_id, score })
            })
            .collect();

        Ok(results)
    }

    /// Create a Tantivy document from a person.
    fn create_document(&self, person: &Person) -> TantivyDocument {
        let email = person.contact_email().unwrap_or_default().to_string();

        doc!(
            self.fields.person_id => person.id.clone(),
            self.fields.campaign_id => person.campaign_id.clone(),
            self.fields.name => person.name.clone(),
            self.fields.email => email
        )
    }
}
