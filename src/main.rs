//! Campaign Backend
//!
//! REST backend for campaign contact management: people CRUD and
//! full-text search, metadata tagging, duplicate merging, CSV transfer
//! and a public signup form. SQLite persistence, Tantivy search.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod external;
mod models;
mod search;
mod transfer;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use external::ExternalServices;
use search::SearchIndex;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<SearchIndex>,
    pub external: Arc<ExternalServices>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Campaign Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (CAMPAIGN_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Initialize search index
    let search = Arc::new(SearchIndex::open(&config.index_path)?);

    // Build initial search index from database
    tracing::info!("Building search index...");
    let people = repo.list_all_people().await?;
    search.rebuild(&people).await?;
    tracing::info!("Search index built with {} people", people.len());

    let config = Arc::new(config);
    let external = Arc::new(ExternalServices::new(config.clone())?);

    // Create application state
    let state = AppState {
        repo,
        search,
        external,
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // Service-key protected routes
    let api_routes = Router::new()
        // People search
        .route("/people/search", post(api::search_people))
        .route("/people/search/count", post(api::count_search))
        // People
        .route("/people", post(api::create_person))
        .route("/people/{id}", get(api::get_person))
        .route("/people/{id}", delete(api::delete_person))
        .route("/people/{id}/meta", put(api::update_person_meta))
        .route("/people/{id}/meta/{section}", put(api::update_meta_section))
        .route("/people/{id}/form-id", get(api::person_form_id))
        .route("/people/{id}/duplicates", get(api::find_duplicates))
        .route("/people/{id}/merge", post(api::merge_people))
        // Campaigns
        .route("/campaigns", post(api::create_campaign))
        .route("/campaigns/{id}", get(api::get_campaign))
        .route(
            "/campaigns/{id}/people/by-facebook/{facebook_id}",
            get(api::person_id_from_facebook),
        )
        .route("/campaigns/{id}/people/export", get(api::export_people))
        .route("/campaigns/{id}/people/import", post(api::import_people))
        // Tags
        .route("/campaigns/{id}/tags", get(api::list_tags))
        .route("/campaigns/{id}/tags", post(api::create_tag))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Public routes (no service key, no user identity)
    let public_routes = Router::new()
        .route("/form/submit", post(api::submit_form))
        .route("/form/connect-facebook", post(api::connect_facebook))
        .route("/zipcode", get(api::resolve_zipcode));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", public_routes.merge(api_routes))
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
