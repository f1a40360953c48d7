//! Configuration module for the campaign backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// reCAPTCHA secret; public form submissions skip verification when unset
    pub recaptcha_secret: Option<String>,
    /// Base URL for the Facebook Graph API
    pub facebook_graph_url: String,
    /// Base URL for the Nominatim geocoding service
    pub geocoder_url: String,
    /// Base URL for the ViaCEP zipcode service (BR)
    pub viacep_url: String,
    /// Base URL for the Zippopotam zipcode service (everywhere else)
    pub zippopotam_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_psk = env::var("CAMPAIGN_API_PSK").ok();

        let db_path = env::var("CAMPAIGN_DB_PATH")
            .unwrap_or_else(|_| "./data/app.sqlite".to_string())
            .into();

        let index_path = env::var("CAMPAIGN_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr = env::var("CAMPAIGN_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid CAMPAIGN_BIND_ADDR format");

        let log_level = env::var("CAMPAIGN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let recaptcha_secret = env::var("CAMPAIGN_RECAPTCHA_SECRET").ok();

        let facebook_graph_url = env::var("CAMPAIGN_FACEBOOK_GRAPH_URL")
            .unwrap_or_else(|_| "https://graph.facebook.com".to_string());

        let geocoder_url = env::var("CAMPAIGN_GEOCODER_URL")
            .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string());

        let viacep_url = env::var("CAMPAIGN_VIACEP_URL")
            .unwrap_or_else(|_| "https://viacep.com.br".to_string());

        let zippopotam_url = env::var("CAMPAIGN_ZIPPOPOTAM_URL")
            .unwrap_or_else(|_| "https://api.zippopotam.us".to_string());

        Self {
            api_psk,
            db_path,
            index_path,
            bind_addr,
            log_level,
            recaptcha_secret,
            facebook_graph_url,
            geocoder_url,
            viacep_url,
            zippopotam_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("CAMPAIGN_API_PSK");
        env::remove_var("CAMPAIGN_DB_PATH");
        env::remove_var("CAMPAIGN_INDEX_PATH");
        env::remove_var("CAMPAIGN_BIND_ADDR");
        env::remove_var("CAMPAIGN_LOG_LEVEL");
        env::remove_var("CAMPAIGN_RECAPTCHA_SECRET");

        let config = Config::from_env();

        assert!(config.api_psk.is_none());
        assert!(config.recaptcha_secret.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/app.sqlite"));
        assert_eq!(config.index_path, PathBuf::from("./data/index"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.facebook_graph_url, "https://graph.facebook.com");
    }
}
