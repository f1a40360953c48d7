//! Clients for outbound HTTP services: zipcode resolution, geocoding,
//! reCAPTCHA verification, and the Facebook Graph lookup.
//!
//! Zipcode and geocoding lookups are best-effort: failures are logged and
//! swallowed. The reCAPTCHA and Graph calls surface their failures.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::AppError;
use crate::models::Address;

const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// Resolved zipcode information.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZipcodeInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighbourhood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
}

/// Minimal profile returned by the Graph API.
#[derive(Debug, Clone, Deserialize)]
pub struct FacebookProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ViaCepResponse {
    #[serde(default)]
    uf: Option<String>,
    #[serde(default)]
    localidade: Option<String>,
    #[serde(default)]
    bairro: Option<String>,
    #[serde(default)]
    logradouro: Option<String>,
    #[serde(default)]
    erro: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ZippopotamResponse {
    #[serde(default)]
    places: Vec<ZippopotamPlace>,
}

#[derive(Debug, Deserialize)]
struct ZippopotamPlace {
    #[serde(rename = "place name")]
    place_name: String,
    #[serde(rename = "state abbreviation")]
    state_abbreviation: String,
}

#[derive(Debug, Deserialize)]
struct RecaptchaResponse {
    success: bool,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    lat: String,
    lon: String,
}

/// Shared client for all outbound calls.
pub struct ExternalServices {
    http: reqwest::Client,
    config: Arc<Config>,
}

impl ExternalServices {
    pub fn new(config: Arc<Config>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("campaign-backend/0.1")
            .build()?;
        Ok(Self { http, config })
    }

    /// Resolve a zipcode to state/city (and street data for BR).
    ///
    /// Never fails: unresolvable codes and upstream errors return an
    /// empty result.
    pub async fn resolve_zipcode(&self, country: &str, zipcode: &str) -> ZipcodeInfo {
        match country {
            "BR" => {
                let code: String = zipcode.chars().filter(char::is_ascii_digit).collect();
                if code.len() != 8 {
                    return ZipcodeInfo::default();
                }
                match self.viacep_lookup(&code).await {
                    Ok(info) => info,
                    Err(e) => {
                        tracing::debug!("ViaCEP lookup failed: {}", e);
                        ZipcodeInfo::default()
                    }
                }
            }
            _ => match self.zippopotam_lookup(country, zipcode).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::debug!("Zippopotam lookup failed: {}", e);
                    ZipcodeInfo::default()
                }
            },
        }
    }

    async fn viacep_lookup(&self, code: &str) -> Result<ZipcodeInfo, reqwest::Error> {
        let url = format!("{}/ws/{}/json/", self.config.viacep_url, code);
        let resp: ViaCepResponse = self.http.get(&url).send().await?.json().await?;

        if resp.erro.unwrap_or(false) {
            return Ok(ZipcodeInfo::default());
        }

        Ok(ZipcodeInfo {
            state: resp.uf,
            city: resp.localidade,
            neighbourhood: resp.bairro,
            street: resp.logradouro,
        })
    }

    async fn zippopotam_lookup(
        &self,
        country: &str,
        zipcode: &str,
    ) -> Result<ZipcodeInfo, reqwest::Error> {
        let url = format!("{}/{}/{}", self.config.zippopotam_url, country, zipcode);
        let resp: ZippopotamResponse = self.http.get(&url).send().await?.json().await?;

        Ok(match resp.places.into_iter().next() {
            Some(place) => ZipcodeInfo {
                state: Some(place.state_abbreviation),
                city: Some(place.place_name),
                neighbourhood: None,
                street: None,
            },
            None => ZipcodeInfo::default(),
        })
    }

    /// Geocode an address to `[lat, lon]`. Strictly best-effort.
    pub async fn geocode(&self, address: &Address) -> Option<[f64; 2]> {
        let query = address.as_query();
        if query.is_empty() {
            return None;
        }

        let url = format!("{}/search", self.config.geocoder_url);
        let result = self
            .http
            .get(&url)
            .query(&[("format", "json"), ("limit", "1"), ("q", &query)])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        let results: Vec<GeocodeResult> = match result {
            Ok(resp) => match resp.json().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!("Geocoder returned invalid payload: {}", e);
                    return None;
                }
            },
            Err(e) => {
                tracing::debug!("Not able to fetch location: {}", e);
                return None;
            }
        };

        let first = results.into_iter().next()?;
        let lat = first.lat.parse().ok()?;
        let lon = first.lon.parse().ok()?;
        Some([lat, lon])
    }

    /// Verify a reCAPTCHA token against the configured secret.
    ///
    /// Returns `Ok(true)` when no secret is configured.
    pub async fn verify_recaptcha(&self, token: &str) -> Result<bool, AppError> {
        let Some(secret) = &self.config.recaptcha_secret else {
            return Ok(true);
        };

        let resp: RecaptchaResponse = self
            .http
            .post(RECAPTCHA_VERIFY_URL)
            .form(&[("secret", secret.as_str()), ("response", token)])
            .send()
            .await?
            .json()
            .await?;

        Ok(resp.success)
    }

    /// Fetch the caller's profile from the Graph API.
    pub async fn fetch_facebook_profile(
        &self,
        access_token: &str,
    ) -> Result<FacebookProfile, AppError> {
        let url = format!("{}/me", self.config.facebook_graph_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("fields", "id,name,email"), ("access_token", access_token)])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AppError::Internal("Error fetching user data".to_string()));
        }

        let profile: FacebookProfile = resp
            .json()
            .await
            .map_err(|_| AppError::Internal("Error fetching user data".to_string()))?;

        Ok(profile)
    }
}
