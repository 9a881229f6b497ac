//! Client HTTP de l'API (RapidAPI, endpoint `get-parcels`)

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER,
};
use serde_json::json;
use tracing::{debug, trace};
use zornade::{BoundingBox, ParcelRecord, WGS84_EPSG};

use super::wire::{self, Envelope};
use super::{ParcelApi, SearchPage};
use crate::config::{ApiConfig, Credentials};
use crate::error::FetchError;

/// Bbox de test utilisée pour vérifier les credentials (Vénétie, ~500 m)
pub const CHECK_BBOX: [f64; 4] = [11.0, 45.0, 11.005, 45.005];

/// Résultat d'une vérification de credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCheck {
    Valid { parcels: usize },
    Invalid,
    Forbidden,
    /// 429 : les credentials sont peut-être valides
    RateLimited,
    Error(String),
}

impl CredentialCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, CredentialCheck::Valid { .. })
    }
}

impl fmt::Display for CredentialCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialCheck::Valid { parcels } => write!(f, "Valid! Found {} test parcels", parcels),
            CredentialCheck::Invalid => write!(f, "Invalid credentials"),
            CredentialCheck::Forbidden => write!(f, "Access forbidden - check subscription"),
            CredentialCheck::RateLimited => write!(f, "Rate limited (credentials may be valid)"),
            CredentialCheck::Error(message) => write!(f, "API error: {}", message),
        }
    }
}

/// Implémentation de [`ParcelApi`] sur reqwest
pub struct HttpParcelApi {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpParcelApi {
    pub fn new(config: &ApiConfig, credentials: &Credentials) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-rapidapi-key"),
            HeaderValue::from_str(credentials.api_key()).context("API key is not a valid header value")?,
        );
        headers.insert(
            HeaderName::from_static("x-rapidapi-host"),
            HeaderValue::from_str(&config.api_host).context("API host is not a valid header value")?,
        );
        let bearer = format!("Bearer {}", credentials.bearer_token());
        let mut bearer =
            HeaderValue::from_str(&bearer).context("bearer token is not a valid header value")?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .user_agent(concat!("catasto-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
        })
    }

    /// Envoie une requête et classe la réponse selon la taxonomie d'erreurs
    async fn post(&self, body: serde_json::Value) -> Result<Envelope, FetchError> {
        trace!(endpoint = %self.endpoint, body = %body, "POST");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.map_err(network_error)?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "API returned an error status");
            return Err(FetchError::from_status(status.as_u16(), &text, retry_after));
        }

        Envelope::parse(&text)
    }

    /// Vérifie les credentials avec une petite requête de recherche
    pub async fn check_credentials(&self) -> CredentialCheck {
        let body = json!({ "queryType": "bbox", "params": CHECK_BBOX });
        match self.post(body).await {
            Ok(envelope) => match wire::stubs_from_data(envelope.data) {
                Ok(stubs) => CredentialCheck::Valid {
                    parcels: stubs.len(),
                },
                Err(e) => CredentialCheck::Error(e.to_string()),
            },
            Err(FetchError::Auth { status: 401, .. }) => CredentialCheck::Invalid,
            Err(FetchError::Auth { .. }) => CredentialCheck::Forbidden,
            Err(FetchError::RateLimited { .. }) => CredentialCheck::RateLimited,
            Err(e) => CredentialCheck::Error(e.to_string()),
        }
    }
}

#[async_trait]
impl ParcelApi for HttpParcelApi {
    async fn search_page(
        &self,
        bbox: &BoundingBox,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage, FetchError> {
        if bbox.epsg != WGS84_EPSG {
            return Err(FetchError::Validation(format!(
                "search bbox must be in EPSG:{}, got EPSG:{}",
                WGS84_EPSG, bbox.epsg
            )));
        }

        let body = json!({
            "queryType": "bbox",
            "params": bbox.to_params(),
            "offset": offset,
            "limit": limit,
        });
        let envelope = self.post(body).await?;
        let has_more = envelope.has_more;
        let stubs = wire::stubs_from_data(envelope.data)?;

        Ok(SearchPage { stubs, has_more })
    }

    async fn fetch_detail(&self, id: &str) -> Result<ParcelRecord, FetchError> {
        let body = json!({ "queryType": "id", "params": [id] });
        let envelope = self.post(body).await?;
        wire::record_from_data(id, envelope.data)
    }
}

/// Erreurs reqwest : réseau et timeouts sont transitoires
fn network_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::transient("request timed out")
    } else if e.is_builder() {
        FetchError::Validation(format!("invalid request: {e}"))
    } else {
        FetchError::transient(format!("network error: {e}"))
    }
}

/// Header `Retry-After` en secondes (la forme date HTTP est ignorée)
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_credential_check_messages() {
        assert_eq!(
            CredentialCheck::Valid { parcels: 12 }.to_string(),
            "Valid! Found 12 test parcels"
        );
        assert_eq!(CredentialCheck::Invalid.to_string(), "Invalid credentials");
        assert!(CredentialCheck::Forbidden.to_string().contains("subscription"));
        assert!(!CredentialCheck::RateLimited.is_valid());
    }

    #[test]
    fn test_client_builds_with_credentials() {
        let credentials = Credentials::new("abcd1234efgh5678", "token-xyz");
        let api = HttpParcelApi::new(&ApiConfig::default(), &credentials).unwrap();
        assert!(api.endpoint.ends_with("/functions/v1/get-parcels"));
    }

    #[test]
    fn test_invalid_header_value_rejected() {
        let credentials = Credentials::new("bad\nkey", "token");
        assert!(HttpParcelApi::new(&ApiConfig::default(), &credentials).is_err());
    }

    #[tokio::test]
    async fn test_search_requires_wgs84_bbox() {
        let credentials = Credentials::new("abcd1234efgh5678", "token-xyz");
        let api = HttpParcelApi::new(&ApiConfig::default(), &credentials).unwrap();
        let bbox = BoundingBox::new(291000.0, 4640000.0, 293000.0, 4642000.0, 32633);

        let err = api.search_page(&bbox, 0, 100).await.unwrap_err();
        assert!(matches!(err, FetchError::Validation(_)));
    }
}
