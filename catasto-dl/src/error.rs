//! Taxonomie des erreurs du pipeline

use std::time::Duration;

use thiserror::Error;
use zornade::GeometryError;

/// Catégorie d'erreur, utilisée par la politique de retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    RateLimit,
    Transient,
    Permanent,
    Cancelled,
}

/// Erreurs pouvant survenir pendant un run
#[derive(Debug, Error)]
pub enum FetchError {
    /// Entrée invalide (bbox, credentials) : jamais retentée
    #[error("validation error: {0}")]
    Validation(String),

    /// HTTP 401/403 : jamais retentée
    #[error("authentication failed (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// HTTP 429
    #[error("rate limited by the API")]
    RateLimited { retry_after: Option<Duration> },

    /// 429 répétés au-delà du budget de retry
    #[error("rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    /// HTTP 5xx, timeout, erreur réseau
    #[error("transient error: {0}")]
    Transient(String),

    /// Parcelle inconnue (404)
    #[error("parcel not found: {0}")]
    NotFound(String),

    /// Réponse illisible ou `success: false`
    #[error("invalid API response: {0}")]
    Parse(String),

    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("coordinate conversion failed: {0}")]
    Reprojection(String),

    /// Échec de la recherche : le run ne peut pas continuer
    #[error("search failed: {0}")]
    FatalSearch(#[source] Box<FetchError>),

    #[error("run cancelled")]
    Cancelled,

    /// Le sink a refusé une feature
    #[error("output sink error: {0}")]
    Sink(String),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Validation(_) => ErrorKind::Validation,
            FetchError::Auth { .. } => ErrorKind::Auth,
            FetchError::RateLimited { .. } | FetchError::RateLimitExceeded { .. } => {
                ErrorKind::RateLimit
            }
            FetchError::Transient(_) => ErrorKind::Transient,
            FetchError::Cancelled => ErrorKind::Cancelled,
            FetchError::FatalSearch(inner) => inner.kind(),
            FetchError::NotFound(_)
            | FetchError::Parse(_)
            | FetchError::Geometry(_)
            | FetchError::Reprojection(_)
            | FetchError::Sink(_) => ErrorKind::Permanent,
        }
    }

    /// Délai imposé par le serveur (header `Retry-After`)
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Crée une erreur de réponse illisible
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse(reason.into())
    }

    /// Crée une erreur transitoire
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    /// Classe une réponse HTTP non-2xx
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = truncate(body, 200);
        match status {
            401 => FetchError::Auth {
                status,
                message: if message.is_empty() {
                    "invalid credentials".to_string()
                } else {
                    message
                },
            },
            403 => FetchError::Auth {
                status,
                message: if message.is_empty() {
                    "access forbidden, check subscription".to_string()
                } else {
                    message
                },
            },
            404 => FetchError::NotFound(message),
            408 => FetchError::Transient(format!("HTTP {status}: request timeout")),
            429 => FetchError::RateLimited { retry_after },
            500..=599 => FetchError::Transient(format!("HTTP {status}: {message}")),
            _ => FetchError::Parse(format!("HTTP {status}: {message}")),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
