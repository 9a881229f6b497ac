//! Configuration : API, credentials, schéma d'attributs, paramètres du pipeline

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use zornade::Schema;

use crate::backoff::BackoffPolicy;

/// Hôte RapidAPI de l'API Zornade
pub const DEFAULT_API_HOST: &str = "enriched-cadastral-parcels-for-italy.p.rapidapi.com";

/// Chemin de l'endpoint unique (recherche et détail)
pub const ENDPOINT_PATH: &str = "/functions/v1/get-parcels";

/// Tolérance d'erreur par défaut (fraction des parcelles trouvées)
pub const DEFAULT_ERROR_TOLERANCE: f64 = 0.10;

/// Taille maximale d'un batch d'enrichissement
pub const MAX_BATCH_SIZE: usize = 25;

/// Charge `.env` au démarrage (répertoire courant, puis celui du binaire)
pub fn load_env() {
    if dotenvy::dotenv().is_err() {
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

/// Configuration de l'accès HTTP
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// URL de base (sans le chemin de l'endpoint)
    pub base_url: String,

    /// Valeur du header `X-RapidAPI-Host`
    pub api_host: String,

    /// Timeout par requête
    pub timeout: Duration,

    /// Nombre de stubs demandés par page de recherche
    pub page_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: format!("https://{}", DEFAULT_API_HOST),
            api_host: DEFAULT_API_HOST.to_string(),
            timeout: Duration::from_secs(30),
            page_size: 100,
        }
    }
}

impl ApiConfig {
    /// Crée une configuration depuis les variables d'environnement
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("ZORNADE_BASE_URL").unwrap_or(defaults.base_url),
            api_host: std::env::var("ZORNADE_API_HOST").unwrap_or(defaults.api_host),
            timeout: std::env::var("ZORNADE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            page_size: std::env::var("ZORNADE_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.page_size),
        }
    }

    /// URL complète de l'endpoint
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), ENDPOINT_PATH)
    }
}

/// Clé RapidAPI et token Bearer
///
/// `Debug` et `Display` n'affichent que la forme masquée.
#[derive(Clone, Default)]
pub struct Credentials {
    api_key: String,
    bearer_token: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
            bearer_token: bearer_token.into().trim().to_string(),
        }
    }

    /// Lit `ZORNADE_API_KEY` et `ZORNADE_BEARER_TOKEN` (vides si absents)
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("ZORNADE_API_KEY").unwrap_or_default(),
            std::env::var("ZORNADE_BEARER_TOKEN").unwrap_or_default(),
        )
    }

    /// Remplace les valeurs fournies explicitement (options CLI)
    pub fn with_overrides(mut self, api_key: Option<String>, bearer_token: Option<String>) -> Self {
        if let Some(key) = api_key {
            self.api_key = key.trim().to_string();
        }
        if let Some(token) = bearer_token {
            self.bearer_token = token.trim().to_string();
        }
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    /// Vérifie la présence des deux valeurs, sans appel réseau
    pub fn validate(&self) -> Result<(), String> {
        match (self.api_key.is_empty(), self.bearer_token.is_empty()) {
            (false, false) => Ok(()),
            (true, true) => Err("missing API key and bearer token".to_string()),
            (true, false) => Err("missing API key".to_string()),
            (false, true) => Err("missing bearer token".to_string()),
        }
    }

    /// Clé masquée pour les logs : `abcd1234...wxyz`
    pub fn masked_key(&self) -> String {
        mask(&self.api_key)
    }
}

fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("bearer_token", &mask(&self.bearer_token))
            .finish()
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked_key())
    }
}

/// Charge un schéma d'attributs
pub struct SchemaConfig;

impl SchemaConfig {
    /// Nom de preset (`base`, `full`) ou chemin vers un fichier JSON
    pub fn resolve(name: &str) -> Result<Schema> {
        match name {
            "base" | "full" => Self::from_preset(name),
            path => Self::load(Path::new(path)),
        }
    }

    /// Charge un schéma depuis un fichier
    pub fn load(path: &Path) -> Result<Schema> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read schema file: {}", path.display()))?;

        Self::parse(&content).context(format!("Failed to parse schema file: {}", path.display()))
    }

    /// Charge un schéma depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Schema> {
        match preset {
            "base" => Self::parse(include_str!("presets/base.json")),
            "full" => Self::parse(include_str!("presets/full.json")),
            _ => bail!("Unknown schema preset: {}. Use: base, full", preset),
        }
    }

    fn parse(json: &str) -> Result<Schema> {
        let schema: Schema = serde_json::from_str(json).context("Failed to parse schema JSON")?;
        if schema.fields.is_empty() {
            bail!("Schema '{}' has no fields", schema.version);
        }
        let mut targets: Vec<&str> = schema.fields.iter().map(|f| f.target.as_str()).collect();
        targets.sort_unstable();
        if let Some(dup) = targets.windows(2).find(|w| w[0] == w[1]) {
            bail!("Schema '{}' declares '{}' twice", schema.version, dup[0]);
        }
        Ok(schema)
    }
}

/// Paramètres d'exécution du pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Système de coordonnées des features émises
    pub target_epsg: u32,

    /// Taille de batch imposée (sinon adaptative), bornée à 1..=25
    pub batch_size: Option<usize>,

    /// Fraction d'échecs tolérée avant de déclarer le run en échec
    pub error_tolerance: f64,

    /// Délai minimal entre deux batches
    pub min_batch_delay: Duration,

    /// Plafond du délai adaptatif entre batches
    pub max_batch_delay: Duration,

    pub backoff: BackoffPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_epsg: zornade::WGS84_EPSG,
            batch_size: None,
            error_tolerance: DEFAULT_ERROR_TOLERANCE,
            min_batch_delay: Duration::from_millis(500),
            max_batch_delay: Duration::from_secs(8),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.error_tolerance) {
            return Err(format!(
                "error tolerance must be between 0 and 1, got {}",
                self.error_tolerance
            ));
        }
        if self.batch_size == Some(0) {
            return Err("batch size must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zornade::FieldType;

    #[test]
    fn test_presets() {
        let base = SchemaConfig::from_preset("base").unwrap();
        assert_eq!(base.version, "base");
        assert_eq!(base.fields.len(), 17);

        let full = SchemaConfig::from_preset("full").unwrap();
        assert_eq!(full.fields.len(), 57);

        // Le preset complet étend le preset de base dans le même ordre
        for (b, f) in base.fields.iter().zip(&full.fields) {
            assert_eq!(b.target, f.target);
        }
        let seismic = full.fields.iter().find(|f| f.target == "seismic_zone").unwrap();
        assert_eq!(seismic.data_type, FieldType::Integer);
    }

    #[test]
    fn test_unknown_preset() {
        assert!(SchemaConfig::from_preset("light").is_err());
    }

    #[test]
    fn test_parse_rejects_duplicate_targets() {
        let json = r#"{"version": "x", "fields": [
            {"source": "a", "target": "t"},
            {"source": "b", "target": "t"}
        ]}"#;
        let err = SchemaConfig::parse(json).unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_resolve_missing_file() {
        assert!(SchemaConfig::resolve("/nonexistent/schema.json").is_err());
    }

    #[test]
    fn test_credentials_validate() {
        assert!(Credentials::new("key", "token").validate().is_ok());
        assert_eq!(
            Credentials::new("", "token").validate(),
            Err("missing API key".to_string())
        );
        assert_eq!(
            Credentials::new("key", "  ").validate(),
            Err("missing bearer token".to_string())
        );
        assert!(Credentials::default().validate().is_err());
    }

    #[test]
    fn test_credentials_masked() {
        let credentials = Credentials::new("abcd1234efgh5678wxyz", "secret-token-value");
        assert_eq!(credentials.masked_key(), "abcd1234...wxyz");

        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("efgh5678"));
        assert!(!debug.contains("secret-token-value"));
        assert_eq!(Credentials::new("short", "t").masked_key(), "*****");
    }

    #[test]
    fn test_credentials_overrides() {
        let credentials = Credentials::new("env-key", "env-token")
            .with_overrides(Some("cli-key".to_string()), None);
        assert_eq!(credentials.api_key(), "cli-key");
        assert_eq!(credentials.bearer_token(), "env-token");
    }

    #[test]
    fn test_endpoint() {
        let config = ApiConfig {
            base_url: "http://localhost:8080/".to_string(),
            ..ApiConfig::default()
        };
        assert_eq!(config.endpoint(), "http://localhost:8080/functions/v1/get-parcels");
    }

    #[test]
    fn test_pipeline_config_validate() {
        assert!(PipelineConfig::default().validate().is_ok());

        let config = PipelineConfig {
            error_tolerance: 1.5,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
