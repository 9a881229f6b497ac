//! # catasto-dl
//!
//! Téléchargement des parcelles cadastrales italiennes enrichies (API Zornade)
//! pour une bounding box, vers GeoJSON.
//!
//! ## Features
//!
//! - Recherche paginée et enrichissement concurrent par batch
//! - Rate limiting adaptatif, retry avec backoff, annulation à tout moment
//! - Reprojection de la bbox et des géométries (Rust pur, PROJ en option)
//! - Rapport de run avec tolérance d'erreur
//!
//! ## Usage CLI
//!
//! ```bash
//! # Vérifier les credentials (env ZORNADE_API_KEY / ZORNADE_BEARER_TOKEN)
//! catasto-dl check-credentials
//!
//! # Parcelles de Vérone en UTM 32N
//! catasto-dl fetch --bbox 10.98,45.43,11.0,45.44 --srid 32632 --output verona.geojson
//! ```

pub mod api;
pub mod backoff;
pub mod config;
pub mod enrich;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod reproject;
pub mod search;
pub mod sink;

pub use api::{HttpParcelApi, ParcelApi, SearchPage};
pub use config::{ApiConfig, Credentials, PipelineConfig, SchemaConfig};
pub use error::{ErrorKind, FetchError};
pub use pipeline::{choose_batch_size, PipelineOrchestrator, PipelineState};
pub use report::{FetchStats, RunReport, RunStatus};
pub use sink::{FeatureSink, GeoJsonSink, LogLevel, MemorySink};
