//! Accès à l'API Zornade
//!
//! Le trait [`ParcelApi`] sépare le pipeline du transport HTTP : le pipeline
//! ne voit que des stubs et des enregistrements, jamais des réponses brutes.

mod http;
mod wire;

pub use http::{CredentialCheck, HttpParcelApi, CHECK_BBOX};

use async_trait::async_trait;
use zornade::{BoundingBox, ParcelRecord, ParcelStub};

use crate::error::FetchError;

/// Une page de résultats de recherche
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub stubs: Vec<ParcelStub>,

    /// Indication explicite de pages restantes, si l'API la fournit
    pub has_more: Option<bool>,
}

/// Opérations distantes utilisées par le pipeline
#[async_trait]
pub trait ParcelApi: Send + Sync {
    /// Récupère une page de stubs dans la bbox (EPSG:4326)
    async fn search_page(
        &self,
        bbox: &BoundingBox,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage, FetchError>;

    /// Récupère géométrie et enrichissement d'une parcelle
    async fn fetch_detail(&self, id: &str) -> Result<ParcelRecord, FetchError>;
}
