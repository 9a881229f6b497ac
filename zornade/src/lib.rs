//! # zornade
//!
//! Modèle de données et traitements purs pour les parcelles cadastrales
//! italiennes enrichies (API Zornade).
//!
//! ## Features
//!
//! - Bounding box validée, stubs de recherche, enregistrements enrichis
//! - Normalisation des géométries (fermeture des rings, rejet des rings dégénérés)
//! - Mapping des champs bruts vers un schéma d'attributs fixe, sans erreur de coercition
//! - Types `geo` pour l'interopérabilité avec l'écosystème Rust géospatial
//!
//! ## Usage
//!
//! ```rust
//! use zornade::{normalize, RawGeometry};
//!
//! // Ring non fermé : fermé automatiquement
//! let raw = RawGeometry::Polygon(vec![vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]]);
//! let geometry = normalize(&raw).unwrap();
//! assert!(matches!(geometry, geo::Geometry::Polygon(_)));
//! ```

pub mod error;
pub mod geometry;
pub mod schema;
pub mod types;

pub use error::{BoundsError, GeometryError};
pub use geometry::normalize;
pub use schema::{FieldSpec, FieldType, Schema, SchemaMapper};
pub use types::{
    AttrValue, AttributeRecord, BoundingBox, Feature, ParcelRecord, ParcelStub, RawGeometry,
    RawPosition, RawRing, RawValue, StubLocation, WGS84_EPSG,
};

/// Construit une [`Feature`] à partir d'un enregistrement et d'une géométrie déjà reprojetée
pub fn assemble_feature(
    record: &ParcelRecord,
    geometry: geo::Geometry,
    mapper: &SchemaMapper,
) -> Feature {
    Feature {
        id: record.id.clone(),
        geometry,
        attributes: mapper.map(&record.fields),
    }
}
