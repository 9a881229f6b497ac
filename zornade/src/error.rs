//! Types d'erreurs pour le crate zornade

use thiserror::Error;

/// Erreurs de normalisation de géométrie
///
/// Ces erreurs ne sont jamais fatales pour un run : la parcelle concernée
/// est ignorée et comptée comme "skipped".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// Aucun ring dans la géométrie
    #[error("geometry has no rings")]
    Empty,

    /// Discriminant `type` non supporté (Point, LineString, ...)
    #[error("unsupported geometry type: {0}")]
    UnsupportedType(String),

    /// Ring avec trop peu de points distincts après fermeture
    #[error("ring {ring} has {distinct} distinct points (minimum 3)")]
    TooFewPoints { ring: usize, distinct: usize },

    /// Coordonnée non finie (NaN, inf)
    #[error("non-finite coordinate in ring {ring}")]
    NonFinite { ring: usize },

    /// Exterior d'aire nulle (points colinéaires)
    #[error("polygon {polygon} has zero area")]
    Degenerate { polygon: usize },

    /// Payload mal formé (positions sans x/y, imbrication incorrecte)
    #[error("malformed geometry payload: {0}")]
    Malformed(String),
}

impl GeometryError {
    /// Crée une erreur de payload mal formé
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}

/// Erreur de validation d'une bounding box
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundsError {
    /// Une des bornes n'est pas un nombre fini
    #[error("bounding box contains a non-finite value")]
    NonFinite,

    /// min > max sur un axe
    #[error("bounding box is inverted on the {axis} axis ({min} > {max})")]
    Inverted {
        axis: &'static str,
        min: f64,
        max: f64,
    },

    /// Aire nulle (min == max sur au moins un axe)
    #[error("bounding box has zero area")]
    Degenerate,
}
