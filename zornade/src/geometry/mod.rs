//! Normalisation des géométries brutes de l'API
//!
//! Le payload porte un discriminant `type` explicite : on ne devine jamais
//! le type à partir du nombre de rings.

pub mod ring;

use geo::{Area, Geometry, LineString, MultiPolygon, Polygon};
use tracing::warn;

use crate::types::{RawGeometry, RawRing};
use crate::GeometryError;

pub use ring::repair_ring;

/// Convertit une géométrie brute en Polygon ou MultiPolygon `geo`
///
/// - rings non fermés : fermés automatiquement
/// - hole invalide : ignoré avec un warning
/// - membre de multipolygone invalide : ignoré, erreur seulement si aucun ne reste
pub fn normalize(raw: &RawGeometry) -> Result<Geometry, GeometryError> {
    match raw {
        RawGeometry::Polygon(rings) => build_polygon(rings, 0).map(Geometry::Polygon),
        RawGeometry::MultiPolygon(polygons) => {
            if polygons.is_empty() || polygons.iter().all(|rings| rings.is_empty()) {
                return Err(GeometryError::Empty);
            }

            let mut built = Vec::with_capacity(polygons.len());
            let mut last_error = None;
            for (idx, rings) in polygons.iter().enumerate() {
                match build_polygon(rings, idx) {
                    Ok(polygon) => built.push(polygon),
                    Err(e) => {
                        warn!(polygon = idx, error = %e, "Dropping invalid multipolygon member");
                        last_error = Some(e);
                    }
                }
            }

            if built.is_empty() {
                Err(last_error.unwrap_or(GeometryError::Empty))
            } else {
                Ok(Geometry::MultiPolygon(MultiPolygon::new(built)))
            }
        }
        RawGeometry::Unsupported(kind) => Err(GeometryError::UnsupportedType(kind.clone())),
        RawGeometry::Malformed(reason) => Err(GeometryError::malformed(reason.as_str())),
    }
}

/// Construit un polygone : premier ring = exterior, suivants = holes
fn build_polygon(rings: &[RawRing], polygon_idx: usize) -> Result<Polygon, GeometryError> {
    let Some((exterior, holes)) = rings.split_first() else {
        return Err(GeometryError::Empty);
    };

    let exterior = repair_ring(exterior, 0)?;

    let interiors: Vec<LineString> = holes
        .iter()
        .enumerate()
        .filter_map(|(i, hole)| match repair_ring(hole, i + 1) {
            Ok(ring) => Some(ring),
            Err(e) => {
                warn!(polygon = polygon_idx, ring = i + 1, error = %e, "Dropping invalid hole");
                None
            }
        })
        .collect();

    let polygon = Polygon::new(exterior, interiors);
    if Polygon::new(polygon.exterior().clone(), vec![]).unsigned_area() == 0.0 {
        return Err(GeometryError::Degenerate {
            polygon: polygon_idx,
        });
    }

    Ok(polygon)
}
