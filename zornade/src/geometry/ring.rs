//! Réparation des rings bruts

use geo::{Coord, LineString};

use crate::types::RawRing;
use crate::GeometryError;

/// Nombre minimal de points distincts pour former un ring
pub const MIN_DISTINCT_POINTS: usize = 3;

/// Ferme et valide un ring brut
///
/// Un ring non fermé est fermé automatiquement en répétant son premier point.
/// `index` ne sert qu'aux messages d'erreur.
pub fn repair_ring(raw: &RawRing, index: usize) -> Result<LineString, GeometryError> {
    let mut ring: Vec<Coord> = Vec::with_capacity(raw.len() + 1);

    for &[x, y] in raw {
        if !x.is_finite() || !y.is_finite() {
            return Err(GeometryError::NonFinite { ring: index });
        }
        let coord = Coord { x, y };
        // Doublons consécutifs : artefacts d'encodage
        if ring.last().is_some_and(|last| coords_equal(*last, coord)) {
            continue;
        }
        ring.push(coord);
    }

    let Some(&first) = ring.first() else {
        return Err(GeometryError::TooFewPoints {
            ring: index,
            distinct: 0,
        });
    };

    let last = ring[ring.len() - 1];
    if ring.len() > 1 && !coords_equal(first, last) {
        let gap = ((first.x - last.x).powi(2) + (first.y - last.y).powi(2)).sqrt();
        tracing::warn!(ring = index, points = ring.len(), gap, "Auto-closing unclosed ring");
        ring.push(first);
    }

    let distinct = distinct_points(&ring);
    if distinct < MIN_DISTINCT_POINTS {
        return Err(GeometryError::TooFewPoints {
            ring: index,
            distinct,
        });
    }

    Ok(LineString::new(ring))
}

/// Compte les points distincts d'un ring fermé (point de fermeture exclu)
fn distinct_points(ring: &[Coord]) -> usize {
    let open = match ring {
        [first, .., last] if coords_equal(*first, *last) => &ring[..ring.len() - 1],
        _ => ring,
    };

    let mut seen: Vec<Coord> = Vec::with_capacity(open.len());
    for &coord in open {
        if !seen.iter().any(|c| coords_equal(*c, coord)) {
            seen.push(coord);
        }
    }
    seen.len()
}

/// Compare deux coordonnées avec tolérance
pub(crate) fn coords_equal(a: Coord, b: Coord) -> bool {
    const TOLERANCE: f64 = 1e-9;
    (a.x - b.x).abs() < TOLERANCE && (a.y - b.y).abs() < TOLERANCE
}
