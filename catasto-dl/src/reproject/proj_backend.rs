//! Reprojection de géométries avec PROJ
//!
//! Ce module est disponible uniquement avec le feature `reproject`.

use anyhow::{Context, Result};
use geo::{Coord, Geometry, MapCoords};
use proj::Proj;

/// Reprojection de géométries entre deux systèmes de coordonnées via PROJ
pub struct ProjReprojector {
    proj: Proj,
    source_epsg: u32,
    target_epsg: u32,
}

impl ProjReprojector {
    /// Crée un nouveau reprojector entre deux EPSG
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self> {
        let source = format!("EPSG:{}", source_epsg);
        let target = format!("EPSG:{}", target_epsg);

        let proj = Proj::new_known_crs(&source, &target, None)
            .with_context(|| format!("Failed to create projection from {} to {}", source, target))?;

        Ok(Self {
            proj,
            source_epsg,
            target_epsg,
        })
    }

    pub fn source_epsg(&self) -> u32 {
        self.source_epsg
    }

    pub fn target_epsg(&self) -> u32 {
        self.target_epsg
    }

    /// Transforme une coordonnée unique
    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let (tx, ty) = self
            .proj
            .convert((x, y))
            .context("Coordinate transformation failed")?;
        if !tx.is_finite() || !ty.is_finite() {
            anyhow::bail!("({}, {}) projects to a non-finite coordinate", x, y);
        }
        Ok((tx, ty))
    }

    /// Transforme une géométrie
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry> {
        geom.try_map_coords(|c: Coord| -> Result<Coord> {
            let (x, y) = self.transform_point(c.x, c.y)?;
            Ok(Coord { x, y })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    #[test]
    fn test_wgs84_to_monte_mario() {
        // Rome dans Monte Mario / Italy zone 2 (EPSG:3004)
        let reprojector = ProjReprojector::new(4326, 3004).unwrap();
        let rome = Geometry::Point(Point::new(12.4924, 41.8902));

        let Geometry::Point(p) = reprojector.transform_geometry(&rome).unwrap() else {
            panic!("Expected Point geometry");
        };
        assert!(p.x() > 2_200_000.0 && p.x() < 2_400_000.0, "x={}", p.x());
        assert!(p.y() > 4_600_000.0 && p.y() < 4_700_000.0, "y={}", p.y());
    }

    #[test]
    fn test_invalid_epsg() {
        assert!(ProjReprojector::new(99999, 4326).is_err());
    }
}
