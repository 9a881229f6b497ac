//! Reprojection légère en Rust pur (sans dépendances externes)
//!
//! Systèmes supportés, en source comme en cible :
//! - WGS84 géographique (EPSG:4326), système natif de l'API
//! - Web Mercator (EPSG:3857)
//! - UTM WGS84 (EPSG:32601-32660, 32701-32760)
//! - UTM ETRS89 (EPSG:25828-25838), dont 25832/25833 pour l'Italie

mod ellipsoid;
mod mercator;
mod utm;

use anyhow::{anyhow, bail, Result};
use geo::{Coord, Geometry, MapCoords};

use utm::UtmZone;

/// Point en coordonnées géographiques (radians)
#[derive(Debug, Clone, Copy)]
pub struct Geographic {
    /// Longitude en radians
    pub lon: f64,
    /// Latitude en radians
    pub lat: f64,
}

impl Geographic {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Convertit en degrés
    pub fn to_degrees(self) -> (f64, f64) {
        (self.lon.to_degrees(), self.lat.to_degrees())
    }

    /// Crée depuis des degrés
    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self {
            lon: lon_deg.to_radians(),
            lat: lat_deg.to_radians(),
        }
    }
}

/// Système de coordonnées géré par la reprojection légère
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiteCrs {
    Wgs84,
    WebMercator,
    Utm(UtmZone),
}

impl LiteCrs {
    fn from_epsg(epsg: u32) -> Option<Self> {
        match epsg {
            4326 => Some(Self::Wgs84),
            3857 => Some(Self::WebMercator),
            _ => UtmZone::from_epsg(epsg).map(Self::Utm),
        }
    }

    fn unproject(self, x: f64, y: f64) -> Result<Geographic> {
        match self {
            Self::Wgs84 => {
                if !(-180.0..=180.0).contains(&x) || !(-90.0..=90.0).contains(&y) {
                    bail!("({}, {}) is not a valid longitude/latitude", x, y);
                }
                Ok(Geographic::from_degrees(x, y))
            }
            Self::WebMercator => mercator::web_mercator_to_geographic(x, y),
            Self::Utm(zone) => utm::utm_to_geographic(x, y, zone),
        }
    }

    fn project(self, geo: Geographic) -> Result<(f64, f64)> {
        match self {
            Self::Wgs84 => Ok(geo.to_degrees()),
            Self::WebMercator => mercator::geographic_to_web_mercator(geo),
            Self::Utm(zone) => utm::geographic_to_utm(geo, zone),
        }
    }
}

/// Reprojection légère entre deux systèmes supportés
pub struct ReprojectorLite {
    source: LiteCrs,
    target: LiteCrs,
}

impl ReprojectorLite {
    /// Crée un nouveau reprojector
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self> {
        let source = LiteCrs::from_epsg(source_epsg).ok_or_else(|| {
            anyhow!(
                "EPSG:{} not supported. Supported: 4326, 3857, 326xx/327xx (UTM WGS84), 258xx (UTM ETRS89)",
                source_epsg
            )
        })?;
        let target = LiteCrs::from_epsg(target_epsg).ok_or_else(|| {
            anyhow!(
                "EPSG:{} not supported. Supported: 4326, 3857, 326xx/327xx (UTM WGS84), 258xx (UTM ETRS89)",
                target_epsg
            )
        })?;

        Ok(Self { source, target })
    }

    /// Vérifie si l'EPSG est supporté
    pub fn is_supported_crs(epsg: u32) -> bool {
        LiteCrs::from_epsg(epsg).is_some()
    }

    /// Vérifie si la reprojection est supportée
    pub fn is_supported(source: u32, target: u32) -> bool {
        Self::is_supported_crs(source) && Self::is_supported_crs(target)
    }

    /// Transforme un point (x, y) de la source vers la cible
    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            bail!("non-finite coordinate ({}, {})", x, y);
        }
        let geo = self.source.unproject(x, y)?;
        let (tx, ty) = self.target.project(geo)?;
        if !tx.is_finite() || !ty.is_finite() {
            bail!("({}, {}) projects to a non-finite coordinate", x, y);
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
    use geo::{LineString, Polygon};

    #[test]
    fn test_wgs84_to_utm33() {
        let reproj = ReprojectorLite::new(4326, 32633).unwrap();
        let (x, y) = reproj.transform_point(12.4924, 41.8902).unwrap();

        assert!((x - 291962.6).abs() < 1.0, "x={}", x);
        assert!((y - 4640626.1).abs() < 1.0, "y={}", y);
    }

    #[test]
    fn test_utm_to_web_mercator() {
        let reproj = ReprojectorLite::new(32633, 3857).unwrap();
        let (x, y) = reproj.transform_point(291962.6, 4640626.1).unwrap();

        assert!((x - 1390647.6).abs() < 1.0, "x={}", x);
        assert!((y - 5144546.1).abs() < 1.0, "y={}", y);
    }

    #[test]
    fn test_polygon_transform() {
        let reproj = ReprojectorLite::new(4326, 25832).unwrap();
        let poly = Geometry::Polygon(Polygon::new(
            LineString::from(vec![
                (10.99, 45.438),
                (10.991, 45.438),
                (10.991, 45.439),
                (10.99, 45.438),
            ]),
            vec![],
        ));

        let Geometry::Polygon(p) = reproj.transform_geometry(&poly).unwrap() else {
            panic!("Expected Polygon geometry");
        };
        assert_eq!(p.exterior().0.len(), 4);
        let first = p.exterior().0[0];
        assert!((first.x - 655642.4).abs() < 1.0);
        assert!((first.y - 5033534.7).abs() < 1.0);
    }

    #[test]
    fn test_invalid_lon_lat() {
        let reproj = ReprojectorLite::new(4326, 3857).unwrap();
        assert!(reproj.transform_point(200.0, 45.0).is_err());
        assert!(reproj.transform_point(f64::NAN, 45.0).is_err());
    }

    #[test]
    fn test_unsupported_epsg() {
        assert!(ReprojectorLite::new(3003, 4326).is_err());
        assert!(ReprojectorLite::new(4326, 2154).is_err());
        assert!(!ReprojectorLite::is_supported(4326, 3004));
        assert!(ReprojectorLite::is_supported(25833, 3857));
    }
}
