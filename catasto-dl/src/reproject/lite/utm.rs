//! Projection UTM (Universal Transverse Mercator)
//!
//! Toutes les zones WGS84 (326xx nord, 327xx sud) et ETRS89 (258xx).
//! L'Italie est couverte par les zones 32N, 33N et 34N.

use super::ellipsoid::WGS84;
use super::Geographic;
use anyhow::{bail, Result};

/// Facteur d'échelle
const K0: f64 = 0.9996;

/// False easting
const X0: f64 = 500000.0;

/// False northing (hémisphère sud)
const Y0_SOUTH: f64 = 10000000.0;

/// Écart maximal au méridien central accepté (degrés)
const MAX_ZONE_OFFSET_DEG: f64 = 30.0;

/// Zone UTM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    pub zone: u32,
    pub south: bool,
}

impl UtmZone {
    /// Déduit la zone depuis un code EPSG (326xx, 327xx, 258xx)
    pub fn from_epsg(epsg: u32) -> Option<Self> {
        match epsg {
            32601..=32660 => Some(Self {
                zone: epsg - 32600,
                south: false,
            }),
            32701..=32760 => Some(Self {
                zone: epsg - 32700,
                south: true,
            }),
            25828..=25838 => Some(Self {
                zone: epsg - 25800,
                south: false,
            }),
            _ => None,
        }
    }

    /// Longitude du méridien central (radians)
    fn central_meridian(&self) -> f64 {
        ((self.zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
    }
}

/// Longueur de l'arc de méridien depuis l'équateur
fn meridian_arc(lat: f64) -> f64 {
    let e2 = WGS84::E2;
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    WGS84::A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

/// Convertit coordonnées géographiques WGS84 vers UTM
pub fn geographic_to_utm(geo: Geographic, zone: UtmZone) -> Result<(f64, f64)> {
    let lat_deg = geo.lat.to_degrees();
    if !(-80.0..=84.0).contains(&lat_deg) {
        bail!("latitude {:.6} outside UTM domain", lat_deg);
    }

    let lon0 = zone.central_meridian();
    let offset = (geo.lon - lon0).to_degrees();
    if offset.abs() > MAX_ZONE_OFFSET_DEG {
        bail!(
            "longitude {:.6} too far from UTM zone {} central meridian",
            geo.lon.to_degrees(),
            zone.zone
        );
    }

    let e2 = WGS84::E2;
    let ep2 = WGS84::EP2;

    let sin_lat = geo.lat.sin();
    let cos_lat = geo.lat.cos();
    let tan_lat = geo.lat.tan();

    let n = WGS84::A / (1.0 - e2 * sin_lat.powi(2)).sqrt();
    let t = tan_lat.powi(2);
    let c = ep2 * cos_lat.powi(2);
    let a = cos_lat * (geo.lon - lon0);
    let m = meridian_arc(geo.lat);

    let x = K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t.powi(2) + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + X0;

    let y = K0
        * (m + n
            * tan_lat
            * (a.powi(2) / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c.powi(2)) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t.powi(2) + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));

    let y = if zone.south { y + Y0_SOUTH } else { y };

    Ok((x, y))
}

/// Convertit UTM vers coordonnées géographiques WGS84
pub fn utm_to_geographic(x: f64, y: f64, zone: UtmZone) -> Result<Geographic> {
    let a = WGS84::A;
    let e2 = WGS84::E2;
    let ep2 = WGS84::EP2;

    let y0 = if zone.south { Y0_SOUTH } else { 0.0 };
    let lon0 = zone.central_meridian();

    let x = x - X0;
    let y = y - y0;

    // Latitude d'empreinte
    let m = y / K0;
    let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));

    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let n1 = a / (1.0 - e2 * sin_phi1.powi(2)).sqrt();
    let t1 = tan_phi1.powi(2);
    let c1 = ep2 * cos_phi1.powi(2);
    let r1 = a * (1.0 - e2) / (1.0 - e2 * sin_phi1.powi(2)).powf(1.5);
    let d = x / (n1 * K0);

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1.powi(2) - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1.powi(2) - 252.0 * ep2 - 3.0 * c1.powi(2))
                    * d.powi(6)
                    / 720.0);

    let lon = lon0
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1.powi(2) + 8.0 * ep2 + 24.0 * t1.powi(2))
                * d.powi(5)
                / 120.0)
            / cos_phi1;

    if !lat.is_finite() || !lon.is_finite() || lat.abs() > std::f64::consts::FRAC_PI_2 {
        bail!("UTM coordinate ({}, {}) outside zone {} domain", x + X0, y + y0, zone.zone);
    }

    Ok(Geographic::new(lon, lat))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONE_32N: UtmZone = UtmZone {
        zone: 32,
        south: false,
    };
    const ZONE_33N: UtmZone = UtmZone {
        zone: 33,
        south: false,
    };

    #[test]
    fn test_zone_from_epsg() {
        assert_eq!(UtmZone::from_epsg(32633), Some(ZONE_33N));
        assert_eq!(UtmZone::from_epsg(25832), Some(ZONE_32N));
        assert_eq!(
            UtmZone::from_epsg(32740),
            Some(UtmZone {
                zone: 40,
                south: true
            })
        );
        assert_eq!(UtmZone::from_epsg(2154), None);
    }

    #[test]
    fn test_rome_forward() {
        // Colisée : 12.4924°E, 41.8902°N -> zone 33N
        let geo = Geographic::from_degrees(12.4924, 41.8902);
        let (x, y) = geographic_to_utm(geo, ZONE_33N).unwrap();

        assert!((x - 291962.6).abs() < 1.0, "x={}", x);
        assert!((y - 4640626.1).abs() < 1.0, "y={}", y);
    }

    #[test]
    fn test_verona_roundtrip() {
        let geo = Geographic::from_degrees(10.99, 45.438);
        let (x, y) = geographic_to_utm(geo, ZONE_32N).unwrap();
        assert!((x - 655642.4).abs() < 1.0, "x={}", x);
        assert!((y - 5033534.7).abs() < 1.0, "y={}", y);

        let (lon, lat) = utm_to_geographic(x, y, ZONE_32N).unwrap().to_degrees();
        assert!((lon - 10.99).abs() < 1e-6, "lon={}", lon);
        assert!((lat - 45.438).abs() < 1e-6, "lat={}", lat);
    }

    #[test]
    fn test_martinique_inverse() {
        // Fort-de-France : 708000, 1615000 en zone 20N
        let zone = UtmZone::from_epsg(32620).unwrap();
        let (lon, lat) = utm_to_geographic(708000.0, 1615000.0, zone)
            .unwrap()
            .to_degrees();

        assert!((lon - (-61.07)).abs() < 0.2, "lon={}", lon);
        assert!((lat - 14.60).abs() < 0.2, "lat={}", lat);
    }

    #[test]
    fn test_out_of_domain() {
        assert!(geographic_to_utm(Geographic::from_degrees(12.0, 86.0), ZONE_33N).is_err());
        assert!(geographic_to_utm(Geographic::from_degrees(-120.0, 45.0), ZONE_33N).is_err());
    }
}
