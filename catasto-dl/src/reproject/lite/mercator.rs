//! Projection Web Mercator (EPSG:3857)

use super::ellipsoid::WGS84;
use super::Geographic;
use anyhow::{bail, Result};

/// Latitude maximale représentable en Web Mercator
const MAX_LAT_DEG: f64 = 85.051_128_78;

/// Convertit coordonnées géographiques vers Web Mercator
pub fn geographic_to_web_mercator(geo: Geographic) -> Result<(f64, f64)> {
    if geo.lat.to_degrees().abs() > MAX_LAT_DEG {
        bail!(
            "latitude {:.6} outside Web Mercator domain",
            geo.lat.to_degrees()
        );
    }

    let r = WGS84::A;
    let x = r * geo.lon;
    let y = r * (std::f64::consts::FRAC_PI_4 + geo.lat / 2.0).tan().ln();

    Ok((x, y))
}

/// Convertit Web Mercator vers coordonnées géographiques
pub fn web_mercator_to_geographic(x: f64, y: f64) -> Result<Geographic> {
    let r = WGS84::A;

    let lon = x / r;
    let lat = 2.0 * (y / r).exp().atan() - std::f64::consts::FRAC_PI_2;

    Ok(Geographic::new(lon, lat))
}
