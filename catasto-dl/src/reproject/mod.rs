//! Conversion de coordonnées : reproject_lite en priorité, fallback sur PROJ
//!
//! Utilise automatiquement la meilleure option disponible.

pub mod lite;
#[cfg(feature = "reproject")]
pub mod proj_backend;

use anyhow::{bail, Result};
use geo::{Coord, Geometry, MapCoords, Rect};
use zornade::{BoundingBox, WGS84_EPSG};

use lite::ReprojectorLite;

/// Nombre de points échantillonnés par côté lors de la conversion d'une bbox
const BBOX_EDGE_SAMPLES: usize = 21;

/// Conversion de coordonnées entre deux systèmes
pub enum CoordinateConverter {
    /// Reprojection légère (pure Rust)
    Lite(ReprojectorLite),
    /// Reprojection via PROJ (si feature activée)
    #[cfg(feature = "reproject")]
    Proj(proj_backend::ProjReprojector),
    /// Pas de reprojection (source == cible)
    ///
    /// En géographique, les coordonnées hors du domaine lon/lat sont rejetées.
    Identity { geographic: bool },
}

impl CoordinateConverter {
    /// Crée un nouveau convertisseur
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self> {
        if source_epsg == target_epsg {
            return Ok(Self::Identity {
                geographic: source_epsg == WGS84_EPSG,
            });
        }

        if ReprojectorLite::is_supported(source_epsg, target_epsg) {
            let lite = ReprojectorLite::new(source_epsg, target_epsg)?;
            return Ok(Self::Lite(lite));
        }

        #[cfg(feature = "reproject")]
        {
            let proj = proj_backend::ProjReprojector::new(source_epsg, target_epsg)?;
            Ok(Self::Proj(proj))
        }

        #[cfg(not(feature = "reproject"))]
        bail!(
            "Reprojection EPSG:{} → EPSG:{} not supported.\n\
             Built-in projections: 4326 (WGS84), 3857 (Web Mercator), \
             326xx/327xx (UTM WGS84), 258xx (UTM ETRS89).\n\
             For other systems, build with: cargo build --features reproject",
            source_epsg,
            target_epsg
        );
    }

    /// Transforme un point
    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match self {
            Self::Identity { geographic } => {
                if !x.is_finite() || !y.is_finite() {
                    bail!("non-finite coordinate ({}, {})", x, y);
                }
                let in_domain = (-180.0..=180.0).contains(&x) && (-90.0..=90.0).contains(&y);
                if *geographic && !in_domain {
                    bail!("({}, {}) is not a valid longitude/latitude", x, y);
                }
                Ok((x, y))
            }
            Self::Lite(lite) => lite.transform_point(x, y),
            #[cfg(feature = "reproject")]
            Self::Proj(proj) => proj.transform_point(x, y),
        }
    }

    /// Transforme une géométrie
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry> {
        match self {
            Self::Identity { geographic: false } => Ok(geom.clone()),
            Self::Identity { geographic: true } => {
                geom.try_map_coords(|c: Coord| -> Result<Coord> {
                    let (x, y) = self.transform_point(c.x, c.y)?;
                    Ok(Coord { x, y })
                })
            }
            Self::Lite(lite) => lite.transform_geometry(geom),
            #[cfg(feature = "reproject")]
            Self::Proj(proj) => proj.transform_geometry(geom),
        }
    }

    /// Transforme une bbox en échantillonnant ses côtés puis en prenant l'enveloppe
    ///
    /// Les côtés d'un rectangle ne restent pas droits après projection :
    /// les 4 coins seuls sous-estiment l'emprise.
    pub fn transform_bbox(&self, bbox: &BoundingBox, target_epsg: u32) -> Result<BoundingBox> {
        if matches!(self, Self::Identity { .. }) {
            return Ok(BoundingBox { epsg: target_epsg, ..*bbox });
        }

        let mut min = Coord {
            x: f64::INFINITY,
            y: f64::INFINITY,
        };
        let mut max = Coord {
            x: f64::NEG_INFINITY,
            y: f64::NEG_INFINITY,
        };

        let steps = (BBOX_EDGE_SAMPLES - 1) as f64;
        for i in 0..BBOX_EDGE_SAMPLES {
            let t = i as f64 / steps;
            let x = bbox.min_x + t * bbox.width();
            let y = bbox.min_y + t * bbox.height();
            let samples = [
                (x, bbox.min_y),
                (x, bbox.max_y),
                (bbox.min_x, y),
                (bbox.max_x, y),
            ];
            for (sx, sy) in samples {
                let (tx, ty) = self.transform_point(sx, sy)?;
                min.x = min.x.min(tx);
                min.y = min.y.min(ty);
                max.x = max.x.max(tx);
                max.y = max.y.max(ty);
            }
        }

        Ok(BoundingBox::from_rect(Rect::new(min, max), target_epsg))
    }

    /// Retourne une description du convertisseur utilisé
    pub fn description(&self) -> &'static str {
        match self {
            Self::Identity { .. } => "identity (no reprojection)",
            Self::Lite(_) => "reproject_lite (pure Rust)",
            #[cfg(feature = "reproject")]
            Self::Proj(_) => "proj (PROJ library)",
        }
    }
}
