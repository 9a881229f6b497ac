//! Types de données pour le crate zornade

use std::collections::HashMap;
use std::fmt;

use geo::{Coord, Geometry, Rect};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::BoundsError;

/// Code EPSG du WGS84, système natif de l'API
pub const WGS84_EPSG: u32 = 4326;

/// Zone de requête rectangulaire dans un système de coordonnées donné
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,

    /// Code EPSG des bornes
    pub epsg: u32,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, epsg: u32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            epsg,
        }
    }

    /// Vérifie que la bbox est interrogeable : bornes finies, min <= max, aire non nulle
    pub fn validate(&self) -> Result<(), BoundsError> {
        let bounds = [self.min_x, self.min_y, self.max_x, self.max_y];
        if bounds.iter().any(|v| !v.is_finite()) {
            return Err(BoundsError::NonFinite);
        }
        if self.min_x > self.max_x {
            return Err(BoundsError::Inverted {
                axis: "x",
                min: self.min_x,
                max: self.max_x,
            });
        }
        if self.min_y > self.max_y {
            return Err(BoundsError::Inverted {
                axis: "y",
                min: self.min_y,
                max: self.max_y,
            });
        }
        if self.width() == 0.0 || self.height() == 0.0 {
            return Err(BoundsError::Degenerate);
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }

    /// Paramètres au format attendu par l'API : `[min_x, min_y, max_x, max_y]`
    pub fn to_params(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// Construit une bbox depuis un rectangle `geo`
    pub fn from_rect(rect: Rect, epsg: u32) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y, epsg)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{} (EPSG:{})",
            self.min_x, self.min_y, self.max_x, self.max_y, self.epsg
        )
    }
}

/// Localisation approximative d'un stub de recherche
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StubLocation {
    Point(Coord),
    Envelope(Rect),
    Unknown,
}

/// Enregistrement minimal retourné par la recherche, avant enrichissement
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelStub {
    /// Identifiant de la parcelle
    pub id: String,

    /// Point ou enveloppe renvoyé par la recherche
    pub location: StubLocation,

    /// Code EPSG de `location`
    pub epsg: u32,
}

impl ParcelStub {
    pub fn new(id: impl Into<String>, location: StubLocation) -> Self {
        Self {
            id: id.into(),
            location,
            epsg: WGS84_EPSG,
        }
    }
}

/// Valeur scalaire brute d'un champ d'enrichissement
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

/// Position brute `[x, y]`
pub type RawPosition = [f64; 2];

/// Ring brut tel qu'encodé par l'API
pub type RawRing = Vec<RawPosition>;

/// Géométrie brute, discriminée par le champ `type` du payload
#[derive(Debug, Clone, PartialEq)]
pub enum RawGeometry {
    /// Un polygone : exterior puis holes
    Polygon(Vec<RawRing>),

    /// Plusieurs polygones
    MultiPolygon(Vec<Vec<RawRing>>),

    /// Type reçu mais non géré (conservé pour le message d'erreur)
    Unsupported(String),

    /// Payload illisible (coordonnées absentes, positions incomplètes) ;
    /// la raison est conservée pour le message d'erreur
    Malformed(String),
}

/// Résultat de l'enrichissement d'une parcelle (système natif de l'API)
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelRecord {
    pub id: String,

    /// Géométrie brute, absente si l'API n'en fournit pas
    pub geometry: Option<RawGeometry>,

    /// Champs d'enrichissement (nom brut -> valeur)
    pub fields: HashMap<String, RawValue>,
}

/// Valeur typée d'un attribut de sortie
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Enregistrement d'attributs conforme au schéma (ordre du schéma conservé)
///
/// Sérialisé comme un objet JSON, clés dans l'ordre du schéma.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeRecord {
    values: Vec<(String, AttrValue)>,
}

impl AttributeRecord {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: AttrValue) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(k, _)| k.as_str())
    }
}

impl Serialize for AttributeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Feature finale : géométrie dans le système cible + attributs du schéma
#[derive(Debug, Clone)]
pub struct Feature {
    /// Identifiant de la parcelle
    pub id: String,

    /// Polygon ou MultiPolygon
    pub geometry: Geometry,

    pub attributes: AttributeRecord,
}
