//! Format JSON des réponses de l'API et conversion vers le modèle `zornade`

use std::collections::HashMap;

use geo::{Coord, Rect};
use serde::Deserialize;
use serde_json::{Map, Value};
use zornade::{ParcelRecord, ParcelStub, RawGeometry, RawPosition, RawRing, RawValue, StubLocation};

use crate::error::FetchError;

/// Enveloppe commune à toutes les réponses
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub data: Value,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default, rename = "hasMore")]
    pub has_more: Option<bool>,
}

impl Envelope {
    /// Parse le corps d'une réponse 2xx ; `success: false` est une erreur
    pub fn parse(body: &str) -> Result<Self, FetchError> {
        let envelope: Envelope = serde_json::from_str(body)
            .map_err(|e| FetchError::parse(format!("malformed JSON: {e}")))?;

        if envelope.success == Some(false) {
            let message = envelope
                .message
                .clone()
                .unwrap_or_else(|| "API returned success=false".to_string());
            return Err(FetchError::Parse(message));
        }
        Ok(envelope)
    }
}

/// Convertit le tableau `data` d'une réponse de recherche en stubs
pub fn stubs_from_data(data: Value) -> Result<Vec<ParcelStub>, FetchError> {
    let items = match data {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => {
            return Err(FetchError::parse(format!(
                "expected an array of parcels, got {}",
                json_type(&other)
            )))
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => stub_from_object(&map),
            other => Err(FetchError::parse(format!(
                "expected a parcel object, got {}",
                json_type(&other)
            ))),
        })
        .collect()
}

fn stub_from_object(map: &Map<String, Value>) -> Result<ParcelStub, FetchError> {
    let id = parcel_id(map).ok_or_else(|| FetchError::parse("parcel without identifier"))?;
    Ok(ParcelStub::new(id, stub_location(map)))
}

/// Identifiant : `id`, sinon `inspireid`
fn parcel_id(map: &Map<String, Value>) -> Option<String> {
    ["id", "inspireid"].iter().find_map(|key| match map.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn stub_location(map: &Map<String, Value>) -> StubLocation {
    if let Some(coord) = map.get("centroid").and_then(point_coord) {
        return StubLocation::Point(coord);
    }

    let lon = map.get("centroid_lon").and_then(Value::as_f64);
    let lat = map.get("centroid_lat").and_then(Value::as_f64);
    if let (Some(x), Some(y)) = (lon, lat) {
        return StubLocation::Point(Coord { x, y });
    }

    if let Some(Value::Array(b)) = map.get("bbox") {
        let values: Vec<f64> = b.iter().filter_map(Value::as_f64).collect();
        if let [min_x, min_y, max_x, max_y] = values[..] {
            return StubLocation::Envelope(Rect::new(
                Coord { x: min_x, y: min_y },
                Coord { x: max_x, y: max_y },
            ));
        }
    }

    StubLocation::Unknown
}

/// Point GeoJSON ou tableau `[x, y]`
fn point_coord(value: &Value) -> Option<Coord> {
    let coords = match value {
        Value::Array(_) => value,
        Value::Object(obj) => obj.get("coordinates")?,
        _ => return None,
    };
    let arr = coords.as_array()?;
    let x = arr.first()?.as_f64()?;
    let y = arr.get(1)?.as_f64()?;
    Some(Coord { x, y })
}

/// Convertit le `data` d'une réponse de détail en enregistrement
///
/// `data` peut être l'objet de la parcelle ou un tableau d'un élément.
pub fn record_from_data(id: &str, data: Value) -> Result<ParcelRecord, FetchError> {
    let object = match data {
        Value::Object(map) => map,
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(FetchError::parse(format!(
                    "expected a parcel object, got {}",
                    json_type(&other)
                )))
            }
            None => return Err(FetchError::NotFound(id.to_string())),
        },
        Value::Null => return Err(FetchError::NotFound(id.to_string())),
        other => {
            return Err(FetchError::parse(format!(
                "expected a parcel object, got {}",
                json_type(&other)
            )))
        }
    };

    record_from_object(id, object)
}

fn record_from_object(id: &str, mut object: Map<String, Value>) -> Result<ParcelRecord, FetchError> {
    let geometry = match object.remove("geometry") {
        None | Some(Value::Null) => None,
        Some(value) => Some(raw_geometry(value)),
    };

    // Format Feature : attributs dans `properties`
    let properties = match object.remove("properties") {
        Some(Value::Object(props)) => props,
        _ => object,
    };

    let fields: HashMap<String, RawValue> = properties
        .into_iter()
        .map(|(key, value)| (key, raw_value(value)))
        .collect();

    Ok(ParcelRecord {
        id: id.to_string(),
        geometry,
        fields,
    })
}

/// Valeur JSON vers valeur brute ; les valeurs imbriquées sont conservées en texte
pub fn raw_value(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(b) => RawValue::Bool(b),
        Value::Number(n) => n.as_f64().map(RawValue::Number).unwrap_or(RawValue::Null),
        Value::String(s) => RawValue::Text(s),
        nested @ (Value::Array(_) | Value::Object(_)) => RawValue::Text(nested.to_string()),
    }
}

/// Géométrie GeoJSON (objet ou chaîne JSON) vers géométrie brute
///
/// Un payload illisible ne rejette pas l'enregistrement : il devient
/// [`RawGeometry::Malformed`] et la parcelle est écartée à la normalisation.
pub fn raw_geometry(value: Value) -> RawGeometry {
    decode_geometry(value).unwrap_or_else(RawGeometry::Malformed)
}

fn decode_geometry(value: Value) -> Result<RawGeometry, String> {
    let value = match value {
        Value::String(s) => {
            serde_json::from_str(&s).map_err(|e| format!("geometry is not valid JSON: {e}"))?
        }
        other => other,
    };

    let type_name = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or("geometry without type")?
        .to_string();

    if type_name != "Polygon" && type_name != "MultiPolygon" {
        return Ok(RawGeometry::Unsupported(type_name));
    }

    let geometry: geojson::Geometry = serde_json::from_value(value)
        .map_err(|e| format!("invalid {type_name} geometry: {e}"))?;

    match geometry.value {
        geojson::Value::Polygon(rings) => Ok(RawGeometry::Polygon(raw_rings(&rings)?)),
        geojson::Value::MultiPolygon(polygons) => {
            let polygons = polygons
                .iter()
                .map(|rings| raw_rings(rings))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(RawGeometry::MultiPolygon(polygons))
        }
        _ => Ok(RawGeometry::Unsupported(type_name)),
    }
}

fn raw_rings(rings: &[Vec<Vec<f64>>]) -> Result<Vec<RawRing>, String> {
    rings
        .iter()
        .map(|ring| ring.iter().map(|pos| raw_position(pos)).collect())
        .collect()
}

fn raw_position(position: &[f64]) -> Result<RawPosition, String> {
    match position {
        [x, y, ..] => Ok([*x, *y]),
        _ => Err(format!("position with {} coordinate(s)", position.len())),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_success_false() {
        let err = Envelope::parse(r#"{"success": false, "message": "quota"}"#).unwrap_err();
        assert!(matches!(err, FetchError::Parse(ref m) if m == "quota"));
    }

    #[test]
    fn test_envelope_malformed() {
        assert!(matches!(Envelope::parse("<html>"), Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_stubs_from_data() {
        let data = json!([
            {"id": "IT.AGE.PLA.L781_000100.1", "centroid": {"type": "Point", "coordinates": [10.99, 45.43]}},
            {"inspireid": "IT.AGE.PLA.L781_000100.2", "bbox": [10.0, 45.0, 10.1, 45.1]},
            {"id": 42}
        ]);

        let stubs = stubs_from_data(data).unwrap();
        assert_eq!(stubs.len(), 3);
        assert_eq!(stubs[0].id, "IT.AGE.PLA.L781_000100.1");
        assert!(matches!(stubs[0].location, StubLocation::Point(c) if c.x == 10.99));
        assert!(matches!(stubs[1].location, StubLocation::Envelope(_)));
        assert_eq!(stubs[2].id, "42");
        assert_eq!(stubs[2].location, StubLocation::Unknown);
    }

    #[test]
    fn test_stub_without_id_rejected() {
        assert!(stubs_from_data(json!([{"foglio": "12"}])).is_err());
    }

    #[test]
    fn test_null_data_is_empty() {
        assert!(stubs_from_data(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_record_from_flat_object() {
        let data = json!({
            "inspireid": "P1",
            "foglio": "12",
            "area_m2": 1520.5,
            "protected_area": false,
            "tags": ["a", "b"],
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[10.0, 45.0, 120.0], [10.1, 45.0], [10.1, 45.1]]]
            }
        });

        let record = record_from_data("P1", data).unwrap();
        assert_eq!(record.id, "P1");
        assert_eq!(record.fields.get("area_m2"), Some(&RawValue::Number(1520.5)));
        assert_eq!(record.fields.get("protected_area"), Some(&RawValue::Bool(false)));
        assert_eq!(
            record.fields.get("tags"),
            Some(&RawValue::Text(r#"["a","b"]"#.to_string()))
        );
        assert!(!record.fields.contains_key("geometry"));

        let Some(RawGeometry::Polygon(rings)) = record.geometry else {
            panic!("Expected Polygon geometry");
        };
        assert_eq!(rings[0], vec![[10.0, 45.0], [10.1, 45.0], [10.1, 45.1]]);
    }

    #[test]
    fn test_record_from_feature_in_array() {
        let data = json!([{
            "type": "Feature",
            "geometry": null,
            "properties": {"comune_name": "Verona"}
        }]);

        let record = record_from_data("P9", data).unwrap();
        assert_eq!(record.id, "P9");
        assert!(record.geometry.is_none());
        assert_eq!(record.fields.get("comune_name"), Some(&RawValue::from("Verona")));
    }

    #[test]
    fn test_record_empty_array_is_not_found() {
        assert!(matches!(
            record_from_data("P1", json!([])),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn test_geometry_as_string() {
        let value = Value::String(
            r#"{"type":"MultiPolygon","coordinates":[[[[0,0],[1,0],[1,1],[0,0]]]]}"#.to_string(),
        );
        assert!(matches!(
            raw_geometry(value),
            RawGeometry::MultiPolygon(ref p) if p.len() == 1
        ));
    }

    #[test]
    fn test_unsupported_geometry_type() {
        let value = json!({"type": "LineString", "coordinates": [[0, 0], [1, 1]]});
        assert_eq!(
            raw_geometry(value),
            RawGeometry::Unsupported("LineString".to_string())
        );
    }

    #[test]
    fn test_short_position_is_malformed() {
        let value = json!({"type": "Polygon", "coordinates": [[[0.0], [1.0, 0.0], [1.0, 1.0]]]});
        assert_eq!(
            raw_geometry(value),
            RawGeometry::Malformed("position with 1 coordinate(s)".to_string())
        );
    }

    #[test]
    fn test_unreadable_geometry_is_malformed() {
        assert!(matches!(
            raw_geometry(json!({"type": "Polygon"})),
            RawGeometry::Malformed(ref m) if m.starts_with("invalid Polygon geometry")
        ));
        assert!(matches!(
            raw_geometry(Value::String("POLYGON((0 0, 1 0, 1 1))".to_string())),
            RawGeometry::Malformed(ref m) if m.starts_with("geometry is not valid JSON")
        ));
        assert_eq!(
            raw_geometry(json!({"coordinates": []})),
            RawGeometry::Malformed("geometry without type".to_string())
        );
    }

    #[test]
    fn test_record_kept_when_geometry_unreadable() {
        let data = json!({"geometry": {"type": "Polygon"}, "foglio": "1"});

        let record = record_from_data("P1", data).unwrap();
        assert_eq!(record.id, "P1");
        assert_eq!(record.fields.get("foglio"), Some(&RawValue::from("1")));
        assert!(matches!(record.geometry, Some(RawGeometry::Malformed(_))));
    }
}
