//! Schéma d'attributs de sortie et mapping des champs bruts
//!
//! Le schéma est une table fixe `source -> target` avec un type déclaré.
//! La coercition ne lève jamais d'erreur : une valeur non convertible
//! devient `Null`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{AttrValue, AttributeRecord, RawValue};

/// Type déclaré d'un champ de sortie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Integer,
    #[serde(alias = "double", alias = "float")]
    Real,
    #[serde(alias = "bool")]
    Boolean,
}

/// Correspondance d'un champ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldSpec {
    /// Nom du champ brut renvoyé par l'API
    pub source: String,

    /// Nom de l'attribut en sortie
    pub target: String,

    #[serde(default = "default_type")]
    pub data_type: FieldType,
}

fn default_type() -> FieldType {
    FieldType::Text
}

/// Schéma d'attributs complet
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Schema {
    /// Nom de version (ex: "base", "full")
    pub version: String,

    pub fields: Vec<FieldSpec>,
}

/// Applique un [`Schema`] aux champs bruts d'une parcelle
#[derive(Debug, Clone)]
pub struct SchemaMapper {
    schema: Schema,
}

impl SchemaMapper {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Nombre de champs en sortie
    pub fn len(&self) -> usize {
        self.schema.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schema.fields.is_empty()
    }

    /// Mappe les champs bruts : chaque champ du schéma est présent en sortie
    pub fn map(&self, raw: &HashMap<String, RawValue>) -> AttributeRecord {
        let mut record = AttributeRecord::with_capacity(self.schema.fields.len());
        for field in &self.schema.fields {
            let value = raw
                .get(&field.source)
                .map(|v| coerce(v, field.data_type))
                .unwrap_or(AttrValue::Null);
            record.push(field.target.clone(), value);
        }
        record
    }
}

/// Convertit une valeur brute vers le type déclaré
pub fn coerce(value: &RawValue, data_type: FieldType) -> AttrValue {
    match (data_type, value) {
        (_, RawValue::Null) => AttrValue::Null,

        (FieldType::Text, RawValue::Text(s)) => AttrValue::Text(s.clone()),
        (FieldType::Text, RawValue::Number(n)) => AttrValue::Text(format_number(*n)),
        (FieldType::Text, RawValue::Bool(b)) => AttrValue::Text(b.to_string()),

        (FieldType::Integer, RawValue::Number(n)) => integer_from_f64(*n),
        (FieldType::Integer, RawValue::Text(s)) => parse_integer(s),
        (FieldType::Integer, RawValue::Bool(b)) => AttrValue::Integer(i64::from(*b)),

        (FieldType::Real, RawValue::Number(n)) if n.is_finite() => AttrValue::Real(*n),
        (FieldType::Real, RawValue::Number(_)) => AttrValue::Null,
        (FieldType::Real, RawValue::Text(s)) => parse_real(s)
            .map(AttrValue::Real)
            .unwrap_or(AttrValue::Null),
        (FieldType::Real, RawValue::Bool(_)) => AttrValue::Null,

        (FieldType::Boolean, RawValue::Bool(b)) => AttrValue::Boolean(*b),
        (FieldType::Boolean, RawValue::Number(n)) => AttrValue::Boolean(*n != 0.0),
        (FieldType::Boolean, RawValue::Text(s)) => parse_boolean(s),
    }
}

/// Les entiers sont écrits sans partie décimale
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn integer_from_f64(n: f64) -> AttrValue {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= i64::MAX as f64 {
        AttrValue::Integer(n as i64)
    } else {
        AttrValue::Null
    }
}

fn parse_integer(s: &str) -> AttrValue {
    let s = s.trim();
    if let Ok(n) = s.parse::<i64>() {
        return AttrValue::Integer(n);
    }
    // "12.0" ou "12,0" venant d'une colonne texte
    parse_real(s).map(integer_from_f64).unwrap_or(AttrValue::Null)
}

/// Accepte la virgule décimale (données italiennes)
fn parse_real(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let parsed = match s.parse::<f64>() {
        Ok(n) => Some(n),
        Err(_) if s.matches(',').count() == 1 && !s.contains('.') => {
            s.replace(',', ".").parse::<f64>().ok()
        }
        Err(_) => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn parse_boolean(s: &str) -> AttrValue {
    match s.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "si" | "sì" | "1" => AttrValue::Boolean(true),
        "false" | "f" | "no" | "n" | "0" => AttrValue::Boolean(false),
        _ => AttrValue::Null,
    }
}
