//! Destinations des features, de la progression et des messages du run

pub mod geojson;

use anyhow::Result;
use zornade::Feature;

pub use self::geojson::GeoJsonSink;

/// Niveau d'un message destiné à l'utilisateur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Reçoit les features émises par le pipeline
///
/// Seul `add_feature` est obligatoire.
pub trait FeatureSink {
    fn add_feature(&mut self, feature: Feature) -> Result<()>;

    /// Progression dans `[0, 1]`
    fn set_progress(&mut self, _fraction: f64, _message: &str) {}

    fn push_log(&mut self, _level: LogLevel, _message: &str) {}

    /// Appelé une fois en fin de run, quel que soit le statut
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink en mémoire
#[derive(Debug, Default)]
pub struct MemorySink {
    pub features: Vec<Feature>,
    pub progress: Vec<f64>,
    pub logs: Vec<(LogLevel, String)>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.id.as_str()).collect()
    }

    pub fn logs_at(&self, level: LogLevel) -> impl Iterator<Item = &str> {
        self.logs
            .iter()
            .filter(move |(l, _)| *l == level)
            .map(|(_, m)| m.as_str())
    }
}

impl FeatureSink for MemorySink {
    fn add_feature(&mut self, feature: Feature) -> Result<()> {
        self.features.push(feature);
        Ok(())
    }

    fn set_progress(&mut self, fraction: f64, _message: &str) {
        self.progress.push(fraction);
    }

    fn push_log(&mut self, level: LogLevel, message: &str) {
        self.logs.push((level, message.to_string()));
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
