//! Sink GeoJSON avec geozero (streaming : chaque feature est écrite dès réception)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;
use tracing::{debug, error, info, warn};
use zornade::Feature;

use super::{FeatureSink, LogLevel};

/// FeatureCollection écrite au fil de l'eau
pub struct GeoJsonSink<W: Write> {
    writer: W,
    count: usize,
    finished: bool,
    last_progress: f64,
}

impl GeoJsonSink<BufWriter<File>> {
    /// Crée le fichier de sortie et écrit l'en-tête
    pub fn create(path: &Path, epsg: u32) -> Result<Self> {
        let file = File::create(path)
            .context(format!("Failed to create file: {}", path.display()))?;
        Self::new(BufWriter::new(file), epsg)
    }
}

impl<W: Write> GeoJsonSink<W> {
    pub fn new(mut writer: W, epsg: u32) -> Result<Self> {
        // Header FeatureCollection avec CRS
        write!(
            writer,
            r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
            epsg
        )?;
        Ok(Self {
            writer,
            count: 0,
            finished: false,
            last_progress: 0.0,
        })
    }

    /// Nombre de features écrites
    pub fn count(&self) -> usize {
        self.count
    }

    /// Termine la collection et rend le writer
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        Ok(self.writer)
    }
}

/// Écrit une feature en GeoJSON
fn write_feature<W: Write>(writer: &mut W, feature: &Feature) -> Result<()> {
    let id = serde_json::to_string(&feature.id)?;
    write!(writer, r#"{{"type":"Feature","id":{},"geometry":"#, id)?;

    let mut geom_buf = Vec::new();
    let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
    feature.geometry.process_geom(&mut geom_writer)?;
    writer.write_all(&geom_buf)?;

    write!(writer, r#","properties":"#)?;
    serde_json::to_writer(&mut *writer, &feature.attributes)?;
    write!(writer, "}}")?;

    Ok(())
}

impl<W: Write> FeatureSink for GeoJsonSink<W> {
    fn add_feature(&mut self, feature: Feature) -> Result<()> {
        if self.finished {
            anyhow::bail!("GeoJSON collection already closed");
        }
        if self.count > 0 {
            write!(self.writer, ",")?;
        }
        write_feature(&mut self.writer, &feature)
            .context(format!("Failed to write feature {}", feature.id))?;
        self.count += 1;
        Ok(())
    }

    fn set_progress(&mut self, fraction: f64, message: &str) {
        // Un log tous les 10 %
        if fraction >= 1.0 || fraction - self.last_progress >= 0.1 {
            self.last_progress = fraction;
            info!(progress = %format!("{:.0}%", fraction * 100.0), "{}", message);
        } else {
            debug!(progress = fraction, "{}", message);
        }
    }

    fn push_log(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => info!("{}", message),
            LogLevel::Warning => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        write!(self.writer, "]}}")?;
        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }
}
