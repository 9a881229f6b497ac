//! Orchestration d'un run : validation, recherche, enrichissement par batch, finalisation
//!
//! Machine à états :
//!
//! ```text
//! Idle -> Validating -> Searching -> Enriching(1..n) -> Finalizing -> Done(status)
//! ```
//!
//! Chaque étape peut terminer le run en `Failed` ou `Cancelled`. Le run rend
//! toujours un [`RunReport`], jamais une erreur brute.

use std::collections::HashSet;
use std::pin::pin;
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zornade::{
    assemble_feature, normalize, BoundingBox, Feature, GeometryError, ParcelRecord, ParcelStub,
    SchemaMapper, WGS84_EPSG,
};

use crate::api::ParcelApi;
use crate::backoff::RateLimiter;
use crate::config::{Credentials, PipelineConfig, MAX_BATCH_SIZE};
use crate::enrich::BatchEnricher;
use crate::error::FetchError;
use crate::reproject::CoordinateConverter;
use crate::report::{FetchStats, RunReport, RunStatus};
use crate::search::PagedSearchClient;
use crate::sink::{FeatureSink, LogLevel};

/// État courant du pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Validating,
    Searching,
    /// Batch `batch` (1-indexé) sur `of`
    Enriching { batch: usize, of: usize },
    Finalizing,
    Done(RunStatus),
}

/// Taille de batch selon le nombre de parcelles trouvées
///
/// Une taille imposée est bornée à `1..=25`.
pub fn choose_batch_size(found: usize, requested: Option<usize>) -> usize {
    if let Some(size) = requested {
        return size.clamp(1, MAX_BATCH_SIZE);
    }
    match found {
        0..=100 => 10,
        101..=500 => 15,
        501..=2000 => 20,
        _ => MAX_BATCH_SIZE,
    }
}

/// Fin anticipée du run
#[derive(Debug)]
enum Abort {
    Cancelled,
    Failed(String),
}

impl From<FetchError> for Abort {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Cancelled => Abort::Cancelled,
            other => Abort::Failed(other.to_string()),
        }
    }
}

/// Conversions de coordonnées d'un run
struct Converters {
    /// Système de la bbox vers EPSG:4326
    to_api: CoordinateConverter,
    /// EPSG:4326 vers le système de sortie
    to_output: CoordinateConverter,
}

/// Pilote un run complet
pub struct PipelineOrchestrator<'a, A: ParcelApi + ?Sized> {
    api: &'a A,
    config: PipelineConfig,
    page_size: usize,
    mapper: SchemaMapper,
    state: PipelineState,
}

impl<'a, A: ParcelApi + ?Sized> PipelineOrchestrator<'a, A> {
    pub fn new(api: &'a A, config: PipelineConfig, page_size: usize, mapper: SchemaMapper) -> Self {
        Self {
            api,
            config,
            page_size,
            mapper,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn enter(&mut self, state: PipelineState) {
        debug!(from = ?self.state, to = ?state, "Pipeline state");
        self.state = state;
    }

    /// Exécute un run ; `sink.finish()` est appelé quel que soit le statut
    pub async fn run(
        &mut self,
        bbox: BoundingBox,
        credentials: &Credentials,
        sink: &mut dyn FeatureSink,
        cancel: &CancellationToken,
    ) -> RunReport {
        let started = Instant::now();
        let mut stats = FetchStats::default();
        let mut report = RunReport::new();

        let outcome = self
            .execute(bbox, credentials, sink, cancel, &mut stats, &mut report)
            .await;

        match outcome {
            Ok(()) => {
                self.enter(PipelineState::Finalizing);
                report.finalize(stats, self.config.error_tolerance);
            }
            Err(Abort::Cancelled) => report.cancel(stats),
            Err(Abort::Failed(message)) => {
                report.stats = stats;
                report.status = RunStatus::Failed;
                report.message = message;
            }
        }

        if let Err(e) = sink.finish() {
            let message = FetchError::Sink(format!("{e:#}")).to_string();
            if !report.status.is_failure() {
                report.status = RunStatus::Failed;
                report.message = message;
            } else {
                warn!(error = %message, "Output sink could not be closed");
            }
        }

        report.set_duration(started.elapsed());
        self.enter(PipelineState::Done(report.status));

        let level = match report.status {
            RunStatus::Succeeded => LogLevel::Info,
            RunStatus::PartiallySucceeded | RunStatus::Cancelled => LogLevel::Warning,
            RunStatus::Failed => LogLevel::Error,
        };
        sink.push_log(level, &report.message);
        info!(status = ?report.status, "{}", report.summary());

        report
    }

    async fn execute(
        &mut self,
        bbox: BoundingBox,
        credentials: &Credentials,
        sink: &mut dyn FeatureSink,
        cancel: &CancellationToken,
        stats: &mut FetchStats,
        report: &mut RunReport,
    ) -> Result<(), Abort> {
        self.enter(PipelineState::Validating);
        let converters = self.validate(&bbox, credentials)?;

        let api_bbox = converters
            .to_api
            .transform_bbox(&bbox, WGS84_EPSG)
            .map_err(|e| FetchError::Validation(format!("bounding box conversion failed: {e:#}")))?;
        api_bbox
            .validate()
            .map_err(|e| FetchError::Validation(format!("converted bounding box: {e}")))?;
        if bbox.epsg != WGS84_EPSG {
            sink.push_log(
                LogLevel::Info,
                &format!("Converted bbox from EPSG:{} to {}", bbox.epsg, api_bbox),
            );
        }

        if cancel.is_cancelled() {
            return Err(Abort::Cancelled);
        }

        self.enter(PipelineState::Searching);
        let stubs = self.search(api_bbox, cancel, stats).await?;
        stats.found = stubs.len();
        sink.push_log(
            LogLevel::Info,
            &format!(
                "Found {} parcels ({} duplicates ignored)",
                stats.found, stats.duplicates
            ),
        );
        if stubs.is_empty() {
            return Ok(());
        }
        sink.set_progress(0.0, &format!("Found {} parcels", stats.found));

        self.enrich_all(stubs, &converters.to_output, sink, cancel, stats, report)
            .await
    }

    /// Vérifie les entrées sans aucun appel réseau
    fn validate(&self, bbox: &BoundingBox, credentials: &Credentials) -> Result<Converters, Abort> {
        bbox.validate()
            .map_err(|e| FetchError::Validation(format!("invalid bounding box {bbox}: {e}")))?;
        credentials.validate().map_err(FetchError::Validation)?;
        self.config.validate().map_err(FetchError::Validation)?;

        let to_api = CoordinateConverter::new(bbox.epsg, WGS84_EPSG)
            .map_err(|e| FetchError::Validation(format!("{e:#}")))?;
        let to_output = CoordinateConverter::new(WGS84_EPSG, self.config.target_epsg)
            .map_err(|e| FetchError::Validation(format!("{e:#}")))?;
        debug!(output = to_output.description(), "Coordinate conversion");

        Ok(Converters { to_api, to_output })
    }

    /// Parcourt toutes les pages en dédupliquant les identifiants
    async fn search(
        &self,
        bbox: BoundingBox,
        cancel: &CancellationToken,
        stats: &mut FetchStats,
    ) -> Result<Vec<ParcelStub>, Abort> {
        let client = PagedSearchClient::new(self.api, self.config.backoff, self.page_size);
        let mut pages = pin!(client.pages(bbox, cancel.clone()));

        let mut seen: HashSet<String> = HashSet::new();
        let mut stubs = Vec::new();

        while let Some(page) = pages.next().await {
            let page = page?;
            stats.retried += page.retries as usize;
            stats.rate_limited += page.rate_limited as usize;

            let received = page.stubs.len();
            let mut fresh = 0;
            for stub in page.stubs {
                if seen.insert(stub.id.clone()) {
                    stubs.push(stub);
                    fresh += 1;
                } else {
                    stats.duplicates += 1;
                }
            }

            // Page pleine sans nouvel identifiant : l'API ignore l'offset
            if fresh == 0 && received >= self.page_size {
                warn!(offset = page.offset, "Search page only repeated known parcels, stopping");
                break;
            }
        }

        info!(found = stubs.len(), duplicates = stats.duplicates, "Search complete");
        Ok(stubs)
    }

    async fn enrich_all(
        &mut self,
        stubs: Vec<ParcelStub>,
        converter: &CoordinateConverter,
        sink: &mut dyn FeatureSink,
        cancel: &CancellationToken,
        stats: &mut FetchStats,
        report: &mut RunReport,
    ) -> Result<(), Abort> {
        let found = stubs.len();
        let batch_size = choose_batch_size(found, self.config.batch_size);
        let batches = found.div_ceil(batch_size);
        info!(found, batch_size, batches, "Starting enrichment");

        let enricher = BatchEnricher::new(self.api, self.config.backoff);
        let mut limiter = RateLimiter::new(self.config.min_batch_delay, self.config.max_batch_delay);
        let mut stubs = stubs.into_iter();
        let mut processed = 0usize;

        for index in 0..batches {
            if cancel.is_cancelled() {
                return Err(Abort::Cancelled);
            }
            self.enter(PipelineState::Enriching {
                batch: index + 1,
                of: batches,
            });
            if !limiter.pace(cancel).await {
                return Err(Abort::Cancelled);
            }

            let batch: Vec<ParcelStub> = stubs.by_ref().take(batch_size).collect();
            let batch_len = batch.len();
            let rate_limited_before = stats.rate_limited;

            let results = enricher.enrich(batch, stats, cancel).await;
            limiter.record_batch((stats.rate_limited - rate_limited_before) as u32);

            // Batch en cours au moment de l'annulation : résultats écartés
            if cancel.is_cancelled() {
                debug!(batch = index + 1, "Discarding batch results after cancellation");
                return Err(Abort::Cancelled);
            }

            let mut emitted = 0usize;
            for (stub, result) in results {
                let record = match result {
                    Ok(record) => record,
                    Err(e) => {
                        report.record_error(&stub.id, e.to_string());
                        continue;
                    }
                };

                match self.build_feature(&record, converter) {
                    Ok(feature) => {
                        sink.add_feature(feature)
                            .map_err(|e| sink_error(&stub.id, e))?;
                        stats.emitted += 1;
                        emitted += 1;
                    }
                    Err(e) => {
                        stats.skipped += 1;
                        warn!(parcel = %stub.id, error = %e, "Parcel skipped");
                        sink.push_log(
                            LogLevel::Warning,
                            &format!("Parcel {} skipped: {}", stub.id, e),
                        );
                        report.record_warning(&stub.id, e.to_string());
                    }
                }
            }

            processed += batch_len;
            sink.set_progress(
                processed as f64 / found as f64,
                &format!(
                    "Batch {}/{}: {} features, {} of {} parcels processed",
                    index + 1,
                    batches,
                    emitted,
                    processed,
                    found
                ),
            );
        }

        Ok(())
    }

    /// Normalise, reprojette et mappe un enregistrement
    fn build_feature(
        &self,
        record: &ParcelRecord,
        converter: &CoordinateConverter,
    ) -> Result<Feature, FetchError> {
        let raw = record.geometry.as_ref().ok_or(GeometryError::Empty)?;
        let geometry = normalize(raw)?;
        let geometry = converter
            .transform_geometry(&geometry)
            .map_err(|e| FetchError::Reprojection(format!("{e:#}")))?;
        Ok(assemble_feature(record, geometry, &self.mapper))
    }
}

fn sink_error(parcel: &str, e: anyhow::Error) -> Abort {
    let error = FetchError::Sink(format!("{e:#}"));
    warn!(parcel, error = %error, "Output sink rejected a feature, aborting");
    Abort::Failed(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptive_batch_size() {
        assert_eq!(choose_batch_size(1, None), 10);
        assert_eq!(choose_batch_size(100, None), 10);
        assert_eq!(choose_batch_size(101, None), 15);
        assert_eq!(choose_batch_size(500, None), 15);
        assert_eq!(choose_batch_size(2000, None), 20);
        assert_eq!(choose_batch_size(2001, None), 25);
    }

    #[test]
    fn test_requested_batch_size_clamped() {
        assert_eq!(choose_batch_size(100, Some(0)), 1);
        assert_eq!(choose_batch_size(100, Some(7)), 7);
        assert_eq!(choose_batch_size(100, Some(200)), 25);
    }

    #[test]
    fn test_abort_from_error() {
        assert!(matches!(Abort::from(FetchError::Cancelled), Abort::Cancelled));
        let Abort::Failed(message) = Abort::from(FetchError::Validation("missing API key".into()))
        else {
            panic!("Expected Failed");
        };
        assert_eq!(message, "validation error: missing API key");
    }
}
