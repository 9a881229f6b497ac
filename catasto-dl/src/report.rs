//! Statistiques et rapport de fin de run
//!
//! Le statut final est décidé une seule fois, à la finalisation, à partir
//! du taux d'échec sur l'ensemble du run.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

/// Nombre maximal de messages conservés par liste
const MAX_MESSAGES: usize = 200;

/// Compteurs du run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    /// Stubs uniques trouvés par la recherche
    pub found: usize,
    /// Stubs ignorés car déjà vus
    pub duplicates: usize,
    /// Enrichissements réussis
    pub fetched: usize,
    /// Features transmises au sink
    pub emitted: usize,
    /// Enregistrements écartés (géométrie, reprojection)
    pub skipped: usize,
    /// Enrichissements en échec
    pub failed: usize,
    /// Retries effectués
    pub retried: usize,
    /// Réponses 429 reçues
    pub rate_limited: usize,
}

impl FetchStats {
    /// Parcelles pour lesquelles aucune feature n'a été produite
    pub fn lost(&self) -> usize {
        self.failed + self.skipped
    }
}

/// Statut terminal d'un run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Succeeded,
    PartiallySucceeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Failed)
    }
}

/// Message rattaché à une parcelle
#[derive(Debug, Clone, Serialize)]
pub struct ParcelIssue {
    pub parcel_id: String,
    pub message: String,
}

/// Rapport complet d'un run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    /// Message de synthèse
    pub message: String,
    pub duration_secs: f64,
    pub stats: FetchStats,

    /// Parcelles écartées à l'assemblage
    pub warnings: Vec<ParcelIssue>,
    /// Parcelles en échec d'enrichissement
    pub errors: Vec<ParcelIssue>,

    #[serde(skip)]
    dropped_messages: usize,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            status: RunStatus::Succeeded,
            message: String::new(),
            duration_secs: 0.0,
            stats: FetchStats::default(),
            warnings: Vec::new(),
            errors: Vec::new(),
            dropped_messages: 0,
        }
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enregistre une parcelle en échec d'enrichissement
    pub fn record_error(&mut self, parcel_id: &str, message: impl Into<String>) {
        Self::push_capped(
            &mut self.errors,
            &mut self.dropped_messages,
            parcel_id,
            message.into(),
        );
    }

    /// Enregistre une parcelle écartée
    pub fn record_warning(&mut self, parcel_id: &str, message: impl Into<String>) {
        Self::push_capped(
            &mut self.warnings,
            &mut self.dropped_messages,
            parcel_id,
            message.into(),
        );
    }

    fn push_capped(
        list: &mut Vec<ParcelIssue>,
        dropped: &mut usize,
        parcel_id: &str,
        message: String,
    ) {
        if list.len() < MAX_MESSAGES {
            list.push(ParcelIssue {
                parcel_id: parcel_id.to_string(),
                message,
            });
        } else {
            *dropped += 1;
        }
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final à partir des compteurs
    ///
    /// Le seuil est strict : un taux d'échec égal à `tolerance` reste toléré.
    pub fn finalize(&mut self, stats: FetchStats, tolerance: f64) {
        self.stats = stats;

        let (status, message) = if stats.found == 0 {
            (RunStatus::Succeeded, "no parcels found".to_string())
        } else if stats.failed == 0 {
            (
                RunStatus::Succeeded,
                format!(
                    "{} features emitted from {} parcels, {} skipped",
                    stats.emitted, stats.found, stats.skipped
                ),
            )
        } else {
            let rate = stats.failed as f64 / stats.found as f64;
            if rate > tolerance {
                (
                    RunStatus::Failed,
                    format!(
                        "{} of {} parcels failed ({:.1}% > {:.1}% tolerated)",
                        stats.failed,
                        stats.found,
                        rate * 100.0,
                        tolerance * 100.0
                    ),
                )
            } else if stats.emitted > 0 {
                (
                    RunStatus::PartiallySucceeded,
                    format!(
                        "{} features emitted, {} of {} parcels failed, {} skipped",
                        stats.emitted, stats.failed, stats.found, stats.skipped
                    ),
                )
            } else {
                (
                    RunStatus::Failed,
                    format!("{} parcels failed and no feature was emitted", stats.failed),
                )
            }
        };

        self.status = status;
        self.message = message;
    }

    /// Marque le run comme annulé, en gardant les compteurs atteints
    pub fn cancel(&mut self, stats: FetchStats) {
        self.stats = stats;
        self.status = RunStatus::Cancelled;
        self.message = format!(
            "cancelled after {} of {} parcels ({} features emitted)",
            stats.fetched + stats.failed,
            stats.found,
            stats.emitted
        );
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("FETCH REPORT");
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Message: {}", self.message);
        println!("Duration: {:.2}s", self.duration_secs);

        let s = &self.stats;
        println!("\n--- SUMMARY ---");
        println!("Parcels: {} found, {} duplicates ignored", s.found, s.duplicates);
        println!(
            "Enrichment: {} fetched, {} failed, {} retries, {} rate limited",
            s.fetched, s.failed, s.retried, s.rate_limited
        );
        println!(
            "Features: {} emitted, {} skipped ({} parcels without feature)",
            s.emitted,
            s.skipped,
            s.lost()
        );

        if !self.warnings.is_empty() {
            println!("\n--- SKIPPED ({}) ---", self.warnings.len());
            for w in self.warnings.iter().take(10) {
                println!("  [{}] {}", w.parcel_id, w.message);
            }
            if self.warnings.len() > 10 {
                println!("  ... and {} more", self.warnings.len() - 10);
            }
        }

        if !self.errors.is_empty() {
            println!("\n--- ERRORS ({}) ---", self.errors.len());
            for e in self.errors.iter().take(20) {
                println!("  [{}] {}", e.parcel_id, e.message);
            }
            if self.errors.len() > 20 {
                println!("  ... and {} more", self.errors.len() - 20);
            }
        }

        if self.dropped_messages > 0 {
            println!("\n({} messages not kept)", self.dropped_messages);
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{:?}: {} emitted, {} failed, {} skipped of {} found",
            self.status, self.stats.emitted, self.stats.failed, self.stats.skipped, self.stats.found
        )
    }
}
