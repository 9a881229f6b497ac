//! Enrichissement concurrent d'un batch de stubs

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zornade::{ParcelRecord, ParcelStub};

use crate::api::ParcelApi;
use crate::backoff::BackoffPolicy;
use crate::config::MAX_BATCH_SIZE;
use crate::error::FetchError;
use crate::report::FetchStats;

/// Résultat d'enrichissement d'un stub
pub type Enriched = (ParcelStub, Result<ParcelRecord, FetchError>);

/// Récupère le détail des parcelles d'un batch en parallèle
pub struct BatchEnricher<'a, A: ParcelApi + ?Sized> {
    api: &'a A,
    backoff: BackoffPolicy,
}

impl<'a, A: ParcelApi + ?Sized> BatchEnricher<'a, A> {
    pub fn new(api: &'a A, backoff: BackoffPolicy) -> Self {
        Self { api, backoff }
    }

    /// Un résultat par stub, dans l'ordre du batch
    ///
    /// Les requêtes partent en parallèle, au plus `min(batch.len(), 25)` à la fois.
    /// Un échec n'affecte que son stub. Si le run est annulé pendant le batch,
    /// seuls retries et 429 sont comptés : le batch sera écarté par l'appelant.
    pub async fn enrich(
        &self,
        batch: Vec<ParcelStub>,
        stats: &mut FetchStats,
        cancel: &CancellationToken,
    ) -> Vec<Enriched> {
        let concurrency = batch.len().clamp(1, MAX_BATCH_SIZE);
        let api = self.api;
        let backoff = &self.backoff;

        let results: Vec<_> = stream::iter(batch)
            .map(|stub| async move {
                let attempted = backoff
                    .run(cancel, &stub.id, || api.fetch_detail(&stub.id))
                    .await;
                (stub, attempted)
            })
            .buffered(concurrency)
            .collect()
            .await;

        let counted = !cancel.is_cancelled();
        let mut out = Vec::with_capacity(results.len());
        for (stub, attempted) in results {
            stats.retried += attempted.retries as usize;
            stats.rate_limited += attempted.rate_limited as usize;

            if counted {
                match &attempted.result {
                    Ok(_) => stats.fetched += 1,
                    Err(FetchError::Cancelled) => {}
                    Err(e) => {
                        stats.failed += 1;
                        warn!(parcel = %stub.id, error = %e, "Enrichment failed");
                    }
                }
            }
            out.push((stub, attempted.result));
        }

        debug!(
            batch = out.len(),
            concurrency,
            cancelled = !counted,
            "Batch enrichment finished"
        );
        out
    }
}
