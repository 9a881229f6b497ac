//! Recherche paginée des stubs dans une bbox

use futures::stream::{self, Stream};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zornade::{BoundingBox, ParcelStub};

use crate::api::ParcelApi;
use crate::backoff::BackoffPolicy;
use crate::error::{ErrorKind, FetchError};

/// Une page obtenue, avec le coût en retries
#[derive(Debug)]
pub struct PageOutcome {
    pub offset: usize,
    pub stubs: Vec<ParcelStub>,
    pub retries: u32,
    pub rate_limited: u32,
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    offset: usize,
    done: bool,
}

/// Client de recherche paginée
///
/// Non reprenable : une erreur termine le flux.
pub struct PagedSearchClient<'a, A: ParcelApi + ?Sized> {
    api: &'a A,
    backoff: BackoffPolicy,
    page_size: usize,
}

impl<'a, A: ParcelApi + ?Sized> PagedSearchClient<'a, A> {
    pub fn new(api: &'a A, backoff: BackoffPolicy, page_size: usize) -> Self {
        Self {
            api,
            backoff,
            page_size: page_size.max(1),
        }
    }

    /// Flux paresseux des pages de la bbox (EPSG:4326)
    ///
    /// S'arrête sur une page incomplète, sur `hasMore: false`, ou sur une page vide.
    /// Erreurs : `Auth` et `Cancelled` telles quelles, le reste enveloppé
    /// dans `FatalSearch` une fois les retries épuisés.
    pub fn pages(
        &self,
        bbox: BoundingBox,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<PageOutcome, FetchError>> + 'a {
        let api = self.api;
        let backoff = self.backoff;
        let limit = self.page_size;
        let start = Cursor {
            offset: 0,
            done: false,
        };

        stream::try_unfold(start, move |cursor| {
            let cancel = cancel.clone();
            async move {
                if cursor.done {
                    return Ok(None);
                }
                if cancel.is_cancelled() {
                    return Err(FetchError::Cancelled);
                }

                let offset = cursor.offset;
                let attempted = backoff
                    .run(&cancel, "search", || api.search_page(&bbox, offset, limit))
                    .await;

                let page = match attempted.result {
                    Ok(page) => page,
                    Err(e) => {
                        return Err(match e.kind() {
                            ErrorKind::Auth | ErrorKind::Cancelled | ErrorKind::Validation => e,
                            _ => FetchError::FatalSearch(Box::new(e)),
                        })
                    }
                };

                let count = page.stubs.len();
                debug!(offset, count, has_more = ?page.has_more, "Search page received");
                if count == 0 {
                    return Ok(None);
                }

                let done = count < limit || page.has_more == Some(false);
                let outcome = PageOutcome {
                    offset,
                    stubs: page.stubs,
                    retries: attempted.retries,
                    rate_limited: attempted.rate_limited,
                };
                let next = Cursor {
                    offset: offset + count,
                    done,
                };
                Ok(Some((outcome, next)))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SearchPage;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use std::sync::Mutex;
    use zornade::{ParcelRecord, StubLocation};

    /// API simulée : `total` stubs, réponses scriptées par appel
    struct PagedApi {
        total: usize,
        has_more_flag: bool,
        failures: Mutex<Vec<FetchError>>,
        offsets: Mutex<Vec<usize>>,
    }

    impl PagedApi {
        fn new(total: usize) -> Self {
            Self {
                total,
                has_more_flag: false,
                failures: Mutex::new(Vec::new()),
                offsets: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ParcelApi for PagedApi {
        async fn search_page(
            &self,
            _bbox: &BoundingBox,
            offset: usize,
            limit: usize,
        ) -> Result<SearchPage, FetchError> {
            if let Some(e) = self.failures.lock().unwrap().pop() {
                return Err(e);
            }
            self.offsets.lock().unwrap().push(offset);
            let end = (offset + limit).min(self.total);
            let stubs = (offset..end)
                .map(|i| ParcelStub::new(format!("P{i}"), StubLocation::Unknown))
                .collect();
            Ok(SearchPage {
                stubs,
                has_more: self.has_more_flag.then_some(end < self.total),
            })
        }

        async fn fetch_detail(&self, id: &str) -> Result<ParcelRecord, FetchError> {
            Err(FetchError::NotFound(id.to_string()))
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox::new(11.0, 45.0, 11.005, 45.005, 4326)
    }

    async fn collect(
        client: &PagedSearchClient<'_, PagedApi>,
    ) -> Result<Vec<PageOutcome>, FetchError> {
        client
            .pages(bbox(), CancellationToken::new())
            .try_collect()
            .await
    }

    #[tokio::test]
    async fn test_pages_until_short_page() {
        let api = PagedApi::new(25);
        let client = PagedSearchClient::new(&api, BackoffPolicy::none(), 10);

        let pages = collect(&client).await.unwrap();
        let sizes: Vec<usize> = pages.iter().map(|p| p.stubs.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(*api.offsets.lock().unwrap(), vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_exact_multiple_ends_on_empty_page() {
        let api = PagedApi::new(20);
        let client = PagedSearchClient::new(&api, BackoffPolicy::none(), 10);

        let pages = collect(&client).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(api.offsets.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_has_more_false_stops() {
        let mut api = PagedApi::new(20);
        api.has_more_flag = true;
        let client = PagedSearchClient::new(&api, BackoffPolicy::none(), 10);

        let pages = collect(&client).await.unwrap();
        assert_eq!(pages.len(), 2);
        // Pas de requête supplémentaire après hasMore=false
        assert_eq!(api.offsets.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_result() {
        let api = PagedApi::new(0);
        let client = PagedSearchClient::new(&api, BackoffPolicy::none(), 10);
        assert!(collect(&client).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auth_error_is_not_wrapped() {
        let api = PagedApi::new(5);
        api.failures
            .lock()
            .unwrap()
            .push(FetchError::from_status(401, "", None));
        let client = PagedSearchClient::new(&api, BackoffPolicy::default(), 10);

        let err = collect(&client).await.unwrap_err();
        assert!(matches!(err, FetchError::Auth { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_transient_exhaustion_is_fatal() {
        let api = PagedApi::new(5);
        api.failures
            .lock()
            .unwrap()
            .push(FetchError::transient("HTTP 502"));
        let client = PagedSearchClient::new(&api, BackoffPolicy::none(), 10);

        let err = collect(&client).await.unwrap_err();
        assert!(matches!(err, FetchError::FatalSearch(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retried() {
        let api = PagedApi::new(5);
        api.failures
            .lock()
            .unwrap()
            .push(FetchError::RateLimited { retry_after: None });
        let client = PagedSearchClient::new(&api, BackoffPolicy::default(), 10);

        let pages = collect(&client).await.unwrap();
        assert_eq!(pages[0].stubs.len(), 5);
        assert_eq!(pages[0].rate_limited, 1);
        assert_eq!(pages[0].retries, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let api = PagedApi::new(5);
        let client = PagedSearchClient::new(&api, BackoffPolicy::none(), 10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<Vec<_>, _> = client.pages(bbox(), cancel).try_collect().await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(api.offsets.lock().unwrap().is_empty());
    }
}
