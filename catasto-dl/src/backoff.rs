//! Rate limiting et politique de retry
//!
//! - [`RateLimiter`] : délai minimal entre deux batches, appliqué même sans erreur
//! - [`BackoffPolicy`] : retry par requête, modélisé comme une machine à états
//!   `Attempting -> BackingOff -> ... -> Succeeded | Exhausted`
//!
//! Toutes les attentes sont interrompues dès que le run est annulé.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ErrorKind, FetchError};

/// Attend `delay`, ou moins si le token est annulé
///
/// Retourne `false` si l'attente a été interrompue par une annulation.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if delay.is_zero() {
        return true;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Paramètres de retry pour une catégorie d'erreur
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Nombre de retries après la première tentative
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Multiplicateur entre deux retries (1.0 = linéaire constant)
    pub factor: f64,
}

impl RetryPolicy {
    /// Délai avant le retry n° `retry` (1-indexé)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16) as i32;
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Politique sans retry ni attente (tests)
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
        }
    }
}

/// Politiques de retry par catégorie d'erreur
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// HTTP 429
    pub rate_limit: RetryPolicy,
    /// HTTP 5xx, timeouts, erreurs réseau
    pub transient: RetryPolicy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rate_limit: RetryPolicy {
                max_retries: 5,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                factor: 2.0,
            },
            transient: RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(8),
                factor: 2.0,
            },
        }
    }
}

/// État d'une requête soumise à la politique de retry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryState {
    Attempting {
        attempt: u32,
    },
    BackingOff {
        attempt: u32,
        delay: Duration,
        last: ErrorKind,
    },
    Exhausted {
        attempts: u32,
        last: ErrorKind,
    },
    Succeeded {
        attempts: u32,
    },
}

/// Résultat d'une requête après retries
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, FetchError>,
    /// Nombre de retries effectués (toutes catégories)
    pub retries: u32,
    /// Nombre de réponses 429 reçues
    pub rate_limited: u32,
    pub state: RetryState,
}

impl BackoffPolicy {
    /// Politique sans retry (tests)
    pub fn none() -> Self {
        Self {
            rate_limit: RetryPolicy::none(),
            transient: RetryPolicy::none(),
        }
    }

    /// Exécute `op` jusqu'à succès, erreur non retentable, épuisement ou annulation
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        label: &str,
        mut op: F,
    ) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut state = RetryState::Attempting { attempt: 1 };
        let mut rate_limit_retries = 0u32;
        let mut transient_retries = 0u32;
        let mut rate_limited = 0u32;
        let mut last_error: Option<FetchError> = None;

        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    if cancel.is_cancelled() {
                        return Attempted {
                            result: Err(FetchError::Cancelled),
                            retries: attempt - 1,
                            rate_limited,
                            state: RetryState::Exhausted {
                                attempts: attempt - 1,
                                last: ErrorKind::Cancelled,
                            },
                        };
                    }

                    match op().await {
                        Ok(value) => {
                            let state = RetryState::Succeeded { attempts: attempt };
                            return Attempted {
                                result: Ok(value),
                                retries: attempt - 1,
                                rate_limited,
                                state,
                            };
                        }
                        Err(e) => {
                            let kind = e.kind();
                            let next = match kind {
                                ErrorKind::RateLimit => {
                                    rate_limited += 1;
                                    if rate_limit_retries < self.rate_limit.max_retries {
                                        rate_limit_retries += 1;
                                        let computed = self.rate_limit.delay_for(rate_limit_retries);
                                        let delay = e
                                            .retry_after()
                                            .map(|d| d.min(self.rate_limit.max_delay))
                                            .unwrap_or(computed);
                                        Some(delay)
                                    } else {
                                        None
                                    }
                                }
                                ErrorKind::Transient => {
                                    if transient_retries < self.transient.max_retries {
                                        transient_retries += 1;
                                        Some(self.transient.delay_for(transient_retries))
                                    } else {
                                        None
                                    }
                                }
                                _ => None,
                            };

                            match next {
                                Some(delay) => {
                                    debug!(
                                        request = label,
                                        attempt,
                                        delay_ms = delay.as_millis() as u64,
                                        error = %e,
                                        "Retrying after backoff"
                                    );
                                    last_error = Some(e);
                                    RetryState::BackingOff {
                                        attempt,
                                        delay,
                                        last: kind,
                                    }
                                }
                                None => {
                                    last_error = Some(e);
                                    RetryState::Exhausted {
                                        attempts: attempt,
                                        last: kind,
                                    }
                                }
                            }
                        }
                    }
                }
                RetryState::BackingOff { attempt, delay, .. } => {
                    if !sleep_or_cancel(delay, cancel).await {
                        return Attempted {
                            result: Err(FetchError::Cancelled),
                            retries: attempt - 1,
                            rate_limited,
                            state: RetryState::Exhausted {
                                attempts: attempt,
                                last: ErrorKind::Cancelled,
                            },
                        };
                    }
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Exhausted { attempts, last } => {
                    let error = match (last, last_error.take()) {
                        (ErrorKind::RateLimit, _) => {
                            warn!(request = label, attempts, "Rate limit retries exhausted");
                            FetchError::RateLimitExceeded { attempts }
                        }
                        (ErrorKind::Transient, Some(e)) => {
                            warn!(request = label, attempts, error = %e, "Transient retries exhausted");
                            e
                        }
                        (_, Some(e)) => e,
                        (_, None) => FetchError::transient("retry loop ended without error"),
                    };
                    return Attempted {
                        result: Err(error),
                        retries: attempts - 1,
                        rate_limited,
                        state,
                    };
                }
                RetryState::Succeeded { .. } => unreachable!("success returns immediately"),
            };
        }
    }
}

/// Délai minimal entre deux batches, adaptatif
///
/// Le délai double après un batch ayant reçu des 429 (plafonné à `max_delay`)
/// et redescend de moitié après un batch propre, sans passer sous `min_delay`.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    max_delay: Duration,
    current: Duration,
    last_batch_end: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        let max_delay = max_delay.max(min_delay);
        Self {
            min_delay,
            max_delay,
            current: min_delay,
            last_batch_end: None,
        }
    }

    /// Délai courant entre deux batches
    pub fn current_delay(&self) -> Duration {
        self.current
    }

    /// Attend avant le batch suivant ; retourne `false` si annulé pendant l'attente
    pub async fn pace(&mut self, cancel: &CancellationToken) -> bool {
        let Some(last) = self.last_batch_end else {
            return !cancel.is_cancelled();
        };
        let remaining = self.current.saturating_sub(last.elapsed());
        sleep_or_cancel(remaining, cancel).await
    }

    /// Enregistre la fin d'un batch et adapte le délai
    pub fn record_batch(&mut self, rate_limited: u32) {
        self.last_batch_end = Some(Instant::now());

        let previous = self.current;
        self.current = if rate_limited > 0 {
            let doubled = if self.current.is_zero() {
                Duration::from_millis(250)
            } else {
                self.current * 2
            };
            doubled.min(self.max_delay)
        } else {
            (self.current / 2).max(self.min_delay)
        };

        if self.current != previous {
            debug!(
                previous_ms = previous.as_millis() as u64,
                delay_ms = self.current.as_millis() as u64,
                rate_limited,
                "Adjusted inter-batch delay"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> BackoffPolicy {
        let retry = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            factor: 2.0,
        };
        BackoffPolicy {
            rate_limit: retry,
            transient: RetryPolicy {
                max_retries: 2,
                ..retry
            },
        }
    }

    #[test]
    fn test_delay_for_is_exponential_and_capped() {
        let policy = BackoffPolicy::default().rate_limit;
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_success_after_transient_errors() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let outcome = fast_policy()
            .run(&cancel, "test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::transient("HTTP 502"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 7);
        assert_eq!(outcome.retries, 2);
        assert_eq!(outcome.state, RetryState::Succeeded { attempts: 3 });
    }

    #[tokio::test]
    async fn test_transient_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let outcome: Attempted<()> = fast_policy()
            .run(&cancel, "test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::transient("HTTP 503"))
            })
            .await;

        // 1 tentative + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(outcome.result, Err(FetchError::Transient(_))));
        assert!(matches!(
            outcome.state,
            RetryState::Exhausted {
                attempts: 3,
                last: ErrorKind::Transient
            }
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion() {
        let cancel = CancellationToken::new();

        let outcome: Attempted<()> = fast_policy()
            .run(&cancel, "test", || async {
                Err(FetchError::RateLimited { retry_after: None })
            })
            .await;

        assert!(matches!(
            outcome.result,
            Err(FetchError::RateLimitExceeded { attempts: 4 })
        ));
        assert_eq!(outcome.rate_limited, 4);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let outcome: Attempted<()> = fast_policy()
            .run(&cancel, "test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::from_status(401, "", None))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(outcome.result, Err(FetchError::Auth { .. })));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let policy = BackoffPolicy {
            rate_limit: RetryPolicy {
                max_retries: 5,
                base_delay: Duration::from_secs(3600),
                max_delay: Duration::from_secs(3600),
                factor: 1.0,
            },
            ..BackoffPolicy::default()
        };

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let outcome: Attempted<()> = policy
            .run(&cancel, "test", || async {
                Err(FetchError::RateLimited { retry_after: None })
            })
            .await;

        assert!(matches!(outcome.result, Err(FetchError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_no_attempt_when_already_cancelled() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = fast_policy()
            .run(&cancel, "test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(outcome.result, Err(FetchError::Cancelled)));
    }

    #[test]
    fn test_rate_limiter_adapts() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100), Duration::from_millis(700));
        assert_eq!(limiter.current_delay(), Duration::from_millis(100));

        limiter.record_batch(3);
        assert_eq!(limiter.current_delay(), Duration::from_millis(200));
        limiter.record_batch(1);
        limiter.record_batch(1);
        assert_eq!(limiter.current_delay(), Duration::from_millis(700));

        limiter.record_batch(0);
        assert_eq!(limiter.current_delay(), Duration::from_millis(350));
        limiter.record_batch(0);
        limiter.record_batch(0);
        assert_eq!(limiter.current_delay(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_pace_waits_between_batches() {
        let cancel = CancellationToken::new();
        let mut limiter = RateLimiter::new(Duration::from_millis(30), Duration::from_millis(30));

        // Premier batch : pas d'attente
        let started = Instant::now();
        assert!(limiter.pace(&cancel).await);
        assert!(started.elapsed() < Duration::from_millis(30));

        limiter.record_batch(0);
        let started = Instant::now();
        assert!(limiter.pace(&cancel).await);
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_pace_cancelled() {
        let cancel = CancellationToken::new();
        let mut limiter = RateLimiter::new(Duration::from_secs(3600), Duration::from_secs(3600));
        limiter.record_batch(0);
        cancel.cancel();
        assert!(!limiter.pace(&cancel).await);
    }
}
