//! The concurrent query runner.
//!
//! [`ConcurrentQueries::run`] opens a structured-concurrency scope: entering is cheap, and leaving
//! blocks until every statement scheduled inside it -- including ones scheduled by callbacks of
//! statements scheduled inside it -- has completed, re-raising the first error encountered. It is a
//! minimal wait-group (`AtomicUsize` outstanding-count + `tokio::sync::Notify`) rather than a
//! `JoinSet`, because a `JoinSet` shared across recursively-spawned callbacks would need its
//! `Mutex` guard held across `join_next().await`, which a wait-group sidesteps entirely.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, Semaphore};
use tracing::{debug, warn};

use crate::backend::{Consistency, GraphBackend, QueryParams, Row, Statement};
use crate::error::StoreError;

/// A statement's completion callback. Boxed because callbacks close over per-invocation state
/// (`visited_ids`, MMR helpers, ...) of varying concrete closure type.
pub type RowCallback =
    Box<dyn FnOnce(Vec<Row>) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>> + Send>;

/// Default in-flight ceiling: a small integer matching the backend session's recommended
/// concurrent-request limit.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 20;

struct Inner {
    backend: Arc<dyn GraphBackend>,
    semaphore: Arc<Semaphore>,
    outstanding: AtomicUsize,
    notify: Notify,
    poisoned: AtomicBool,
    error: Mutex<Option<StoreError>>,
}

impl Inner {
    fn poison(&self, err: StoreError) {
        let mut guard = self.error.lock().expect("concurrency error mutex poisoned");
        if guard.is_none() {
            *guard = Some(err);
        } else {
            warn!(
                additional_error = %err,
                "concurrent query scope already poisoned; dropping additional error"
            );
        }
        self.poisoned.store(true, Ordering::SeqCst);
    }

    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}

/// A handle into one concurrent-query scope. Cheaply `Clone`; every clone shares the same
/// in-flight semaphore, outstanding count, and poison state.
#[derive(Clone)]
pub struct ConcurrentQueries {
    inner: Arc<Inner>,
}

impl ConcurrentQueries {
    fn new(backend: Arc<dyn GraphBackend>, max_in_flight: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
                outstanding: AtomicUsize::new(0),
                notify: Notify::new(),
                poisoned: AtomicBool::new(false),
                error: Mutex::new(None),
            }),
        }
    }

    /// Schedule one backend call. If the scope is already poisoned this is a no-op: subsequent
    /// calls after poisoning must not deadlock, so they fast-fail instead.
    ///
    /// The `.await` here is the suspension point for backpressure: it resolves once a semaphore
    /// permit is available, not once the backend call itself completes. The backend call and its
    /// callback run as a background task.
    pub async fn execute(
        &self,
        statement: Statement,
        params: QueryParams,
        consistency: Consistency,
        callback: Option<RowCallback>,
    ) {
        if self.inner.poisoned.load(Ordering::SeqCst) {
            return;
        }

        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);

        let permit = match self.inner.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.inner.finish_one();
                return;
            }
        };

        let inner = self.inner.clone();
        tokio::spawn(async move {
            if inner.poisoned.load(Ordering::SeqCst) {
                drop(permit);
                inner.finish_one();
                return;
            }

            let result = inner.backend.execute(statement, params, consistency).await;
            drop(permit);

            match result {
                Ok(rows) => {
                    if inner.poisoned.load(Ordering::SeqCst) {
                        debug!("scope already poisoned; skipping callback");
                    } else if let Some(cb) = callback {
                        if let Err(e) = cb(rows).await {
                            inner.poison(e);
                        }
                    }
                }
                Err(e) => inner.poison(e),
            }

            inner.finish_one();
        });
    }

    async fn wait_until_quiescent(&self) {
        loop {
            // Register interest *before* checking the count, so a completion that races with the
            // check can't be missed between the check and the subscription.
            let notified = self.inner.notify.notified();
            if self.inner.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Run `body` inside a fresh concurrent-query scope bound to `backend`, with `max_in_flight`
    /// backend calls allowed at once. Awaits until every statement scheduled -- including ones
    /// scheduled transitively by callbacks -- has completed, then returns `body`'s result, unless
    /// a backend call or callback poisoned the scope, in which case the first such error is
    /// returned instead (even if `body` itself returned `Ok`).
    pub async fn run<F, Fut, T>(
        backend: Arc<dyn GraphBackend>,
        max_in_flight: usize,
        body: F,
    ) -> Result<T, StoreError>
    where
        F: FnOnce(ConcurrentQueries) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let cq = ConcurrentQueries::new(backend, max_in_flight);
        let result = body(cq.clone()).await;
        cq.wait_until_quiescent().await;

        let poisoning_error = cq
            .inner
            .error
            .lock()
            .expect("concurrency error mutex poisoned")
            .take();

        match (result, poisoning_error) {
            (Err(e), _) => Err(e),
            (Ok(_), Some(e)) => Err(e),
            (Ok(value), None) => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    struct CountingBackend {
        calls: StdAtomicUsize,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl GraphBackend for CountingBackend {
        async fn apply_schema(&self, _schema: &crate::backend::SchemaSpec) -> Result<(), StoreError> {
            Ok(())
        }

        async fn execute(
            &self,
            _statement: Statement,
            _params: QueryParams,
            _consistency: Consistency,
        ) -> Result<Vec<Row>, StoreError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(n) {
                return Err(StoreError::Backend("boom".to_string()));
            }
            Ok(vec![Row::default()])
        }
    }

    #[tokio::test]
    async fn waits_for_transitively_scheduled_callbacks() {
        let backend = Arc::new(CountingBackend {
            calls: StdAtomicUsize::new(0),
            fail_on: None,
        });
        let seen = Arc::new(std::sync::Mutex::new(0usize));

        let seen_clone = seen.clone();
        let result: Result<(), StoreError> = ConcurrentQueries::run(backend, 4, move |cq| async move {
            let seen_inner = seen_clone.clone();
            let cq_for_cb = cq.clone();
            cq.execute(
                Statement::QueryById,
                QueryParams::by_id("a"),
                Consistency::Quorum,
                Some(Box::new(move |_rows| {
                    let seen_inner = seen_inner.clone();
                    let cq_for_cb = cq_for_cb.clone();
                    Box::pin(async move {
                        *seen_inner.lock().unwrap() += 1;
                        // Schedule a second, nested statement from within the first's callback.
                        cq_for_cb
                            .execute(
                                Statement::QueryById,
                                QueryParams::by_id("b"),
                                Consistency::Quorum,
                                Some(Box::new(move |_rows| {
                                    let seen_inner = seen_inner.clone();
                                    Box::pin(async move {
                                        *seen_inner.lock().unwrap() += 1;
                                        Ok(())
                                    })
                                })),
                            )
                            .await;
                        Ok(())
                    })
                })),
            )
            .await;
            Ok(())
        })
        .await;

        result.unwrap();
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn first_error_is_surfaced_on_scope_exit() {
        let backend = Arc::new(CountingBackend {
            calls: StdAtomicUsize::new(0),
            fail_on: Some(0),
        });

        let result: Result<(), StoreError> = ConcurrentQueries::run(backend, 4, |cq| async move {
            cq.execute(
                Statement::QueryById,
                QueryParams::by_id("a"),
                Consistency::Quorum,
                None,
            )
            .await;
            Ok(())
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn execute_after_poisoning_is_a_fast_noop() {
        let backend = Arc::new(CountingBackend {
            calls: StdAtomicUsize::new(0),
            fail_on: Some(0),
        });

        let result: Result<(), StoreError> = ConcurrentQueries::run(backend, 1, |cq| async move {
            cq.execute(
                Statement::QueryById,
                QueryParams::by_id("a"),
                Consistency::Quorum,
                None,
            )
            .await;
            // Give the spawned task a chance to poison the scope.
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cq.execute(
                Statement::QueryById,
                QueryParams::by_id("b"),
                Consistency::Quorum,
                None,
            )
            .await;
            Ok(())
        })
        .await;

        assert!(result.is_err());
    }
}
