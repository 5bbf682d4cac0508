//! Time-to-live cached value with single-flight refresh.
//!
//! A [`TtlCache`] lazily produces a value through an async producer and
//! re-runs that producer once the value is older than its TTL. Concurrent
//! callers that find the cache cold or stale share one in-flight
//! production: the producer never runs twice at the same time.
//!
//! The production runs on its own task, so a caller whose future is dropped
//! only abandons its own wait. The refresh completes and its value becomes
//! visible to every other caller.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::CoreError;

/// What a `get` does when the cached value is older than the TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Wait for the refresh to complete, guaranteeing freshness at the cost
    /// of latency on the request that crosses the TTL boundary.
    Blocking,
    /// Return the previous value immediately and refresh in the background.
    StaleWhileRefresh,
}

type Producer<T, E> = Box<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type InFlight<T, E> = Shared<BoxFuture<'static, Result<Arc<T>, E>>>;

/// A lazily-initialised, periodically refreshed value.
///
/// Cloning a `TtlCache` yields another handle to the same cached state.
pub struct TtlCache<T, E> {
    inner: Arc<Inner<T, E>>,
}

struct Inner<T, E> {
    ttl: Duration,
    policy: RefreshPolicy,
    producer: Producer<T, E>,
    state: Mutex<State<T, E>>,
}

struct State<T, E> {
    value: Option<Arc<T>>,
    last_refresh: Option<Instant>,
    in_flight: Option<InFlight<T, E>>,
}

impl<T, E> Clone for TtlCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for TtlCache<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TtlCache")
            .field("ttl", &self.inner.ttl)
            .field("policy", &self.inner.policy)
            .field("loaded", &state.value.is_some())
            .field("refreshing", &state.in_flight.is_some())
            .finish()
    }
}

impl<T, E> TtlCache<T, E>
where
    T: Send + Sync + 'static,
    E: Clone + fmt::Display + From<CoreError> + Send + Sync + 'static,
{
    /// Create a cache around `producer`.
    ///
    /// A zero `ttl` caches the first value until [`TtlCache::force_refresh`]
    /// is called. Nothing is produced until the first `get`.
    pub fn new<F, Fut>(ttl: Duration, policy: RefreshPolicy, producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                ttl,
                policy,
                producer: Box::new(move || producer().boxed()),
                state: Mutex::new(State {
                    value: None,
                    last_refresh: None,
                    in_flight: None,
                }),
            }),
        }
    }

    /// Get the cached value, producing or refreshing it as needed.
    ///
    /// # Errors
    ///
    /// Returns the producer's error when no value has ever been produced.
    /// Once a value exists a failed refresh is logged and the previous value
    /// is returned instead.
    pub async fn get(&self) -> Result<Arc<T>, E> {
        let (previous, refresh) = {
            let mut state = self.inner.state.lock();
            match state.value.clone() {
                Some(value) if self.inner.is_fresh(state.last_refresh) => return Ok(value),
                Some(value) if self.inner.policy == RefreshPolicy::StaleWhileRefresh => {
                    if state.in_flight.is_none() {
                        state.in_flight = Some(Inner::spawn_production(&self.inner));
                    }
                    return Ok(value);
                }
                previous => (previous, Inner::start_refresh(&self.inner, &mut state)),
            }
        };

        match refresh.await {
            Ok(value) => Ok(value),
            Err(err) => match previous {
                Some(stale) => {
                    tracing::warn!(error = %err, "Cache refresh failed, serving previous value");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }

    /// Produce a new value now, even if the current one is fresh.
    ///
    /// Joins the in-flight production if one is already running.
    ///
    /// # Errors
    ///
    /// Returns the producer's error; the previously cached value is left in
    /// place.
    pub async fn force_refresh(&self) -> Result<Arc<T>, E> {
        let refresh = {
            let mut state = self.inner.state.lock();
            Inner::start_refresh(&self.inner, &mut state)
        };
        refresh.await
    }

    /// Refresh unless the last successful production finished less than
    /// `min_age` ago, in which case the current value is returned as is.
    ///
    /// The age check and the decision to refresh are made under one lock
    /// acquisition, and a running production is always joined, so a burst
    /// of callers causes at most one production.
    ///
    /// # Errors
    ///
    /// Returns the producer's error; the previously cached value is left in
    /// place.
    pub async fn refresh_if_older_than(&self, min_age: Duration) -> Result<Arc<T>, E> {
        let refresh = {
            let mut state = self.inner.state.lock();
            let recent = state
                .last_refresh
                .is_some_and(|at| at.elapsed() < min_age);
            match state.value.clone() {
                Some(value) if recent && state.in_flight.is_none() => return Ok(value),
                _ => Inner::start_refresh(&self.inner, &mut state),
            }
        };
        refresh.await
    }

    /// The current value without triggering any production.
    #[must_use]
    pub fn peek(&self) -> Option<Arc<T>> {
        self.inner.state.lock().value.clone()
    }

}

impl<T, E> Inner<T, E>
where
    T: Send + Sync + 'static,
    E: Clone + fmt::Display + From<CoreError> + Send + Sync + 'static,
{
    fn is_fresh(&self, last_refresh: Option<Instant>) -> bool {
        match last_refresh {
            None => false,
            Some(_) if self.ttl.is_zero() => true,
            Some(at) => at.elapsed() < self.ttl,
        }
    }

    /// Join the running production, or spawn one. Caller holds the lock.
    fn start_refresh(this: &Arc<Self>, state: &mut State<T, E>) -> InFlight<T, E> {
        state
            .in_flight
            .get_or_insert_with(|| Self::spawn_production(this))
            .clone()
    }

    fn spawn_production(this: &Arc<Self>) -> InFlight<T, E> {
        let task = tokio::spawn(Arc::clone(this).produce());
        async move {
            task.await
                .unwrap_or_else(|err| Err(E::from(CoreError::RefreshAborted(err.to_string()))))
        }
        .boxed()
        .shared()
    }

    async fn produce(self: Arc<Self>) -> Result<Arc<T>, E> {
        let mut guard = InFlightGuard {
            inner: self.as_ref(),
            armed: true,
        };
        let outcome = (self.producer)().await;

        let mut state = self.state.lock();
        state.in_flight = None;
        guard.armed = false;

        match outcome {
            Ok(value) => {
                let value = Arc::new(value);
                state.value = Some(Arc::clone(&value));
                state.last_refresh = Some(Instant::now());
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(error = %err, "Cache producer failed");
                Err(err)
            }
        }
    }
}

/// Clears the in-flight marker if the producer panics.
struct InFlightGuard<'a, T, E> {
    inner: &'a Inner<T, E>,
    armed: bool,
}

impl<T, E> Drop for InFlightGuard<'_, T, E> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.state.lock().in_flight = None;
        }
    }
}
