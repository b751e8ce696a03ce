//! At-most-one in-flight execution of an async operation.
//!
//! The first caller spawns the work onto the runtime and every caller that
//! arrives before it settles awaits the same shared result. The work is
//! detached from its callers: dropping every waiter does not cancel it, so a
//! renewal that nobody is listening to anymore still lands in the session.
//!
//! Two retention policies exist:
//!
//! - [`SingleFlight::memoized`] keeps the settled result, and later callers get
//!   it without re-running the work until [`SingleFlight::reset`] is called.
//! - [`SingleFlight::cleared_on_settle`] forgets the flight once the work
//!   completes, and the next caller starts a fresh one.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;
use tracing::{debug, error};

/// The spawned work panicked or was cancelled by runtime shutdown.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("in-flight task did not complete: {0}")]
pub struct FlightAborted(pub String);

type Flight<T> = Shared<BoxFuture<'static, Result<T, FlightAborted>>>;

struct Slot<T> {
    next_id: u64,
    current: Option<(u64, Flight<T>)>,
}

/// Drops the flight from its slot when the spawned work ends, including by panic.
struct ClearOnSettle<T> {
    id: u64,
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Drop for ClearOnSettle<T> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot
            .current
            .as_ref()
            .is_some_and(|(current, _)| *current == self.id)
        {
            slot.current = None;
        }
    }
}

pub struct SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    name: &'static str,
    memoize: bool,
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> std::fmt::Debug for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("name", &self.name)
            .field("memoize", &self.memoize)
            .field("in_flight", &self.is_pending())
            .finish()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn with_policy(name: &'static str, memoize: bool) -> Self {
        Self {
            name,
            memoize,
            slot: Arc::new(Mutex::new(Slot {
                next_id: 0,
                current: None,
            })),
        }
    }

    #[must_use]
    pub fn memoized(name: &'static str) -> Self {
        Self::with_policy(name, true)
    }

    #[must_use]
    pub fn cleared_on_settle(name: &'static str) -> Self {
        Self::with_policy(name, false)
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Joins the current flight, or starts one running `work`.
    ///
    /// `work` is only invoked when no flight is held. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    /// Returns [`FlightAborted`] if the spawned work panicked.
    pub async fn run<F, Fut>(&self, work: F) -> Result<T, FlightAborted>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut slot = self.lock();
            if let Some((_, flight)) = &slot.current {
                debug!(flight = self.name, "joining in-flight operation");
                flight.clone()
            } else {
                let id = slot.next_id;
                slot.next_id = slot.next_id.wrapping_add(1);

                let flight = self.spawn(id, work());
                slot.current = Some((id, flight.clone()));
                flight
            }
        };

        flight.await
    }

    fn spawn<Fut>(&self, id: u64, work: Fut) -> Flight<T>
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let name = self.name;
        let memoize = self.memoize;
        let slot = Arc::clone(&self.slot);

        // The slot mutex is held by `run` while this is spawned, so the task
        // cannot clear the slot before the flight is stored.
        let handle = tokio::spawn(async move {
            let _settle = (!memoize).then(|| ClearOnSettle { id, slot });
            work.await
        });

        async move {
            handle.await.map_err(|err| {
                error!(flight = name, "in-flight task failed: {err}");
                FlightAborted(err.to_string())
            })
        }
        .boxed()
        .shared()
    }

    /// Forgets the held flight. Waiters already joined still receive its
    /// result; the next [`run`](Self::run) starts new work.
    pub fn reset(&self) {
        if self.lock().current.take().is_some() {
            debug!(flight = self.name, "single-flight reset");
        }
    }

    /// True while a flight is held (running, or settled and memoized).
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.lock().current.is_some()
    }
}
