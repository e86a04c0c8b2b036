//! Request collapsing for concurrent loads of the same key.
//!
//! The first caller for a key registers a shared call and every caller that
//! arrives while it is running awaits that same call. The record removes
//! itself from the registry the moment the call completes, so results are
//! never reused by later sequential callers and failures are never cached.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Handle to one in-flight execution. Every clone resolves to the same output.
pub type SharedCall<T> = Shared<BoxFuture<'static, T>>;

/// Deduplicates concurrent work per key.
///
/// At most one execution per key is in progress at any instant, and every
/// caller collapsed onto an execution receives a clone of its output.
/// Cancelling callers never cancels the execution itself.
pub struct FlightGroup<T: Clone> {
    calls: Arc<Mutex<HashMap<String, SharedCall<T>>>>,
}

impl<T> FlightGroup<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run the future built by `f` for `key`, or join the one already running.
    pub async fn run<F, Fut>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.join(key, f).await
    }

    /// Get a handle to the execution for `key`, registering one built by `f`
    /// if none is running.
    ///
    /// `f` is invoked with the registry locked and must only build the
    /// future; the future itself runs unlocked. A new execution is driven by
    /// its own Tokio task, so it runs to completion and leaves the registry
    /// even if every handle is dropped. Must be called within a Tokio runtime.
    pub fn join<F, Fut>(&self, key: &str, f: F) -> SharedCall<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let call = {
            let mut calls = self.calls.lock();
            if let Some(call) = calls.get(key) {
                return call.clone();
            }

            let registry = Arc::clone(&self.calls);
            let owned_key = key.to_owned();
            let work = f();
            let call = async move {
                let output = work.await;
                registry.lock().remove(&owned_key);
                output
            }
            .boxed()
            .shared();
            calls.insert(key.to_owned(), call.clone());
            call
        };

        tokio::spawn(call.clone());
        call
    }

    /// Number of keys with an execution in progress.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

impl<T> Default for FlightGroup<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> fmt::Debug for FlightGroup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlightGroup")
            .field("in_flight", &self.calls.lock().len())
            .finish()
    }
}
