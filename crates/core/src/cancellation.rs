//! Request cancellation registry
//!
//! Central mapping from request id to cancellation state. Backend handlers
//! register abort callbacks here so that a cancellation arriving on another
//! task can close their in-flight HTTP response immediately.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;

type AbortCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct RegistryInner {
    cancelled: HashSet<String>,
    abort_callbacks: HashMap<String, Vec<AbortCallback>>,
}

/// Thread-safe cancellation registry, shared across all in-flight requests.
///
/// All state mutations happen under a single lock; callbacks are always
/// invoked outside the lock so a callback may itself touch the registry
/// without deadlocking. Every method is total.
#[derive(Default)]
pub struct CancellationRegistry {
    inner: Mutex<RegistryInner>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a request cancelled and fire its registered abort callbacks.
    ///
    /// The first call for an id fires every callback registered under it;
    /// subsequent calls are no-ops. Empty ids are ignored.
    pub fn request_cancellation(&self, request_id: &str) {
        if request_id.is_empty() {
            tracing::warn!("Attempted to cancel a request with empty request_id");
            return;
        }

        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.cancelled.contains(request_id) {
                tracing::debug!(request_id, "Request already marked for cancellation");
                return;
            }
            inner.cancelled.insert(request_id.to_string());
            tracing::info!(request_id, "Cancellation registered");
            inner
                .abort_callbacks
                .remove(request_id)
                .unwrap_or_default()
        };

        for callback in callbacks {
            Self::invoke(request_id, callback);
        }
    }

    /// Check whether a request has been marked for cancellation.
    pub fn is_cancelled(&self, request_id: &str) -> bool {
        if request_id.is_empty() {
            return false;
        }
        self.inner.lock().cancelled.contains(request_id)
    }

    /// Remove a request from the cancelled set and drop its callbacks.
    ///
    /// Called when the owning generator has observed the cancellation and
    /// finished cleaning up. Safe if the id was never cancelled.
    pub fn acknowledge_cancellation(&self, request_id: &str) {
        if request_id.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.cancelled.remove(request_id) {
            tracing::info!(request_id, "Cancellation acknowledged and cleared");
        }
        inner.abort_callbacks.remove(request_id);
    }

    /// Register a callback to run when the request is cancelled.
    ///
    /// If the request is already cancelled the callback runs immediately,
    /// before this method returns (and outside the registry lock).
    pub fn register_abort_callback(
        &self,
        request_id: &str,
        callback: impl FnOnce() + Send + 'static,
    ) {
        if request_id.is_empty() {
            tracing::warn!("Attempted to register abort callback with empty request_id");
            return;
        }

        let immediate = {
            let mut inner = self.inner.lock();
            if inner.cancelled.contains(request_id) {
                true
            } else {
                inner
                    .abort_callbacks
                    .entry(request_id.to_string())
                    .or_default()
                    .push(Box::new(callback));
                tracing::debug!(request_id, "Registered abort callback");
                return;
            }
        };

        if immediate {
            tracing::warn!(
                request_id,
                "Registering abort callback for already cancelled request, invoking immediately"
            );
            Self::invoke(request_id, Box::new(callback));
        }
    }

    /// Drop all abort callbacks for a request without touching its
    /// cancellation state. Called on normal completion so a stale callback
    /// can never fire against a finished operation.
    pub fn unregister_abort_callbacks(&self, request_id: &str) {
        if request_id.is_empty() {
            return;
        }
        if self.inner.lock().abort_callbacks.remove(request_id).is_some() {
            tracing::debug!(request_id, "Unregistered abort callbacks");
        }
    }

    fn invoke(request_id: &str, callback: AbortCallback) {
        // A misbehaving callback must not take the registry down with it.
        if catch_unwind(AssertUnwindSafe(callback)).is_err() {
            tracing::error!(request_id, "Abort callback panicked");
        }
    }
}
