//! Bounded admission gate
//!
//! Caps how many requests are processed at the same time across every
//! client. This is independent of the per-client rate limiter: a client can
//! be within budget and still wait here when the server is busy.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

use crate::errors::{AppError, AppResult};

/// Counting semaphore over in-flight requests
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Slot held by one admitted request.
///
/// The slot returns to the gate when this value is dropped, which covers
/// success, error, panic unwinding and a cancelled request future alike.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    /// # Panics
    ///
    /// Panics if `capacity` is 0. Configuration validation rejects that value
    /// before the gate is built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "admission gate capacity must be > 0");
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot. Waiters are served in FIFO order.
    pub async fn acquire(&self) -> AppResult<AdmissionPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::internal("admission gate closed"))?;
        self.record_admission();
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                self.record_admission();
                Some(AdmissionPermit { _permit: permit })
            }
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => None,
        }
    }

    /// Return a slot explicitly. Equivalent to dropping the permit.
    pub fn release(&self, permit: AdmissionPermit) {
        drop(permit);
        debug!(available = self.available(), "Admission slot released");
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }

    /// Highest number of simultaneously admitted requests observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    fn record_admission(&self) {
        self.peak_in_flight
            .fetch_max(self.in_flight(), Ordering::Relaxed);
    }
}
