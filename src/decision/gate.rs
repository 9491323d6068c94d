//! Admission gate for external decision calls
//!
//! Bounds the number of outstanding calls. Callers over the limit queue on a
//! fair semaphore (no busy-waiting) for at most their allowed wait. A `Permit`
//! releases its slot when dropped, so every acquired slot is returned exactly
//! once on every path, including errors and cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::TacticianError;

/// Reasons a permit could not be obtained
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("no permit within {}ms", .waited.as_millis())]
    Timeout { waited: Duration },

    #[error("all permits in use")]
    Saturated,

    #[error("gate closed")]
    Closed,
}

impl From<GateError> for TacticianError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Timeout { waited } => TacticianError::AdmissionTimeout {
                waited_ms: waited.as_millis() as u64,
            },
            GateError::Saturated => TacticianError::AdmissionTimeout { waited_ms: 0 },
            GateError::Closed => TacticianError::GateClosed,
        }
    }
}

/// One unit of external-call capacity; released on drop
#[derive(Debug)]
pub struct Permit {
    // Dropped after `Drop::drop` runs, so the counter falls before the slot frees.
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
    acquired_at: Instant,
}

impl Permit {
    /// How long this permit has been held
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded-concurrency throttle in front of the external decision service
#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    in_flight: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

impl AdmissionGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: AtomicUsize::new(0),
        }
    }

    /// Wait for a permit; `None` waits until one frees up or the gate closes
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<Permit, GateError> {
        let acquire = self.semaphore.clone().acquire_owned();
        let permit = match timeout {
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(GateError::Closed),
                Err(_) => {
                    debug!(waited_ms = limit.as_millis() as u64, "admission wait expired");
                    return Err(GateError::Timeout { waited: limit });
                }
            },
            None => acquire.await.map_err(|_| GateError::Closed)?,
        };
        Ok(self.admit(permit))
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(&self) -> Result<Permit, GateError> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(self.admit(permit)),
            Err(TryAcquireError::NoPermits) => Err(GateError::Saturated),
            Err(TryAcquireError::Closed) => Err(GateError::Closed),
        }
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> Permit {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Permit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
            acquired_at: Instant::now(),
        }
    }

    /// Return a permit. Equivalent to dropping it.
    pub fn release(&self, permit: Permit) {
        drop(permit);
    }

    /// Reject all waiting and future acquisitions
    pub fn close(&self) {
        if !self.semaphore.is_closed() {
            info!(in_flight = self.in_flight(), "admission gate closed");
            self.semaphore.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest in-flight count observed since construction
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release_track_in_flight() {
        let gate = AdmissionGate::new(2);
        let p1 = gate.acquire(None).await.unwrap();
        let p2 = gate.try_acquire().unwrap();
        assert_eq!(gate.in_flight(), 2);
        assert_eq!(gate.available(), 0);
        assert_eq!(gate.try_acquire().unwrap_err(), GateError::Saturated);

        gate.release(p1);
        assert_eq!(gate.in_flight(), 1);
        drop(p2);
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.available(), 2);
        assert_eq!(gate.peak_in_flight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out_when_saturated() {
        let gate = AdmissionGate::new(1);
        let _held = gate.acquire(None).await.unwrap();

        let err = gate
            .acquire(Some(Duration::from_millis(250)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GateError::Timeout {
                waited: Duration::from_millis(250)
            }
        );
        assert_eq!(gate.in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_proceeds_after_release() {
        let gate = Arc::new(AdmissionGate::new(1));
        let held = gate.acquire(None).await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire(Some(Duration::from_secs(5))).await.is_ok() })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(held);
        assert!(waiter.await.unwrap());
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_close_rejects_waiters_and_new_callers() {
        let gate = Arc::new(AdmissionGate::new(1));
        let _held = gate.acquire(None).await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire(None).await })
        };
        tokio::task::yield_now().await;

        gate.close();
        assert!(gate.is_closed());
        assert_eq!(waiter.await.unwrap().unwrap_err(), GateError::Closed);
        assert_eq!(gate.try_acquire().unwrap_err(), GateError::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_never_exceeds_max() {
        let gate = Arc::new(AdmissionGate::new(3));
        let violations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let gate = gate.clone();
            let violations = violations.clone();
            handles.push(tokio::spawn(async move {
                let permit = gate.acquire(None).await.unwrap();
                if gate.in_flight() > 3 {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                drop(permit);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(violations.load(Ordering::SeqCst), 0);
        assert!(gate.peak_in_flight() <= 3);
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.available(), 3);
    }

    #[test]
    fn test_gate_error_into_tactician_error() {
        let err: TacticianError = GateError::Timeout {
            waited: Duration::from_millis(40),
        }
        .into();
        assert!(matches!(err, TacticianError::AdmissionTimeout { waited_ms: 40 }));
        assert!(matches!(
            TacticianError::from(GateError::Closed),
            TacticianError::GateClosed
        ));
    }
}
