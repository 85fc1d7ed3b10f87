//! Connection admission
//!
//! A fixed pool of tokens bounds how many subscribers are admitted at once.
//! Admission never waits: when the pool is empty the connection is refused.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Which transports draw from the admission pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Only stream (TCP) subscribers are counted; WebSocket is unlimited
    #[default]
    StreamOnly,
    /// Stream and WebSocket subscribers share one pool
    Shared,
}

impl AdmissionPolicy {
    /// Whether message (WebSocket) subscribers need a token
    pub fn limits_messages(self) -> bool {
        matches!(self, AdmissionPolicy::Shared)
    }
}

/// Fixed-capacity token pool
#[derive(Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Proof of admission, held for a subscriber's whole lifetime
///
/// Dropping the token returns it to the pool.
pub struct AdmissionToken {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    /// Create a pool with `capacity` tokens
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take a token if one is free
    pub fn try_admit(&self) -> Option<AdmissionToken> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionToken { _permit: permit })
    }

    /// Total number of tokens
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Tokens currently held
    pub fn outstanding(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionController")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}

impl AdmissionToken {
    /// Return the token to the pool
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for AdmissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdmissionToken")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admit_until_exhausted() {
        let admission = AdmissionController::new(2);

        let a = admission.try_admit();
        let b = admission.try_admit();
        let c = admission.try_admit();

        assert!(a.is_some());
        assert!(b.is_some());
        assert!(c.is_none());
        assert_eq!(admission.available(), 0);
        assert_eq!(admission.outstanding(), 2);
    }

    #[test]
    fn test_release_returns_token() {
        let admission = AdmissionController::new(1);

        let token = admission.try_admit().unwrap();
        assert!(admission.try_admit().is_none());

        token.release();
        assert_eq!(admission.available(), 1);
        assert!(admission.try_admit().is_some());
    }

    #[test]
    fn test_drop_returns_token() {
        let admission = AdmissionController::new(1);
        {
            let _token = admission.try_admit().unwrap();
            assert_eq!(admission.outstanding(), 1);
        }
        assert_eq!(admission.outstanding(), 0);
    }

    #[test]
    fn test_clones_share_pool() {
        let admission = AdmissionController::new(1);
        let other = admission.clone();

        let _token = admission.try_admit().unwrap();
        assert!(other.try_admit().is_none());
        assert_eq!(other.capacity(), 1);
    }

    #[test]
    fn test_outstanding_never_exceeds_capacity() {
        let admission = AdmissionController::new(3);
        let tokens: Vec<_> = (0..10).filter_map(|_| admission.try_admit()).collect();

        assert_eq!(tokens.len(), 3);
        assert!(admission.outstanding() <= admission.capacity());
    }

    #[test]
    fn test_policy_default() {
        assert_eq!(AdmissionPolicy::default(), AdmissionPolicy::StreamOnly);
        assert!(!AdmissionPolicy::StreamOnly.limits_messages());
        assert!(AdmissionPolicy::Shared.limits_messages());
    }
}
