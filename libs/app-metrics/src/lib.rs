use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use utoipa::ToSchema;

pub mod logging;

pub use logging::init_tracing;

/// Operational counters shared by every component of a process.
///
/// One instance is built at startup and handed to each component through an
/// `Arc`, so tests can construct their own and assert on it in isolation.
#[derive(Debug, Default)]
pub struct ServiceCounters {
    pub errors: AtomicU64,
    pub requests_in: AtomicU64,
    pub requests_out: AtomicU64,
    pub success: AtomicU64,
    pub failed: AtomicU64,
    pub cache_hit: AtomicU64,
    pub cache_miss: AtomicU64,
    pub relay_forwarded: AtomicU64,
    pub relay_executed: AtomicU64,
    pub relay_unmatched: AtomicU64,
}

impl ServiceCounters {
    pub fn new() -> Self { Self::default() }

    pub fn incr(counter: &AtomicU64) { counter.fetch_add(1, Ordering::Relaxed); }

    /// Records the outcome of a finished request.
    pub fn record<T, E>(&self, result: &Result<T, E>) {
        match result {
            Ok(_) => Self::incr(&self.success),
            Err(_) => {
                Self::incr(&self.failed);
                Self::incr(&self.errors);
            }
        }
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            errors: self.errors.load(Ordering::Relaxed),
            requests_in: self.requests_in.load(Ordering::Relaxed),
            requests_out: self.requests_out.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cache_hit: self.cache_hit.load(Ordering::Relaxed),
            cache_miss: self.cache_miss.load(Ordering::Relaxed),
            relay_forwarded: self.relay_forwarded.load(Ordering::Relaxed),
            relay_executed: self.relay_executed.load(Ordering::Relaxed),
            relay_unmatched: self.relay_unmatched.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ServiceCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CountersSnapshot {
    pub errors: u64,
    pub requests_in: u64,
    pub requests_out: u64,
    pub success: u64,
    pub failed: u64,
    pub cache_hit: u64,
    pub cache_miss: u64,
    pub relay_forwarded: u64,
    pub relay_executed: u64,
    pub relay_unmatched: u64,
}
