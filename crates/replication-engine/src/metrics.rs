//! # Engine Metrics
//!
//! Lock-free counters updated by the control loop and readable from any
//! `EngineHandle`.
//!
//! - `txs_forwarded` - transactions accepted by the consensus proxy
//! - `submit_failures` - transactions dropped after a failed submission
//! - `commits_applied` - commits acknowledged with a digest
//! - `execution_failures` - commits acknowledged with an error
//! - `last_applied_index` - index of the most recent successfully applied block

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineMetrics {
    txs_forwarded: AtomicU64,
    submit_failures: AtomicU64,
    commits_applied: AtomicU64,
    execution_failures: AtomicU64,
    last_applied_index: AtomicU64,
    has_applied: AtomicBool,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub txs_forwarded: u64,
    pub submit_failures: u64,
    pub commits_applied: u64,
    pub execution_failures: u64,
    pub last_applied_index: Option<u64>,
}

impl MetricsSnapshot {
    /// Commits acknowledged either way.
    pub fn commits_acknowledged(&self) -> u64 {
        self.commits_applied + self.execution_failures
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_forwarded(&self) {
        self.txs_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_submit_failure(&self) {
        self.submit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_applied(&self, index: u64) {
        self.last_applied_index.store(index, Ordering::Relaxed);
        self.has_applied.store(true, Ordering::Release);
        self.commits_applied.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_execution_failure(&self) {
        self.execution_failures.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_applied_index = if self.has_applied.load(Ordering::Acquire) {
            Some(self.last_applied_index.load(Ordering::Relaxed))
        } else {
            None
        };
        MetricsSnapshot {
            txs_forwarded: self.txs_forwarded.load(Ordering::Relaxed),
            submit_failures: self.submit_failures.load(Ordering::Relaxed),
            commits_applied: self.commits_applied.load(Ordering::Acquire),
            execution_failures: self.execution_failures.load(Ordering::Acquire),
            last_applied_index,
        }
    }
}
