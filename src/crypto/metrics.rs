//! Counters for crypto operations, shared between a service and its callers.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CryptoMetrics {
    keys_generated: AtomicU64,
    signatures: AtomicU64,
    verifications: AtomicU64,
    rejected_signatures: AtomicU64,
    hashes: AtomicU64,
    failures: AtomicU64,
    offloaded_tasks: AtomicU64,
    inline_tasks: AtomicU64,
    fallbacks: AtomicU64,
    timeouts: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub keys_generated: u64,
    pub signatures: u64,
    pub verifications: u64,
    pub rejected_signatures: u64,
    pub hashes: u64,
    pub failures: u64,
    pub offloaded_tasks: u64,
    pub inline_tasks: u64,
    pub fallbacks: u64,
    pub timeouts: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl CryptoMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_key_generated(&self) {
        bump(&self.keys_generated);
    }

    pub fn record_signature(&self) {
        bump(&self.signatures);
    }

    pub fn record_verification(&self, valid: bool) {
        bump(&self.verifications);
        if !valid {
            bump(&self.rejected_signatures);
        }
    }

    pub fn record_hash(&self) {
        bump(&self.hashes);
    }

    pub fn record_failure(&self) {
        bump(&self.failures);
    }

    pub fn record_offloaded(&self) {
        bump(&self.offloaded_tasks);
    }

    pub fn record_inline(&self) {
        bump(&self.inline_tasks);
    }

    /// A task the executor refused and the caller ran itself.
    pub fn record_fallback(&self) {
        bump(&self.fallbacks);
        bump(&self.inline_tasks);
    }

    pub fn record_timeout(&self) {
        bump(&self.timeouts);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            keys_generated: self.keys_generated.load(Ordering::Relaxed),
            signatures: self.signatures.load(Ordering::Relaxed),
            verifications: self.verifications.load(Ordering::Relaxed),
            rejected_signatures: self.rejected_signatures.load(Ordering::Relaxed),
            hashes: self.hashes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            offloaded_tasks: self.offloaded_tasks.load(Ordering::Relaxed),
            inline_tasks: self.inline_tasks.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = CryptoMetrics::new();
        metrics.record_verification(true);
        metrics.record_verification(false);
        metrics.record_fallback();
        metrics.record_timeout();

        let snap = metrics.snapshot();
        assert_eq!(snap.verifications, 2);
        assert_eq!(snap.rejected_signatures, 1);
        assert_eq!(snap.fallbacks, 1);
        assert_eq!(snap.inline_tasks, 1);
        assert_eq!(snap.timeouts, 1);
        assert_eq!(snap.failures, 0);
    }
}
