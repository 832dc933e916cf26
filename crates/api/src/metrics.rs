use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct Metrics {
    // Relay
    relay_succeeded: AtomicUsize,
    relay_failed: AtomicUsize,
    total_relay_time_us: AtomicU64,

    // Token exchange
    tokens_minted: AtomicUsize,
    mint_skipped: AtomicUsize,
    mint_failures: AtomicUsize,
    resolves_found: AtomicUsize,
    resolves_not_found: AtomicUsize,
    resolve_errors: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            relay_succeeded: AtomicUsize::new(0),
            relay_failed: AtomicUsize::new(0),
            total_relay_time_us: AtomicU64::new(0),
            tokens_minted: AtomicUsize::new(0),
            mint_skipped: AtomicUsize::new(0),
            mint_failures: AtomicUsize::new(0),
            resolves_found: AtomicUsize::new(0),
            resolves_not_found: AtomicUsize::new(0),
            resolve_errors: AtomicUsize::new(0),
        })
    }

    pub fn record_relay(&self, success: bool, duration: Duration) {
        if success {
            self.relay_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.relay_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_relay_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_mint(&self, outcome: MintOutcome) {
        let counter = match outcome {
            MintOutcome::Minted => &self.tokens_minted,
            MintOutcome::Skipped => &self.mint_skipped,
            MintOutcome::Failed => &self.mint_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolve(&self, outcome: ResolveOutcome) {
        let counter = match outcome {
            ResolveOutcome::Found => &self.resolves_found,
            ResolveOutcome::NotFound => &self.resolves_not_found,
            ResolveOutcome::Error => &self.resolve_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let succeeded = self.relay_succeeded.load(Ordering::Relaxed);
        let failed = self.relay_failed.load(Ordering::Relaxed);
        let total_us = self.total_relay_time_us.load(Ordering::Relaxed) as f64;
        let relays = (succeeded + failed) as f64;

        MetricsSnapshot {
            relay_succeeded: succeeded,
            relay_failed: failed,
            avg_relay_time_ms: if relays > 0.0 { total_us / relays / 1000.0 } else { 0.0 },
            tokens_minted: self.tokens_minted.load(Ordering::Relaxed),
            mint_skipped: self.mint_skipped.load(Ordering::Relaxed),
            mint_failures: self.mint_failures.load(Ordering::Relaxed),
            resolves_found: self.resolves_found.load(Ordering::Relaxed),
            resolves_not_found: self.resolves_not_found.load(Ordering::Relaxed),
            resolve_errors: self.resolve_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum MintOutcome {
    Minted,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub enum ResolveOutcome {
    Found,
    NotFound,
    Error,
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub relay_succeeded: usize,
    pub relay_failed: usize,
    pub avg_relay_time_ms: f64,
    pub tokens_minted: usize,
    pub mint_skipped: usize,
    pub mint_failures: usize,
    pub resolves_found: usize,
    pub resolves_not_found: usize,
    pub resolve_errors: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
