//! Splitting long updates into chunks of roughly constant duration.

use std::time::Duration;

/// Iterator-like planner that sizes each chunk of an update so that it takes
/// about `period`, judging by the throughput of the chunks already run.
///
/// The first chunk is a single iteration. While no time has been measured
/// the chunk size doubles. Every chunk is clamped to `[1, remaining]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstTimePartition {
    total: u64,
    done: u64,
    period: Duration,
    next: u64,
}

impl ConstTimePartition {
    /// Plans `total` iterations in chunks of about `period`.
    pub fn new(total: u64, period: Duration) -> Self {
        Self {
            total,
            done: 0,
            period,
            next: 1,
        }
    }

    /// Iterations run so far.
    pub fn done(&self) -> u64 {
        self.done
    }

    /// Iterations still to run.
    pub fn remaining(&self) -> u64 {
        self.total - self.done
    }

    /// Size of the next chunk, or `None` once everything has run. `elapsed`
    /// is the time spent on all previous chunks together.
    pub fn next_chunk(&mut self, elapsed: Duration) -> Option<u64> {
        let remaining = self.remaining();
        if remaining == 0 {
            return None;
        }
        let wanted = if self.done == 0 {
            self.next
        } else if elapsed.is_zero() {
            self.next.saturating_mul(2)
        } else {
            let rate = self.done as f64 / elapsed.as_secs_f64();
            (rate * self.period.as_secs_f64()).round() as u64
        };
        let chunk = wanted.clamp(1, remaining);
        self.next = chunk;
        self.done += chunk;
        Some(chunk)
    }
}
