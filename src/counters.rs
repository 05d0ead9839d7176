// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read-only, process-wide statistics: per-source missing-fragment counts
//! and global spurious/unrequested L1 fragment counts.
//!
//! All counters are relaxed atomics -- per `spec.md` §5, "never participate
//! in synchronization" -- sized once from [`crate::config::Config`] and
//! never resized afterwards.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-source-number missing/spurious fragment tallies.
#[derive(Debug)]
pub struct Counters {
    missing_l0_by_source_num: Vec<AtomicU64>,
    missing_l1_by_source_num: Vec<AtomicU64>,
    spurious_l1_frames: AtomicU64,
}

impl Counters {
    #[must_use]
    pub fn new(num_l0_sources: usize, num_l1_sources: usize) -> Self {
        Self {
            missing_l0_by_source_num: (0..num_l0_sources).map(|_| AtomicU64::new(0)).collect(),
            missing_l1_by_source_num: (0..num_l1_sources).map(|_| AtomicU64::new(0)).collect(),
            spurious_l1_frames: AtomicU64::new(0),
        }
    }

    pub fn record_missing_l0(&self, source_num: usize) {
        if let Some(counter) = self.missing_l0_by_source_num.get(source_num) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_missing_l1(&self, source_num: usize) {
        if let Some(counter) = self.missing_l1_by_source_num.get(source_num) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_spurious_l1(&self) {
        self.spurious_l1_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn missing_l0_for(&self, source_num: usize) -> u64 {
        self.missing_l0_by_source_num
            .get(source_num)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn missing_l1_for(&self, source_num: usize) -> u64 {
        self.missing_l1_by_source_num
            .get(source_num)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn spurious_l1_frames(&self) -> u64 {
        self.spurious_l1_frames.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_counters_start_at_zero() {
        let counters = Counters::new(2, 1);
        assert_eq!(counters.missing_l0_for(0), 0);
        assert_eq!(counters.missing_l1_for(0), 0);
    }

    #[test]
    fn record_and_read_missing_l0() {
        let counters = Counters::new(2, 1);
        counters.record_missing_l0(1);
        counters.record_missing_l0(1);
        assert_eq!(counters.missing_l0_for(1), 2);
        assert_eq!(counters.missing_l0_for(0), 0);
    }

    #[test]
    fn out_of_range_source_num_is_a_no_op() {
        let counters = Counters::new(1, 1);
        counters.record_missing_l0(50);
        assert_eq!(counters.missing_l0_for(50), 0);
    }

    #[test]
    fn spurious_l1_accumulates() {
        let counters = Counters::new(1, 1);
        counters.record_spurious_l1();
        counters.record_spurious_l1();
        assert_eq!(counters.spurious_l1_frames(), 2);
    }
}
