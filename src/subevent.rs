// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-(event, source) fragment accumulator.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::fragment::MepFragment;

/// Holds every fragment expected from one source for one event, slotted
/// directly by `sourceSubID`.
///
/// `received_fragments` is a separate atomic rather than `slots.len()` under
/// the lock so that `get_number_of_fragments()` stays lock-free; the slot
/// mutex's critical section is only ever the single slot check-and-set.
#[derive(Debug)]
pub struct Subevent {
    slots: Mutex<Vec<Option<MepFragment>>>,
    received_fragments: AtomicU32,
    expected_fragments: u8,
}

impl Subevent {
    #[must_use]
    pub fn new(expected_fragments: u8) -> Self {
        Self {
            slots: Mutex::new(vec![None; usize::from(expected_fragments)]),
            received_fragments: AtomicU32::new(0),
            expected_fragments,
        }
    }

    /// Place `fragment` in the slot indexed by its `sourceSubID`.
    ///
    /// Returns `false` without touching the counter if the slot is already
    /// filled (duplicate) or `sourceSubID` is out of range for this source's
    /// registered board count (an unknown board, counted by the caller the
    /// same way a duplicate is).
    pub fn add_fragment(&self, fragment: MepFragment) -> bool {
        let idx = usize::from(fragment.source_sub_id());
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| {
            log::debug!("[subevent] slot mutex poisoned, recovering");
            poisoned.into_inner()
        });
        match slots.get_mut(idx) {
            Some(slot @ None) => {
                *slot = Some(fragment);
                drop(slots);
                self.received_fragments.fetch_add(1, Ordering::Release);
                true
            }
            Some(Some(_)) | None => false,
        }
    }

    /// Drop every held fragment and reset the received count.
    pub fn destroy(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| {
            log::debug!("[subevent] slot mutex poisoned, recovering");
            poisoned.into_inner()
        });
        for slot in slots.iter_mut() {
            *slot = None;
        }
        drop(slots);
        self.received_fragments.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get_fragment(&self, i: usize) -> Option<MepFragment> {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| {
            log::debug!("[subevent] slot mutex poisoned, recovering");
            poisoned.into_inner()
        });
        slots.get(i).cloned().flatten()
    }

    /// Lock-free: number of fragments actually received so far.
    #[must_use]
    pub fn get_number_of_fragments(&self) -> u32 {
        self.received_fragments.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn get_number_of_expected_fragments(&self) -> u8 {
        self.expected_fragments
    }
}
