// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The per-event aggregation state machine.
//!
//! One `Event` occupies one [`crate::event_pool::EventPool`] slot for the
//! lifetime of one event number, is reset and handed to the next event
//! number on recycle, and is never reallocated.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;

use crate::config::Config;
use crate::counters::Counters;
use crate::fragment::MepFragment;
use crate::l0tp::L0TpHeader;
use crate::source_id::SourceIdManager;
use crate::subevent::Subevent;

/// Bound on stale-epoch recycle retries per `addL0Fragment` call.
///
/// The redesign in `spec.md` §9 ("Recursive retry on stale epoch") replaces
/// unbounded self-recursion with this explicit bounded loop.
const MAX_EPOCH_RETRIES: u32 = 8;

/// Fragments collected for the non-zero-suppressed readout path, keyed by
/// `sourceSubID` (the crate/cream identifier). Reused as the token guarding
/// both the non-ZS phase and stale-burst recycling -- see
/// [`Event::epoch_mutex`].
type NonZsMap = BTreeMap<u8, MepFragment>;

/// One event slot.
///
/// Every field besides the two mutexes and the subevent arrays is a plain
/// atomic: `Event` is only ever touched through a shared reference, by any
/// number of concurrent capture threads plus whichever single thread the
/// downstream trigger layer schedules its callbacks on.
#[derive(Debug)]
pub struct Event {
    event_number: AtomicU32,
    burst_id: AtomicU32,
    last_event_of_burst: AtomicBool,

    number_of_l0_fragments: AtomicU32,
    number_of_l1_fragments: AtomicU32,
    expected_l0_packets: u32,
    expected_l1_packets: u32,

    l0_subevents: Vec<Subevent>,
    l1_subevents: Vec<Subevent>,
    /// Wire-level `sourceID`s backing `l0_subevents`, in `sourceNum` order --
    /// only held to honor `print_completed_source_ids`.
    l0_source_ids: Vec<u8>,
    print_completed_source_ids: bool,

    trigger_type_word: AtomicU8,
    trigger_flags: AtomicU8,
    timestamp: AtomicU32,
    finetime: AtomicU16,
    processing_id: AtomicU32,
    sob_timestamp: AtomicU32,

    l1_processed: AtomicBool,
    l2_accepted: AtomicBool,
    unfinished: AtomicBool,

    non_zs_requested: AtomicU32,

    /// Guards burst-epoch transitions and slot freeing on stale-epoch
    /// detection, and serializes the entire non-ZS check-insert-size-check
    /// sequence -- resolving the Open Question in `spec.md` §9 in favor of
    /// "serialize the whole non-ZS phase behind `epochMutex`".
    epoch_mutex: Mutex<NonZsMap>,
    /// Guards explicit recycle via [`Event::destroy`].
    destroy_mutex: Mutex<()>,
}

impl Event {
    /// Build one fresh, empty slot sized from `source_ids`.
    #[must_use]
    pub fn new(source_ids: &SourceIdManager, config: &Config) -> Self {
        let l0_subevents = (0..source_ids.num_sources(crate::config::Level::L0))
            .map(|n| {
                Subevent::new(
                    source_ids
                        .expected_fragments_for(crate::config::Level::L0, n)
                        .unwrap_or(0),
                )
            })
            .collect();
        let l1_subevents = (0..source_ids.num_sources(crate::config::Level::L1))
            .map(|n| {
                Subevent::new(
                    source_ids
                        .expected_fragments_for(crate::config::Level::L1, n)
                        .unwrap_or(0),
                )
            })
            .collect();
        let l0_source_ids = (0..source_ids.num_sources(crate::config::Level::L0))
            .map(|n| source_ids.num_to_source_id(crate::config::Level::L0, n).unwrap_or(0))
            .collect();

        Self {
            event_number: AtomicU32::new(0),
            burst_id: AtomicU32::new(0),
            last_event_of_burst: AtomicBool::new(false),
            number_of_l0_fragments: AtomicU32::new(0),
            number_of_l1_fragments: AtomicU32::new(0),
            expected_l0_packets: config.expected_l0_packets_per_event,
            expected_l1_packets: config.expected_l1_packets_per_event,
            l0_subevents,
            l1_subevents,
            l0_source_ids,
            print_completed_source_ids: config.print_completed_source_ids,
            trigger_type_word: AtomicU8::new(0),
            trigger_flags: AtomicU8::new(0),
            timestamp: AtomicU32::new(0),
            finetime: AtomicU16::new(0),
            processing_id: AtomicU32::new(0),
            sob_timestamp: AtomicU32::new(0),
            l1_processed: AtomicBool::new(false),
            l2_accepted: AtomicBool::new(false),
            unfinished: AtomicBool::new(false),
            non_zs_requested: AtomicU32::new(0),
            epoch_mutex: Mutex::new(BTreeMap::new()),
            destroy_mutex: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn event_number(&self) -> u32 {
        self.event_number.load(Ordering::Relaxed)
    }

    /// Associates this slot with `event_number`. Called by
    /// [`crate::event_pool::EventPool::get_event`] on every lookup; writes
    /// of the same value from concurrent lookups for the same event are
    /// idempotent.
    pub(crate) fn set_event_number(&self, event_number: u32) {
        self.event_number.store(event_number, Ordering::Relaxed);
    }

    #[must_use]
    pub fn burst_id(&self) -> u32 {
        self.burst_id.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn last_event_of_burst(&self) -> bool {
        self.last_event_of_burst.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn number_of_l0_fragments(&self) -> u32 {
        self.number_of_l0_fragments.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn number_of_l1_fragments(&self) -> u32 {
        self.number_of_l1_fragments.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_unfinished(&self) -> bool {
        self.unfinished.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn l1_processed(&self) -> bool {
        self.l1_processed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn l2_accepted(&self) -> bool {
        self.l2_accepted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn l0_subevent(&self, source_num: usize) -> &Subevent {
        &self.l0_subevents[source_num]
    }

    #[must_use]
    pub fn l1_subevent(&self, source_num: usize) -> &Subevent {
        &self.l1_subevents[source_num]
    }

    /// Called by the downstream trigger layer once L0 is complete to open
    /// the L1 intake gate.
    pub fn set_l1_processed(&self) {
        self.l1_processed.store(true, Ordering::Release);
    }

    /// Called by the downstream trigger layer to switch this event onto the
    /// non-zero-suppressed path; `expected` is the number of distinct
    /// crate/cream boards expected to respond.
    pub fn request_non_zs_data(&self, expected: u32) {
        self.non_zs_requested.store(expected, Ordering::Relaxed);
    }

    pub fn set_l2_accepted(&self, accepted: bool) {
        self.l2_accepted.store(accepted, Ordering::Relaxed);
    }

    /// Route one L0 fragment into this event.
    ///
    /// Returns `true` exactly when this call's increment brought
    /// `numberOfL0Fragments` to the configured expected total -- the
    /// publication signal the caller forwards to the trigger layer.
    pub fn add_l0_fragment(&self, fragment: MepFragment, burst_id: u32) -> bool {
        for attempt in 0..MAX_EPOCH_RETRIES {
            self.unfinished.store(true, Ordering::Relaxed);

            if self.number_of_l0_fragments.load(Ordering::Acquire) == 0 {
                self.last_event_of_burst
                    .store(fragment.is_last_event_of_burst(), Ordering::Relaxed);
                self.burst_id.store(burst_id, Ordering::Relaxed);
            } else {
                if !self.last_event_of_burst.load(Ordering::Relaxed) && fragment.is_last_event_of_burst()
                {
                    // Work around transmitters that only flag the true last
                    // fragment of the burst on some sources, not all.
                    self.last_event_of_burst.store(true, Ordering::Relaxed);
                }

                let stored_burst_id = self.burst_id.load(Ordering::Relaxed);
                if burst_id > stored_burst_id {
                    debug_assert!(
                        attempt <= 1,
                        "stale-epoch recycle required more than one retry ({attempt})"
                    );
                    match self.epoch_mutex.try_lock() {
                        Ok(mut guard) => {
                            log::error!(
                                "[event] recycling non-cleared event {} left over from burst {}",
                                self.event_number(),
                                stored_burst_id
                            );
                            guard.clear();
                            drop(guard);
                            self.destroy();
                        }
                        Err(std::sync::TryLockError::WouldBlock) => {
                            // Another thread is already recycling; wait for it.
                            drop(self.epoch_mutex.lock().unwrap_or_else(|p| p.into_inner()));
                        }
                        Err(std::sync::TryLockError::Poisoned(p)) => {
                            drop(p.into_inner());
                        }
                    }
                    continue;
                } else if burst_id < stored_burst_id {
                    log::warn!(
                        "[event] dropping fragment from stale burst {} for event {} (current burst {})",
                        burst_id,
                        self.event_number(),
                        stored_burst_id
                    );
                    return false;
                }
            }

            let source_num = fragment.source_num();
            let subevent = &self.l0_subevents[source_num];
            if !subevent.add_fragment(fragment) {
                log::warn!(
                    "[event] duplicate L0 fragment from source_num {source_num} for event {}",
                    self.event_number()
                );
                return false;
            }

            let current = self.number_of_l0_fragments.fetch_add(1, Ordering::Release) + 1;
            if current > self.expected_l0_packets {
                log::error!(
                    "[event] too many L0 packets: {current}/{}",
                    self.expected_l0_packets
                );
            }
            let complete = current == self.expected_l0_packets;
            if complete && self.print_completed_source_ids {
                log::info!(
                    "[event] event {} complete at L0 from source IDs {:02x?}",
                    self.event_number(),
                    self.l0_source_ids
                );
            }
            return complete;
        }

        log::error!(
            "[event] gave up recycling event {} after {MAX_EPOCH_RETRIES} attempts",
            self.event_number()
        );
        false
    }

    /// Route one L1 fragment into this event.
    pub fn add_l1_fragment(&self, fragment: MepFragment, counters: &Counters) -> bool {
        if !self.l1_processed() {
            log::warn!(
                "[event] L1 data for event {} arrived before it was requested, dropping",
                fragment.event_number()
            );
            counters.record_spurious_l1();
            return false;
        }

        if self.non_zs_requested.load(Ordering::Relaxed) != 0 {
            return self.store_non_zs_fragment(fragment, counters);
        }

        let source_num = fragment.source_num();
        let subevent = &self.l1_subevents[source_num];
        if !subevent.add_fragment(fragment) {
            log::warn!("[event] duplicate L1 fragment for source_num {source_num}");
            return false;
        }

        let current = self.number_of_l1_fragments.fetch_add(1, Ordering::Release) + 1;
        current == self.expected_l1_packets
    }

    fn store_non_zs_fragment(&self, fragment: MepFragment, counters: &Counters) -> bool {
        let crate_cream_id = fragment.source_sub_id();
        let mut map = self.epoch_mutex.lock().unwrap_or_else(|p| p.into_inner());

        if map.contains_key(&crate_cream_id) {
            log::info!(
                "[event] non-ZS fragment for crate/cream 0x{crate_cream_id:02x} on event {} received twice, freeing event",
                self.event_number()
            );
            counters.record_spurious_l1();
            drop(map);
            self.destroy();
            return false;
        }

        map.insert(crate_cream_id, fragment);
        map.len() as u32 == self.non_zs_requested.load(Ordering::Relaxed)
    }

    /// Read the trigger-type word and fine time from fragment 0 of the
    /// L0TP subevent. Returns the default trigger type `1` when the L0TP
    /// source isn't configured active.
    pub fn read_trigger_type_word_and_fine_time(&self, config: &Config) -> u8 {
        if !config.l0tp_active {
            return 1;
        }
        let Some(l0tp_fragment) = self.l0_subevents[config.l0tp_source_num].get_fragment(0) else {
            log::error!(
                "[event] L0TP active but fragment 0 missing for event {}",
                self.event_number()
            );
            return 0;
        };
        let Some(header) = L0TpHeader::parse(l0tp_fragment.payload()) else {
            log::error!("[event] L0TP payload too short to decode header");
            return 0;
        };
        self.finetime.store(header.ref_fine_time, Ordering::Relaxed);
        self.trigger_type_word
            .store(header.l0_trigger_type, Ordering::Relaxed);
        self.trigger_flags
            .store(header.l0_trigger_flags, Ordering::Relaxed);
        header.l0_trigger_type
    }

    #[must_use]
    pub fn trigger_type_word(&self) -> u8 {
        self.trigger_type_word.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn trigger_flags(&self) -> u8 {
        self.trigger_flags.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn finetime(&self) -> u16 {
        self.finetime.load(Ordering::Relaxed)
    }

    pub fn set_timestamp(&self, timestamp: u32) {
        self.timestamp.store(timestamp, Ordering::Relaxed);
    }

    #[must_use]
    pub fn timestamp(&self) -> u32 {
        self.timestamp.load(Ordering::Relaxed)
    }

    pub fn set_processing_id(&self, processing_id: u32) {
        self.processing_id.store(processing_id, Ordering::Relaxed);
    }

    #[must_use]
    pub fn processing_id(&self) -> u32 {
        self.processing_id.load(Ordering::Relaxed)
    }

    pub fn set_sob_timestamp(&self, sob_timestamp: u32) {
        self.sob_timestamp.store(sob_timestamp, Ordering::Relaxed);
    }

    #[must_use]
    pub fn sob_timestamp(&self) -> u32 {
        self.sob_timestamp.load(Ordering::Relaxed)
    }

    /// Increment the per-source missing-fragment counters for whichever
    /// phase (L0 or L1) this event is currently in.
    pub fn update_missing_events_stats(&self, counters: &Counters) {
        if !self.l1_processed() {
            for (source_num, subevent) in self.l0_subevents.iter().enumerate() {
                if subevent.get_number_of_fragments() != u32::from(subevent.get_number_of_expected_fragments())
                {
                    counters.record_missing_l0(source_num);
                }
            }
        } else {
            for (source_num, subevent) in self.l1_subevents.iter().enumerate() {
                if subevent.get_number_of_fragments() != u32::from(subevent.get_number_of_expected_fragments())
                {
                    counters.record_missing_l1(source_num);
                }
            }
        }
    }

    /// Zero all counters, flags and the non-ZS request count. Does not
    /// touch the Subevent arrays or the non-ZS map -- [`Event::destroy`]
    /// handles those before calling this.
    fn reset(&self) {
        self.number_of_l0_fragments.store(0, Ordering::Relaxed);
        self.number_of_l1_fragments.store(0, Ordering::Relaxed);
        self.burst_id.store(0, Ordering::Relaxed);
        self.trigger_type_word.store(0, Ordering::Relaxed);
        self.trigger_flags.store(0, Ordering::Relaxed);
        self.timestamp.store(0, Ordering::Relaxed);
        self.finetime.store(0, Ordering::Relaxed);
        self.processing_id.store(0, Ordering::Relaxed);
        self.sob_timestamp.store(0, Ordering::Relaxed);
        self.l1_processed.store(false, Ordering::Relaxed);
        self.l2_accepted.store(false, Ordering::Relaxed);
        self.unfinished.store(false, Ordering::Relaxed);
        self.last_event_of_burst.store(false, Ordering::Relaxed);
        self.non_zs_requested.store(0, Ordering::Relaxed);
    }

    /// Release every held fragment and reset the slot to `EMPTY`.
    pub fn destroy(&self) {
        let _destroy_guard = self.destroy_mutex.lock().unwrap_or_else(|p| p.into_inner());

        for subevent in &self.l0_subevents {
            subevent.destroy();
        }
        for subevent in &self.l1_subevents {
            subevent.destroy();
        }

        let mut non_zs = self.epoch_mutex.lock().unwrap_or_else(|p| p.into_inner());
        non_zs.clear();
        drop(non_zs);

        self.reset();
    }
}
