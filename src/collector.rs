// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic sweep that reclaims event slots that never completed.

use crate::counters::Counters;
use crate::event_pool::EventPool;

/// Scans every pool slot and frees the ones left over from a prior burst.
///
/// This struct only holds the sweep logic; scheduling it on a cooperative
/// cadence (the original "once per second" cadence) is the embedding
/// application's job, same as NIC polling and CLI wiring (`spec.md` §1).
#[derive(Debug, Default)]
pub struct UnfinishedEventsCollector;

impl UnfinishedEventsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Free every slot still marked `unfinished` from a burst older than
    /// `current_burst_id`, after recording its missing-fragment stats.
    pub fn sweep(&self, pool: &EventPool, current_burst_id: u32, counters: &Counters) {
        for event in pool.slots() {
            if event.is_unfinished() && event.burst_id() < current_burst_id {
                log::warn!(
                    "[collector] reclaiming unfinished event {} from burst {}",
                    event.event_number(),
                    event.burst_id()
                );
                event.update_missing_events_stats(counters);
                pool.free_event(event);
            }
        }
    }
}
