// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-capacity pool of reusable [`Event`] slots.

use std::sync::Arc;

use crate::config::Config;
use crate::event::Event;
use crate::source_id::SourceIdManager;
use crate::{Error, Result};

/// Preallocated array of `Event` slots, indexed by event number modulo
/// capacity.
///
/// Slots never move or reallocate after construction, so a `&Event`
/// borrowed from the pool is stable for the pool's entire lifetime --
/// callers are expected to hold the pool behind an `Arc` and share that,
/// not the individual slot references, across threads.
#[derive(Debug)]
pub struct EventPool {
    slots: Vec<Event>,
}

impl EventPool {
    /// Preallocate `config.event_pool_size` slots.
    pub fn new(config: &Config, source_ids: &SourceIdManager) -> Result<Self> {
        if config.event_pool_size == 0 {
            return Err(Error::PoolExhausted);
        }
        let slots = (0..config.event_pool_size)
            .map(|_| Event::new(source_ids, config))
            .collect();
        Ok(Self { slots })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Look up the slot for `event_number`, stamping it with that event
    /// number on every call.
    #[must_use]
    pub fn get_event(&self, event_number: u32) -> &Event {
        let slot = &self.slots[event_number as usize % self.slots.len()];
        slot.set_event_number(event_number);
        slot
    }

    /// Release `event`'s fragments and reset it to `EMPTY`.
    pub fn free_event(&self, event: &Event) {
        event.destroy();
    }

    /// Iterate every slot, e.g. for [`crate::collector::UnfinishedEventsCollector`].
    pub fn slots(&self) -> impl Iterator<Item = &Event> {
        self.slots.iter()
    }
}

/// Convenience alias for embedding applications that want shared ownership
/// of one pool across capture threads.
pub type SharedEventPool = Arc<EventPool>;
