// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Zero-copy view over one event fragment carried inside a MEP.

use std::sync::Arc;

use crate::config::Level;
use crate::wire::FRAGMENT_HEADER_LEN;

/// Raw datagram bytes, shared between the owning [`crate::mep::Mep`] and
/// every [`MepFragment`] sliced out of it.
///
/// Ownership is plain `Arc` reference counting: there is no manual
/// decrement-on-drop and no back-pointer into the MEP. The buffer is freed
/// automatically the instant the last clone -- the MEP's or any fragment's
/// -- is dropped, in whatever order that happens.
pub type Buffer = Arc<Vec<u8>>;

/// One event's contribution from one source, carried inside a MEP.
///
/// Never copies payload bytes: `payload()` borrows directly from the shared
/// [`Buffer`].
#[derive(Debug, Clone)]
pub struct MepFragment {
    buffer: Buffer,
    payload_offset: usize,
    payload_len: usize,
    event_number: u32,
    source_id: u8,
    source_sub_id: u8,
    source_num: usize,
    level: Level,
    is_last_event_of_burst: bool,
}

impl MepFragment {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        buffer: Buffer,
        payload_offset: usize,
        payload_len: usize,
        event_number: u32,
        source_id: u8,
        source_sub_id: u8,
        source_num: usize,
        level: Level,
        is_last_event_of_burst: bool,
    ) -> Self {
        debug_assert!(payload_offset + payload_len <= buffer.len());
        Self {
            buffer,
            payload_offset,
            payload_len,
            event_number,
            source_id,
            source_sub_id,
            source_num,
            level,
            is_last_event_of_burst,
        }
    }

    /// Fully reconstructed 32-bit event number.
    #[must_use]
    pub fn event_number(&self) -> u32 {
        self.event_number
    }

    /// Wire-level detector identifier.
    #[must_use]
    pub fn source_id(&self) -> u8 {
        self.source_id
    }

    /// Intra-detector board identifier.
    #[must_use]
    pub fn source_sub_id(&self) -> u8 {
        self.source_sub_id
    }

    /// Dense registry number for this source at this fragment's level.
    #[must_use]
    pub fn source_num(&self) -> usize {
        self.source_num
    }

    /// Trigger level (L0 or L1) this fragment was routed under.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Whether the transmitter marked this the last event of the burst.
    #[must_use]
    pub fn is_last_event_of_burst(&self) -> bool {
        self.is_last_event_of_burst
    }

    /// Payload bytes, borrowed directly from the shared datagram buffer.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.payload_offset..self.payload_offset + self.payload_len]
    }

    /// Payload length in bytes (fragment wire length minus the sub-header).
    #[must_use]
    pub fn data_length(&self) -> usize {
        self.payload_len
    }

    /// Offset, within the fragment header, at which the payload starts.
    pub(crate) const PAYLOAD_HEADER_LEN: usize = FRAGMENT_HEADER_LEN;
}
