// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Parser for Multi-Event Packets (MEPs): a UDP datagram grouping several
//! consecutive event fragments from one detector source.

use std::sync::Arc;

use crate::config::Level;
use crate::fragment::{Buffer, MepFragment};
use crate::source_id::SourceIdManager;
use crate::wire::{FragmentHeader, MepHeader, FRAGMENT_HEADER_LEN, MEP_HEADER_LEN};
use crate::{BrokenPacketReason, Error, Result};

/// A parsed MEP: owns the datagram buffer and the fragment views sliced out
/// of it.
///
/// Zero-copy: no payload byte is copied out of the original buffer during
/// parsing. Dropping the `Mep` drops its `Buffer` clone; the buffer itself
/// stays alive as long as any [`MepFragment`] clone of it does.
#[derive(Debug)]
pub struct Mep {
    header: MepHeader,
    level: Level,
    fragments: Vec<MepFragment>,
}

impl Mep {
    /// Parse a captured datagram into a MEP and its fragment views.
    ///
    /// Implements `spec.md` §4.2 steps 1-7 in order; the first failing step
    /// short-circuits the rest.
    pub fn parse(buffer: Buffer, level: Level, source_ids: &SourceIdManager) -> Result<Self> {
        let data_len = buffer.len();

        let header = MepHeader::parse(&buffer).ok_or(Error::BrokenPacket(BrokenPacketReason::TooShort))?;

        // Step 2: declared length must match received length.
        let declared = usize::from(header.length);
        if declared > data_len {
            return Err(Error::BrokenPacket(BrokenPacketReason::TooShort));
        }
        if declared < data_len {
            return Err(Error::BrokenPacket(BrokenPacketReason::TooLong));
        }

        // Step 3: sourceID must be registered.
        let source_num = source_ids.source_id_to_num(level, header.source_id)?;

        // Steps 4-6: walk fragments.
        let mut offset = MEP_HEADER_LEN;
        let mut fragments = Vec::with_capacity(usize::from(header.number_of_fragments));

        for i in 0..u32::from(header.number_of_fragments) {
            let frag_hdr = FragmentHeader::parse(&buffer[offset..])
                .ok_or(Error::BrokenPacket(BrokenPacketReason::Truncated))?;

            let expected_lsb = ((header.first_event_number).wrapping_add(i) & 0xFF) as u8;
            if frag_hdr.event_number_lsb != expected_lsb {
                return Err(Error::BrokenPacket(BrokenPacketReason::BadEventNumberLsb));
            }

            let frag_len = usize::from(frag_hdr.length);
            if frag_len < FRAGMENT_HEADER_LEN || offset + frag_len > data_len {
                return Err(Error::BrokenPacket(BrokenPacketReason::Truncated));
            }

            let event_number = (header.first_event_number & !0xFF) | u32::from(expected_lsb);
            let payload_offset = offset + FRAGMENT_HEADER_LEN;
            let payload_len = frag_len - FRAGMENT_HEADER_LEN;

            fragments.push(MepFragment::new(
                Arc::clone(&buffer),
                payload_offset,
                payload_len,
                event_number,
                header.source_id,
                header.source_sub_id,
                source_num,
                level,
                frag_hdr.is_last_event_of_burst,
            ));

            offset += frag_len;
        }

        // Step 7: no trailing bytes.
        if offset < data_len {
            return Err(Error::BrokenPacket(BrokenPacketReason::TrailingBytes));
        }

        Ok(Self {
            header,
            level,
            fragments,
        })
    }

    #[must_use]
    pub fn source_id(&self) -> u8 {
        self.header.source_id
    }

    #[must_use]
    pub fn source_sub_id(&self) -> u8 {
        self.header.source_sub_id
    }

    #[must_use]
    pub fn first_event_number(&self) -> u32 {
        self.header.first_event_number
    }

    #[must_use]
    pub fn number_of_fragments(&self) -> usize {
        self.fragments.len()
    }

    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Take ownership of the parsed fragment views, consuming the MEP.
    #[must_use]
    pub fn into_fragments(self) -> Vec<MepFragment> {
        self.fragments
    }

    #[must_use]
    pub fn fragments(&self) -> &[MepFragment] {
        &self.fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Level, SourceTableEntry};

    fn source_ids() -> SourceIdManager {
        let config = Config {
            num_l0_sources: 1,
            num_l1_sources: 0,
            expected_l0_packets_per_event: 1,
            expected_l1_packets_per_event: 0,
            source_id_table: vec![SourceTableEntry {
                source_id: 0xA0,
                level: Level::L0,
                expected_fragments: 1,
            }],
            l0tp_active: false,
            l0tp_source_num: 0,
            event_pool_size: 4,
            print_completed_source_ids: false,
        };
        SourceIdManager::new(&config).unwrap()
    }

    /// Builds a well-formed MEP datagram with `n` fragments, each carrying
    /// `payload` as its body.
    fn build_mep(first_event_number: u32, n: u8, payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        for i in 0..n {
            let hdr = FragmentHeader {
                is_last_event_of_burst: i + 1 == n,
                event_number_lsb: ((first_event_number + u32::from(i)) & 0xFF) as u8,
                length: (crate::wire::FRAGMENT_HEADER_LEN + payload.len()) as u16,
            };
            body.extend_from_slice(&hdr.to_bytes());
            body.extend_from_slice(payload);
        }
        let header = MepHeader {
            source_id: 0xA0,
            source_sub_id: 3,
            number_of_fragments: n,
            first_event_number,
            length: (MEP_HEADER_LEN + body.len()) as u16,
            timestamp: 0x1234_5678,
        };
        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn parses_well_formed_mep() {
        let bytes = build_mep(100, 3, b"hello");
        let mep = Mep::parse(Arc::new(bytes.clone()), Level::L0, &source_ids()).unwrap();
        assert_eq!(mep.number_of_fragments(), 3);
        let frags = mep.into_fragments();
        assert_eq!(frags[0].event_number(), 100);
        assert_eq!(frags[1].event_number(), 101);
        assert_eq!(frags[2].event_number(), 102);
        assert!(frags[2].is_last_event_of_burst());
        assert!(!frags[0].is_last_event_of_burst());
        for f in &frags {
            assert_eq!(f.payload(), b"hello");
        }
    }

    #[test]
    fn zero_copy_payload_matches_original_bytes() {
        let bytes = build_mep(0, 1, b"zero-copy-payload");
        let arc = Arc::new(bytes.clone());
        let mep = Mep::parse(Arc::clone(&arc), Level::L0, &source_ids()).unwrap();
        let frag = &mep.fragments()[0];
        let payload_start = frag.payload().as_ptr();
        let buf_start = arc.as_ptr();
        // SAFETY: just pointer arithmetic for the assertion below, no deref.
        let offset = payload_start as usize - buf_start as usize;
        assert_eq!(&arc[offset..offset + frag.data_length()], frag.payload());
    }

    #[test]
    fn too_short_declared_length_rejected() {
        let mut bytes = build_mep(0, 1, b"x");
        // Declare a length longer than what's actually there.
        let len = bytes.len() as u16 + 10;
        bytes[8..10].copy_from_slice(&len.to_be_bytes());
        let err = Mep::parse(Arc::new(bytes), Level::L0, &source_ids()).unwrap_err();
        assert_eq!(err, Error::BrokenPacket(BrokenPacketReason::TooShort));
    }

    #[test]
    fn too_long_declared_length_rejected() {
        let mut bytes = build_mep(0, 1, b"x");
        let shorter = bytes.len() as u16 - 2;
        bytes[8..10].copy_from_slice(&shorter.to_be_bytes());
        let err = Mep::parse(Arc::new(bytes), Level::L0, &source_ids()).unwrap_err();
        assert_eq!(err, Error::BrokenPacket(BrokenPacketReason::TooLong));
    }

    #[test]
    fn unknown_source_rejected() {
        let mut bytes = build_mep(0, 1, b"x");
        bytes[0] = 0xFF;
        let err = Mep::parse(Arc::new(bytes), Level::L0, &source_ids()).unwrap_err();
        assert_eq!(err, Error::UnknownSource(0xFF));
    }

    #[test]
    fn bad_lsb_rejected() {
        let mut bytes = build_mep(0, 2, b"x");
        // Corrupt the second fragment's LSB.
        let second_frag_offset = MEP_HEADER_LEN + FRAGMENT_HEADER_LEN + 1;
        bytes[second_frag_offset + 1] = 99;
        let err = Mep::parse(Arc::new(bytes), Level::L0, &source_ids()).unwrap_err();
        assert_eq!(err, Error::BrokenPacket(BrokenPacketReason::BadEventNumberLsb));
    }

    #[test]
    fn truncated_fragment_rejected() {
        let bytes = build_mep(0, 1, b"hello");
        // Truncate the buffer itself but keep the header's declared length lying.
        let mut truncated = bytes[..bytes.len() - 3].to_vec();
        let new_len = truncated.len() as u16;
        truncated[8..10].copy_from_slice(&new_len.to_be_bytes());
        // Now the declared length matches the truncated buffer (valid per step 2)
        // but the fragment's own length field overruns it (step 5).
        let err = Mep::parse(Arc::new(truncated), Level::L0, &source_ids()).unwrap_err();
        assert_eq!(err, Error::BrokenPacket(BrokenPacketReason::Truncated));
    }

    #[test]
    fn s6_scenario_short_buffer_freed_on_parse_failure() {
        // S6: declared length 100, buffer length 80 -> BROKEN_PACKET, buffer freed.
        let mut bytes = build_mep(0, 1, b"1234567890");
        bytes[8..10].copy_from_slice(&100u16.to_be_bytes());
        let buffer = Arc::new(bytes);
        let weak_count_before = Arc::strong_count(&buffer);
        let result = Mep::parse(Arc::clone(&buffer), Level::L0, &source_ids());
        assert!(result.is_err());
        drop(result);
        assert_eq!(Arc::strong_count(&buffer), weak_count_before);
    }
}
