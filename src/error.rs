// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type.
//!
//! Only failures that abort a whole operation live here. The recoverable,
//! per-fragment conditions (duplicate, spurious L1, stale epoch, oversize)
//! never reach this type -- they resolve to a `bool` plus a `Counters`
//! increment, per the ingest-path contract in `Event`.

use std::fmt;

/// Reason a MEP datagram was rejected as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokenPacketReason {
    /// Declared `length` exceeds the number of bytes actually received.
    TooShort,
    /// Declared `length` is smaller than the number of bytes received.
    TooLong,
    /// A fragment header's `eventNumberLSB` didn't match the expected run.
    BadEventNumberLsb,
    /// A fragment's declared length runs past the end of the datagram.
    Truncated,
    /// Bytes remain after walking the declared fragment count.
    TrailingBytes,
}

impl fmt::Display for BrokenPacketReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "declared length exceeds received bytes"),
            Self::TooLong => write!(f, "declared length is smaller than received bytes"),
            Self::BadEventNumberLsb => write!(f, "fragment event-number LSB out of sequence"),
            Self::Truncated => write!(f, "fragment length runs past end of datagram"),
            Self::TrailingBytes => write!(f, "trailing bytes after last fragment"),
        }
    }
}

/// Errors returned by the event-building core.
///
/// # Example
///
/// ```
/// use na62_event_builder::{Error, BrokenPacketReason};
///
/// let err = Error::BrokenPacket(BrokenPacketReason::Truncated);
/// assert_eq!(err.to_string(), "broken packet: fragment length runs past end of datagram");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Parse errors (recovered locally by the caller: drop datagram, count it)
    // ========================================================================
    /// Malformed MEP: length mismatch, truncated fragment, or bad LSB run.
    BrokenPacket(BrokenPacketReason),
    /// `sourceID` carried by the datagram is not in the registered table.
    UnknownSource(u8),

    // ========================================================================
    // Fatal errors (initialization only)
    // ========================================================================
    /// `Config` failed validation.
    InvalidConfig(String),
    /// `EventPool` could not be built from the given configuration.
    PoolExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BrokenPacket(reason) => write!(f, "broken packet: {reason}"),
            Self::UnknownSource(id) => write!(f, "unknown sourceID: 0x{id:02x}"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::PoolExhausted => write!(f, "event pool could not be allocated"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
