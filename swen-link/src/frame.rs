//! ## swen-link::frame
//! **SWEN datagram framing**
//!
//! A frame is `{to:1B, from:1B, proto:1B, cksum:2B LE}` followed by the
//! payload. The checksum is the ones-complement sum of the whole frame
//! computed with the checksum field zeroed first.

use thiserror::Error;

/// Link-layer header length in bytes.
pub const HDR_LEN: usize = 5;

/// Broadcast destination address.
pub const ADDR_BROADCAST: u8 = 0xFF;

/// Errors that can occur while parsing a SWEN frame.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Shorter than a valid frame; candidate for the generic-command
    /// matcher.
    #[error("frame too short to carry a SWEN header")]
    TooShort,
    #[error("frame checksum mismatch")]
    BadChecksum,
    /// Valid frame addressed to another node.
    #[error("frame addressed to another node")]
    NotForUs,
}

/// Parsed link-layer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub to: u8,
    pub from: u8,
    pub proto: u8,
}

/// Ones-complement sum of `data`, 16-bit words little-endian, odd tail
/// padded with zero.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        sum += u32::from(u16::from_le_bytes([pair[0], pair[1]]));
    }
    if let [tail] = chunks.remainder() {
        sum += u32::from(*tail);
    }
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Ones-complement sum of a frame with its checksum field treated as zero,
/// without copying the frame.
fn checksum_zeroed(frame: &[u8]) -> u16 {
    let at = |i: usize| -> u8 {
        if i == 3 || i == 4 {
            0
        } else {
            frame[i]
        }
    };
    let mut sum: u32 = 0;
    let mut i = 0;
    while i + 1 < frame.len() {
        sum += u32::from(u16::from_le_bytes([at(i), at(i + 1)]));
        i += 2;
    }
    if i < frame.len() {
        sum += u32::from(at(i));
    }
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Writes the header into the first [`HDR_LEN`] bytes of `frame` and stamps
/// the checksum over the whole frame.
///
/// # Panics
/// Panics if `frame` is shorter than [`HDR_LEN`].
pub fn write_header(frame: &mut [u8], hdr: FrameHeader) {
    frame[0] = hdr.to;
    frame[1] = hdr.from;
    frame[2] = hdr.proto;
    frame[3] = 0;
    frame[4] = 0;
    let sum = checksum(frame);
    frame[3..5].copy_from_slice(&sum.to_le_bytes());
}

/// Parses and verifies a frame for the node addressed `local`.
///
/// Returns the header and the payload offset. Broadcast frames pass the
/// address check.
pub fn parse(frame: &[u8], local: u8) -> Result<(FrameHeader, usize), FrameError> {
    if frame.len() < HDR_LEN {
        return Err(FrameError::TooShort);
    }

    let stored = u16::from_le_bytes([frame[3], frame[4]]);
    if checksum_zeroed(frame) != stored {
        return Err(FrameError::BadChecksum);
    }

    let hdr = FrameHeader {
        to: frame[0],
        from: frame[1],
        proto: frame[2],
    };
    if hdr.to != local && hdr.to != ADDR_BROADCAST {
        return Err(FrameError::NotForUs);
    }
    Ok((hdr, HDR_LEN))
}
