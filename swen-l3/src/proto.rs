//! ## swen-l3::proto
//! **Association header and envelope codec**
//!
//! Operations travel in a 3-byte plaintext header `{op, seq, ack}`. With an
//! association key configured, the unit `{length:1B, header, payload}` is
//! zero-padded to the XTEA block size and encrypted as one envelope; the
//! length byte lets the receiver strip the padding again.

use thiserror::Error;

use crate::xtea::{Xtea, BLOCK};

/// Plaintext header length in bytes.
pub const HDR_LEN: usize = 3;

/// Association operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    AssocSyn = 0x01,
    AssocSynAck = 0x02,
    AssocComplete = 0x03,
    Ack = 0x04,
    Data = 0x05,
    Disassoc = 0x06,
}

impl Op {
    pub fn from_u8(value: u8) -> Option<Op> {
        match value {
            0x01 => Some(Op::AssocSyn),
            0x02 => Some(Op::AssocSynAck),
            0x03 => Some(Op::AssocComplete),
            0x04 => Some(Op::Ack),
            0x05 => Some(Op::Data),
            0x06 => Some(Op::Disassoc),
            _ => None,
        }
    }

    /// One-shot ops are never placed on the retransmission list; a lost one
    /// is regenerated in response to the peer's retry.
    pub fn is_one_shot(self) -> bool {
        matches!(self, Op::Ack | Op::AssocSynAck)
    }
}

/// Decoded association header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L3Hdr {
    pub op: Op,
    pub seq: u8,
    pub ack: u8,
}

/// Transport faults. All of these drop the frame silently; nothing is
/// surfaced to the application beyond the absence of progress.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    #[error("truncated association header")]
    Truncated,
    #[error("unknown association op")]
    BadOp,
    #[error("envelope decryption failed")]
    BadEnvelope,
}

pub fn encode_hdr(hdr: L3Hdr) -> [u8; HDR_LEN] {
    [hdr.op as u8, hdr.seq, hdr.ack]
}

pub fn parse_hdr(bytes: &[u8]) -> Result<L3Hdr, ProtoError> {
    if bytes.len() < HDR_LEN {
        return Err(ProtoError::Truncated);
    }
    Ok(L3Hdr {
        op: Op::from_u8(bytes[0]).ok_or(ProtoError::BadOp)?,
        seq: bytes[1],
        ack: bytes[2],
    })
}

/// Number of zero bytes needed to pad an envelope of `len` bytes to a whole
/// number of cipher blocks.
pub fn pad_len(len: usize) -> usize {
    (BLOCK - len % BLOCK) % BLOCK
}

/// Decrypts an envelope and returns `(header, payload)` slices of `bytes`.
pub fn open_envelope<'a>(
    cipher: &Xtea,
    bytes: &'a mut [u8],
) -> Result<(L3Hdr, &'a [u8]), ProtoError> {
    if !cipher.decrypt_in_place(bytes) {
        return Err(ProtoError::BadEnvelope);
    }
    let total = bytes[0] as usize;
    if total < 1 + HDR_LEN || total > bytes.len() {
        return Err(ProtoError::BadEnvelope);
    }
    let hdr = parse_hdr(&bytes[1..1 + HDR_LEN])?;
    Ok((hdr, &bytes[1 + HDR_LEN..total]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [0x5A; 16];

    fn seal(cipher: &Xtea, hdr: L3Hdr, payload: &[u8]) -> Vec<u8> {
        let total = 1 + HDR_LEN + payload.len();
        let mut env = Vec::with_capacity(total + pad_len(total));
        env.push(total as u8);
        env.extend_from_slice(&encode_hdr(hdr));
        env.extend_from_slice(payload);
        env.resize(total + pad_len(total), 0);
        cipher.encrypt_in_place(&mut env);
        env
    }

    #[test]
    fn hdr_roundtrip() {
        let hdr = L3Hdr {
            op: Op::Data,
            seq: 7,
            ack: 3,
        };
        assert_eq!(parse_hdr(&encode_hdr(hdr)).unwrap(), hdr);
    }

    #[test]
    fn unknown_op_rejected() {
        assert_eq!(parse_hdr(&[0x7F, 0, 0]), Err(ProtoError::BadOp));
        assert_eq!(parse_hdr(&[0x05, 0]), Err(ProtoError::Truncated));
    }

    #[test]
    fn envelope_roundtrip() {
        let cipher = Xtea::new(&KEY);
        let hdr = L3Hdr {
            op: Op::Data,
            seq: 2,
            ack: 1,
        };
        let mut env = seal(&cipher, hdr, b"hello");
        assert_eq!(env.len() % BLOCK, 0);
        let (parsed, payload) = open_envelope(&cipher, &mut env).unwrap();
        assert_eq!(parsed, hdr);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn wrong_key_fails_envelope() {
        let cipher = Xtea::new(&KEY);
        let hdr = L3Hdr {
            op: Op::Ack,
            seq: 0,
            ack: 0,
        };
        let mut env = seal(&cipher, hdr, &[]);
        let other = Xtea::new(&[0xA5; 16]);
        // Decryption "succeeds" mechanically; the length byte is garbage, so
        // the envelope is rejected. A lucky length byte would still fail the
        // op check.
        let result = open_envelope(&other, &mut env);
        assert!(result.is_err());
    }

    #[test]
    fn truncated_envelope_rejected() {
        let cipher = Xtea::new(&KEY);
        let mut short = vec![0u8; 5];
        assert_eq!(
            open_envelope(&cipher, &mut short),
            Err(ProtoError::BadEnvelope)
        );
    }
}
