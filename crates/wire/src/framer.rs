//! Protocol-specific frame boundary detection on top of a `FrameBuffer`. These parsers only
//! find `[lo, hi)` frame boundaries; decoding the payload into typed messages is the caller's
//! job (for Bitcoin P2P that's `bitcoin::p2p::message::RawNetworkMessage`).
use crate::buffer::{FrameOutcome, malformed};
use crate::error::Result;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct LineFrame;

/// Line-delimited JSON (Stratum). A frame ends at the first `\n`, including it in `[lo, hi)`
/// so `consume(hi)` drops the delimiter along with the line.
pub fn parse_line(buf: &[u8], cap: usize) -> Result<FrameOutcome<LineFrame>> {
    match buf.iter().position(|&b| b == b'\n') {
        Some(pos) => Ok(FrameOutcome::FrameReady {
            lo: 0,
            hi: pos + 1,
            kind: LineFrame,
        }),
        None if buf.len() >= cap => Err(malformed(format!(
            "no newline within buffer cap of {cap} bytes"
        ))),
        None => Ok(FrameOutcome::NeedMore {
            at_least: buf.len() + 1,
        }),
    }
}

/// Bitcoin P2P message envelope: magic(4) + command(12) + length(u32 LE) + checksum(4) + payload.
pub const BITCOIN_HEADER_LEN: usize = 24;
pub const BITCOIN_MAX_PAYLOAD: usize = 32 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BitcoinFrame {
    pub command: [u8; 12],
}

/// Parses one Bitcoin P2P frame boundary. `checksum4` computes the first 4 bytes of
/// `sha256d(payload)`; injected so this crate never needs a SHA-256 dependency of its own.
pub fn parse_bitcoin_message(
    buf: &[u8],
    expected_magic: u32,
    checksum4: impl Fn(&[u8]) -> [u8; 4],
) -> Result<FrameOutcome<BitcoinFrame>> {
    if buf.len() < BITCOIN_HEADER_LEN {
        return Ok(FrameOutcome::NeedMore {
            at_least: BITCOIN_HEADER_LEN,
        });
    }

    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic != expected_magic {
        return Err(malformed(format!(
            "magic mismatch: got {magic:#010x}, expected {expected_magic:#010x}"
        )));
    }

    let mut command = [0u8; 12];
    command.copy_from_slice(&buf[4..16]);

    let length = u32::from_le_bytes(buf[16..20].try_into().unwrap()) as usize;
    if length > BITCOIN_MAX_PAYLOAD {
        return Err(malformed(format!(
            "payload length {length} exceeds max {BITCOIN_MAX_PAYLOAD}"
        )));
    }

    let total = BITCOIN_HEADER_LEN + length;
    if buf.len() < total {
        return Ok(FrameOutcome::NeedMore { at_least: total });
    }

    let checksum = &buf[20..24];
    let payload = &buf[BITCOIN_HEADER_LEN..total];
    if &checksum4(payload)[..] != checksum {
        return Err(malformed("checksum mismatch"));
    }

    Ok(FrameOutcome::FrameReady {
        lo: 0,
        hi: total,
        kind: BitcoinFrame { command },
    })
}
