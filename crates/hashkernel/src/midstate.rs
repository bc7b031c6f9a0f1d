use crate::sha256::{IV, compress};

/// SHA-256 compression state cached after absorbing the first 64 bytes of an
/// 80-byte Bitcoin block header. Every nonce trial during a job only changes the
/// header's last 16 bytes (the tail of the merkle root, `time`, `bits` and
/// `nonce`), so the first block never needs to be recompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Midstate([u32; 8]);

impl Midstate {
    pub fn state(&self) -> [u32; 8] {
        self.0
    }
}

/// Absorbs the first 64 bytes of an 80-byte header into a fresh midstate.
pub fn header_midstate(first_64: &[u8; 64]) -> Midstate {
    let mut state = IV;
    compress(&mut state, first_64);
    Midstate(state)
}

fn second_block(last_16: &[u8; 16]) -> [u8; 64] {
    let mut block = [0u8; 64];
    block[..16].copy_from_slice(last_16);
    block[16] = 0x80;
    // total header length is always 80 bytes = 640 bits, fixed regardless of nonce.
    block[56..64].copy_from_slice(&640u64.to_be_bytes());
    block
}

fn single_block_of_32(digest: &[u8; 32]) -> [u8; 64] {
    let mut block = [0u8; 64];
    block[..32].copy_from_slice(digest);
    block[32] = 0x80;
    block[56..64].copy_from_slice(&256u64.to_be_bytes());
    block
}

fn state_to_bytes(state: [u32; 8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, word) in state.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
    }
    out
}

/// Completes a SHA-256d block header hash from a cached midstate and the header's
/// last 16 bytes. Returns the digest in natural (big-endian) byte order, i.e. the
/// same order `sha256d` would return for the full 80-byte header.
pub fn finish_header(midstate: &Midstate, last_16: &[u8; 16]) -> [u8; 32] {
    let mut state = midstate.0;
    compress(&mut state, &second_block(last_16));
    let first_round = state_to_bytes(state);

    let mut state = IV;
    compress(&mut state, &single_block_of_32(&first_round));
    state_to_bytes(state)
}

/// One-shot SHA-256d over a full 80-byte header, without midstate reuse. Mainly
/// useful for tests and for hashing a single header outside the hot loop.
pub fn sha256d_header(header: &[u8; 80]) -> [u8; 32] {
    let first64: &[u8; 64] = header[..64].try_into().expect("64 bytes");
    let last16: &[u8; 16] = header[64..].try_into().expect("16 bytes");
    finish_header(&header_midstate(first64), last16)
}
