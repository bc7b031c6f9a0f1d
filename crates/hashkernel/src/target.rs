//! Little-endian 256-bit target comparison.
//!
//! Block header hashes and Stratum targets are both conventionally serialized as
//! 32-byte little-endian integers. Comparing them as numbers means comparing from the
//! most-significant byte down, i.e. index 31 first.
use std::cmp::Ordering;

fn le_u256_cmp(a: &[u8; 32], b: &[u8; 32]) -> Ordering {
    for i in (0..32).rev() {
        match a[i].cmp(&b[i]) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    Ordering::Equal
}

/// True if `hash`, read as a little-endian 256-bit integer, is at or below `target`.
pub fn meets_target(hash: &[u8; 32], target: &[u8; 32]) -> bool {
    le_u256_cmp(hash, target) != Ordering::Greater
}
