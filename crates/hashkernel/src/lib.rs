//! From-scratch SHA-256d block header hashing, kept free of any async runtime or
//! protocol dependency so it can be unit-tested and benchmarked in isolation.
pub mod lanes;
pub mod midstate;
pub mod sha256;
pub mod target;

pub use lanes::{LANES, SimdCapability, finish_header_lanes, simd_capability};
pub use midstate::{Midstate, finish_header, header_midstate, sha256d_header};
pub use sha256::{compress, sha256, sha256d};
pub use target::meets_target;
