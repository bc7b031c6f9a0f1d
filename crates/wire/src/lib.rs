//! Sans-io wire parsing shared by the Stratum, Bitcoin P2P, and WebSocket layers. Nothing
//! here touches a socket: everything operates on byte slices handed in by the caller,
//! keeping message types free of I/O.
pub mod buffer;
pub mod error;
pub mod framer;
pub mod websocket;

pub use buffer::{FrameBuffer, FrameOutcome};
pub use error::FrameError;
