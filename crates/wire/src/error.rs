use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FrameError {
    #[snafu(display("frame exceeds buffer cap of {cap} bytes"))]
    BufferCapExceeded { cap: usize },

    #[snafu(display("malformed frame: {reason}"))]
    Malformed { reason: String },
}

pub type Result<T, E = FrameError> = std::result::Result<T, E>;
