use super::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClientError {
    #[snafu(display("Connection timeout: {source}"))]
    Timeout { source: tokio::time::error::Elapsed },

    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    #[snafu(display("Channel receive error: {source}"))]
    ChannelRecv {
        source: tokio::sync::oneshot::error::RecvError,
    },

    #[snafu(display("Serialization error: {source}"))]
    Serialization { source: serde_json::Error },

    #[snafu(display("{message}"))]
    Protocol { message: String },

    #[snafu(display("share rejected (code={code:?}): {message}"))]
    SubmitRejected { code: Option<i32>, message: String },

    #[snafu(display("not connected"))]
    NotConnected,

    #[snafu(display("event stream lagged, missed {count} messages"))]
    EventsLagged { count: u64 },

    #[snafu(display("event channel closed"))]
    EventChannelClosed,
}
