//! Exchange Session: `wss://` market data + order submission over the WebSocket Layer.
//! Tagged-variant dispatch mirrors the Stratum `Message`/`Event` split — parsing stops at
//! "valid exchange message received", business logic is an external collaborator's job.
use {
    super::*,
    websocket::{Message as WsMessage, WebSocketSession},
};

#[derive(Debug, Snafu)]
pub enum ExchangeError {
    #[snafu(display("websocket error"))]
    WebSocket { source: websocket::WebSocketError },
    #[snafu(display("malformed exchange message: {reason}"))]
    Malformed { reason: String },
    #[snafu(display("too many in-flight orders (max {max})"))]
    Busy { max: usize },
}

pub type Result<T, E = ExchangeError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExchangeEvent {
    Trade {
        symbol: String,
        price: f64,
        size: f64,
    },
    BookUpdate {
        symbol: String,
        bids: Vec<(f64, f64)>,
        asks: Vec<(f64, f64)>,
    },
    OrderAck {
        ticket: u64,
        order_id: String,
    },
    OrderReject {
        ticket: u64,
        reason: String,
    },
    Heartbeat,
    Error {
        message: String,
    },
}

const MAX_IN_FLIGHT: usize = 4096;

/// Monotonic ticket correlating a submitted order with its eventual `OrderAck` /
/// `OrderReject`. The correlation table is bounded; once full, `submit` returns `Busy`
/// without sending anything.
pub struct ExchangeSession<S> {
    ws: WebSocketSession<S>,
    next_ticket: u64,
    in_flight: std::collections::HashSet<u64>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ExchangeSession<S> {
    pub async fn connect(channel: S, host: &str, path: &str, channels: &[String]) -> Result<Self> {
        let mut ws = WebSocketSession::handshake(channel, host, path)
            .await
            .context(WebSocketSnafu)?;

        let subscribe = serde_json::json!({
            "type": "subscribe",
            "channels": channels,
        });
        ws.send_text(&subscribe.to_string())
            .await
            .context(WebSocketSnafu)?;

        Ok(Self {
            ws,
            next_ticket: 0,
            in_flight: std::collections::HashSet::new(),
        })
    }

    /// Enqueues an order frame, returning the ticket used to correlate the eventual
    /// `OrderAck`/`OrderReject`. Ordered delivery is the WebSocket Layer's job; this
    /// only tracks correlation bookkeeping.
    pub async fn submit(&mut self, order_bytes: &[u8]) -> Result<u64> {
        if self.in_flight.len() >= MAX_IN_FLIGHT {
            return Err(ExchangeError::Busy {
                max: MAX_IN_FLIGHT,
            });
        }

        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.in_flight.insert(ticket);

        self.ws
            .send_binary(order_bytes)
            .await
            .context(WebSocketSnafu)?;

        Ok(ticket)
    }

    /// Reads the next exchange event. On `OrderAck`/`OrderReject`, the ticket is
    /// released from the correlation table even if it was unrecognized (a stale or
    /// duplicate ack should not wedge `submit` forever).
    pub async fn recv(&mut self) -> Result<Option<ExchangeEvent>> {
        let Some(message) = self.ws.recv().await.context(WebSocketSnafu)? else {
            return Ok(None);
        };

        let text = match message {
            WsMessage::Text(text) => text,
            WsMessage::Binary(bytes) => String::from_utf8(bytes).map_err(|_| {
                ExchangeError::Malformed {
                    reason: "binary exchange message was not valid UTF-8".into(),
                }
            })?,
        };

        let event: ExchangeEvent =
            serde_json::from_str(&text).map_err(|err| ExchangeError::Malformed {
                reason: err.to_string(),
            })?;

        match &event {
            ExchangeEvent::OrderAck { ticket, .. } | ExchangeEvent::OrderReject { ticket, .. } => {
                self.in_flight.remove(ticket);
            }
            _ => {}
        }

        Ok(Some(event))
    }
}
