//! Message-oriented WebSocket layer riding on a [`Channel`](crate::secure_channel::Channel)
//! already in the TLS-ready state. Frame-level concerns (masking, length classes,
//! control-frame rules) live in `wire::websocket`; this module owns the HTTP upgrade
//! handshake, fragment reassembly, and the control-frame auto-reply policy.
use {
    super::*,
    base64::Engine,
    rand::RngCore,
    sha1::{Digest, Sha1},
    wire::{
        buffer::FrameOutcome,
        websocket::{self, DecodedHeader, Opcode},
    },
};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Snafu)]
pub enum WebSocketError {
    #[snafu(display("handshake I/O error"))]
    Io { source: io::Error },
    #[snafu(display("server did not upgrade: {status_line}"))]
    NotUpgraded { status_line: String },
    #[snafu(display("Sec-WebSocket-Accept mismatch"))]
    AcceptMismatch,
    #[snafu(display("malformed frame: {reason}"))]
    Malformed { reason: String },
    #[snafu(display("message exceeded the {MAX_MESSAGE_BYTES} byte reassembly cap"))]
    MessageTooLarge,
}

pub type Result<T, E = WebSocketError> = std::result::Result<T, E>;

impl From<wire::FrameError> for WebSocketError {
    fn from(err: wire::FrameError) -> Self {
        WebSocketError::Malformed {
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebSocketState {
    Handshaking,
    Open,
    CloseReceived,
    CloseSent,
    Closed,
}

/// A message the caller's protocol layer (e.g. the Exchange Session) cares about. Ping
/// and Pong are handled internally and never surface here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

/// Result of decoding whatever is currently buffered: a complete message for the
/// caller, a Ping that still needs its Pong sent, or not enough bytes yet.
enum Decoded {
    Message(Message),
    Ping(Vec<u8>),
    Close(Vec<u8>),
    Pending,
}

pub struct WebSocketSession<S> {
    channel: S,
    state: WebSocketState,
    recv_buf: wire::FrameBuffer,
    partial: Option<(Opcode, Vec<u8>)>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> WebSocketSession<S> {
    /// Performs the client-side HTTP upgrade handshake over an already-connected
    /// channel, then returns a session ready for message-oriented I/O.
    pub async fn handshake(mut channel: S, host: &str, path: &str) -> Result<Self> {
        let mut nonce = [0u8; 16];
        rand::rng().fill_bytes(&mut nonce);
        let key = base64::engine::general_purpose::STANDARD.encode(nonce);

        let request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {key}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n"
        );

        channel
            .write_all(request.as_bytes())
            .await
            .context(IoSnafu)?;
        channel.flush().await.context(IoSnafu)?;

        let response = read_http_response(&mut channel).await?;
        verify_handshake_response(&response, &key)?;

        Ok(Self {
            channel,
            state: WebSocketState::Open,
            recv_buf: wire::FrameBuffer::new(MAX_MESSAGE_BYTES + 16),
            partial: None,
        })
    }

    pub fn state(&self) -> &WebSocketState {
        &self.state
    }

    /// Sends a masked Text frame, a fresh random mask key per frame as required for
    /// client-to-server traffic.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_frame(Opcode::Text, text.as_bytes()).await
    }

    pub async fn send_binary(&mut self, payload: &[u8]) -> Result<()> {
        self.send_frame(Opcode::Binary, payload).await
    }

    async fn send_frame(&mut self, opcode: Opcode, payload: &[u8]) -> Result<()> {
        let mut key = [0u8; 4];
        rand::rng().fill_bytes(&mut key);
        let frame = websocket::encode_frame(true, opcode, payload, Some(key));
        self.channel.write_all(&frame).await.context(IoSnafu)?;
        self.channel.flush().await.context(IoSnafu)
    }

    /// Reads network bytes until one complete message is available, or the underlying
    /// channel is closed. Control frames are handled inline: a Ping gets an immediate
    /// Pong reply carrying the same payload, Pong never surfaces to the caller, and a
    /// Close gets an echoed Close reply before the session reports the channel closed.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        loop {
            match self.try_decode_one()? {
                Decoded::Message(message) => return Ok(Some(message)),
                Decoded::Ping(payload) => {
                    self.send_frame(Opcode::Pong, &payload).await?;
                    continue;
                }
                Decoded::Close(payload) => {
                    let code = payload.get(..2).unwrap_or(&[]);
                    self.send_frame(Opcode::Close, code).await?;
                    self.state = WebSocketState::Closed;
                    return Ok(None);
                }
                Decoded::Pending => {}
            }

            let mut chunk = [0u8; 4096];
            let n = self.channel.read(&mut chunk).await.context(IoSnafu)?;
            if n == 0 {
                self.state = WebSocketState::Closed;
                return Ok(None);
            }
            self.recv_buf
                .append(&chunk[..n])
                .map_err(|_| WebSocketError::MessageTooLarge)?;
        }
    }

    fn try_decode_one(&mut self) -> Result<Decoded> {
        loop {
            let outcome = websocket::decode_header(self.recv_buf.peek())?;
            let FrameOutcome::FrameReady { hi, kind, .. } = outcome else {
                return Ok(Decoded::Pending);
            };

            if kind.mask_key.is_some() {
                return Err(WebSocketError::Malformed {
                    reason: "server-to-client frame must not be masked".into(),
                });
            }

            let frame = self.recv_buf.peek()[..hi].to_vec();
            self.recv_buf.consume(hi);

            let mut payload = frame[kind.payload_offset..hi].to_vec();

            match kind.opcode {
                Opcode::Ping => {
                    if payload.len() > 125 {
                        return Err(WebSocketError::Malformed {
                            reason: "ping payload over 125 bytes".into(),
                        });
                    }
                    return Ok(Decoded::Ping(payload));
                }
                Opcode::Pong => continue,
                Opcode::Close => {
                    self.state = WebSocketState::CloseReceived;
                    return Ok(Decoded::Close(payload));
                }
                Opcode::Text | Opcode::Binary if kind.fin => {
                    return Ok(Decoded::Message(finish_message(kind.opcode, payload)?));
                }
                Opcode::Text | Opcode::Binary => {
                    self.partial = Some((kind.opcode, std::mem::take(&mut payload)));
                    continue;
                }
                Opcode::Continuation => {
                    let Some((opcode, mut acc)) = self.partial.take() else {
                        return Err(WebSocketError::Malformed {
                            reason: "continuation frame without a preceding fragment".into(),
                        });
                    };
                    acc.extend_from_slice(&payload);
                    if acc.len() > MAX_MESSAGE_BYTES {
                        return Err(WebSocketError::MessageTooLarge);
                    }
                    if kind.fin {
                        return Ok(Decoded::Message(finish_message(opcode, acc)?));
                    }
                    self.partial = Some((opcode, acc));
                    continue;
                }
            }
        }
    }

    /// Queues a Close frame echoing `code`, transitions to `CloseSent`, then shuts the
    /// channel down if we are the one initiating (i.e. no Close was already received).
    pub async fn close(&mut self, code: u16) -> Result<()> {
        let payload = code.to_be_bytes();
        let mut key = [0u8; 4];
        rand::rng().fill_bytes(&mut key);
        let frame = websocket::encode_frame(true, Opcode::Close, &payload, Some(key));
        self.channel.write_all(&frame).await.context(IoSnafu)?;
        self.channel.flush().await.context(IoSnafu)?;
        self.state = WebSocketState::CloseSent;
        Ok(())
    }
}

fn finish_message(opcode: Opcode, payload: Vec<u8>) -> Result<Message> {
    match opcode {
        Opcode::Text => String::from_utf8(payload)
            .map(Message::Text)
            .map_err(|_| WebSocketError::Malformed {
                reason: "text frame was not valid UTF-8".into(),
            }),
        Opcode::Binary => Ok(Message::Binary(payload)),
        _ => unreachable!("only called for Text/Binary"),
    }
}

async fn read_http_response<S: AsyncRead + Unpin>(channel: &mut S) -> Result<String> {
    let mut reader = BufReader::new(channel);
    let mut response = String::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await.context(IoSnafu)?;
        if n == 0 || line == "\r\n" {
            response.push_str(&line);
            break;
        }
        response.push_str(&line);
    }
    Ok(response)
}

fn verify_handshake_response(response: &str, key: &str) -> Result<()> {
    let mut lines = response.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    if !status_line.contains("101") {
        return Err(WebSocketError::NotUpgraded {
            status_line: status_line.to_string(),
        });
    }

    let accept = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("Sec-WebSocket-Accept"))
        .map(|(_, value)| value.trim().to_string())
        .ok_or(WebSocketError::AcceptMismatch)?;

    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(GUID.as_bytes());
    let expected = base64::engine::general_purpose::STANDARD.encode(hasher.finalize());

    if accept != expected {
        return Err(WebSocketError::AcceptMismatch);
    }

    Ok(())
}
