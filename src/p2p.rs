//! Bitcoin P2P Session: version/verack handshake, mempool ingest via inv/getdata
//! batching, and ping/pong liveness. Frame-boundary detection is `wire::framer`'s job;
//! this module decodes payloads with `bitcoin::p2p::message::RawNetworkMessage` into a
//! standalone long-lived session rather than a one-shot sync.
use {
    super::*,
    bitcoin::{
        hashes::sha256d,
        p2p::{
            Address as P2pAddress, ServiceFlags,
            message::{NetworkMessage, RawNetworkMessage},
            message_blockdata::Inventory,
            message_network::VersionMessage,
        },
    },
    wire::{
        buffer::FrameOutcome,
        framer::{self, BITCOIN_HEADER_LEN},
    },
};

const PROTOCOL_VERSION: u32 = 70015;
const GETDATA_BATCH_INTERVAL: Duration = Duration::from_millis(200);
const GETDATA_BATCH_SIZE: usize = 500;
const PING_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const PONG_TIMEOUT: Duration = Duration::from_secs(20);
const RECV_BUF_CAP: usize = BITCOIN_HEADER_LEN + framer::BITCOIN_MAX_PAYLOAD;

#[derive(Debug, Snafu)]
pub enum P2pError {
    #[snafu(display("channel I/O error"))]
    Io { source: io::Error },
    #[snafu(display("malformed P2P message: {reason}"))]
    Malformed { reason: String },
    #[snafu(display("received {command} before handshake completed"))]
    ProtocolBeforeHandshake { command: String },
    #[snafu(display("no pong within {PONG_TIMEOUT:?} of ping"))]
    PongTimeout,
    #[snafu(display("peer closed the connection"))]
    Eof,
}

pub type Result<T, E = P2pError> = std::result::Result<T, E>;

impl From<wire::FrameError> for P2pError {
    fn from(err: wire::FrameError) -> Self {
        P2pError::Malformed {
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum P2pState {
    Connecting,
    Handshaking,
    Ready,
    Closed,
}

/// A transaction accepted off the wire, ready to hand to the Mempool Index. Fee is 0
/// unless an external UTXO oracle is wired in (spec treats this as an optional
/// collaborator; we don't have one, so every ingested transaction records fee 0 and a
/// weight computed locally per BIP 141).
pub struct IngestedTx {
    pub txid: Txid,
    pub weight: u32,
    pub raw: Vec<u8>,
}

pub struct P2pSession<S> {
    channel: S,
    magic: u32,
    state: P2pState,
    verack_sent: bool,
    verack_received: bool,
    recv_buf: wire::FrameBuffer,
    pending_getdata: Vec<Inventory>,
    last_batch: Instant,
    known_txids: std::collections::HashSet<Txid>,
    last_activity: Instant,
    ping_nonce: Option<(u64, Instant)>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> P2pSession<S> {
    pub fn new(channel: S, magic: u32) -> Self {
        Self {
            channel,
            magic,
            state: P2pState::Connecting,
            verack_sent: false,
            verack_received: false,
            recv_buf: wire::FrameBuffer::new(RECV_BUF_CAP),
            pending_getdata: Vec::new(),
            last_batch: Instant::now(),
            known_txids: std::collections::HashSet::new(),
            last_activity: Instant::now(),
            ping_nonce: None,
        }
    }

    pub fn state(&self) -> P2pState {
        self.state
    }

    /// Sends our `version`, then blocks until both sides have exchanged `verack`.
    /// Anything other than `version`/`verack` seen before that point is a protocol
    /// error and the session must close without recording it.
    pub async fn handshake(&mut self, start_height: i32, user_agent: &str) -> Result<()> {
        self.state = P2pState::Handshaking;

        let version = NetworkMessage::Version(VersionMessage::new(
            ServiceFlags::NONE,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64,
            P2pAddress::new(&"0.0.0.0:0".parse().unwrap(), ServiceFlags::NONE),
            P2pAddress::new(&"0.0.0.0:0".parse().unwrap(), ServiceFlags::NONE),
            rand::random(),
            user_agent.to_string(),
            start_height,
        ));
        self.send(version).await?;

        loop {
            let message = self.recv_one().await?;
            match message {
                NetworkMessage::Version(_) => {
                    self.send(NetworkMessage::Verack).await?;
                    self.verack_sent = true;
                }
                NetworkMessage::Verack => {
                    self.verack_received = true;
                }
                other => {
                    return Err(P2pError::ProtocolBeforeHandshake {
                        command: command_name(&other),
                    });
                }
            }

            if self.verack_sent && self.verack_received {
                self.state = P2pState::Ready;
                return Ok(());
            }
        }
    }

    /// Requests the peer's mempool; replies arrive as `inv` and are queued for
    /// `poll_getdata_batch`.
    pub async fn request_mempool(&mut self) -> Result<()> {
        self.send(NetworkMessage::MemPool).await
    }

    /// Reads and handles exactly one message, returning an ingested transaction if the
    /// message was a `tx` we didn't already know about. Non-tx traffic (inv queuing,
    /// pong bookkeeping) is handled internally and yields `None`.
    ///
    /// Liveness is enforced here too: after `PING_IDLE_TIMEOUT` of silence we send a
    /// `ping` and start a `PONG_TIMEOUT` deadline; if the matching `pong` doesn't arrive
    /// in time the peer is considered dead and `PongTimeout` is returned.
    pub async fn poll(&mut self) -> Result<Option<IngestedTx>> {
        if self.state != P2pState::Ready {
            return Err(P2pError::ProtocolBeforeHandshake {
                command: "<not ready>".into(),
            });
        }

        loop {
            let deadline = match self.ping_nonce {
                Some((_, sent_at)) => sent_at + PONG_TIMEOUT,
                None => self.last_activity + PING_IDLE_TIMEOUT,
            };
            let timeout = deadline.saturating_duration_since(Instant::now());

            tokio::select! {
                biased;
                message = self.recv_one() => {
                    let message = message?;
                    self.last_activity = Instant::now();

                    match message {
                        NetworkMessage::Inv(items) => {
                            for item in items {
                                if let Inventory::Transaction(txid) = item {
                                    if !self.known_txids.contains(&txid) {
                                        self.pending_getdata.push(Inventory::Transaction(txid));
                                    }
                                }
                            }
                            return Ok(None);
                        }
                        NetworkMessage::Tx(tx) => {
                            let mut raw = Vec::new();
                            tx.consensus_encode(&mut raw)
                                .map_err(|err| P2pError::Malformed {
                                    reason: err.to_string(),
                                })?;
                            let txid = tx.compute_txid();
                            self.known_txids.insert(txid);
                            let weight = tx.weight().to_wu() as u32;
                            return Ok(Some(IngestedTx { txid, weight, raw }));
                        }
                        NetworkMessage::Ping(nonce) => {
                            self.send(NetworkMessage::Pong(nonce)).await?;
                            return Ok(None);
                        }
                        NetworkMessage::Pong(nonce) => {
                            if matches!(self.ping_nonce, Some((expected, _)) if expected == nonce) {
                                self.ping_nonce = None;
                            }
                            return Ok(None);
                        }
                        _ => return Ok(None),
                    }
                }
                _ = sleep(timeout) => {
                    if self.ping_nonce.take().is_some() {
                        return Err(P2pError::PongTimeout);
                    }

                    let nonce = rand::random();
                    self.send(NetworkMessage::Ping(nonce)).await?;
                    self.ping_nonce = Some((nonce, Instant::now()));
                }
            }
        }
    }

    /// Flushes the pending-getdata queue if it has been `GETDATA_BATCH_INTERVAL` since
    /// the last batch, or has reached `GETDATA_BATCH_SIZE` entries.
    pub async fn maybe_flush_getdata(&mut self) -> Result<()> {
        let due_by_time = self.last_batch.elapsed() >= GETDATA_BATCH_INTERVAL;
        let due_by_size = self.pending_getdata.len() >= GETDATA_BATCH_SIZE;

        if self.pending_getdata.is_empty() || !(due_by_time || due_by_size) {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.pending_getdata);
        self.send(NetworkMessage::GetData(batch)).await?;
        self.last_batch = Instant::now();
        Ok(())
    }

    async fn send(&mut self, payload: NetworkMessage) -> Result<()> {
        let raw = RawNetworkMessage::new(self.magic, payload);
        let mut bytes = Vec::new();
        raw.consensus_encode(&mut bytes)
            .map_err(|err| P2pError::Malformed {
                reason: err.to_string(),
            })?;
        self.channel.write_all(&bytes).await.context(IoSnafu)?;
        self.channel.flush().await.context(IoSnafu)
    }

    async fn recv_one(&mut self) -> Result<NetworkMessage> {
        loop {
            let magic = self.magic;
            let outcome = framer::parse_bitcoin_message(self.recv_buf.peek(), magic, checksum4)?;

            if let FrameOutcome::FrameReady { hi, .. } = outcome {
                let frame = self.recv_buf.peek()[..hi].to_vec();
                self.recv_buf.consume(hi);
                let raw: RawNetworkMessage = consensus::deserialize(&frame)
                    .map_err(|err| P2pError::Malformed { reason: err.to_string() })?;
                return Ok(raw.payload().clone());
            }

            let mut chunk = [0u8; 4096];
            let n = self.channel.read(&mut chunk).await.context(IoSnafu)?;
            if n == 0 {
                self.state = P2pState::Closed;
                return Err(P2pError::Eof);
            }
            self.recv_buf
                .append(&chunk[..n])
                .map_err(|err| P2pError::Malformed { reason: err.to_string() })?;
        }
    }
}

fn checksum4(payload: &[u8]) -> [u8; 4] {
    let hash = sha256d::Hash::hash(payload);
    let bytes = hash.to_byte_array();
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

fn command_name(message: &NetworkMessage) -> String {
    message.command().to_string()
}
