use {
    super::*,
    mempool::{MempoolEntry, MempoolIndex},
    p2p::P2pSession,
    secure_channel::{Backoff, Channel},
};

const DEFAULT_CAPACITY_BYTES: usize = 300_000_000;

#[derive(Debug, Parser)]
pub(crate) struct Node {
    #[arg(help = "Bitcoin P2P peer <HOST:PORT>.")]
    address: Option<String>,
    #[arg(long, value_enum, help = "Bitcoin <CHAIN> to connect to.")]
    chain: Option<Chain>,
    #[arg(
        long,
        default_value_t = DEFAULT_CAPACITY_BYTES,
        help = "Mempool capacity in <BYTES>."
    )]
    capacity_bytes: usize,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            address: None,
            chain: None,
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
        }
    }
}

impl Node {
    pub(crate) async fn run(self, config: config::EngineConfig, cancel_token: CancellationToken) -> Result {
        let node = config.node;

        let chain = self.chain.or(node.chain).unwrap_or_default();

        let address = self
            .address
            .or(node.address)
            .unwrap_or_else(|| format!("127.0.0.1:{}", chain.default_p2p_port()));

        let (host, port) = split_host_port(&address)?;

        info!("Connecting to {address} ({chain})");

        let mut mempool = MempoolIndex::new(self.capacity_bytes);
        let mut backoff = Backoff::default();

        while !cancel_token.is_cancelled() {
            let channel = match Channel::connect(&host, port, false).await {
                Ok(channel) => channel,
                Err(err) => {
                    warn!("Failed to connect to {address}: {err}");
                    sleep(backoff.next_delay()).await;
                    continue;
                }
            };

            let mut session = P2pSession::new(channel, chain.magic());

            if let Err(err) = session.handshake(0, USER_AGENT).await {
                warn!("P2P handshake with {address} failed: {err}");
                sleep(backoff.next_delay()).await;
                continue;
            }

            backoff.note_ready();
            info!("P2P handshake complete, requesting mempool");

            if let Err(err) = session.request_mempool().await {
                warn!("mempool request failed: {err}");
                continue;
            }

            loop {
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        info!(
                            "Shutting down. Mempool held {} transactions, {} bytes",
                            mempool.len(),
                            mempool.total_bytes()
                        );
                        return Ok(());
                    }
                    result = session.poll() => match result {
                        Ok(Some(tx)) => {
                            let entry = MempoolEntry {
                                txid: tx.txid,
                                weight: tx.weight,
                                fee: 0,
                                first_seen: Instant::now(),
                                raw: tx.raw,
                            };
                            if let Err(err) = mempool.insert(entry) {
                                debug!("mempool rejected {}: {}", tx.txid, err);
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!("P2P session error with {address}: {err}");
                            break;
                        }
                    }
                }

                if let Err(err) = session.maybe_flush_getdata().await {
                    warn!("getdata flush failed: {err}");
                    break;
                }
            }

            info!(
                "Disconnected from {address}. Mempool holds {} transactions, {} bytes",
                mempool.len(),
                mempool.total_bytes()
            );
        }

        Ok(())
    }
}

fn split_host_port(address: &str) -> Result<(String, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("expected <HOST:PORT>, got {address}"))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid port in {address}"))?;
    Ok((host.to_string(), port))
}
