#![allow(clippy::too_many_arguments)]
use {
    anyhow::{Context, Error, anyhow, bail, ensure},
    arguments::Arguments,
    bitcoin::{
        Address, BlockHash, CompactTarget, Network, Target, TxMerkleNode, Txid,
        address::NetworkUnchecked,
        block::{self, Header},
        consensus::{self, Decodable, Encodable},
        hashes::{Hash, sha256d},
    },
    byteorder::{BigEndian, ByteOrder, LittleEndian},
    chain::Chain,
    derive_more::Display,
    hash_rate::HashRate,
    hex::FromHex,
    rand::Rng,
    serde::{
        Deserialize, Serialize, Serializer,
        de::{self, Deserializer},
        ser::SerializeSeq,
    },
    serde_json::Value,
    serde_with::{DeserializeFromStr, SerializeDisplay},
    snafu::{ResultExt, Snafu},
    std::{
        collections::{BTreeMap, HashMap},
        env,
        fmt::{self, Display, Formatter},
        fs,
        io::{self, Write},
        net::SocketAddr,
        ops::{Add, BitAnd, BitOr, BitXor, Not},
        path::{Path, PathBuf},
        process,
        str::FromStr,
        sync::{
            Arc, LazyLock,
            atomic::{AtomicBool, AtomicU64, Ordering},
        },
        time::{Duration, Instant, SystemTime, UNIX_EPOCH},
    },
    stratum::{
        Authorize, Configure, Difficulty, Id, Message, Nbits, Notify, Ntime, PrevHash,
        SetDifficulty, Submit, Subscribe, SubscribeResult, Username, Version,
    },
    throbber::{StatusLine, spawn_throbber},
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter},
        net::{TcpListener, TcpStream, lookup_host},
        runtime::Runtime,
        sync::{Mutex, mpsc, oneshot, watch},
        task::{self, JoinHandle, JoinSet},
        time::{MissedTickBehavior, interval, sleep},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
    tracing_subscriber::EnvFilter,
};

mod arguments;
mod chain;
pub mod config;
pub mod exchange;
pub mod hash_rate;
pub mod mempool;
pub mod p2p;
pub mod secure_channel;
mod signal;
pub mod stratum;
pub mod subcommand;
mod throbber;
pub mod websocket;

pub const COIN_VALUE: u64 = 100_000_000;
pub const USER_AGENT: &str = "stratum-engine/0.1.0";
pub const EXTRANONCE2_SIZE: usize = 8;

type Result<T = (), E = Error> = std::result::Result<T, E>;

fn target_as_block_hash(target: bitcoin::Target) -> BlockHash {
    BlockHash::from_raw_hash(Hash::from_byte_array(target.to_le_bytes()))
}

pub(crate) fn integration_test() -> bool {
    env::var_os("PARA_INTEGRATION_TEST").is_some()
}

pub(crate) fn logs_enabled() -> bool {
    env::var_os("RUST_LOG").is_some()
}

pub(crate) async fn resolve_stratum_endpoint(endpoint: &str) -> Result<SocketAddr> {
    lookup_host(endpoint)
        .await
        .with_context(|| format!("failed to resolve {endpoint}"))?
        .next()
        .ok_or_else(|| anyhow!("no addresses found for {endpoint}"))
}

pub fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Arguments::parse_and_merge_config();

    let result = match Runtime::new() {
        Ok(rt) => rt.block_on(args.run()),
        Err(err) => Err(err.into()),
    };

    match result {
        Err(err) if err.is::<config::ConfigError>() => {
            error!("config error: {err}");
            process::exit(1);
        }
        Err(err) => {
            error!("error: {err}");

            if env::var_os("RUST_BACKTRACE")
                .map(|val| val == "1")
                .unwrap_or_default()
            {
                error!("{}", err.backtrace());
            }
            process::exit(2);
        }
        Ok(_) => {
            process::exit(0);
        }
    }
}
