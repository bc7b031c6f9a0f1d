//! Opaque bidirectional byte stream over plain TCP or TLS, with graceful close and the
//! exponential reconnect backoff shared by every session kind (Stratum, Bitcoin P2P,
//! Exchange). Async-native throughout (tokio everywhere, no manual polling); TLS is a
//! client connector only, there is no server-side listener here.
use {
    super::*,
    std::sync::LazyLock as StdLazyLock,
    tokio::net::lookup_host,
    tokio_rustls::{
        TlsConnector,
        client::TlsStream,
        rustls::{ClientConfig as RustlsClientConfig, RootCertStore, pki_types::ServerName},
    },
};

#[derive(Debug, Snafu)]
pub enum ChannelError {
    #[snafu(display("failed to resolve {host}:{port}"))]
    Resolve { source: io::Error, host: String, port: u16 },
    #[snafu(display("no addresses found for {host}:{port}"))]
    NoAddress { host: String, port: u16 },
    #[snafu(display("failed to connect to {addr}"))]
    Connect { source: io::Error, addr: SocketAddr },
    #[snafu(display("TLS handshake with {host} failed"))]
    Handshake {
        source: io::Error,
        host: String,
    },
    #[snafu(display("invalid TLS server name {host}"))]
    InvalidServerName { host: String },
    #[snafu(display("channel I/O error"))]
    Io { source: io::Error },
}

pub type Result<T, E = ChannelError> = std::result::Result<T, E>;

static ROOTS: StdLazyLock<RootCertStore> = StdLazyLock::new(|| {
    let mut store = RootCertStore::empty();
    store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    store
});

enum Inner {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// A connected duplex byte stream. `AsyncRead`/`AsyncWrite` give callers `read`/`write`
/// directly; `close` performs the TLS close-notify (if any) then the TCP FIN.
pub struct Channel {
    inner: Inner,
}

impl Channel {
    /// Resolves `host:port`, opens a TCP connection, and if `tls` performs a TLS 1.2+
    /// handshake with SNI = `host`, verifying the server certificate chain against the
    /// bundled Mozilla root set. There is no caller-exposed way to disable verification;
    /// the spec's debug-only insecure flag is intentionally not wired into production
    /// builds of this engine.
    pub async fn connect(host: &str, port: u16, tls: bool) -> Result<Self> {
        let addr = resolve(host, port).await?;

        let tcp = TcpStream::connect(addr)
            .await
            .context(ConnectSnafu { addr })?;

        if !tls {
            return Ok(Self {
                inner: Inner::Plain(tcp),
            });
        }

        let config = RustlsClientConfig::builder()
            .with_root_certificates(ROOTS.clone())
            .with_no_client_auth();

        let connector = TlsConnector::from(Arc::new(config));

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| InvalidServerNameSnafu { host }.build())?;

        let stream = connector
            .connect(server_name, tcp)
            .await
            .context(HandshakeSnafu { host })?;

        Ok(Self {
            inner: Inner::Tls(Box::new(stream)),
        })
    }

    /// Graceful shutdown: TLS close-notify (if this is a TLS channel) then TCP FIN.
    /// Idempotent — shutting down an already-shut-down stream is a no-op error we swallow.
    pub async fn close(&mut self) -> Result<()> {
        let result = match &mut self.inner {
            Inner::Plain(tcp) => tcp.shutdown().await,
            Inner::Tls(tls) => tls.shutdown().await,
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(source) => Err(ChannelError::Io { source }),
        }
    }
}

impl AsyncRead for Channel {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Plain(tcp) => std::pin::Pin::new(tcp).poll_read(cx, buf),
            Inner::Tls(tls) => std::pin::Pin::new(tls.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Channel {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Plain(tcp) => std::pin::Pin::new(tcp).poll_write(cx, buf),
            Inner::Tls(tls) => std::pin::Pin::new(tls.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Plain(tcp) => std::pin::Pin::new(tcp).poll_flush(cx),
            Inner::Tls(tls) => std::pin::Pin::new(tls.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Plain(tcp) => std::pin::Pin::new(tcp).poll_shutdown(cx),
            Inner::Tls(tls) => std::pin::Pin::new(tls.as_mut()).poll_shutdown(cx),
        }
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    lookup_host((host, port))
        .await
        .context(ResolveSnafu { host, port })?
        .next()
        .ok_or_else(|| NoAddressSnafu { host, port }.build())
}

/// Exponential reconnect backoff shared by every session kind: base 500 ms, doubling per
/// failure, capped at 30 s, reset after 60 s of continuous `Ready` state.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    reset_after: Duration,
    attempt: u32,
    ready_since: Option<Instant>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(30),
            reset_after: Duration::from_secs(60),
            attempt: 0,
            ready_since: None,
        }
    }
}

impl Backoff {
    pub fn next_delay(&mut self) -> Duration {
        let delay = self
            .base
            .saturating_mul(1 << self.attempt.min(16))
            .min(self.cap);
        self.attempt = self.attempt.saturating_add(1);
        self.ready_since = None;
        delay
    }

    /// Call once a session reaches `Ready`; after `reset_after` of continuous readiness
    /// the attempt counter drops back to zero so a later failure starts at `base` again.
    pub fn note_ready(&mut self) {
        let now_ready_since = self.ready_since.get_or_insert_with(Instant::now);
        if now_ready_since.elapsed() >= self.reset_after {
            self.attempt = 0;
        }
    }
}
