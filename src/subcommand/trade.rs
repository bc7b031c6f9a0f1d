use {
    super::*,
    exchange::ExchangeSession,
    secure_channel::{Backoff, Channel},
};

#[derive(Debug, Default, Parser)]
pub(crate) struct Trade {
    #[arg(help = "Exchange <wss://HOST[:PORT]/PATH> endpoint.")]
    url: Option<String>,
    #[arg(long, help = "Exchange API <KEY>.")]
    api_key: Option<String>,
    #[arg(long, help = "Market data <CHANNEL> to subscribe to (repeatable).")]
    channel: Vec<String>,
}

impl Trade {
    pub(crate) async fn run(self, config: config::EngineConfig, cancel_token: CancellationToken) -> Result {
        let trade = config.trade;

        let url = self
            .url
            .or(trade.url)
            .ok_or_else(|| anyhow!("exchange url required"))?;

        let _api_key = self.api_key.or(trade.api_key);

        let (host, port, path) = parse_ws_url(&url)?;
        let channels = self.channel;

        info!("Connecting to {url}");

        let mut backoff = Backoff::default();

        while !cancel_token.is_cancelled() {
            let channel = match Channel::connect(&host, port, true).await {
                Ok(channel) => channel,
                Err(err) => {
                    warn!("Failed to connect to {url}: {err}");
                    sleep(backoff.next_delay()).await;
                    continue;
                }
            };

            let mut session = match ExchangeSession::connect(channel, &host, &path, &channels).await {
                Ok(session) => session,
                Err(err) => {
                    warn!("Exchange handshake with {url} failed: {err}");
                    sleep(backoff.next_delay()).await;
                    continue;
                }
            };

            backoff.note_ready();
            info!("Connected to {url}, subscribed to {channels:?}");

            loop {
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => return Ok(()),
                    event = session.recv() => match event {
                        Ok(Some(event)) => info!("{event:?}"),
                        Ok(None) => {
                            info!("Exchange connection to {url} closed");
                            break;
                        }
                        Err(err) => {
                            warn!("Exchange session error with {url}: {err}");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn parse_ws_url(url: &str) -> Result<(String, u16, String)> {
    let rest = url
        .strip_prefix("wss://")
        .ok_or_else(|| anyhow!("only wss:// exchange URLs are supported, got {url}"))?;

    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, format!("/{path}")),
        None => (rest, "/".to_string()),
    };

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (
            host.to_string(),
            port.parse()
                .with_context(|| format!("invalid port in {url}"))?,
        ),
        None => (authority.to_string(), 443),
    };

    Ok((host, port, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port_and_path() {
        assert_eq!(
            parse_ws_url("wss://exchange.example.com:8443/v1/stream").unwrap(),
            (
                "exchange.example.com".to_string(),
                8443,
                "/v1/stream".to_string()
            )
        );
    }

    #[test]
    fn defaults_to_port_443_and_root_path() {
        assert_eq!(
            parse_ws_url("wss://exchange.example.com").unwrap(),
            ("exchange.example.com".to_string(), 443, "/".to_string())
        );
    }

    #[test]
    fn rejects_non_wss_scheme() {
        assert!(parse_ws_url("ws://exchange.example.com").is_err());
    }

    fn parse_trade_args(args: &str) -> Trade {
        match Arguments::try_parse_from(args.split_whitespace()) {
            Ok(arguments) => match arguments.subcommand {
                Subcommand::Trade(trade) => trade,
                subcommand => panic!("unexpected subcommand: {subcommand:?}"),
            },
            Err(err) => panic!("error parsing arguments: {err}"),
        }
    }

    #[test]
    fn parse_args_with_url() {
        let trade = parse_trade_args("stratum-engine trade wss://exchange.example.com/v1/stream");
        assert_eq!(
            trade.url,
            Some("wss://exchange.example.com/v1/stream".into())
        );
    }

    #[test]
    fn parse_args_with_api_key() {
        let trade = parse_trade_args(
            "stratum-engine trade wss://exchange.example.com --api-key secret",
        );
        assert_eq!(trade.api_key, Some("secret".into()));
    }

    #[test]
    fn parse_args_with_repeated_channels() {
        let trade = parse_trade_args(
            "stratum-engine trade wss://exchange.example.com --channel trades --channel book",
        );
        assert_eq!(trade.channel, vec!["trades".to_string(), "book".to_string()]);
    }

    #[test]
    fn parse_args_without_url_is_none() {
        let trade = parse_trade_args("stratum-engine trade");
        assert!(trade.url.is_none());
    }
}
