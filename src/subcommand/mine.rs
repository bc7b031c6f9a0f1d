use {
    super::*,
    controller::Controller,
    hasher::Hasher,
    metrics::Metrics,
    stratum::{Client, ClientConfig},
};

mod controller;
mod hasher;
mod metrics;
mod version_rolling;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Mode {
    Continuous,
    ShareFound,
    BlockFound,
}

#[derive(Debug, Default, Parser)]
pub(crate) struct Mine {
    #[arg(help = "Stratum <HOST:PORT>.")]
    stratum_endpoint: Option<String>,
    #[arg(long, help = "Stratum <USERNAME>.")]
    username: Option<String>,
    #[arg(long, help = "Stratum <PASSWORD>.")]
    password: Option<String>,
    #[arg(
        long,
        value_enum,
        help = "Mining mode: <continuous|share-found|block-found>."
    )]
    mode: Option<Mode>,
    #[arg(long, help = "Number of <CPU_CORES> to use.")]
    cpu_cores: Option<usize>,
    #[arg(long, help = "Hash rate to <THROTTLE> to.")]
    throttle: Option<HashRate>,
    #[arg(long, help = "Disable version rolling (BIP 320).")]
    disable_version_rolling: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Share {
    pub extranonce1: Extranonce,
    pub extranonce2: Extranonce,
    pub job_id: JobId,
    pub nonce: Nonce,
    pub ntime: Ntime,
    pub username: Username,
    pub version_bits: Option<Version>,
}

impl Mine {
    pub(crate) async fn run(self, config: config::EngineConfig, cancel_token: CancellationToken) -> Result {
        let mining = config.mining;

        let stratum_endpoint = self
            .stratum_endpoint
            .or(mining.stratum_endpoint)
            .ok_or_else(|| anyhow!("stratum endpoint required"))?;

        let username = self
            .username
            .or(mining.username)
            .ok_or_else(|| anyhow!("username required"))?;

        let password = self.password.or(mining.password);

        let mode_str = self
            .mode
            .map(|m| match m {
                Mode::Continuous => "continuous",
                Mode::ShareFound => "share-found",
                Mode::BlockFound => "block-found",
            })
            .or(mining.mode.as_deref().map(str::to_string).as_deref())
            .unwrap_or("continuous")
            .to_string();

        let mode = match mode_str.as_str() {
            "share-found" => Mode::ShareFound,
            "block-found" => Mode::BlockFound,
            _ => Mode::Continuous,
        };

        let cpu_cores = self.cpu_cores.or(mining.cpu_cores);

        let throttle = self.throttle.or_else(|| {
            mining
                .throttle
                .as_ref()
                .and_then(|s| s.parse::<HashRate>().ok())
        });

        let username: Username = username.into();

        info!("Connecting to {stratum_endpoint} with user {username}");

        let address = resolve_stratum_endpoint(&stratum_endpoint).await?;

        let client_config = ClientConfig {
            address: address.to_string(),
            username: username.clone(),
            user_agent: USER_AGENT.into(),
            password,
            timeout: Duration::from_secs(10),
        };

        let client = Client::new(client_config);

        let available_cpu_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let cpu_cores = if let Some(cpu_cores) = cpu_cores {
            std::cmp::min(cpu_cores, available_cpu_cores)
        } else {
            available_cpu_cores
        };

        info!("Available CPU cores: {}", available_cpu_cores);
        info!("CPU cores to use: {}", cpu_cores);

        let shares = Controller::run(
            client,
            username,
            cpu_cores,
            throttle,
            mode,
            self.disable_version_rolling,
            cancel_token,
        )
        .await?;

        println!("{}", serde_json::to_string_pretty(&shares)?);

        Ok(())
    }
}
