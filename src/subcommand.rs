use super::*;

mod mine;
mod node;
mod run;
mod trade;

#[derive(Debug, Parser)]
pub(crate) enum Subcommand {
    #[command(about = "Mine against a Stratum pool")]
    Mine(mine::Mine),
    #[command(about = "Ingest the Bitcoin P2P mempool")]
    Node(node::Node),
    #[command(about = "Trade against a WebSocket exchange")]
    Trade(trade::Trade),
    #[command(about = "Run mining, node, and trade sessions together")]
    Run(run::Run),
}

impl Subcommand {
    pub(crate) async fn run(self, config: config::EngineConfig, cancel_token: CancellationToken) -> Result {
        match self {
            Self::Mine(mine) => mine.run(config, cancel_token).await,
            Self::Node(node) => node.run(config, cancel_token).await,
            Self::Trade(trade) => trade.run(config, cancel_token).await,
            Self::Run(run) => run.run(config, cancel_token).await,
        }
    }
}
