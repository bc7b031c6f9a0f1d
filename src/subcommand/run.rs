use super::*;

/// Drives mining, P2P mempool ingestion, and exchange execution concurrently under one
/// shared cancellation token, standing in for the single-loop scheduler described for a
/// from-scratch implementation: here tokio's own task scheduler plays that role, and
/// each session already honors `cancel_token` cooperatively at its own suspension points.
#[derive(Debug, Parser)]
pub(crate) struct Run;

impl Run {
    pub(crate) async fn run(self, config: config::EngineConfig, cancel_token: CancellationToken) -> Result {
        let mut tasks = JoinSet::new();

        {
            let config = config.clone();
            let cancel_token = cancel_token.clone();
            tasks.spawn(async move {
                if let Err(err) = mine::Mine::default().run(config, cancel_token).await {
                    error!("mining session ended: {err}");
                }
            });
        }

        {
            let config = config.clone();
            let cancel_token = cancel_token.clone();
            tasks.spawn(async move {
                if let Err(err) = node::Node::default().run(config, cancel_token).await {
                    error!("node session ended: {err}");
                }
            });
        }

        {
            let config = config.clone();
            let cancel_token = cancel_token.clone();
            tasks.spawn(async move {
                if let Err(err) = trade::Trade::default().run(config, cancel_token).await {
                    error!("trade session ended: {err}");
                }
            });
        }

        while tasks.join_next().await.is_some() {}

        Ok(())
    }
}
