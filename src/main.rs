//! Main entry point for the poolscout survey loop.

use anyhow::Result;
use poolscout::relay::HttpRelayClient;
use poolscout::survey::{SurveyConfigBuilder, SurveyEngine};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let config = SurveyConfigBuilder::new()
        .with_pool_base_url(env_or("POOLSCOUT_POOL_URL", "http://localhost:4000"))
        .with_relay_endpoints(
            env_or("POOLSCOUT_RELAYS", "http://localhost:7777")
                .split(',')
                .map(str::to_string)
                .collect(),
        )
        .with_address(env_or("POOLSCOUT_ADDRESS", "bc1qdemoaddress"))
        .with_campaign_tag(env_or("POOLSCOUT_CAMPAIGN", "poolscout"))
        .build();

    info!(
        "Starting poolscout for {} against {}",
        config.address, config.pool_base_url
    );

    let relay_client = Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;
    let transport = Arc::new(HttpRelayClient::new(
        relay_client,
        config.relay_endpoints.clone(),
    ));
    let (match_sender, mut match_receiver) = mpsc::channel(16);

    let engine = SurveyEngine::new(config, transport, match_sender)?;
    info!("Surveying as identity {}", engine.surveyor_identity());

    tokio::spawn(async move {
        engine.run().await;
    });

    while let Some(results) = match_receiver.recv().await {
        if results.is_empty() {
            info!("Cycle complete: no corroborating reports this round");
            continue;
        }
        for result in results {
            info!(
                "[{:?}] score {:.2} recent={}: {}",
                result.match_type, result.match_score, result.is_recent, result.analysis
            );
        }
    }

    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
