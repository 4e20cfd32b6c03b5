// Copyright 2025 Treeline Labs
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use log::{info, warn};
use solana_sdk::signer::keypair::read_keypair_file;
use treeline_config::TreelineConfig;
use treeline_core::accumulator::{AccumulatorConfig, DepositAccumulator};
use treeline_core::ingest;
use treeline_core::ledger::{LedgerClient, LedgerConfig, MockLedger, SolanaLedger};
use treeline_core::service::DepositService;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Treeline operator starting...");

    let config = TreelineConfig::load()?;

    let accumulator = DepositAccumulator::new(AccumulatorConfig {
        depth: config.tree.depth,
        batch_exponent: config.tree.batch_exponent,
    })?;

    let ledger: Box<dyn LedgerClient> = match &config.solana.keypair_path {
        Some(path) => {
            let keypair = read_keypair_file(path).map_err(|e| {
                anyhow::anyhow!("Failed to read operator keypair '{}': {}", path, e)
            })?;
            let ledger_config = LedgerConfig {
                rpc_url: config.solana.rpc_url.clone(),
                rollup_program_id: config.solana.rollup_program_id.clone(),
                domain: config
                    .solana
                    .domain
                    .as_deref()
                    .map(LedgerConfig::domain_from_str)
                    .unwrap_or_else(|| LedgerConfig::default().domain),
                ..LedgerConfig::default()
            };
            info!(
                "Submitting batches to rollup program {}",
                ledger_config.rollup_program_id
            );
            Box::new(SolanaLedger::new(ledger_config, keypair)?)
        }
        None => {
            warn!("No operator keypair configured. Using MockLedger; batches will not reach L1.");
            Box::new(MockLedger::new())
        }
    };

    let service = DepositService::start(accumulator, ledger, &config.service);

    let ingest_service = service.clone();
    let ws_url = config.solana.ws_url.clone();
    let rollup_program_id = config.solana.rollup_program_id.clone();
    tokio::spawn(async move {
        ingest::start_ingest(ingest_service, ws_url, rollup_program_id).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    service.shutdown().await?;
    Ok(())
}
