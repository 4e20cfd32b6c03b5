//! Deposit event ingestion
//!
//! Watches the rollup bridge program's transaction logs over the Solana
//! WebSocket pubsub API and forwards parsed deposit requests into the
//! deposit service channel. The service task stays the single writer;
//! this task only parses and sends.

use std::str::FromStr;

use ark_bn254::Fr;
use log::{error, info, warn};
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_commitment_config::CommitmentConfig;
use tokio_stream::StreamExt;

use crate::account::DepositRequest;
use crate::service::DepositService;

const DEPOSIT_LOG_PREFIX: &str = "Program log: TL_DEPOSIT:";

/// Subscribe to deposit logs and feed the service until the stream ends.
///
/// A subscription failure is logged and the task returns; the service
/// keeps operating on whatever was already queued, with no new
/// admissions until the source is restored.
pub async fn start_ingest(service: DepositService, ws_url: String, rollup_program_id: String) {
    info!("Deposit ingest started. Watching: {}", rollup_program_id);

    let pubsub = match PubsubClient::new(&ws_url).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to Solana WSS: {}", e);
            return;
        }
    };

    let (mut stream, _unsub) = match pubsub
        .logs_subscribe(
            RpcTransactionLogsFilter::Mentions(vec![rollup_program_id]),
            RpcTransactionLogsConfig {
                commitment: Some(CommitmentConfig::confirmed()),
            },
        )
        .await
    {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to subscribe to logs: {}", e);
            return;
        }
    };

    while let Some(response) = stream.next().await {
        for log in response.value.logs {
            if let Some(payload) = log.strip_prefix(DEPOSIT_LOG_PREFIX) {
                if let Some(request) = parse_deposit_log(payload) {
                    info!(
                        "Deposit received: amount {}, token {}",
                        request.amount, request.token_type
                    );
                    if let Err(e) = service.deposit(request).await {
                        error!("Failed to admit deposit: {}", e);
                    }
                }
            }
        }
    }

    warn!("Deposit log stream ended; no new admissions until the source is restored");
}

/// Parses format: "TL_DEPOSIT:<pubkey_x>:<pubkey_y>:<amount>:<token_type>"
/// with the public key coordinates as decimal field elements.
fn parse_deposit_log(payload: &str) -> Option<DepositRequest> {
    let parts: Vec<&str> = payload.split(':').collect();
    if parts.len() != 4 {
        warn!("Malformed deposit log: {}", payload);
        return None;
    }

    let pubkey_x = Fr::from_str(parts[0].trim()).ok()?;
    let pubkey_y = Fr::from_str(parts[1].trim()).ok()?;
    let amount = parts[2].trim().parse::<u64>().ok()?;
    let token_type = parts[3].trim().parse::<u32>().ok()?;

    Some(DepositRequest {
        pubkey_x,
        pubkey_y,
        amount,
        token_type,
    })
}
