//! Deposit service
//!
//! Single-writer service loop around the accumulator and the ledger
//! client. Deposits arrive as messages over an mpsc channel; one spawned
//! task owns all mutable state, so no locking is needed in the core.
//! Batch submission is awaited inline by that task, which makes batch
//! commits strictly serialized: deposits that arrive while a submission
//! is in flight simply buffer in the channel until it resolves.
//!
//! A failed submission leaves the accumulator untouched (the staged
//! batch is dropped); the poll ticker retries it from identical state.
//!
//! A confirmed submission whose reported root disagrees with the local
//! tree is different: the ledger and the operator have diverged, and
//! resubmitting cannot reconcile them. Batch processing halts, the
//! condition is exposed through [`ServiceStats::halted`], and operator
//! intervention is required.

use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::sync::{mpsc, oneshot};
use treeline_config::ServiceConfig;

use crate::account::DepositRequest;
use crate::accumulator::DepositAccumulator;
use crate::error::OperatorError;
use crate::hash;
use crate::ledger::{BatchCommit, LedgerClient};

// ============================================================================
// Commands and Stats
// ============================================================================

/// Commands for the deposit service
enum DepositCommand {
    /// Admit a deposit
    Deposit(DepositRequest, oneshot::Sender<Result<()>>),
    /// Get service statistics
    Stats(oneshot::Sender<ServiceStats>),
    /// Shutdown
    Shutdown,
}

/// Snapshot of the accumulator state
#[derive(Debug, Clone)]
pub struct ServiceStats {
    /// Deposits waiting for a batch
    pub pending_deposits: usize,
    /// Next unfilled batch slot
    pub batch_index: usize,
    /// Accounts admitted into the tree
    pub account_count: usize,
    /// Committed subtree roots recorded so far
    pub committed_subtree_roots: usize,
    /// Current local root
    pub root: [u8; 32],
    /// Batch processing is parked after a root mismatch with the ledger
    pub halted: bool,
}

// ============================================================================
// Service
// ============================================================================

/// Handle to the deposit service task
#[derive(Clone)]
pub struct DepositService {
    command_tx: mpsc::Sender<DepositCommand>,
}

impl DepositService {
    /// Start the service loop, taking ownership of the accumulator and
    /// the ledger client.
    pub fn start(
        mut accumulator: DepositAccumulator,
        mut ledger: Box<dyn LedgerClient>,
        config: &ServiceConfig,
    ) -> Self {
        let (command_tx, mut command_rx) = mpsc::channel::<DepositCommand>(config.channel_capacity);
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            let mut halted = false;

            loop {
                tokio::select! {
                    Some(cmd) = command_rx.recv() => {
                        match cmd {
                            DepositCommand::Deposit(request, reply) => {
                                let admitted = accumulator.enqueue(request);
                                let _ = reply.send(admitted.map_err(Into::into));
                                if !halted {
                                    halted = process_ready(&mut accumulator, ledger.as_mut());
                                }
                            }
                            DepositCommand::Stats(reply) => {
                                let _ = reply.send(collect_stats(&accumulator, halted));
                            }
                            DepositCommand::Shutdown => {
                                let pending = accumulator.pending_len();
                                if pending > 0 {
                                    warn!("Shutting down with {} deposits still pending", pending);
                                }
                                info!("Deposit service shutdown complete");
                                break;
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        // retries batches whose submission previously failed
                        if !halted {
                            halted = process_ready(&mut accumulator, ledger.as_mut());
                        }
                    }
                }
            }
        });

        Self { command_tx }
    }

    /// Admit a deposit. Errors only if the tree can never seat it.
    pub async fn deposit(&self, request: DepositRequest) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(DepositCommand::Deposit(request, reply_tx))
            .await
            .context("deposit service unavailable")?;
        reply_rx.await.context("deposit service crashed")?
    }

    /// Get service statistics
    pub async fn stats(&self) -> Result<ServiceStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(DepositCommand::Stats(reply_tx))
            .await
            .context("deposit service unavailable")?;
        reply_rx.await.context("deposit service crashed")
    }

    /// Shutdown the service
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(DepositCommand::Shutdown)
            .await
            .context("deposit service unavailable")?;
        Ok(())
    }
}

// ============================================================================
// Batch processing
// ============================================================================

/// Stage and submit every full batch in the queue. Submission errors are
/// logged and left for the ticker to retry; the accumulator is unchanged
/// on any failure.
///
/// Returns `true` if processing must halt: the ledger confirmed a commit
/// but reported a divergent root, so resubmitting the same batch can
/// only fire useless transactions.
fn process_ready(accumulator: &mut DepositAccumulator, ledger: &mut dyn LedgerClient) -> bool {
    loop {
        match submit_next(accumulator, ledger) {
            Ok(true) => continue,
            Ok(false) => return false,
            Err(e @ OperatorError::RootMismatch { .. }) => {
                error!("Halting batch processing, operator intervention required: {}", e);
                return true;
            }
            Err(e) => {
                error!("Batch commit failed: {}", e);
                return false;
            }
        }
    }
}

/// Submit one staged batch if the queue holds a full one. Returns whether
/// a batch was committed.
fn submit_next(
    accumulator: &mut DepositAccumulator,
    ledger: &mut dyn LedgerClient,
) -> Result<bool, OperatorError> {
    let Some(staged) = accumulator.stage_batch()? else {
        return Ok(false);
    };

    let batch_index = staged.batch_index as u64;
    let commit = BatchCommit {
        batch_index,
        batch_size_exponent: accumulator.config().batch_exponent as u8,
        position: staged.position.clone(),
        proof: staged.proof.iter().map(hash::field_to_bytes).collect(),
        subtree_root: hash::field_to_bytes(&staged.subtree_root),
        expected_root: hash::field_to_bytes(&staged.tree.root()),
    };

    info!(
        "Submitting batch {} at position {:?}",
        batch_index, commit.position
    );

    let receipt = ledger
        .submit_batch(&commit)
        .map_err(|source| OperatorError::LedgerSubmission {
            batch_index,
            source,
        })?;

    // The ledger recomputed the root on its side; it must agree with the
    // locally rebuilt tree before the batch is committed.
    if receipt.root != commit.expected_root {
        return Err(OperatorError::RootMismatch {
            batch_index,
            local: hex::encode(commit.expected_root),
            ledger: hex::encode(receipt.root),
        });
    }

    info!(
        "Batch {} confirmed: {}",
        batch_index, receipt.tx_signature
    );
    accumulator.commit_batch(staged)?;
    Ok(true)
}

fn collect_stats(accumulator: &DepositAccumulator, halted: bool) -> ServiceStats {
    ServiceStats {
        pending_deposits: accumulator.pending_len(),
        batch_index: accumulator.batch_index(),
        account_count: accumulator.accounts().len(),
        committed_subtree_roots: accumulator.subtree_roots().len(),
        root: hash::field_to_bytes(&accumulator.root()),
        halted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::AccumulatorConfig;
    use crate::ledger::MockLedger;
    use ark_bn254::Fr;

    fn request(seed: u64) -> DepositRequest {
        DepositRequest {
            pubkey_x: Fr::from(1000 + seed),
            pubkey_y: Fr::from(2000 + seed),
            amount: 10 * (seed + 1),
            token_type: 0,
        }
    }

    fn start_service() -> (DepositService, MockLedger) {
        let accumulator = DepositAccumulator::new(AccumulatorConfig {
            depth: 4,
            batch_exponent: 2,
        })
        .unwrap();
        let ledger = MockLedger::new();
        let config = ServiceConfig {
            channel_capacity: 64,
            poll_interval_ms: 10,
        };
        let service = DepositService::start(accumulator, Box::new(ledger.clone()), &config);
        (service, ledger)
    }

    #[tokio::test]
    async fn test_deposits_below_capacity_accumulate() {
        let (service, ledger) = start_service();

        for seed in 0..3 {
            service.deposit(request(seed)).await.unwrap();
        }

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.pending_deposits, 3);
        assert_eq!(stats.batch_index, 0);
        assert!(ledger.journal().is_empty());

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_full_batch_is_submitted() {
        let (service, ledger) = start_service();

        for seed in 0..4 {
            service.deposit(request(seed)).await.unwrap();
        }

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.pending_deposits, 0);
        assert_eq!(stats.batch_index, 1);
        assert_eq!(stats.account_count, 4);
        assert_eq!(stats.committed_subtree_roots, 1);

        let journal = ledger.journal();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].position, vec![0, 0]);
        assert_eq!(ledger.current_root().unwrap(), stats.root);

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_root_mismatch_halts_processing() {
        let (service, ledger) = start_service();
        ledger.report_wrong_root_next();

        for seed in 0..4 {
            service.deposit(request(seed)).await.unwrap();
        }

        // the divergent receipt was not committed and processing parked
        let stats = service.stats().await.unwrap();
        assert!(stats.halted);
        assert_eq!(stats.batch_index, 0);
        assert_eq!(stats.pending_deposits, 4);

        // several ticker intervals pass without a resubmission
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(ledger.journal().len(), 1);
        assert!(service.stats().await.unwrap().halted);

        service.shutdown().await.unwrap();
    }
}
