//! External ledger collaborator
//!
//! Submits batch commits to the rollup contract on Solana L1 and reads
//! back the committed root.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                    Batch Commit Flow                           │
//! │                                                                │
//! │  ┌────────────┐    ┌────────────┐    ┌─────────────────────┐   │
//! │  │   Batch    │───▶│   Submit   │───▶│    Cross-check      │   │
//! │  │   Staged   │    │   to L1    │    │    reported root    │   │
//! │  └────────────┘    └────────────┘    └─────────────────────┘   │
//! │                          │                                     │
//! │                          ▼                                     │
//! │  ┌──────────────────────────────────────────────────────────┐  │
//! │  │              Rollup Program                               │ │
//! │  │  • Recompute root from (position, proof, subtree root)    │ │
//! │  │  • Update the committed root                              │ │
//! │  └──────────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow, bail};
use ark_bn254::Fr;
use solana_client::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};

use crate::accumulator::recombine_root;
use crate::hash;

// ============================================================================
// Types
// ============================================================================

/// A batch-commit request handed to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCommit {
    /// Slot this batch occupies
    pub batch_index: u64,
    /// Batch size exponent k
    pub batch_size_exponent: u8,
    /// Slot position bits, most significant first (length D - k)
    pub position: Vec<u8>,
    /// Sibling hashes above the subtree, innermost first (length D - k)
    pub proof: Vec<[u8; 32]>,
    /// Root of the new subtree
    pub subtree_root: [u8; 32],
    /// Locally computed post-commit root, for equality verification
    pub expected_root: [u8; 32],
}

/// Result of a confirmed ledger submission; an unconfirmed or rejected
/// transaction is an `Err` from `submit_batch`, not a receipt.
#[derive(Debug, Clone)]
pub struct LedgerReceipt {
    /// L1 transaction signature
    pub tx_signature: String,
    /// Root the ledger reports after the update
    pub root: [u8; 32],
}

/// The ledger collaborator interface.
///
/// Implementations recompute the new root from the commit payload on
/// their side; the caller compares the reported root with its own.
pub trait LedgerClient: Send {
    fn submit_batch(&mut self, commit: &BatchCommit) -> Result<LedgerReceipt>;
    fn current_root(&self) -> Result<[u8; 32]>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Solana ledger configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Solana RPC URL
    pub rpc_url: String,
    /// Rollup program ID
    pub rollup_program_id: String,
    /// Domain for the rollup state PDAs (e.g., "solana", "testnet")
    pub domain: [u8; 32],
    /// Confirmation commitment level
    pub commitment: CommitmentConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let mut domain = [0u8; 32];
        domain[..6].copy_from_slice(b"solana");

        Self {
            rpc_url: "http://127.0.0.1:8899".to_string(),
            rollup_program_id: "9HXapBN9otLGnQNGv1HRk91DGqMNvMAvQqohL7gPW1sd".to_string(),
            domain,
            commitment: CommitmentConfig::confirmed(),
        }
    }
}

impl LedgerConfig {
    /// Build a domain tag from a configured string
    pub fn domain_from_str(tag: &str) -> [u8; 32] {
        let mut domain = [0u8; 32];
        let len = tag.len().min(32);
        domain[..len].copy_from_slice(&tag.as_bytes()[..len]);
        domain
    }
}

// ============================================================================
// Solana Ledger
// ============================================================================

/// Concrete ledger client against the rollup program on Solana
pub struct SolanaLedger {
    config: LedgerConfig,
    rpc: RpcClient,
    operator_keypair: Arc<Keypair>,
    program_id: Pubkey,
}

impl SolanaLedger {
    pub fn new(config: LedgerConfig, operator_keypair: Keypair) -> Result<Self> {
        let rpc = RpcClient::new_with_commitment(config.rpc_url.clone(), config.commitment);
        let program_id =
            Pubkey::from_str(&config.rollup_program_id).context("invalid rollup program ID")?;

        Ok(Self {
            config,
            rpc,
            operator_keypair: Arc::new(operator_keypair),
            program_id,
        })
    }

    /// Get PDAs for the rollup program
    fn get_pdas(&self) -> (Pubkey, Pubkey) {
        let (config_pda, _) =
            Pubkey::find_program_address(&[b"config", &self.config.domain], &self.program_id);
        let (state_pda, _) =
            Pubkey::find_program_address(&[b"state", &self.config.domain], &self.program_id);
        (config_pda, state_pda)
    }
}

impl LedgerClient for SolanaLedger {
    fn submit_batch(&mut self, commit: &BatchCommit) -> Result<LedgerReceipt> {
        let (config_pda, state_pda) = self.get_pdas();

        // Build instruction data
        // Instruction discriminator: 2 = ProcessDeposits
        let mut data = vec![2u8];
        data.extend_from_slice(&commit.batch_index.to_le_bytes());
        data.push(commit.batch_size_exponent);
        data.push(commit.position.len() as u8);
        data.extend_from_slice(&commit.position);
        data.push(commit.proof.len() as u8);
        for sibling in &commit.proof {
            data.extend_from_slice(sibling);
        }
        data.extend_from_slice(&commit.subtree_root);
        data.extend_from_slice(&commit.expected_root);

        let instruction = Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(self.operator_keypair.pubkey(), true), // payer/signer
                AccountMeta::new_readonly(config_pda, false),           // config
                AccountMeta::new(state_pda, false),                     // state
            ],
            data,
        };

        let recent_blockhash = self
            .rpc
            .get_latest_blockhash()
            .context("failed to get blockhash")?;

        let tx = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&self.operator_keypair.pubkey()),
            &[&self.operator_keypair],
            recent_blockhash,
        );

        let signature = self
            .rpc
            .send_and_confirm_transaction(&tx)
            .context("failed to submit batch commit")?;

        // Read the root the program actually committed
        let root = self.current_root()?;

        Ok(LedgerReceipt {
            tx_signature: signature.to_string(),
            root,
        })
    }

    fn current_root(&self) -> Result<[u8; 32]> {
        let (_, state_pda) = self.get_pdas();

        let account = self
            .rpc
            .get_account(&state_pda)
            .context("failed to get rollup state account")?;

        // State account layout: batch_index (8) + current_root (32)
        let data = account.data;
        if data.len() < 40 {
            bail!("invalid rollup state account data");
        }

        let root: [u8; 32] = data[8..40]
            .try_into()
            .context("malformed root in state account")?;
        Ok(root)
    }
}

// ============================================================================
// Mock Ledger (for testing)
// ============================================================================

#[derive(Debug, Default)]
struct MockLedgerState {
    root: [u8; 32],
    fail_next: bool,
    wrong_root_next: bool,
    journal: Vec<BatchCommit>,
}

/// Mock ledger that replays the verifier side without L1.
///
/// Recomputes the new root from `(subtree_root, position, proof)` by
/// Merkle-path recombination, exactly as the rollup program would, and
/// records every submission attempt. Clone handles share state so tests
/// can inspect the journal while the service owns the client.
#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<MockLedgerState>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot failure for the next submission
    pub fn fail_next_submission(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = true;
        }
    }

    /// Arm a one-shot divergent receipt: the next submission confirms
    /// but reports a root that differs from the recombined one
    pub fn report_wrong_root_next(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.wrong_root_next = true;
        }
    }

    /// Every commit ever submitted, failed attempts included
    pub fn journal(&self) -> Vec<BatchCommit> {
        self.state
            .lock()
            .map(|state| state.journal.clone())
            .unwrap_or_default()
    }
}

impl LedgerClient for MockLedger {
    fn submit_batch(&mut self, commit: &BatchCommit) -> Result<LedgerReceipt> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("mock ledger state poisoned"))?;
        state.journal.push(commit.clone());

        if state.fail_next {
            state.fail_next = false;
            bail!("mock ledger rejected batch {}", commit.batch_index);
        }

        // Verifier side: recompute the root from one subtree update
        let subtree_root = hash::bytes_to_field(&commit.subtree_root);
        let proof: Vec<Fr> = commit.proof.iter().map(hash::bytes_to_field).collect();
        let new_root = recombine_root(&subtree_root, &commit.position, &proof)?;
        let mut root = hash::field_to_bytes(&new_root);

        if state.wrong_root_next {
            // confirmed but divergent; the stored root is not advanced
            state.wrong_root_next = false;
            root[0] ^= 0xff;
        } else {
            state.root = root;
        }

        Ok(LedgerReceipt {
            tx_signature: format!("mock_sig_{}", commit.batch_index),
            root,
        })
    }

    fn current_root(&self) -> Result<[u8; 32]> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("mock ledger state poisoned"))?;
        Ok(state.root)
    }
}
