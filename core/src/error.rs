//! Operator error types

use thiserror::Error;

/// Errors surfaced by the account tree and deposit accumulator
#[derive(Debug, Error)]
pub enum OperatorError {
    /// The tree cannot admit any more accounts. Fatal for this
    /// accumulator instance: no further batches are possible.
    #[error("account capacity exceeded: tree holds at most {capacity} accounts")]
    CapacityExceeded { capacity: u64 },

    /// Internal invariant violation in proof construction. This is a
    /// programming-error class, not a recoverable runtime condition.
    #[error("proof assembly inconsistency: {0}")]
    ProofAssemblyInconsistency(String),

    /// The ledger confirmed a batch but reported a different root than
    /// the locally rebuilt tree.
    #[error("root mismatch after batch {batch_index}: local {local}, ledger {ledger}")]
    RootMismatch {
        batch_index: u64,
        local: String,
        ledger: String,
    },

    /// The external ledger rejected or failed to confirm a batch commit.
    /// The staged batch is discarded and retried from unchanged state.
    #[error("ledger submission failed for batch {batch_index}")]
    LedgerSubmission {
        batch_index: u64,
        #[source]
        source: anyhow::Error,
    },

    /// Misconfigured tree geometry, rejected at construction.
    #[error("invalid tree geometry: {0}")]
    Geometry(String),

    /// Poseidon primitive failure (bad arity)
    #[error("hash primitive failure: {0}")]
    Hash(#[from] light_poseidon::PoseidonError),
}
