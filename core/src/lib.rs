//! Treeline operator core
//!
//! Maintains the authenticated account set of a rollup ledger: a
//! fixed-depth Merkle tree whose root commits to every account balance,
//! and a batching pipeline that admits deposits in fixed-size groups,
//! proves each subtree insertion against the committed history, and
//! hands the minimal update data to the on-chain rollup program.

pub mod account;
pub mod accumulator;
pub mod error;
pub mod hash;
pub mod ingest;
pub mod ledger;
pub mod service;
pub mod tree;

pub use account::{Account, DepositRequest};
pub use accumulator::{AccumulatorConfig, DepositAccumulator, StagedBatch};
pub use error::OperatorError;
pub use ledger::{BatchCommit, LedgerClient, LedgerConfig, LedgerReceipt, MockLedger, SolanaLedger};
pub use service::{DepositService, ServiceStats};
pub use tree::{AccountTree, ZeroCache};
