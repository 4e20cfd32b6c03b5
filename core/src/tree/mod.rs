//! Account tree storage
//!
//! The authenticated commitment to all account balances: a fixed-depth
//! Merkle tree over `2^D` leaf slots, plus the precomputed hashes of
//! empty subtrees at every level.

pub mod account_tree;
pub mod zero_cache;

pub use account_tree::AccountTree;
pub use zero_cache::ZeroCache;
