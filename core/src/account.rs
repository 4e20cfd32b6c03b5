//! Account records
//!
//! A leaf of the account tree. The leaf hash covers the public key pair,
//! balance, nonce and token type; the index addresses the leaf slot and is
//! not part of the hash. Accounts are immutable once hashed: the deposit
//! path only appends, so a batch fixes each account's contents for good.

use ark_bn254::Fr;
use light_poseidon::PoseidonError;

use crate::hash;

/// A single account leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Leaf slot index; `None` until a batch assigns one
    pub index: Option<u32>,
    pub pubkey_x: Fr,
    pub pubkey_y: Fr,
    pub balance: u64,
    pub nonce: u64,
    pub token_type: u32,
}

impl Account {
    /// The canonical empty-slot account: every field zero, no index
    pub fn zero() -> Self {
        Self {
            index: None,
            pubkey_x: Fr::from(0u64),
            pubkey_y: Fr::from(0u64),
            balance: 0,
            nonce: 0,
            token_type: 0,
        }
    }

    /// Leaf hash: Poseidon(pk_x, pk_y, balance, nonce, token_type)
    pub fn hash(&self) -> Result<Fr, PoseidonError> {
        hash::hash_fields(&[
            self.pubkey_x,
            self.pubkey_y,
            Fr::from(self.balance),
            Fr::from(self.nonce),
            Fr::from(self.token_type as u64),
        ])
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::zero()
    }
}

/// An admitted deposit waiting to be batched into the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    pub pubkey_x: Fr,
    pub pubkey_y: Fr,
    pub amount: u64,
    pub token_type: u32,
}

impl DepositRequest {
    /// Materialize the account this deposit creates at the given leaf slot
    pub fn into_account(self, index: u32) -> Account {
        Account {
            index: Some(index),
            pubkey_x: self.pubkey_x,
            pubkey_y: self.pubkey_y,
            balance: self.amount,
            nonce: 0,
            token_type: self.token_type,
        }
    }
}
