//! Deposit batch accumulator
//!
//! Admits deposits in fixed-size groups and computes the minimal proof
//! data an on-chain verifier needs to roll the committed root forward by
//! one subtree, without rehashing the whole tree.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Account tree (D = 4)                     │
//! │                                                              │
//! │                         root                                 │
//! │                       /      \                               │
//! │                   ┌──┴──┐  ┌──┴──┐                           │
//! │    batch slots:   "00"  "01"  "10"  "11"   (2^(D-k) slots)   │
//! │                    │     │     │     │                       │
//! │                 batch0 batch1 zero  zero   (2^k leaves each) │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Batch lifecycle is a two-phase commit: `stage_batch` computes the
//! subtree root, insertion proof, slot position and the rebuilt tree
//! without touching any state; `commit_batch` applies it only once the
//! external ledger has confirmed. A failed submission simply drops the
//! staged value, so a retry forms an identical batch from the unchanged
//! queue.

use std::collections::VecDeque;

use ark_bn254::Fr;
use log::{debug, info};

use crate::account::{Account, DepositRequest};
use crate::error::OperatorError;
use crate::hash;
use crate::tree::{AccountTree, ZeroCache};

// ============================================================================
// Configuration
// ============================================================================

/// Accumulator configuration, fixed at construction
#[derive(Debug, Clone)]
pub struct AccumulatorConfig {
    /// Tree depth D; the tree holds `2^D` account leaves
    pub depth: usize,
    /// Batch size exponent k; each batch fills `2^k` leaves
    pub batch_exponent: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            depth: 4,
            batch_exponent: 2,
        }
    }
}

impl AccumulatorConfig {
    /// Leaves per batch (`2^k`)
    pub fn batch_capacity(&self) -> usize {
        1 << self.batch_exponent
    }

    /// Total leaf slots (`2^D`)
    pub fn leaf_capacity(&self) -> usize {
        1 << self.depth
    }

    /// Levels between a subtree root and the global root (`D - k`)
    pub fn spine_height(&self) -> usize {
        self.depth - self.batch_exponent
    }

    /// Number of batch slots (`2^(D-k)`)
    pub fn slot_count(&self) -> usize {
        1 << self.spine_height()
    }

    fn validate(&self) -> Result<(), OperatorError> {
        // 31 keeps every leaf index, and one past the last, inside u32
        if self.depth == 0 || self.depth > 31 {
            return Err(OperatorError::Geometry(format!(
                "tree depth {} out of range (1..=31)",
                self.depth
            )));
        }
        if self.batch_exponent == 0 || self.batch_exponent >= self.depth {
            return Err(OperatorError::Geometry(format!(
                "batch exponent {} must satisfy 0 < k < depth {}",
                self.batch_exponent, self.depth
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Staged Batch
// ============================================================================

/// A fully computed batch waiting for ledger confirmation.
///
/// Holds everything the commit needs; nothing in the accumulator changes
/// until `commit_batch` consumes this.
#[derive(Debug, Clone)]
pub struct StagedBatch {
    /// Slot this batch occupies (0-based, strictly increasing)
    pub batch_index: usize,
    /// Accounts created from the queue head, indices already assigned
    pub accounts: Vec<Account>,
    /// Root of the batch's own subtree
    pub subtree_root: Fr,
    /// Sibling hashes above the subtree, innermost first (length `D - k`)
    pub proof: Vec<Fr>,
    /// Slot address bits, most significant first (length `D - k`)
    pub position: Vec<u8>,
    /// Full tree rebuilt with this batch included; its root is the local
    /// reference value the ledger's reported root is checked against
    pub tree: AccountTree,
}

// ============================================================================
// Accumulator
// ============================================================================

/// The pending-deposit queue, batch counter and committed subtree history.
///
/// Single-writer: exactly one task mutates this at a time.
pub struct DepositAccumulator {
    config: AccumulatorConfig,
    pending: VecDeque<DepositRequest>,
    /// All accounts admitted so far, in index order
    accounts: Vec<Account>,
    /// Next free leaf index
    next_index: u32,
    /// Next unfilled batch slot
    batch_index: usize,
    /// One entry per committed batch, in commit order
    subtree_roots: Vec<Fr>,
    zero_cache: ZeroCache,
    /// Authoritative local tree, rebuilt on every commit
    tree: AccountTree,
}

impl DepositAccumulator {
    /// Create an empty accumulator; builds the zero cache once.
    pub fn new(config: AccumulatorConfig) -> Result<Self, OperatorError> {
        config.validate()?;
        let zero_cache = ZeroCache::build(config.depth)?;
        let tree = AccountTree::rebuild(&[], config.depth)?;
        info!(
            "Account tree initialized: depth {}, batch size {}, zero root {}",
            config.depth,
            config.batch_capacity(),
            hash::field_to_decimal(&zero_cache.level(0))
        );

        Ok(Self {
            config,
            pending: VecDeque::new(),
            accounts: Vec::new(),
            next_index: 0,
            batch_index: 0,
            subtree_roots: Vec::new(),
            zero_cache,
            tree,
        })
    }

    /// Admit a deposit into the pending queue.
    ///
    /// Rejected once the tree can no longer seat it: admitted accounts
    /// plus queued deposits already cover every leaf slot.
    pub fn enqueue(&mut self, request: DepositRequest) -> Result<(), OperatorError> {
        if self.next_index as usize + self.pending.len() >= self.config.leaf_capacity() {
            return Err(OperatorError::CapacityExceeded {
                capacity: self.config.leaf_capacity() as u64,
            });
        }
        self.pending.push_back(request);
        debug!(
            "Deposit queued ({} pending, batch forms at {})",
            self.pending.len(),
            self.config.batch_capacity()
        );
        Ok(())
    }

    /// Whether the queue holds a full batch
    pub fn batch_ready(&self) -> bool {
        self.pending.len() >= self.config.batch_capacity()
    }

    /// Form the next batch if the queue has reached capacity.
    ///
    /// Pure with respect to accumulator state: the queue head is peeked,
    /// not consumed. Leaf ordering within the batch equals arrival order,
    /// so index assignment is deterministic and auditable.
    pub fn stage_batch(&self) -> Result<Option<StagedBatch>, OperatorError> {
        if !self.batch_ready() {
            return Ok(None);
        }
        if self.batch_index >= self.config.slot_count() {
            return Err(OperatorError::CapacityExceeded {
                capacity: self.config.leaf_capacity() as u64,
            });
        }

        let capacity = self.config.batch_capacity();
        let mut accounts = Vec::with_capacity(capacity);
        for (offset, request) in self.pending.iter().take(capacity).enumerate() {
            accounts.push(request.clone().into_account(self.next_index + offset as u32));
        }

        let subtree_root = AccountTree::subtree_root(&accounts, capacity)?;
        let proof = self.assemble_proof()?;
        let position = index_to_position(self.batch_index, self.config.spine_height());

        // The authoritative post-commit root: rebuild over every account
        // assigned so far plus this batch, zero-padded to 2^D.
        let mut all_accounts = self.accounts.clone();
        all_accounts.extend(accounts.iter().cloned());
        let tree = AccountTree::rebuild(&all_accounts, self.config.depth)?;

        debug!(
            "Staged batch {} at position {:?}, subtree root {}",
            self.batch_index,
            position,
            hash::field_to_decimal(&subtree_root)
        );

        Ok(Some(StagedBatch {
            batch_index: self.batch_index,
            accounts,
            subtree_root,
            proof,
            position,
            tree,
        }))
    }

    /// Apply a confirmed batch: consume the queue head, extend the account
    /// list, record the subtree root and advance the counters.
    pub fn commit_batch(&mut self, staged: StagedBatch) -> Result<(), OperatorError> {
        if staged.batch_index != self.batch_index {
            return Err(OperatorError::ProofAssemblyInconsistency(format!(
                "commit for batch {} but accumulator is at batch {}",
                staged.batch_index, self.batch_index
            )));
        }
        if self.subtree_roots.len() != self.batch_index {
            return Err(OperatorError::ProofAssemblyInconsistency(format!(
                "{} committed subtree roots recorded for batch index {}",
                self.subtree_roots.len(),
                self.batch_index
            )));
        }

        let capacity = self.config.batch_capacity();
        self.pending.drain(..capacity);
        self.accounts.extend(staged.accounts);
        self.next_index += capacity as u32;
        self.subtree_roots.push(staged.subtree_root);
        self.batch_index += 1;
        self.tree = staged.tree;

        info!(
            "Batch {} committed: {} accounts total, root {}",
            self.batch_index - 1,
            self.accounts.len(),
            hash::field_to_decimal(&self.tree.root())
        );
        Ok(())
    }

    /// Sibling hashes above the current batch slot, innermost first.
    ///
    /// Slots left of the cursor hold committed subtree roots; every other
    /// slot is still the zero subtree. Upper-level siblings are folded
    /// from those slot roots, so each proof entry is exactly the node the
    /// global tree contains at that position. Valid only while batches
    /// commit in strictly increasing, contiguous slot order, which the
    /// history-length check enforces.
    fn assemble_proof(&self) -> Result<Vec<Fr>, OperatorError> {
        let spine = self.config.spine_height();
        if self.subtree_roots.len() != self.batch_index {
            return Err(OperatorError::ProofAssemblyInconsistency(format!(
                "{} committed subtree roots but next batch slot is {}",
                self.subtree_roots.len(),
                self.batch_index
            )));
        }

        let zero_slot = self.zero_cache.level(spine);
        let mut level: Vec<Fr> = (0..self.config.slot_count())
            .map(|slot| {
                self.subtree_roots
                    .get(slot)
                    .copied()
                    .unwrap_or(zero_slot)
            })
            .collect();

        let mut proof = Vec::with_capacity(spine);
        let mut cursor = self.batch_index;
        for _ in 0..spine {
            proof.push(level[cursor ^ 1]);
            let mut parent = Vec::with_capacity(level.len() / 2);
            for pair in level.chunks(2) {
                parent.push(hash::combine(&pair[0], &pair[1])?);
            }
            level = parent;
            cursor >>= 1;
        }

        if proof.len() != spine {
            return Err(OperatorError::ProofAssemblyInconsistency(format!(
                "proof has {} siblings, expected {}",
                proof.len(),
                spine
            )));
        }
        Ok(proof)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &AccumulatorConfig {
        &self.config
    }

    /// Current authoritative local root
    pub fn root(&self) -> Fr {
        self.tree.root()
    }

    /// Next unfilled batch slot
    pub fn batch_index(&self) -> usize {
        self.batch_index
    }

    /// Next free leaf index
    pub fn next_account_index(&self) -> u32 {
        self.next_index
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn subtree_roots(&self) -> &[Fr] {
        &self.subtree_roots
    }

    pub fn zero_cache(&self) -> &ZeroCache {
        &self.zero_cache
    }
}

// ============================================================================
// Slot Position Addressing
// ============================================================================

/// MSB-first binary address of a batch slot among `2^bits` slots
pub fn index_to_position(index: usize, bits: usize) -> Vec<u8> {
    (0..bits)
        .map(|bit| ((index >> (bits - 1 - bit)) & 1) as u8)
        .collect()
}

/// Inverse of [`index_to_position`]
pub fn position_to_index(bits: &[u8]) -> usize {
    bits.iter().fold(0, |acc, bit| (acc << 1) | *bit as usize)
}

/// Recompute the global root from a subtree root, its slot position and
/// the sibling proof (innermost first). This is the verifier-side
/// Merkle-path recombination the ledger performs.
pub fn recombine_root(
    subtree_root: &Fr,
    position: &[u8],
    proof: &[Fr],
) -> Result<Fr, OperatorError> {
    if proof.len() != position.len() {
        return Err(OperatorError::ProofAssemblyInconsistency(format!(
            "proof has {} siblings for a {}-bit position",
            proof.len(),
            position.len()
        )));
    }

    let mut current = *subtree_root;
    for (step, sibling) in proof.iter().enumerate() {
        // innermost sibling pairs with the least significant position bit
        let is_right = position[position.len() - 1 - step] == 1;
        current = if is_right {
            hash::combine(sibling, &current)?
        } else {
            hash::combine(&current, sibling)?
        };
    }
    Ok(current)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request(seed: u64) -> DepositRequest {
        DepositRequest {
            pubkey_x: Fr::from(1000 + seed),
            pubkey_y: Fr::from(2000 + seed),
            amount: 10 * (seed + 1),
            token_type: 0,
        }
    }

    fn accumulator() -> DepositAccumulator {
        DepositAccumulator::new(AccumulatorConfig {
            depth: 4,
            batch_exponent: 2,
        })
        .unwrap()
    }

    fn stage_and_commit(acc: &mut DepositAccumulator) -> StagedBatch {
        let staged = acc.stage_batch().unwrap().expect("batch should be ready");
        acc.commit_batch(staged.clone()).unwrap();
        staged
    }

    #[test]
    fn test_geometry_validation() {
        assert!(matches!(
            DepositAccumulator::new(AccumulatorConfig {
                depth: 4,
                batch_exponent: 4
            }),
            Err(OperatorError::Geometry(_))
        ));
        assert!(matches!(
            DepositAccumulator::new(AccumulatorConfig {
                depth: 0,
                batch_exponent: 0
            }),
            Err(OperatorError::Geometry(_))
        ));
        // depth 32 would overflow the u32 index counter on the last batch
        assert!(matches!(
            DepositAccumulator::new(AccumulatorConfig {
                depth: 32,
                batch_exponent: 2
            }),
            Err(OperatorError::Geometry(_))
        ));
    }

    #[test]
    fn test_no_batch_below_capacity() {
        let mut acc = accumulator();
        for seed in 0..3 {
            acc.enqueue(request(seed)).unwrap();
        }
        assert!(!acc.batch_ready());
        assert!(acc.stage_batch().unwrap().is_none());
        assert_eq!(acc.batch_index(), 0);
    }

    #[test]
    fn test_indices_follow_arrival_order() {
        let mut acc = accumulator();
        for seed in 0..8 {
            acc.enqueue(request(seed)).unwrap();
        }
        stage_and_commit(&mut acc);
        stage_and_commit(&mut acc);

        let indices: Vec<u32> = acc.accounts().iter().filter_map(|a| a.index).collect();
        assert_eq!(indices, (0..8).collect::<Vec<u32>>());
        // arrival order preserved: balances match the enqueue sequence
        let balances: Vec<u64> = acc.accounts().iter().map(|a| a.balance).collect();
        assert_eq!(balances, vec![10, 20, 30, 40, 50, 60, 70, 80]);
    }

    #[test]
    fn test_first_batch_state() {
        // four deposits, exactly one batch
        let mut acc = accumulator();
        for seed in 0..4 {
            acc.enqueue(request(seed)).unwrap();
        }
        let staged = stage_and_commit(&mut acc);

        assert_eq!(acc.next_account_index(), 4);
        assert_eq!(acc.batch_index(), 1);
        assert_eq!(acc.subtree_roots().len(), 1);
        assert_eq!(staged.proof.len(), 2);
        assert_eq!(staged.position, vec![0, 0]);
        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn test_position_sequence_and_tree_full() {
        let mut acc = accumulator();
        let mut positions = Vec::new();
        for batch in 0..4 {
            for offset in 0..4 {
                acc.enqueue(request(batch * 4 + offset)).unwrap();
            }
            positions.push(stage_and_commit(&mut acc).position);
        }

        assert_eq!(
            positions,
            vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
        );
        assert_eq!(acc.batch_index(), 4);
        assert_eq!(acc.next_account_index(), 16);

        // 17th deposit: no leaf slot can ever seat it
        assert!(matches!(
            acc.enqueue(request(99)),
            Err(OperatorError::CapacityExceeded { capacity: 16 })
        ));
    }

    #[test]
    fn test_proof_recombines_to_local_root_every_batch() {
        // Root recomputation equivalence: full rebuild vs subtree + proof
        let mut acc = accumulator();
        for batch in 0..4 {
            for offset in 0..4 {
                acc.enqueue(request(batch * 4 + offset)).unwrap();
            }
            let staged = acc.stage_batch().unwrap().unwrap();
            let recombined =
                recombine_root(&staged.subtree_root, &staged.position, &staged.proof).unwrap();
            assert_eq!(
                recombined,
                staged.tree.root(),
                "batch {} proof does not recombine to the rebuilt root",
                batch
            );
            acc.commit_batch(staged).unwrap();
        }
    }

    #[test]
    fn test_failed_submission_retries_identically() {
        // Staging twice from unchanged state is deterministic
        let mut acc = accumulator();
        for seed in 0..4 {
            acc.enqueue(request(seed)).unwrap();
        }
        stage_and_commit(&mut acc);

        for seed in 4..8 {
            acc.enqueue(request(seed)).unwrap();
        }
        let attempt = acc.stage_batch().unwrap().unwrap();
        // submission fails: attempt is dropped, nothing changed
        assert_eq!(acc.batch_index(), 1);
        assert_eq!(acc.pending_len(), 4);

        let retry = acc.stage_batch().unwrap().unwrap();
        assert_eq!(retry.subtree_root, attempt.subtree_root);
        assert_eq!(retry.position, attempt.position);
        assert_eq!(retry.proof, attempt.proof);
        assert_eq!(retry.tree.root(), attempt.tree.root());
    }

    #[test]
    fn test_out_of_order_commit_rejected() {
        let mut acc = accumulator();
        for seed in 0..8 {
            acc.enqueue(request(seed)).unwrap();
        }
        let first = acc.stage_batch().unwrap().unwrap();
        acc.commit_batch(first.clone()).unwrap();

        // replaying the already committed batch must fail loudly
        assert!(matches!(
            acc.commit_batch(first),
            Err(OperatorError::ProofAssemblyInconsistency(_))
        ));
    }

    #[test]
    fn test_position_encoding_round_trip() {
        for bits in 1..=6 {
            for index in 0..(1usize << bits) {
                let position = index_to_position(index, bits);
                assert_eq!(position.len(), bits);
                assert_eq!(position_to_index(&position), index);
            }
        }
        assert_eq!(index_to_position(2, 2), vec![1, 0], "MSB comes first");
    }
}
