//! Incremental Merkle accumulator for note commitments.
//!
//! Fixed depth of 20 (~1M leaves), append-only, Poseidon-hashed. Inserting a
//! leaf touches only the ancestor chain, so writes are O(depth); the root is
//! read off the top level in O(1). Every level of the tree is cached so a
//! membership proof for any historical leaf can be produced against the
//! current root. A circular buffer keeps the last 100 roots; the on-chain
//! program accepts any root inside that window, which lets a proof survive
//! the tree moving underneath it between proving and landing.

use std::sync::OnceLock;

use crate::bn254::Field;
use crate::poseidon;

/// Tree depth fixed by the circuit.
pub const TREE_DEPTH: usize = 20;

/// Leaf capacity: 2^20.
pub const MAX_LEAVES: u64 = 1 << TREE_DEPTH;

/// How many past roots remain provable.
pub const ROOT_HISTORY_SIZE: usize = 100;

/// Canonical zero hashes: `Z[0] = Poseidon(0)`, `Z[i] = Poseidon(Z[i-1], Z[i-1])`.
///
/// Computed once per process; repeated calls return the same cache.
pub fn zero_hashes() -> &'static [Field; TREE_DEPTH + 1] {
    static ZEROS: OnceLock<[Field; TREE_DEPTH + 1]> = OnceLock::new();
    ZEROS.get_or_init(|| {
        let mut zeros = [Field::zero(); TREE_DEPTH + 1];
        zeros[0] = poseidon::empty_leaf();
        for level in 1..=TREE_DEPTH {
            zeros[level] = poseidon::merkle_node(zeros[level - 1], zeros[level - 1]);
        }
        zeros
    })
}

/// Authentication path from a leaf to the root.
///
/// `path_indices[i]` is bit `i` of the leaf index (0 = the node is a left
/// child at that level); `path_elements[i]` is the sibling hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MembershipProof {
    pub leaf_index: u64,
    pub path_indices: [u8; TREE_DEPTH],
    pub path_elements: [Field; TREE_DEPTH],
}

/// The append-only commitment tree.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves, `levels[TREE_DEPTH]` the root (once any
    /// leaf exists). Only positions reachable from an inserted leaf are
    /// materialized; absent siblings read as the level's zero hash.
    levels: Vec<Vec<Field>>,
    root_history: Vec<Field>,
    history_index: usize,
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MerkleTree {
    pub fn new() -> Self {
        // Every slot starts as the genesis (empty-tree) root. A zero or
        // otherwise never-recorded value must not pass the freshness check,
        // so unrotated slots may only hold roots this tree actually had.
        Self {
            levels: vec![Vec::new(); TREE_DEPTH + 1],
            root_history: vec![zero_hashes()[TREE_DEPTH]; ROOT_HISTORY_SIZE],
            history_index: 0,
        }
    }

    pub fn leaf_count(&self) -> u64 {
        self.levels.first().map_or(0, |leaves| leaves.len() as u64)
    }

    /// Leaves in insertion order.
    pub fn leaves(&self) -> &[Field] {
        self.levels.first().map_or(&[], Vec::as_slice)
    }

    pub fn is_full(&self) -> bool {
        self.leaf_count() >= MAX_LEAVES
    }

    /// Current root; the empty-tree root before any insertion.
    pub fn root(&self) -> Field {
        self.levels
            .last()
            .and_then(|top| top.first().copied())
            .unwrap_or_else(|| zero_hashes()[TREE_DEPTH])
    }

    /// Append a leaf and update the ancestor chain. Returns the leaf index.
    #[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
    pub fn insert(&mut self, leaf: Field) -> anyhow::Result<u64> {
        anyhow::ensure!(!self.is_full(), "merkle tree is full at {MAX_LEAVES} leaves");
        let zeros = zero_hashes();
        let leaf_index = self.levels[0].len();
        self.levels[0].push(leaf);

        let mut node = leaf;
        let mut index = leaf_index;
        for level in 0..TREE_DEPTH {
            let sibling_index = index ^ 1;
            let (left, right) = if index & 1 == 0 {
                let sibling = self.levels[level]
                    .get(sibling_index)
                    .copied()
                    .unwrap_or(zeros[level]);
                (node, sibling)
            } else {
                (self.levels[level][sibling_index], node)
            };
            node = poseidon::merkle_node(left, right);

            index >>= 1;
            let parents = &mut self.levels[level + 1];
            if index < parents.len() {
                parents[index] = node;
            } else {
                parents.push(node);
            }
        }

        self.record_root(node);
        tracing::debug!(leaf_index, root = ?node, "inserted commitment leaf");
        Ok(leaf_index as u64)
    }

    /// Produce the authentication path for an inserted leaf.
    #[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
    pub fn generate_proof(&self, leaf_index: u64) -> anyhow::Result<MembershipProof> {
        anyhow::ensure!(
            leaf_index < self.leaf_count(),
            "leaf index {leaf_index} out of range (only {} leaves)",
            self.leaf_count()
        );
        let zeros = zero_hashes();
        let mut path_indices = [0u8; TREE_DEPTH];
        let mut path_elements = [Field::zero(); TREE_DEPTH];
        let mut index = leaf_index as usize;
        for (level, (bit, element)) in path_indices
            .iter_mut()
            .zip(path_elements.iter_mut())
            .enumerate()
        {
            *bit = ((leaf_index >> level) & 1) as u8;
            *element = self.levels[level]
                .get(index ^ 1)
                .copied()
                .unwrap_or(zeros[level]);
            index >>= 1;
        }
        Ok(MembershipProof {
            leaf_index,
            path_indices,
            path_elements,
        })
    }

    /// Whether `root` is the current root or inside the retained window.
    pub fn is_known_root(&self, root: Field) -> bool {
        root == self.root() || self.root_history.iter().any(|r| *r == root)
    }

    fn record_root(&mut self, root: Field) {
        self.history_index = self
            .history_index
            .checked_add(1)
            .map_or(0, |next| next % ROOT_HISTORY_SIZE);
        if let Some(slot) = self.root_history.get_mut(self.history_index) {
            *slot = root;
        }
    }
}

/// Fold a leaf up a path and compare against an expected root.
pub fn verify_proof(leaf: Field, proof: &MembershipProof, root: Field) -> bool {
    let mut node = leaf;
    for (bit, sibling) in proof.path_indices.iter().zip(proof.path_elements.iter()) {
        node = if *bit == 0 {
            poseidon::merkle_node(node, *sibling)
        } else {
            poseidon::merkle_node(*sibling, node)
        };
    }
    node == root
}
