//! Host-chain instruction records.
//!
//! The client never talks to a socket; it emits an `InstructionRecord` whose
//! `data` is byte-exact for the on-chain program, hands it to the wallet
//! adapter for signing, and lets the connection submit it. Account addresses
//! are derived downstream from the fixed seed constants below: the pool PDA
//! from `["shielded_pool", token_mint]`, then the tree and nullifier-set
//! PDAs from the pool address.

use crate::bn254::Field;
use crate::note::EncryptedNote;
use crate::prover::Groth16Proof;

pub const POOL_SEED: &[u8] = b"shielded_pool";
pub const MERKLE_TREE_SEED: &[u8] = b"merkle_tree";
pub const NULLIFIER_SET_SEED: &[u8] = b"nullifier_set";

/// Host-chain account identifier (opaque to the core).
pub type ExternalAddress = [u8; 32];

/// Seeds the pool PDA is derived from.
pub fn pool_seeds(token_mint: Field) -> [Vec<u8>; 2] {
    [POOL_SEED.to_vec(), token_mint.to_bytes_le().to_vec()]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InstructionKind {
    Shield,
    Transfer,
    Unshield,
}

/// One instruction for the pool program, plus the off-instruction extras the
/// submission layer attaches: ciphertext memos (one per real output
/// commitment, in commitment order) and, for unshield, the clear-text exit
/// recipient passed as an account.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InstructionRecord {
    pub kind: InstructionKind,
    pub token_mint: Field,
    pub data: Vec<u8>,
    pub memos: Vec<EncryptedNote>,
    pub unshield_recipient: Option<ExternalAddress>,
}

/// An instruction after the wallet adapter signed it; `transaction` is the
/// host chain's wire form and stays opaque here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedInstruction {
    pub record: InstructionRecord,
    pub transaction: Vec<u8>,
}

/// `amount (8 LE) ∥ commitment (32 LE)`.
pub fn shield_data(amount: u64, commitment: Field) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + 32);
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&commitment.to_bytes_le());
    data
}

/// `proof (256) ∥ nullifier_1 ∥ nullifier_2 ∥ output_commitment_1 ∥
/// output_commitment_2 ∥ merkle_root` (32 bytes each).
pub fn transfer_data(
    proof: &Groth16Proof,
    nullifiers: [Field; 2],
    output_commitments: [Field; 2],
    merkle_root: Field,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(256 + 5 * 32);
    data.extend_from_slice(&proof.to_bytes());
    for nullifier in nullifiers {
        data.extend_from_slice(&nullifier.to_bytes_le());
    }
    for commitment in output_commitments {
        data.extend_from_slice(&commitment.to_bytes_le());
    }
    data.extend_from_slice(&merkle_root.to_bytes_le());
    data
}

/// `proof (256) ∥ nullifier_1 ∥ nullifier_2 ∥ change_commitment ∥
/// merkle_root ∥ amount (8 LE)`. The change slot is all zeros when the spend
/// is exact and no change note exists.
pub fn unshield_data(
    proof: &Groth16Proof,
    nullifiers: [Field; 2],
    change_commitment: Option<Field>,
    merkle_root: Field,
    amount: u64,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(256 + 4 * 32 + 8);
    data.extend_from_slice(&proof.to_bytes());
    for nullifier in nullifiers {
        data.extend_from_slice(&nullifier.to_bytes_le());
    }
    data.extend_from_slice(&change_commitment.unwrap_or_else(Field::zero).to_bytes_le());
    data.extend_from_slice(&merkle_root.to_bytes_le());
    data.extend_from_slice(&amount.to_le_bytes());
    data
}
