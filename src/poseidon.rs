//! Poseidon hashing over BN254 with the circomlib parameter set.
//!
//! The on-chain verifier's circuit hashes with the circomlib round constants
//! and MDS matrix, arity equal to the input count, no domain separator. Every
//! digest this module produces must match that circuit bit-for-bit, so the
//! parameters are pinned here and nowhere else. Arities 1 through 4 cover the
//! whole protocol: unary for key images and the empty leaf, binary for
//! nullifiers and Merkle nodes, 4-ary for note commitments.

use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonHasher};

use crate::bn254::Field;

/// Largest arity the protocol uses (the 4-input note commitment).
pub const MAX_ARITY: usize = 4;

fn permute(inputs: &[Fr]) -> Fr {
    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())
        .expect("circom parameters exist for arity 1..=4");
    hasher
        .hash(inputs)
        .expect("input count matches the hasher arity")
}

/// Hash 1..=4 field elements; fails on any other input count.
pub fn hash_fields(inputs: &[Field]) -> anyhow::Result<Field> {
    anyhow::ensure!(
        (1..=MAX_ARITY).contains(&inputs.len()),
        "poseidon arity {} unsupported (expected 1..={MAX_ARITY})",
        inputs.len()
    );
    let frs: Vec<Fr> = inputs.iter().map(|f| f.into_fr()).collect();
    Ok(Field::from_fr(permute(&frs)))
}

pub fn hash1(a: Field) -> Field {
    Field::from_fr(permute(&[a.into_fr()]))
}

pub fn hash2(a: Field, b: Field) -> Field {
    Field::from_fr(permute(&[a.into_fr(), b.into_fr()]))
}

pub fn hash4(a: Field, b: Field, c: Field, d: Field) -> Field {
    Field::from_fr(permute(&[
        a.into_fr(),
        b.into_fr(),
        c.into_fr(),
        d.into_fr(),
    ]))
}

/// Commitment digest of a note's opening.
pub fn note_commitment(amount: Field, owner_pubkey: Field, randomness: Field, token_mint: Field) -> Field {
    hash4(amount, owner_pubkey, randomness, token_mint)
}

/// Spend tag revealed on chain when a note is consumed.
pub fn nullifier(commitment: Field, spending_key_hash: Field) -> Field {
    hash2(commitment, spending_key_hash)
}

/// Public key image of a spending key.
pub fn owner_pubkey(spending_key: Field) -> Field {
    hash1(spending_key)
}

/// Internal Merkle node from its two children.
pub fn merkle_node(left: Field, right: Field) -> Field {
    hash2(left, right)
}

/// Canonical value filling unused leaf positions.
pub fn empty_leaf() -> Field {
    hash1(Field::zero())
}
