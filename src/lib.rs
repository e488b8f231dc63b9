#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

//! Core engine of a privacy-preserving payment client for a UTXO-style
//! shielded pool. The crate owns everything a wallet must reproduce
//! off-chain: note commitments and nullifiers over circom-parameter Poseidon,
//! an incremental Merkle accumulator, witness assembly for the 2-in-2-out
//! Groth16 transfer circuit, note encryption and wallet scanning, and the
//! shielded-client orchestrator that ties them together. The on-chain
//! program, RPC transport, key storage, and UI are external collaborators
//! reached through narrow traits.

pub mod address;
pub mod artifacts;
pub mod bn254;
pub mod client;
pub mod error;
pub mod instruction;
pub mod keys;
pub mod merkle;
pub mod note;
pub mod poseidon;
pub mod prover;
pub mod tx;

pub use address::ZkAddress;
pub use bn254::Field;
pub use client::{
    ClientConfig, ClientState, CommitmentEvent, PoolConnection, ScanOutcome, ShieldedClient,
    TxOutcome, WalletAdapter, WalletSnapshot, native_token_mint,
};
pub use error::{ClientError, Operation};
pub use instruction::{
    ExternalAddress, InstructionKind, InstructionRecord, SignedInstruction, pool_seeds,
};
pub use keys::{SpendingKeypair, derive_viewing_key};
pub use merkle::{MAX_LEAVES, MembershipProof, MerkleTree, ROOT_HISTORY_SIZE, TREE_DEPTH};
pub use note::{
    ENCRYPTED_NOTE_LEN, EncryptedNote, Note, compute_commitment, compute_nullifier, create_note,
    decrypt_note, encrypt_note,
};
pub use prover::{
    DEFAULT_PROOF_TIMEOUT, Groth16Proof, ProverBackend, TransferPublicInputs, TransferWitness,
    generate_transfer_proof,
};
pub use tx::{SelectedInputs, SpendPlan, plan_transfer, plan_unshield, select_inputs};
