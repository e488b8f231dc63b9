//! Adapter between wallet state and the external Groth16 prover.
//!
//! Proof generation itself is opaque: a pluggable [`ProverBackend`] turns
//! ordered signal lists into proof bytes. What this module owns is the
//! circuit ABI: the exact ordering of public inputs and private witness
//! signals, the signed encoding of the public amount, and the consistency
//! rules the circuit will enforce. Witnesses are re-checked here before the
//! backend runs, so an inconsistent transaction fails fast with a local
//! error instead of a cryptic backend crash two minutes later.

use std::time::Duration;

use crate::bn254::Field;
use crate::error::ClientError;
use crate::merkle::{self, MembershipProof, TREE_DEPTH};
use crate::note;
use crate::poseidon;

/// Public-input count of the transfer circuit (order fixed by the ABI).
pub const TRANSFER_PUBLIC_INPUT_COUNT: usize = 7;

/// Serialized proof size: `pi_a (64) ∥ pi_b (128) ∥ pi_c (64)`.
pub const PROOF_LEN: usize = 256;

/// Default bound on a single proving run.
pub const DEFAULT_PROOF_TIMEOUT: Duration = Duration::from_secs(120);

/// A Groth16 proof in the canonical encoding the on-chain verifier expects.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Groth16Proof {
    pub pi_a: [u8; 64],
    pub pi_b: [u8; 128],
    pub pi_c: [u8; 64],
}

impl Groth16Proof {
    pub fn to_bytes(&self) -> [u8; PROOF_LEN] {
        let mut out = [0u8; PROOF_LEN];
        out[0..64].copy_from_slice(&self.pi_a);
        out[64..192].copy_from_slice(&self.pi_b);
        out[192..256].copy_from_slice(&self.pi_c);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(
            bytes.len() == PROOF_LEN,
            "proof is {} bytes, expected {PROOF_LEN}",
            bytes.len()
        );
        let mut proof = Groth16Proof {
            pi_a: [0u8; 64],
            pi_b: [0u8; 128],
            pi_c: [0u8; 64],
        };
        proof.pi_a.copy_from_slice(bytes.get(0..64).expect("length checked"));
        proof.pi_b.copy_from_slice(bytes.get(64..192).expect("length checked"));
        proof.pi_c.copy_from_slice(bytes.get(192..256).expect("length checked"));
        Ok(proof)
    }
}

impl core::fmt::Debug for Groth16Proof {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // 256 bytes of group elements add nothing to a log line.
        write!(f, "Groth16Proof(..)")
    }
}

/// Public inputs of the transfer circuit.
///
/// `public_amount` is signed: positive for shield, negative for unshield,
/// zero for an internal transfer. The field encoding maps negatives to
/// `p - |amount|`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferPublicInputs {
    pub merkle_root: Field,
    pub nullifiers: [Field; 2],
    pub output_commitments: [Field; 2],
    pub public_amount: i64,
    pub token_mint: Field,
}

impl TransferPublicInputs {
    /// ABI order: root, nullifiers, output commitments, public amount, mint.
    pub fn to_field_elements(&self) -> [Field; TRANSFER_PUBLIC_INPUT_COUNT] {
        [
            self.merkle_root,
            self.nullifiers[0],
            self.nullifiers[1],
            self.output_commitments[0],
            self.output_commitments[1],
            Field::from_i64(self.public_amount),
            self.token_mint,
        ]
    }
}

/// Witness data for one consumed note.
#[derive(Clone, Copy, Debug)]
pub struct InputWitness {
    pub amount: u64,
    pub owner_pubkey: Field,
    pub randomness: Field,
    pub path: MembershipProof,
}

impl InputWitness {
    /// Dummy inputs pad a one-note spend: zero opening, all-zero path. The
    /// circuit skips their Merkle check.
    pub fn is_dummy(&self) -> bool {
        self.amount == 0 && self.owner_pubkey.is_zero() && self.randomness.is_zero()
    }
}

/// Witness data for one created note.
#[derive(Clone, Copy, Debug)]
pub struct OutputWitness {
    pub amount: u64,
    pub recipient: Field,
    pub randomness: Field,
}

impl OutputWitness {
    /// Dummy outputs fill the second slot when a spend produces no change;
    /// their public commitment is the zero element and nothing lands on
    /// chain for them.
    pub fn is_dummy(&self) -> bool {
        self.amount == 0 && self.recipient.is_zero() && self.randomness.is_zero()
    }
}

/// The full private witness of a 2-in-2-out transfer.
#[derive(Clone, Debug)]
pub struct TransferWitness {
    pub inputs: [InputWitness; 2],
    pub outputs: [OutputWitness; 2],
    pub spending_key: Field,
}

/// Flatten the witness into the circuit's signal order.
///
/// This is the only place that knows the private-signal layout: per input,
/// amount, owner pubkey, randomness, 20 path bits, and 20 path elements;
/// per output, amount, recipient, and randomness; then the spending key.
pub fn flatten_witness(witness: &TransferWitness) -> Vec<Field> {
    let mut signals = Vec::with_capacity(2 * (3 + 2 * TREE_DEPTH) + 2 * 3 + 1);
    for input in &witness.inputs {
        signals.push(Field::from_u64(input.amount));
        signals.push(input.owner_pubkey);
        signals.push(input.randomness);
        signals.extend(
            input
                .path
                .path_indices
                .iter()
                .map(|bit| Field::from_u64(u64::from(*bit))),
        );
        signals.extend_from_slice(&input.path.path_elements);
    }
    for output in &witness.outputs {
        signals.push(Field::from_u64(output.amount));
        signals.push(output.recipient);
        signals.push(output.randomness);
    }
    signals.push(witness.spending_key);
    signals
}

/// External Groth16 proving system.
///
/// Implementations receive the ABI-ordered public inputs and flattened
/// private witness and return proof bytes; artifact handling, process
/// management, and caching are theirs. Errors are surfaced to callers as
/// `ProofFailed` with the backend detail attached.
#[allow(async_fn_in_trait)]
pub trait ProverBackend {
    async fn prove_transfer(
        &self,
        public_inputs: &[Field; TRANSFER_PUBLIC_INPUT_COUNT],
        witness: &[Field],
    ) -> anyhow::Result<Groth16Proof>;
}

/// Check the witness against everything the circuit will enforce.
#[allow(clippy::arithmetic_side_effects)]
fn check_consistency(
    public: &TransferPublicInputs,
    witness: &TransferWitness,
) -> anyhow::Result<()> {
    let key_image = poseidon::owner_pubkey(witness.spending_key);

    for (slot, input) in witness.inputs.iter().enumerate() {
        let commitment = note::compute_commitment(
            input.amount,
            input.owner_pubkey,
            input.randomness,
            public.token_mint,
        );
        let expected_nullifier = poseidon::nullifier(commitment, key_image);
        anyhow::ensure!(
            public.nullifiers[slot] == expected_nullifier,
            "nullifier {slot} does not match its input note"
        );
        if input.is_dummy() {
            continue;
        }
        anyhow::ensure!(
            input.owner_pubkey == key_image,
            "input {slot} is not owned by the spending key"
        );
        anyhow::ensure!(
            merkle::verify_proof(commitment, &input.path, public.merkle_root),
            "input {slot} membership proof does not reconstruct the merkle root"
        );
    }

    for (slot, output) in witness.outputs.iter().enumerate() {
        let expected = if output.is_dummy() {
            Field::zero()
        } else {
            note::compute_commitment(
                output.amount,
                output.recipient,
                output.randomness,
                public.token_mint,
            )
        };
        anyhow::ensure!(
            public.output_commitments[slot] == expected,
            "output commitment {slot} does not match its note"
        );
    }

    let inflow = u128::from(witness.inputs[0].amount)
        + u128::from(witness.inputs[1].amount)
        + u128::from(public.public_amount.max(0).unsigned_abs());
    let outflow = u128::from(witness.outputs[0].amount)
        + u128::from(witness.outputs[1].amount)
        + u128::from(public.public_amount.min(0).unsigned_abs());
    anyhow::ensure!(
        inflow == outflow,
        "value not conserved: {inflow} flows in, {outflow} flows out"
    );
    Ok(())
}

/// Validate the witness, drive the backend, and bound the run with a
/// timeout. Cancelling the returned future cancels the proving run; no
/// state is touched either way.
pub async fn generate_transfer_proof<P: ProverBackend>(
    backend: &P,
    public: &TransferPublicInputs,
    witness: &TransferWitness,
    timeout: Duration,
) -> Result<Groth16Proof, ClientError> {
    check_consistency(public, witness).map_err(ClientError::ProofFailed)?;

    let public_inputs = public.to_field_elements();
    let signals = flatten_witness(witness);
    tracing::debug!(
        public_amount = public.public_amount,
        signals = signals.len(),
        "invoking proving backend"
    );
    match tokio::time::timeout(timeout, backend.prove_transfer(&public_inputs, &signals)).await {
        Ok(Ok(proof)) => Ok(proof),
        Ok(Err(err)) => Err(ClientError::ProofFailed(err)),
        Err(_) => Err(ClientError::ProofFailed(anyhow::anyhow!(
            "proving backend exceeded the {timeout:?} bound"
        ))),
    }
}
