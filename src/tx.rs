//! Spend planning: coin selection, output derivation, witness assembly.
//!
//! The circuit is fixed at two inputs and two outputs, so every shielded
//! spend, transfer or unshield alike, reduces to the same shape: pick at
//! most two notes, derive a primary output and a change output, pad the gaps
//! with dummies, and assemble the public inputs and private witness in one
//! place.
//! Planning is pure: nothing here touches wallet state, signs, or proves, so
//! the policies stay deterministic and directly testable.

use crate::bn254::Field;
use crate::error::ClientError;
use crate::keys::SpendingKeypair;
use crate::merkle::{MembershipProof, MerkleTree, TREE_DEPTH};
use crate::note::{self, Note};
use crate::prover::{InputWitness, OutputWitness, TransferPublicInputs, TransferWitness};

/// Hard circuit cap on consumed notes per transaction.
pub const MAX_INPUTS: usize = 2;

/// Notes picked to fund a spend, plus their total value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedInputs {
    pub notes: Vec<Note>,
    pub total: u64,
}

/// Deterministic coin selection under the two-input cap.
///
/// Candidates are ordered by amount descending, ties broken by leaf index
/// ascending (older notes first), so the same wallet state always selects
/// the same notes. Selection stops as soon as the accumulated value covers
/// `amount`; if the two largest notes cannot cover it the spend fails with
/// `InsufficientBalance` even when the wallet's total balance would suffice,
/// and callers surface that and schedule a consolidation transfer.
pub fn select_inputs(notes: &[Note], amount: u64) -> Result<SelectedInputs, ClientError> {
    let mut candidates: Vec<&Note> = notes.iter().collect();
    candidates.sort_by(|a, b| {
        b.amount.cmp(&a.amount).then_with(|| {
            a.leaf_index
                .unwrap_or(u64::MAX)
                .cmp(&b.leaf_index.unwrap_or(u64::MAX))
        })
    });

    let mut selected = Vec::new();
    let mut total: u64 = 0;
    for candidate in candidates {
        if total >= amount && !selected.is_empty() {
            break;
        }
        if selected.len() == MAX_INPUTS {
            break;
        }
        total = total.saturating_add(candidate.amount);
        selected.push(*candidate);
    }

    if total < amount || selected.is_empty() {
        return Err(ClientError::InsufficientBalance {
            required: amount,
            selectable: total,
        });
    }
    Ok(SelectedInputs {
        notes: selected,
        total,
    })
}

/// A fully planned 2-in-2-out spend, ready for proving and submission.
#[derive(Clone, Debug)]
pub struct SpendPlan {
    /// Real notes consumed (one or two).
    pub spent_notes: Vec<Note>,
    /// Output addressed to the payee; `None` for unshield.
    pub recipient_note: Option<Note>,
    /// Change back to the sender; `None` when the spend is exact.
    pub change_note: Option<Note>,
    pub public_inputs: TransferPublicInputs,
    pub witness: TransferWitness,
}

impl SpendPlan {
    /// Output commitments that actually land on chain, in instruction order.
    pub fn real_output_commitments(&self) -> Vec<Field> {
        self.recipient_note
            .iter()
            .chain(self.change_note.iter())
            .map(Note::commitment)
            .collect()
    }
}

/// Plan an internal shielded transfer (`public_amount = 0`).
pub fn plan_transfer(
    notes: &[Note],
    keys: &SpendingKeypair,
    tree: &MerkleTree,
    recipient_pubkey: Field,
    amount: u64,
    token_mint: Field,
) -> Result<SpendPlan, ClientError> {
    let selection = select_inputs(notes, amount)?;
    let recipient_note = note::create_note(amount, recipient_pubkey, token_mint);
    let change_note = change_output(&selection, amount, keys, token_mint);
    assemble(
        selection,
        Some(recipient_note),
        change_note,
        0,
        keys,
        tree,
        token_mint,
    )
}

/// Plan an exit from the pool (`public_amount = -amount`); the clear-text
/// recipient travels in the instruction record, not the circuit.
pub fn plan_unshield(
    notes: &[Note],
    keys: &SpendingKeypair,
    tree: &MerkleTree,
    amount: u64,
    token_mint: Field,
) -> Result<SpendPlan, ClientError> {
    let selection = select_inputs(notes, amount)?;
    let public_amount = i64::try_from(amount)
        .map(|a| -a)
        .map_err(|_| {
            ClientError::ProofFailed(anyhow::anyhow!(
                "amount {amount} exceeds the signed public-amount range"
            ))
        })?;
    let change_note = change_output(&selection, amount, keys, token_mint);
    assemble(
        selection,
        None,
        change_note,
        public_amount,
        keys,
        tree,
        token_mint,
    )
}

fn change_output(
    selection: &SelectedInputs,
    amount: u64,
    keys: &SpendingKeypair,
    token_mint: Field,
) -> Option<Note> {
    let change = selection.total.saturating_sub(amount);
    (change > 0).then(|| note::create_note(change, keys.owner_pubkey(), token_mint))
}

#[allow(clippy::indexing_slicing)]
fn assemble(
    selection: SelectedInputs,
    recipient_note: Option<Note>,
    change_note: Option<Note>,
    public_amount: i64,
    keys: &SpendingKeypair,
    tree: &MerkleTree,
    token_mint: Field,
) -> Result<SpendPlan, ClientError> {
    let mut inputs = [dummy_input(); 2];
    for (slot, spent) in selection.notes.iter().enumerate() {
        let leaf_index = spent.leaf_index.ok_or_else(|| {
            ClientError::ProofFailed(anyhow::anyhow!("selected note was never inserted in the tree"))
        })?;
        let path = tree
            .generate_proof(leaf_index)
            .map_err(ClientError::ProofFailed)?;
        inputs[slot] = InputWitness {
            amount: spent.amount,
            owner_pubkey: spent.owner_pubkey,
            randomness: spent.randomness,
            path,
        };
    }

    // Output slot 0 is the payee (or the change when exiting the pool),
    // slot 1 is the change (or a dummy). Dummy outputs publish the zero
    // commitment and never reach the tree.
    let slots = match (&recipient_note, &change_note) {
        (Some(recipient), change) => [Some(*recipient), *change],
        (None, change) => [*change, None],
    };
    let outputs = slots.map(|slot| match slot {
        Some(note) => OutputWitness {
            amount: note.amount,
            recipient: note.owner_pubkey,
            randomness: note.randomness,
        },
        None => OutputWitness {
            amount: 0,
            recipient: Field::zero(),
            randomness: Field::zero(),
        },
    });

    let key_image = keys.spending_key_hash();
    let nullifiers = inputs.map(|input| {
        let commitment = note::compute_commitment(
            input.amount,
            input.owner_pubkey,
            input.randomness,
            token_mint,
        );
        note::compute_nullifier(commitment, key_image)
    });
    let output_commitments = outputs.map(|output| {
        if output.is_dummy() {
            Field::zero()
        } else {
            note::compute_commitment(output.amount, output.recipient, output.randomness, token_mint)
        }
    });

    Ok(SpendPlan {
        spent_notes: selection.notes,
        recipient_note,
        change_note,
        public_inputs: TransferPublicInputs {
            merkle_root: tree.root(),
            nullifiers,
            output_commitments,
            public_amount,
            token_mint,
        },
        witness: TransferWitness {
            inputs,
            outputs,
            spending_key: keys.spending_key(),
        },
    })
}

fn dummy_input() -> InputWitness {
    InputWitness {
        amount: 0,
        owner_pubkey: Field::zero(),
        randomness: Field::zero(),
        path: MembershipProof {
            leaf_index: 0,
            path_indices: [0; TREE_DEPTH],
            path_elements: [Field::zero(); TREE_DEPTH],
        },
    }
}
