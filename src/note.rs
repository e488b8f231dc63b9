//! Notes: the atomic unit of shielded value.
//!
//! A note's commitment is `Poseidon(amount, owner_pubkey, randomness,
//! token_mint)` and its nullifier is `Poseidon(commitment,
//! spending_key_hash)`. Senders attach an encrypted copy of the opening so
//! the receiver can recover the note off-chain with nothing but the viewing
//! key; the ciphertext envelope is bit-exact across wallet implementations.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;

use crate::bn254::Field;
use crate::poseidon;

/// Envelope version byte; bump only with a format change.
pub const ENCRYPTED_NOTE_VERSION: u8 = 0x01;

const NONCE_LEN: usize = 24;
const PLAINTEXT_LEN: usize = 8 + 32 + 32 + 32;
const TAG_LEN: usize = 16;

/// Fixed envelope size: version ∥ nonce ∥ ciphertext ∥ tag.
pub const ENCRYPTED_NOTE_LEN: usize = 1 + NONCE_LEN + PLAINTEXT_LEN + TAG_LEN;

/// A spendable (or incoming) shielded output.
///
/// The commitment is a pure function of the four value fields, so it is
/// recomputed on demand rather than stored. `leaf_index` is set once the
/// commitment lands in the Merkle tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Note {
    pub amount: u64,
    pub owner_pubkey: Field,
    pub randomness: Field,
    pub token_mint: Field,
    pub leaf_index: Option<u64>,
}

impl Note {
    /// `Poseidon(amount, owner_pubkey, randomness, token_mint)`.
    pub fn commitment(&self) -> Field {
        compute_commitment(self.amount, self.owner_pubkey, self.randomness, self.token_mint)
    }

    /// Padding input for the circuit's two-input layout: zero amount, zero
    /// owner, zero randomness. The circuit's dummy branch skips the Merkle
    /// check for it, but its commitment and nullifier are still well defined.
    pub fn dummy(token_mint: Field) -> Self {
        Self {
            amount: 0,
            owner_pubkey: Field::zero(),
            randomness: Field::zero(),
            token_mint,
            leaf_index: None,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.amount == 0 && self.owner_pubkey.is_zero() && self.randomness.is_zero()
    }
}

/// Mint a fresh note: samples new randomness, so two calls never collide.
pub fn create_note(amount: u64, owner_pubkey: Field, token_mint: Field) -> Note {
    Note {
        amount,
        owner_pubkey,
        randomness: Field::random(),
        token_mint,
        leaf_index: None,
    }
}

/// Deterministic commitment recomputation, for verification paths.
pub fn compute_commitment(
    amount: u64,
    owner_pubkey: Field,
    randomness: Field,
    token_mint: Field,
) -> Field {
    poseidon::note_commitment(Field::from_u64(amount), owner_pubkey, randomness, token_mint)
}

/// `Poseidon(commitment, spending_key_hash)`.
pub fn compute_nullifier(commitment: Field, spending_key_hash: Field) -> Field {
    poseidon::nullifier(commitment, spending_key_hash)
}

/// Ciphertext blob attached alongside a commitment on chain.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EncryptedNote(Vec<u8>);

impl EncryptedNote {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Encrypt a note's opening to a viewing key.
///
/// Envelope: `version (1) ∥ nonce (24) ∥ XChaCha20-Poly1305(amount LE 8 ∥
/// owner_pubkey 32 ∥ randomness 32 ∥ token_mint 32) ∥ tag (16)`, no
/// associated data, fresh nonce per call.
pub fn encrypt_note(note: &Note, recipient_viewing_key: &[u8; 32]) -> anyhow::Result<EncryptedNote> {
    let mut plaintext = [0u8; PLAINTEXT_LEN];
    plaintext[0..8].copy_from_slice(&note.amount.to_le_bytes());
    plaintext[8..40].copy_from_slice(&note.owner_pubkey.to_bytes_le());
    plaintext[40..72].copy_from_slice(&note.randomness.to_bytes_le());
    plaintext[72..104].copy_from_slice(&note.token_mint.to_bytes_le());

    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(recipient_viewing_key));
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|_| anyhow::anyhow!("note encryption failed"))?;

    let mut out = Vec::with_capacity(ENCRYPTED_NOTE_LEN);
    out.push(ENCRYPTED_NOTE_VERSION);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(EncryptedNote(out))
}

/// Try to decrypt a scanned ciphertext with the holder's viewing key.
///
/// Returns `None` (not an error) on any mismatch: wrong length, unknown
/// version, or MAC failure. Scanning walks every ciphertext on chain and
/// must silently skip the ones addressed to other wallets.
pub fn decrypt_note(ciphertext: &EncryptedNote, viewing_key: &[u8; 32]) -> Option<Note> {
    let bytes = ciphertext.as_bytes();
    if bytes.len() != ENCRYPTED_NOTE_LEN || *bytes.first()? != ENCRYPTED_NOTE_VERSION {
        return None;
    }
    let nonce = bytes.get(1..1 + NONCE_LEN)?;
    let body = bytes.get(1 + NONCE_LEN..)?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(viewing_key));
    let plaintext = cipher.decrypt(XNonce::from_slice(nonce), body).ok()?;
    if plaintext.len() != PLAINTEXT_LEN {
        return None;
    }

    let mut amount_bytes = [0u8; 8];
    amount_bytes.copy_from_slice(plaintext.get(0..8)?);
    let mut owner = [0u8; 32];
    owner.copy_from_slice(plaintext.get(8..40)?);
    let mut randomness = [0u8; 32];
    randomness.copy_from_slice(plaintext.get(40..72)?);
    let mut mint = [0u8; 32];
    mint.copy_from_slice(plaintext.get(72..104)?);

    Some(Note {
        amount: u64::from_le_bytes(amount_bytes),
        owner_pubkey: Field::from_bytes_le(&owner),
        randomness: Field::from_bytes_le(&randomness),
        token_mint: Field::from_bytes_le(&mint),
        leaf_index: None,
    })
}
