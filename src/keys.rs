//! Seed-derived key material for the shielded wallet.
//!
//! A single user seed (a BIP-39 mnemonic's bytes, or any secret of at least
//! 16 bytes) deterministically yields the spending key and the viewing key
//! through HKDF-SHA256 with domain-separated info strings. The viewing key is
//! derived independently of the spending key, so handing it to a scanner
//! grants decryption but no spend authority and no algebraic relation to the
//! owner pubkey beyond what the address already publishes.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::bn254::Field;
use crate::error::ClientError;
use crate::poseidon;

/// Seeds shorter than this are rejected before the KDF runs.
pub const MIN_SEED_LEN: usize = 16;

const KDF_SALT: &[u8] = b"shielded-pool/seed/v1";
const SPENDING_KEY_INFO: &[u8] = b"spending-key";
const VIEWING_KEY_INFO: &[u8] = b"viewing-key";

/// The wallet's long-lived secret and its public image.
///
/// `spending_key_hash` carries the same value as `owner_pubkey`; the circuit
/// wires the two as distinct signals, so the API keeps both names.
#[derive(Clone)]
pub struct SpendingKeypair {
    spending_key: Field,
    owner_pubkey: Field,
}

impl SpendingKeypair {
    /// Derive the keypair deterministically from a seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, ClientError> {
        let spending_key = Field::from_bytes_le(&expand(seed, SPENDING_KEY_INFO)?);
        let owner_pubkey = poseidon::owner_pubkey(spending_key);
        Ok(Self {
            spending_key,
            owner_pubkey,
        })
    }

    pub fn spending_key(&self) -> Field {
        self.spending_key
    }

    pub fn owner_pubkey(&self) -> Field {
        self.owner_pubkey
    }

    /// Key image the nullifier derivation binds to.
    pub fn spending_key_hash(&self) -> Field {
        self.owner_pubkey
    }
}

impl core::fmt::Debug for SpendingKeypair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Never print the secret half.
        f.debug_struct("SpendingKeypair")
            .field("owner_pubkey", &self.owner_pubkey)
            .finish_non_exhaustive()
    }
}

/// Derive the 32-byte symmetric viewing key from the same seed.
pub fn derive_viewing_key(seed: &[u8]) -> Result<[u8; 32], ClientError> {
    expand(seed, VIEWING_KEY_INFO)
}

fn expand(seed: &[u8], info: &[u8]) -> Result<[u8; 32], ClientError> {
    if seed.len() < MIN_SEED_LEN {
        return Err(ClientError::InvalidSeed(format!(
            "seed is {} bytes, need at least {MIN_SEED_LEN}",
            seed.len()
        )));
    }
    let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), seed);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .expect("32 bytes is a valid hkdf-sha256 output length");
    Ok(okm)
}
