//! Text codec for shielded receiving addresses.
//!
//! An address packs the receiving pubkey and the 32-byte viewing key into
//! `"zk:" + base64(64 bytes)`: everything a payer needs to mint a note the
//! recipient can find and decrypt.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::bn254::Field;
use crate::error::ClientError;

pub const ADDRESS_PREFIX: &str = "zk:";

const PAYLOAD_LEN: usize = 64;

/// The external receiving identifier a payer constructs notes against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZkAddress {
    pub receiving_pubkey: Field,
    pub viewing_key: [u8; 32],
}

impl ZkAddress {
    pub fn new(receiving_pubkey: Field, viewing_key: [u8; 32]) -> Self {
        Self {
            receiving_pubkey,
            viewing_key,
        }
    }

    /// `"zk:" ∥ base64(field_to_bytes(receiving_pubkey) ∥ viewing_key)`.
    pub fn encode(&self) -> String {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[..32].copy_from_slice(&self.receiving_pubkey.to_bytes_le());
        payload[32..].copy_from_slice(&self.viewing_key);
        format!("{ADDRESS_PREFIX}{}", STANDARD.encode(payload))
    }

    /// Parse the text form; rejects a bad prefix, bad base64, or any payload
    /// that is not exactly 64 bytes.
    pub fn decode(s: &str) -> Result<Self, ClientError> {
        let encoded = s
            .strip_prefix(ADDRESS_PREFIX)
            .ok_or_else(|| ClientError::InvalidAddress(format!("missing {ADDRESS_PREFIX:?} prefix")))?;
        let payload = STANDARD
            .decode(encoded)
            .map_err(|err| ClientError::InvalidAddress(format!("base64: {err}")))?;
        if payload.len() != PAYLOAD_LEN {
            return Err(ClientError::InvalidAddress(format!(
                "payload is {} bytes, expected {PAYLOAD_LEN}",
                payload.len()
            )));
        }
        let mut pubkey = [0u8; 32];
        let mut viewing_key = [0u8; 32];
        pubkey.copy_from_slice(payload.get(..32).expect("length checked above"));
        viewing_key.copy_from_slice(payload.get(32..).expect("length checked above"));
        Ok(Self {
            receiving_pubkey: Field::from_bytes_le(&pubkey),
            viewing_key,
        })
    }
}
