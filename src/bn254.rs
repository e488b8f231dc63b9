//! BN254 scalar-field elements as the crate's universal value type.
//!
//! Everything the pool commits to (amounts, keys, randomness, commitments,
//! nullifiers, Merkle nodes) lives in this field. `Field` wraps the arkworks
//! representation and fixes the byte convention once: little-endian 32-byte
//! arrays, reduced modulo the field order on ingest, canonical on egress.
//! Higher layers never touch `ark_bn254::Fr` directly.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField, Zero};
use rand::RngCore;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Field(Fr);

impl Field {
    pub fn zero() -> Self {
        Field(Fr::zero())
    }

    pub fn one() -> Self {
        Self::from_u64(1)
    }

    pub fn from_u64(v: u64) -> Self {
        Field(Fr::from(v))
    }

    /// Lift a signed amount into the field: negative values map to `p - |v|`,
    /// which is how the circuit reads a signed public amount.
    pub fn from_i64(v: i64) -> Self {
        if v >= 0 {
            Self::from_u64(v as u64)
        } else {
            Field(-Fr::from(v.unsigned_abs()))
        }
    }

    /// Interpret 32 little-endian bytes as an integer and reduce mod p.
    pub fn from_bytes_le(bytes: &[u8; 32]) -> Self {
        Field(Fr::from_le_bytes_mod_order(bytes))
    }

    /// Canonical (reduced) little-endian 32-byte form.
    pub fn to_bytes_le(self) -> [u8; 32] {
        let repr = self.0.into_bigint().to_bytes_le();
        let mut out = [0u8; 32];
        for (dst, src) in out.iter_mut().zip(repr.iter()) {
            *dst = *src;
        }
        out
    }

    /// Sample a uniform field element from the OS RNG.
    ///
    /// Draws 254 bits and resamples until the draw lands below the modulus,
    /// so the result carries no modular bias.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        loop {
            rand::rngs::OsRng.fill_bytes(&mut bytes);
            if let Some(last) = bytes.last_mut() {
                *last &= 0x3f;
            }
            if let Some(fe) = <Fr as ark_ff::Field>::from_random_bytes(&bytes) {
                return Field(fe);
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub(crate) fn into_fr(self) -> Fr {
        self.0
    }

    pub(crate) fn from_fr(fr: Fr) -> Self {
        Field(fr)
    }
}

impl Default for Field {
    fn default() -> Self {
        Self::zero()
    }
}

impl core::fmt::Debug for Field {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Field(0x")?;
        let bytes = self.to_bytes_le();
        for byte in bytes.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl core::ops::Add for Field {
    type Output = Field;

    fn add(self, rhs: Self) -> Self::Output {
        Field(self.0 + rhs.0)
    }
}

impl core::ops::Sub for Field {
    type Output = Field;

    fn sub(self, rhs: Self) -> Self::Output {
        Field(self.0 - rhs.0)
    }
}

impl core::ops::Mul for Field {
    type Output = Field;

    fn mul(self, rhs: Self) -> Self::Output {
        Field(self.0 * rhs.0)
    }
}

impl core::ops::Neg for Field {
    type Output = Field;

    fn neg(self) -> Self::Output {
        Field(-self.0)
    }
}

impl serde::Serialize for Field {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.to_bytes_le(), serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Field {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <[u8; 32]>::deserialize(deserializer)?;
        Ok(Field::from_bytes_le(&bytes))
    }
}
