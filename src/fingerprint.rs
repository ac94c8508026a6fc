//! Bit-packed token-type fingerprint.
//!
//! A [`Fingerprint`] records the alpha/numeric shape of a tokenized string and
//! is used as an exact-match key into a knowledge base. Two strings with the
//! same sequence of alpha and numeric runs produce equal fingerprints, no matter
//! what the runs contain.
//!
//! ## Byte layout
//!
//! ```text
//! byte:   0        1              31       32
//!       [bbbbbbbb][bbbbbbbb] ... [bbbbbbbb][count]
//!        ^ token 0..7            ^ tokens 248..254
//! ```
//!
//! Bits are appended by shifting the current byte left and or-ing the new bit,
//! so a full byte holds its first token in the most significant bit. The last
//! byte holds the number of tokens encoded (0..=255). This layout is shared
//! with persisted keys and must not change.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Size of the raw fingerprint buffer in bytes.
pub const FINGERPRINT_LEN: usize = 33;

/// Maximum number of tokens a fingerprint can encode.
pub const MAX_TOKENS: usize = u8::MAX as usize;

const COUNT_INDEX: usize = FINGERPRINT_LEN - 1;
const BITS_PER_BYTE: usize = 8;

#[derive(Clone, Copy)]
pub struct Fingerprint {
    raw: [u8; FINGERPRINT_LEN],
}

impl Fingerprint {
    /// Create an empty fingerprint (zero tokens).
    pub fn new() -> Self {
        Fingerprint { raw: [0; FINGERPRINT_LEN] }
    }

    /// Rebuild a fingerprint from its persisted 33-byte form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; FINGERPRINT_LEN] = bytes
            .try_into()
            .map_err(|_| Error::InvalidFingerprintLength { expected: FINGERPRINT_LEN, actual: bytes.len() })?;
        Ok(Fingerprint { raw })
    }

    /// Copy of the raw 33-byte representation.
    pub fn to_bytes(&self) -> [u8; FINGERPRINT_LEN] {
        self.raw
    }

    /// Number of tokens encoded so far.
    pub fn token_count(&self) -> usize {
        self.raw[COUNT_INDEX] as usize
    }

    /// Append an alpha token (bit 0).
    pub fn mark_alpha(&mut self) -> Result<()> {
        self.push_bit(false)
    }

    /// Append a numeric token (bit 1).
    pub fn mark_numeric(&mut self) -> Result<()> {
        self.push_bit(true)
    }

    /// Returns whether the token at `index` was marked numeric, or `None` when
    /// `index` is past the encoded length.
    pub fn is_numeric_at(&self, index: usize) -> Option<bool> {
        let count = self.token_count();
        if index >= count {
            return None;
        }

        let byte = index / BITS_PER_BYTE;
        // Bits in a partially filled byte are right-aligned.
        let bits_in_byte = (count - byte * BITS_PER_BYTE).min(BITS_PER_BYTE);
        let shift = bits_in_byte - 1 - index % BITS_PER_BYTE;
        Some((self.raw[byte] >> shift) & 1 == 1)
    }

    fn push_bit(&mut self, numeric: bool) -> Result<()> {
        let count = self.token_count();
        if count == MAX_TOKENS {
            return Err(Error::FingerprintOverflow { max: MAX_TOKENS });
        }

        let byte = count / BITS_PER_BYTE;
        self.raw[byte] <<= 1;
        if numeric {
            self.raw[byte] |= 0x01;
        }
        self.raw[COUNT_INDEX] += 1;
        Ok(())
    }

    /// The bytes that carry bits for the encoded tokens.
    fn used_bytes(&self) -> &[u8] {
        let used = self.token_count().div_ceil(BITS_PER_BYTE);
        &self.raw[..used]
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.raw[COUNT_INDEX] == other.raw[COUNT_INDEX] && self.used_bytes() == other.used_bytes()
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw[COUNT_INDEX].hash(state);
        self.used_bytes().hash(state);
    }
}

/// Upper-case hex of all 33 bytes (66 characters).
impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.raw))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint").field("tokens", &self.token_count()).field("hex", &self.to_string()).finish()
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidFingerprintLength { expected: FINGERPRINT_LEN, actual: s.len() / 2 };
        if s.len() != FINGERPRINT_LEN * 2 {
            return Err(invalid());
        }

        let mut raw = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(s, &mut raw).map_err(|_| invalid())?;
        Ok(Fingerprint { raw })
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
