/// Hashing for block identity and vote digests
///
/// BLAKE3 by default, SHA-256 as the compatibility option.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const HASH_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum HashError {
    #[error("invalid hash length")]
    InvalidLength,
}

/// 32-byte content address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, HashError> {
        if slice.len() != HASH_SIZE {
            return Err(HashError::InvalidLength);
        }
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// The all-zero hash, used as the parent of the genesis block.
    pub fn zero() -> Self {
        Self([0u8; HASH_SIZE])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Hash function selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashFunction {
    /// SHA-256 (compatibility)
    Sha256,
    /// BLAKE3 (performance)
    Blake3,
}

impl Default for HashFunction {
    fn default() -> Self {
        Self::Blake3
    }
}

/// Hash raw bytes with the default function.
pub fn hash_bytes(data: &[u8]) -> Hash {
    hash_bytes_with(data, HashFunction::default())
}

/// Hash raw bytes with a specific function.
pub fn hash_bytes_with(data: &[u8], function: HashFunction) -> Hash {
    match function {
        HashFunction::Sha256 => {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(data);
            let result = hasher.finalize();
            Hash::new(result.into())
        }
        HashFunction::Blake3 => {
            let result = blake3::hash(data);
            Hash::new(*result.as_bytes())
        }
    }
}

/// Hash any serializable value through its canonical bincode encoding.
pub fn hash_data<T: Serialize>(value: &T) -> Hash {
    let encoded = bincode::serialize(value).unwrap_or_default();
    hash_bytes(&encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_consistency() {
        let data = b"block payload";

        let hash1 = hash_bytes(data);
        let hash2 = hash_bytes(data);

        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_distinct_inputs_distinct_hashes() {
        assert_ne!(hash_bytes(b"a"), hash_bytes(b"b"));
        assert_ne!(hash_data(&1u64), hash_data(&2u64));
    }

    #[test]
    fn test_functions_disagree() {
        let data = b"same input";
        assert_ne!(
            hash_bytes_with(data, HashFunction::Sha256),
            hash_bytes_with(data, HashFunction::Blake3),
        );
    }

    #[test]
    fn test_hash_display() {
        let hash = hash_bytes(b"display");
        let display = format!("{}", hash);

        // First 8 bytes in hex.
        assert_eq!(display.len(), 16);
    }

    #[test]
    fn test_from_slice_length_check() {
        assert!(Hash::from_slice(&[0u8; 32]).is_ok());
        assert!(Hash::from_slice(&[0u8; 31]).is_err());
    }

    #[test]
    fn test_zero_hash() {
        assert_eq!(Hash::zero().as_bytes(), &[0u8; HASH_SIZE]);
    }
}
