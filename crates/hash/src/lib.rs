#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Content addressing for crossforge
//!
//! Two digests identify everything the orchestrator touches: artifacts are
//! directories named by their git-tree-sha1 (`TreeHash`), and archives are
//! verified by SHA-256 (`Sha256`).

mod tree;

pub use tree::tree_hash_of_dir;

use crossforge_errors::{Error, StorageError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256 as Sha256Hasher};
use std::fmt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Size of chunks for streaming hash computation
const CHUNK_SIZE: usize = 64 * 1024; // 64KB

/// A SHA-256 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256 {
    bytes: [u8; 32],
}

impl Sha256 {
    /// Create a digest from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse from hex string
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid hexadecimal or is not
    /// exactly 64 characters (32 bytes).
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let bytes = parse_hex(s, 32)?;
        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self::from_bytes(array))
    }

    /// Compute digest of a byte slice
    #[must_use]
    pub fn from_data(data: &[u8]) -> Self {
        let digest = Sha256Hasher::digest(data);
        Self::from_bytes(digest.into())
    }

    /// Compute digest of a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub async fn hash_file(path: &Path) -> Result<Self, Error> {
        let mut file = File::open(path)
            .await
            .map_err(|_| StorageError::PathNotFound {
                path: path.display().to_string(),
            })?;

        let mut hasher = Sha256Hasher::new();
        let mut buffer = vec![0; CHUNK_SIZE];

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(Self::from_bytes(hasher.finalize().into()))
    }
}

impl fmt::Display for Sha256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A git-tree-sha1 identifying a content-addressed artifact directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeHash {
    bytes: [u8; 20],
}

impl TreeHash {
    /// Create a tree hash from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self { bytes }
    }

    /// Get the raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.bytes
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse from hex string
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid hexadecimal or is not
    /// exactly 40 characters (20 bytes).
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let bytes = parse_hex(s, 20)?;
        let mut array = [0u8; 20];
        array.copy_from_slice(&bytes);
        Ok(Self::from_bytes(array))
    }
}

impl fmt::Display for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for TreeHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TreeHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Sha256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Sha256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Verify a file matches an expected digest
///
/// # Errors
///
/// Returns an error if the file cannot be read or hashed.
pub async fn verify_file(path: &Path, expected: &Sha256) -> Result<bool, Error> {
    let actual = Sha256::hash_file(path).await?;
    Ok(actual == *expected)
}

fn parse_hex(s: &str, expected_len: usize) -> Result<Vec<u8>, Error> {
    let bytes = hex::decode(s).map_err(|e| StorageError::CorruptedData {
        message: format!("invalid hex: {e}"),
    })?;

    if bytes.len() != expected_len {
        return Err(StorageError::CorruptedData {
            message: format!("digest must be {expected_len} bytes, got {}", bytes.len()),
        }
        .into());
    }

    Ok(bytes)
}
