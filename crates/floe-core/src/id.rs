use std::fmt;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

type Blake2b256 = Blake2b<U32>;

/// A 32-byte content identifier: the BLAKE2b-256 digest of a plaintext
/// byte sequence (a file chunk, a serialized tree, or a snapshot).
///
/// Content ids define identity for deduplication. They are independent of
/// how (or whether) the plaintext is encrypted by the object store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId(pub [u8; 32]);

impl ContentId {
    /// Compute the content id of a plaintext buffer.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(data);
        ContentId(hasher.finalize().into())
    }

    /// Hex-encode the full content id.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a content id from a 64-character hex string.
    pub fn from_hex(hex_str: &str) -> std::result::Result<Self, String> {
        Ok(ContentId(decode_hex32(hex_str)?))
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentId::from_hex(&s).map_err(D::Error::custom)
    }
}

/// A 32-byte storage identifier assigned by the object store when an
/// encrypted object is written.
///
/// Not equal to the plaintext's [`ContentId`], and not stable: two
/// encryptions of the same plaintext yield distinct storage ids.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageId(pub [u8; 32]);

impl StorageId {
    /// Hex-encode the full storage id.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a storage id from a 64-character hex string.
    pub fn from_hex(hex_str: &str) -> std::result::Result<Self, String> {
        Ok(StorageId(decode_hex32(hex_str)?))
    }
}

impl fmt::Debug for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl Serialize for StorageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for StorageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        StorageId::from_hex(&s).map_err(D::Error::custom)
    }
}

fn decode_hex32(hex_str: &str) -> std::result::Result<[u8; 32], String> {
    let bytes = hex::decode(hex_str).map_err(|e| format!("invalid hex: {e}"))?;
    if bytes.len() != 32 {
        return Err(format!("expected 32 bytes, got {}", bytes.len()));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}
