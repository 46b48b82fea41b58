//! Text digests for the hash generator endpoints.

use std::collections::BTreeMap;

use md5::Md5;
use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{LookupError, LookupResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 4] = [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512];

    /// Unknown or missing names fall back to SHA-256.
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("md5") => Self::Md5,
            Some("sha1") => Self::Sha1,
            Some("sha512") => Self::Sha512,
            _ => Self::Sha256,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Lowercase hex digest of `text`'s UTF-8 bytes.
    pub fn digest_hex(self, text: &str) -> String {
        let bytes = text.as_bytes();
        match self {
            Self::Md5 => hex::encode(Md5::digest(bytes)),
            Self::Sha1 => hex::encode(Sha1::digest(bytes)),
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HashOutput {
    pub algorithm: HashAlgorithm,
    pub hash: String,
    pub length: usize,
}

pub fn hash_text(text: &str, algorithm: Option<&str>) -> LookupResult<HashOutput> {
    require_text(text)?;
    let algorithm = HashAlgorithm::from_name(algorithm);
    let hash = algorithm.digest_hex(text);
    Ok(HashOutput {
        algorithm,
        length: hash.len(),
        hash,
    })
}

/// Digest `text` with every supported algorithm, keyed by algorithm name.
pub fn hash_all(text: &str) -> LookupResult<BTreeMap<&'static str, String>> {
    require_text(text)?;
    Ok(HashAlgorithm::ALL
        .iter()
        .map(|algo| (algo.as_str(), algo.digest_hex(text)))
        .collect())
}

fn require_text(text: &str) -> LookupResult<()> {
    if text.is_empty() {
        return Err(LookupError::InvalidInput("text is required".into()));
    }
    Ok(())
}
