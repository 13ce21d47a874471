//! Content hashes and incremental hashing
//!
//! The storefront declares MD5 and SHA-1 digests for its files. [`ContentHash`]
//! carries a digest together with its algorithm so the two are never compared
//! by accident, and [`StreamingHasher`] lets the download engine feed bytes as
//! they arrive instead of re-reading the finished file.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::Digest as _;
use thiserror::Error;

/// Hash algorithms understood by the storefront
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
}

impl HashAlgorithm {
    /// Length of the raw digest in bytes
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" | "sha-1" => Ok(HashAlgorithm::Sha1),
            other => Err(HashParseError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Errors produced while parsing a textual digest
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashParseError {
    #[error("Unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Invalid {algorithm} digest: {digest}")]
    InvalidDigest {
        algorithm: HashAlgorithm,
        digest: String,
    },
}

/// A digest together with the algorithm that produced it
///
/// Displays as `algorithm:hex`, e.g. `md5:50c9d1c465f3cbff652be1509c2e2a4e`.
/// Serializes as `{"algorithm": "md5", "digest": "<hex>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawContentHash", into = "RawContentHash")]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    digest: Vec<u8>,
}

impl ContentHash {
    /// Parse a hex digest for the given algorithm (case insensitive)
    pub fn from_hex(algorithm: HashAlgorithm, hex: &str) -> Result<Self, HashParseError> {
        let hex = hex.trim();
        let invalid = || HashParseError::InvalidDigest {
            algorithm,
            digest: hex.to_string(),
        };

        if hex.len() != algorithm.digest_len() * 2 || !hex.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(invalid());
        }

        let digest = hex
            .as_bytes()
            .chunks(2)
            .map(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|s| u8::from_str_radix(s, 16).ok())
                    .ok_or_else(invalid)
            })
            .collect::<Result<Vec<u8>, _>>()?;

        Ok(Self { algorithm, digest })
    }

    /// Wrap raw digest bytes; the length must match the algorithm
    pub fn from_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> Option<Self> {
        (bytes.len() == algorithm.digest_len()).then(|| Self {
            algorithm,
            digest: bytes.to_vec(),
        })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.digest
    }

    /// Lowercase hex representation of the digest
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;
        self.digest
            .iter()
            .fold(String::with_capacity(self.digest.len() * 2), |mut acc, b| {
                let _ = write!(&mut acc, "{:02x}", b);
                acc
            })
    }

    /// Hash an in-memory buffer in one go
    pub fn of_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let mut hasher = StreamingHasher::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = HashParseError;

    /// Parses `algorithm:hex`; a bare hex string is taken as MD5 or SHA-1 by length
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((algorithm, hex)) => Self::from_hex(algorithm.parse()?, hex),
            None if s.len() == HashAlgorithm::Sha1.digest_len() * 2 => {
                Self::from_hex(HashAlgorithm::Sha1, s)
            }
            None => Self::from_hex(HashAlgorithm::Md5, s),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawContentHash {
    algorithm: HashAlgorithm,
    digest: String,
}

impl TryFrom<RawContentHash> for ContentHash {
    type Error = HashParseError;

    fn try_from(raw: RawContentHash) -> Result<Self, Self::Error> {
        ContentHash::from_hex(raw.algorithm, &raw.digest)
    }
}

impl From<ContentHash> for RawContentHash {
    fn from(hash: ContentHash) -> Self {
        RawContentHash {
            digest: hash.to_hex(),
            algorithm: hash.algorithm,
        }
    }
}

/// Incremental hasher for either supported algorithm
pub enum StreamingHasher {
    Md5(md5::Context),
    Sha1(sha1::Sha1),
}

impl StreamingHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => StreamingHasher::Md5(md5::Context::new()),
            HashAlgorithm::Sha1 => StreamingHasher::Sha1(sha1::Sha1::new()),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            StreamingHasher::Md5(_) => HashAlgorithm::Md5,
            StreamingHasher::Sha1(_) => HashAlgorithm::Sha1,
        }
    }

    /// Feed the next chunk of content
    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamingHasher::Md5(ctx) => ctx.consume(data),
            StreamingHasher::Sha1(hasher) => hasher.update(data),
        }
    }

    pub fn finalize(self) -> ContentHash {
        match self {
            StreamingHasher::Md5(ctx) => ContentHash {
                algorithm: HashAlgorithm::Md5,
                digest: ctx.compute().0.to_vec(),
            },
            StreamingHasher::Sha1(hasher) => ContentHash {
                algorithm: HashAlgorithm::Sha1,
                digest: hasher.finalize().to_vec(),
            },
        }
    }
}

impl fmt::Debug for StreamingHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamingHasher")
            .field(&self.algorithm())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        let md5 = ContentHash::of_bytes(HashAlgorithm::Md5, b"hello world");
        assert_eq!(md5.to_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");

        let sha1 = ContentHash::of_bytes(HashAlgorithm::Sha1, b"hello world");
        assert_eq!(sha1.to_hex(), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        for algorithm in [HashAlgorithm::Md5, HashAlgorithm::Sha1] {
            let mut hasher = StreamingHasher::new(algorithm);
            for chunk in data.chunks(333) {
                hasher.update(chunk);
            }
            assert_eq!(hasher.finalize(), ContentHash::of_bytes(algorithm, &data));
        }
    }

    #[test]
    fn test_from_hex_is_case_insensitive() {
        let lower =
            ContentHash::from_hex(HashAlgorithm::Md5, "5eb63bbbe01eeed093cb22bb8f5acdc3").unwrap();
        let upper =
            ContentHash::from_hex(HashAlgorithm::Md5, "5EB63BBBE01EEED093CB22BB8F5ACDC3").unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(ContentHash::from_hex(HashAlgorithm::Md5, "abc").is_err());
        assert!(ContentHash::from_hex(HashAlgorithm::Md5, &"z".repeat(32)).is_err());
        // a valid MD5 is not a valid SHA-1
        assert!(
            ContentHash::from_hex(HashAlgorithm::Sha1, "5eb63bbbe01eeed093cb22bb8f5acdc3").is_err()
        );
    }

    #[test]
    fn test_algorithms_never_compare_equal() {
        let md5 = ContentHash::of_bytes(HashAlgorithm::Md5, b"x");
        let sha1 = ContentHash::of_bytes(HashAlgorithm::Sha1, b"x");
        assert_ne!(md5, sha1);
    }

    #[test]
    fn test_display_and_parse() {
        let hash = ContentHash::of_bytes(HashAlgorithm::Sha1, b"game.zip");
        let text = hash.to_string();
        assert!(text.starts_with("sha1:"));
        assert_eq!(text.parse::<ContentHash>().unwrap(), hash);

        let bare: ContentHash = "5eb63bbbe01eeed093cb22bb8f5acdc3".parse().unwrap();
        assert_eq!(bare.algorithm(), HashAlgorithm::Md5);
    }

    #[test]
    fn test_serde_shape() {
        let hash = ContentHash::of_bytes(HashAlgorithm::Md5, b"hello world");
        let json = serde_json::to_value(&hash).unwrap();
        assert_eq!(json["algorithm"], "md5");
        assert_eq!(json["digest"], "5eb63bbbe01eeed093cb22bb8f5acdc3");

        let back: ContentHash = serde_json::from_value(json).unwrap();
        assert_eq!(back, hash);

        let bad = serde_json::json!({"algorithm": "md5", "digest": "nope"});
        assert!(serde_json::from_value::<ContentHash>(bad).is_err());
    }
}
