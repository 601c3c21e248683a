// src/repomd/checksum.rs

//! Algorithm-tagged digests used by repository metadata

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::fmt;

/// Checksum algorithm type
///
/// Names follow the `type` attribute used in repomd.xml. Algorithms we cannot
/// compute are kept verbatim in `Other` so that a manifest survives a
/// decode/encode cycle unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChecksumType {
    Md5,
    /// SHA-1 under the name older createrepo releases write
    Sha,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Other(String),
}

impl ChecksumType {
    /// Parse the algorithm name as found in a `type` attribute
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "md5" => ChecksumType::Md5,
            "sha" => ChecksumType::Sha,
            "sha1" => ChecksumType::Sha1,
            "sha224" => ChecksumType::Sha224,
            "sha256" => ChecksumType::Sha256,
            "sha384" => ChecksumType::Sha384,
            "sha512" => ChecksumType::Sha512,
            _ => ChecksumType::Other(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ChecksumType::Md5 => "md5",
            ChecksumType::Sha => "sha",
            ChecksumType::Sha1 => "sha1",
            ChecksumType::Sha224 => "sha224",
            ChecksumType::Sha256 => "sha256",
            ChecksumType::Sha384 => "sha384",
            ChecksumType::Sha512 => "sha512",
            ChecksumType::Other(name) => name,
        }
    }

    /// Hex digest of `data`, or `None` if this algorithm is not supported
    pub fn digest(&self, data: &[u8]) -> Option<String> {
        let hex = match self {
            ChecksumType::Md5 => format!("{:x}", Md5::digest(data)),
            ChecksumType::Sha | ChecksumType::Sha1 => format!("{:x}", Sha1::digest(data)),
            ChecksumType::Sha224 => format!("{:x}", Sha224::digest(data)),
            ChecksumType::Sha256 => format!("{:x}", Sha256::digest(data)),
            ChecksumType::Sha384 => format!("{:x}", Sha384::digest(data)),
            ChecksumType::Sha512 => format!("{:x}", Sha512::digest(data)),
            ChecksumType::Other(_) => return None,
        };
        Some(hex)
    }
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A digest together with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: ChecksumType,
    pub digest: String,
}

impl Checksum {
    pub fn new(algorithm: ChecksumType, digest: impl Into<String>) -> Self {
        Self {
            algorithm,
            digest: digest.into(),
        }
    }

    /// Compute the checksum of `data` with the given algorithm
    pub fn compute(algorithm: ChecksumType, data: &[u8]) -> Option<Self> {
        let digest = algorithm.digest(data)?;
        Some(Self { algorithm, digest })
    }

    /// Whether two checksums name the same algorithm and digest.
    ///
    /// Hex digests compare case-insensitively.
    pub fn matches(&self, other: &Checksum) -> bool {
        self.algorithm == other.algorithm && self.digest.eq_ignore_ascii_case(&other.digest)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_unknown_algorithms() {
        assert_eq!(ChecksumType::parse("sha256"), ChecksumType::Sha256);
        assert_eq!(ChecksumType::parse("SHA512"), ChecksumType::Sha512);
        assert_eq!(ChecksumType::parse("sha"), ChecksumType::Sha);
        assert_eq!(ChecksumType::parse("sha1"), ChecksumType::Sha1);
        assert_eq!(ChecksumType::parse("MD5").as_str(), "md5");
        assert_eq!(
            ChecksumType::parse("sha3-256"),
            ChecksumType::Other("sha3-256".to_string())
        );
    }

    #[test]
    fn test_sha256_digest() {
        let checksum = Checksum::compute(ChecksumType::Sha256, b"hello").unwrap();
        assert_eq!(
            checksum.digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_legacy_digests() {
        let sha1 = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
        assert_eq!(ChecksumType::Sha.digest(b"hello").unwrap(), sha1);
        assert_eq!(ChecksumType::Sha1.digest(b"hello").unwrap(), sha1);
        assert_eq!(
            ChecksumType::Md5.digest(b"hello").unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn test_unsupported_algorithm_has_no_digest() {
        assert!(ChecksumType::Other("crc32".to_string()).digest(b"x").is_none());
    }

    #[test]
    fn test_matches_ignores_hex_case() {
        let lower = Checksum::new(ChecksumType::Sha256, "abcdef");
        let upper = Checksum::new(ChecksumType::Sha256, "ABCDEF");
        let other_algo = Checksum::new(ChecksumType::Sha512, "abcdef");
        assert!(lower.matches(&upper));
        assert!(!lower.matches(&other_algo));
    }
}
