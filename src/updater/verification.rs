use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::core::UpdaterError;

/// Hash algorithms a manifest checksum may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// 160-bit SHA-1, the historical format. Accepted for existing release feeds.
    Sha1,
    /// 256-bit SHA-256, the default for new releases.
    Sha256,
}

impl ChecksumAlgorithm {
    /// Prefix used in the versioned checksum format.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    const fn hex_len(self) -> usize {
        match self {
            Self::Sha1 => 40,
            Self::Sha256 => 64,
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Result of checking a buffer against an optional checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The buffer matched.
    Verified {
        /// Algorithm that was used.
        algorithm: ChecksumAlgorithm,
        /// Versioned digest of the buffer (`<algorithm>:<hex>`).
        digest: String,
    },
    /// The manifest carried no checksum; nothing was checked.
    Skipped,
}

impl Verification {
    /// Digest that was verified, if any.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        match self {
            Self::Verified {
                digest,
                ..
            } => Some(digest),
            Self::Skipped => None,
        }
    }
}

/// Verifies downloaded artifacts against manifest checksums.
///
/// Checksums use a versioned format, `<algorithm>:<hex>`:
///
/// ```text
/// sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
/// sha1:a94a8fe5ccb19ba61c4c0873d391e987982fbbd3
/// ```
///
/// A bare hex string is accepted and its algorithm inferred from its length
/// (40 digits for SHA-1, 64 for SHA-256), which keeps feeds written for the
/// historical SHA-1 `sha1` field working. Comparison is case-insensitive.
///
/// Verification is opt-in per manifest: a release without a checksum is
/// accepted unverified and a warning is logged.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Versioned digest of `bytes`.
    #[must_use]
    pub fn digest(algorithm: ChecksumAlgorithm, bytes: &[u8]) -> String {
        let hex = match algorithm {
            ChecksumAlgorithm::Sha1 => hex::encode(Sha1::digest(bytes)),
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
        };
        format!("{}:{hex}", algorithm.prefix())
    }

    /// Split a checksum string into its algorithm and lowercase hex digest.
    pub fn parse(checksum: &str) -> Result<(ChecksumAlgorithm, String), UpdaterError> {
        let checksum = checksum.trim();
        let (algorithm, hex) = match checksum.split_once(':') {
            Some((prefix, hex)) => (ChecksumAlgorithm::from_prefix(prefix), hex),
            None => (
                [ChecksumAlgorithm::Sha1, ChecksumAlgorithm::Sha256]
                    .into_iter()
                    .find(|alg| alg.hex_len() == checksum.len()),
                checksum,
            ),
        };

        match algorithm {
            Some(algorithm)
                if hex.len() == algorithm.hex_len()
                    && hex.bytes().all(|b| b.is_ascii_hexdigit()) =>
            {
                Ok((algorithm, hex.to_ascii_lowercase()))
            }
            _ => Err(UpdaterError::ChecksumMismatch {
                expected: checksum.to_string(),
                actual: "<unrecognised checksum format>".to_string(),
            }),
        }
    }

    /// Check `bytes` against `expected`.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::ChecksumMismatch`] when the digest differs or the
    /// expected value is not a recognised checksum.
    pub fn verify(bytes: &[u8], expected: Option<&str>) -> Result<Verification, UpdaterError> {
        let Some(expected) = expected.map(str::trim).filter(|c| !c.is_empty()) else {
            warn!("Release carries no checksum; installing it unverified");
            return Ok(Verification::Skipped);
        };

        let (algorithm, expected_hex) = Self::parse(expected)?;
        debug!("Verifying {} bytes with {algorithm}", bytes.len());

        let digest = Self::digest(algorithm, bytes);
        let actual_hex = &digest[algorithm.prefix().len() + 1..];
        if actual_hex != expected_hex {
            warn!("Checksum mismatch: expected {expected}, got {digest}");
            return Err(UpdaterError::ChecksumMismatch {
                expected: expected.to_string(),
                actual: digest,
            });
        }

        info!("Checksum verification successful ({digest})");
        Ok(Verification::Verified {
            algorithm,
            digest,
        })
    }

    /// Check a file on disk against `expected`.
    pub async fn verify_file(
        file_path: &Path,
        expected: Option<&str>,
    ) -> Result<Verification, UpdaterError> {
        info!("Verifying checksum for: {}", file_path.display());
        let contents = fs::read(file_path).await?;
        Self::verify(&contents, expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_digest_known_values() {
        assert_eq!(
            ChecksumVerifier::digest(ChecksumAlgorithm::Sha1, b"hello"),
            format!("sha1:{HELLO_SHA1}")
        );
        assert_eq!(
            ChecksumVerifier::digest(ChecksumAlgorithm::Sha256, b"hello"),
            format!("sha256:{HELLO_SHA256}")
        );
    }

    #[test]
    fn test_verify_accepts_all_formats() {
        for expected in [
            format!("sha256:{HELLO_SHA256}"),
            format!("sha1:{HELLO_SHA1}"),
            HELLO_SHA1.to_string(),
            HELLO_SHA256.to_uppercase(),
        ] {
            let result = ChecksumVerifier::verify(b"hello", Some(&expected)).unwrap();
            assert!(matches!(result, Verification::Verified { .. }), "{expected}");
        }
    }

    #[test]
    fn test_verify_single_bit_flip_fails() {
        let digest = ChecksumVerifier::digest(ChecksumAlgorithm::Sha256, b"payload");
        let (_, hex) = digest.split_once(':').unwrap();
        let mut bytes = hex::decode(hex).unwrap();
        bytes[0] ^= 1;
        let flipped = format!("sha256:{}", hex::encode(bytes));

        let err = ChecksumVerifier::verify(b"payload", Some(&flipped)).unwrap_err();
        assert!(matches!(err, UpdaterError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_verify_skips_without_checksum() {
        assert_eq!(ChecksumVerifier::verify(b"x", None).unwrap(), Verification::Skipped);
        assert_eq!(ChecksumVerifier::verify(b"x", Some("  ")).unwrap(), Verification::Skipped);
    }

    #[test]
    fn test_malformed_checksum_is_rejected() {
        for bad in ["md5:abcd", "sha1:xyz", "deadbeef", "sha256:00"] {
            let err = ChecksumVerifier::verify(b"hello", Some(bad)).unwrap_err();
            assert!(matches!(err, UpdaterError::ChecksumMismatch { .. }), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_verify_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"hello").unwrap();
        temp_file.flush().unwrap();

        let result =
            ChecksumVerifier::verify_file(temp_file.path(), Some(HELLO_SHA1)).await.unwrap();
        assert_eq!(result.digest(), Some(format!("sha1:{HELLO_SHA1}").as_str()));

        let err = ChecksumVerifier::verify_file(temp_file.path(), Some(HELLO_SHA256.replace('2', "3").as_str()))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::ChecksumMismatch { .. }));
    }
}
