//! Integrity hashing of compiled modules. The hash covers the exact bytes that get executed.

use crate::error::PipelineError;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
pub fn seal(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Re-hash `bytes` and compare with `expected`. Comparison ignores hex case.
pub fn verify(bytes: &[u8], expected: &str) -> Result<(), PipelineError> {
    let actual = seal(bytes);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(PipelineError::Integrity {
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_is_sha256_hex() {
        assert_eq!(
            seal(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sealed_bytes_verify() {
        let bytes = vec![7u8; 4096];
        let hash = seal(&bytes);
        assert!(verify(&bytes, &hash).is_ok());
        assert!(verify(&bytes, &hash.to_uppercase()).is_ok());
    }

    #[test]
    fn any_flipped_bit_fails() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let hash = seal(&bytes);
        for i in [0, 100, bytes.len() - 1] {
            for bit in 0..8 {
                let mut tampered = bytes.clone();
                tampered[i] ^= 1 << bit;
                let err = verify(&tampered, &hash).unwrap_err();
                assert!(matches!(err, PipelineError::Integrity { .. }));
            }
        }
    }

    #[test]
    fn flipped_hash_fails() {
        let bytes = b"module".to_vec();
        let mut hash = seal(&bytes).into_bytes();
        hash[0] = if hash[0] == b'0' { b'1' } else { b'0' };
        let hash = String::from_utf8(hash).unwrap();
        assert!(verify(&bytes, &hash).is_err());
    }
}
