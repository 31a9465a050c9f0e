//! Deterministic unit-interval hashing for traffic gating and bucketing.
//!
//! Bucket decisions are persisted permanently, so this mapping is a contract:
//! the digest algorithm, prefix width and normalization must never change
//! between releases.

use sha2::{Digest, Sha256};

/// Map `(subject, salt)` to a stable value in [0, 1).
///
/// SHA-256 over `subject + salt`, top 53 bits of the first 8 digest bytes,
/// divided by 2^53. 53 bits keeps the quotient exact in an f64 and the
/// result strictly below 1.0; entropy is far above the 4-byte floor needed
/// to avoid visible collision artifacts in bucket proportions.
pub fn hash_to_unit(subject: &str, salt: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let bits = u64::from_be_bytes(prefix) >> 11;

    bits as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_calls() {
        let a = hash_to_unit("user_123", "test_abc");
        let b = hash_to_unit("user_123", "test_abc");
        assert_eq!(a, b);
    }

    #[test]
    fn output_in_unit_interval() {
        for i in 0..5_000 {
            let v = hash_to_unit(&format!("user_{i}"), "salt");
            assert!((0.0..1.0).contains(&v), "out of range: {v}");
        }
    }

    #[test]
    fn salt_changes_output() {
        let a = hash_to_unit("user_123", "test_a");
        let b = hash_to_unit("user_123", "test_b");
        assert_ne!(a, b);
    }

    #[test]
    fn roughly_uniform() {
        // Coarse uniformity check: 10 buckets over 10k subjects should each
        // hold close to 1000 entries. Wide tolerance; this is a smoke test,
        // not a chi-squared test.
        let mut buckets = [0usize; 10];
        for i in 0..10_000 {
            let v = hash_to_unit(&format!("subject_{i}"), "uniformity");
            buckets[(v * 10.0) as usize] += 1;
        }
        for (idx, count) in buckets.iter().enumerate() {
            assert!(
                (800..=1200).contains(count),
                "bucket {idx} skewed: {count}"
            );
        }
    }

    #[test]
    fn pinned_reference_value() {
        // Regression pin: bucket decisions are persisted, so the mapping
        // must stay byte-stable. Expected values are SHA-256 of the
        // concatenated input, top 53 bits over 2^53. If this fails, the
        // hash contract broke and persisted assignments no longer replay.
        assert_eq!(hash_to_unit("user_123", "test_abc"), 0.281_537_218_793_597_5);
        assert_eq!(hash_to_unit("user_456", "exp_2024"), 0.296_999_391_004_401_87);
        assert_eq!(hash_to_unit("", ""), 0.889_415_994_891_337_3);
    }
}
