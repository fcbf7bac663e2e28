//! Canonical serialization for deterministic parameter fingerprints.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - Stable map order: only `BTreeMap` is used for hashed data
//! - Stable float format: floats are quantized to `i64` before hashing

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Quantization factor for float normalization.
/// Floats are multiplied by this value and rounded to i64.
pub const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Serialize a value to canonical JSON bytes for hashing.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Compute canonical xxh64 hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<u64, serde_json::Error> {
    let bytes = to_canonical_bytes(value)?;
    Ok(xxh64(&bytes, 0))
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(format!("{:016x}", canonical_hash(value)?))
}

/// Quantize a float to an i64 for deterministic hashing.
pub fn quantize_float(value: f64) -> i64 {
    (value * FLOAT_QUANTIZATION_FACTOR).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct TestParams {
        key: String,
        dnorm: bool,
    }

    #[test]
    fn test_determinism() {
        let p = TestParams { key: "connectivities".to_string(), dnorm: true };

        let h1 = canonical_hash(&p).unwrap();
        let h2 = canonical_hash(&p).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_hex_width() {
        let hex = canonical_hash_hex(&42u32).unwrap();
        assert_eq!(hex.len(), 16);
    }

    #[test]
    fn test_quantize_absorbs_float_noise() {
        assert_eq!(quantize_float(0.1 + 0.2), quantize_float(0.3));
        assert_ne!(quantize_float(0.3), quantize_float(0.31));
    }
}
