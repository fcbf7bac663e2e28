//! Parameter maps and their fingerprints.
//!
//! A kernel records the parameters of its last successful computation. A
//! recomputation request whose fingerprint and parameters both match the
//! record is a cache hit.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::canonical::canonical_hash;
use crate::error::{KernelError, Result};

/// Immutable mapping from parameter name to value, in stable key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KernelParams(BTreeMap<String, Value>);

impl KernelParams {
    /// Empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a typed parameter struct that serializes to a JSON object.
    pub fn from_serialize<T: Serialize>(params: &T) -> Result<Self> {
        match serde_json::to_value(params)? {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(KernelError::InvalidInput(format!(
                "kernel parameters must serialize to an object, got {other}"
            ))),
        }
    }

    /// Add or replace one parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Fingerprint of these parameters for a given kernel.
    pub fn fingerprint(&self, kernel_name: &str) -> Result<ParamsFingerprint> {
        Ok(ParamsFingerprint(canonical_hash(&(kernel_name, &self.0))?))
    }
}

/// Hash of `(kernel name, parameters)` under which a matrix was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamsFingerprint(u64);

impl ParamsFingerprint {
    /// Parse the 16-digit hex form produced by `Display`.
    pub fn from_hex(s: &str) -> Result<Self> {
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| KernelError::InvalidInput(format!("bad fingerprint {s:?}: {e}")))
    }
}

impl fmt::Display for ParamsFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
