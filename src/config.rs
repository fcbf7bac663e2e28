//! Kernel construction options.
//!
//! ## Environment
//!
//! `KernelConfig::from_env` overlays these variables on the defaults:
//! - `TRANSITION_KERNEL_BACKWARD`: `true`/`false` (default: false)
//! - `TRANSITION_KERNEL_CONN_KEY`: input matrix key (default: `connectivities`)
//! - `TRANSITION_KERNEL_CHECK_CONNECTIVITY`: `true`/`false` (default: false)
//! - `TRANSITION_KERNEL_COPY_INPUT`: `true`/`false` (default: false)

use serde::{Deserialize, Serialize};

/// Default key of the connectivity matrix in the dataset.
pub const DEFAULT_CONN_KEY: &str = "connectivities";

/// Options fixed at kernel construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Model the reversed-time process.
    pub backward: bool,
    /// Key of the raw input matrix in the dataset.
    pub conn_key: String,
    /// Run the connectivity diagnostic when the kernel is built.
    pub check_connectivity: bool,
    /// Deep-copy the input instead of sharing the dataset's matrix.
    pub copy_input: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            backward: false,
            conn_key: DEFAULT_CONN_KEY.to_string(),
            check_connectivity: false,
            copy_input: false,
        }
    }
}

impl KernelConfig {
    /// Defaults overlaid with `TRANSITION_KERNEL_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_flag("TRANSITION_KERNEL_BACKWARD") {
            config.backward = v;
        }
        if let Ok(key) = std::env::var("TRANSITION_KERNEL_CONN_KEY") {
            if !key.is_empty() {
                config.conn_key = key;
            }
        }
        if let Some(v) = env_flag("TRANSITION_KERNEL_CHECK_CONNECTIVITY") {
            config.check_connectivity = v;
        }
        if let Some(v) = env_flag("TRANSITION_KERNEL_COPY_INPUT") {
            config.copy_input = v;
        }
        config
    }

    /// Set the direction.
    pub fn backward(mut self, backward: bool) -> Self {
        self.backward = backward;
        self
    }

    /// Set the input key.
    pub fn conn_key(mut self, key: impl Into<String>) -> Self {
        self.conn_key = key.into();
        self
    }

    /// Enable or disable the construction-time connectivity check.
    pub fn check_connectivity(mut self, check: bool) -> Self {
        self.check_connectivity = check;
        self
    }

    /// Enable or disable copying of the input matrix.
    pub fn copy_input(mut self, copy: bool) -> Self {
        self.copy_input = copy;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match parse_flag(&raw) {
        Some(v) => Some(v),
        None => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable boolean");
            None
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
