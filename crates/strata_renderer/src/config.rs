//! Renderer configuration
//!
//! Loaded from a TOML file such as:
//!
//! ```toml
//! max_pending_flushes_to_force_apply = 120
//! max_pending_flushes_to_kill_scene = 600
//! force_apply_after_ms = 2000
//! expiration_check = true
//! uploader_queue_capacity = 256
//! device_memory_budget = 268435456
//! ```
//!
//! Every key is optional; missing keys keep their default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration for the scene updater
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// A scene with more pending flushes than this is force-applied
    pub max_pending_flushes_to_force_apply: usize,
    /// A scene reaching this many pending flushes is force-unsubscribed
    pub max_pending_flushes_to_kill_scene: usize,
    /// Force-apply once the oldest pending flush has waited this long
    pub force_apply_after_ms: Option<u64>,
    /// Emit expiration events for shown scenes
    pub expiration_check: bool,
    /// Effects that may wait for the compiler thread at once
    pub uploader_queue_capacity: usize,
    /// Caps the display device's memory budget, `None` keeps the device's own
    pub device_memory_budget: Option<u64>,
    /// Upper bound on actions in one flush
    pub max_actions_per_flush: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_pending_flushes_to_force_apply: 120,
            max_pending_flushes_to_kill_scene: 600,
            force_apply_after_ms: None,
            expiration_check: true,
            uploader_queue_capacity: 256,
            device_memory_budget: None,
            max_actions_per_flush: 100_000,
        }
    }
}

impl RendererConfig {
    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: RendererConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check the knobs against each other
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_pending_flushes_to_force_apply == 0 {
            return Err(ConfigError::Invalid(
                "max_pending_flushes_to_force_apply must be at least 1".to_string(),
            ));
        }
        if self.max_pending_flushes_to_kill_scene <= self.max_pending_flushes_to_force_apply {
            return Err(ConfigError::Invalid(format!(
                "max_pending_flushes_to_kill_scene ({}) must exceed max_pending_flushes_to_force_apply ({})",
                self.max_pending_flushes_to_kill_scene, self.max_pending_flushes_to_force_apply
            )));
        }
        if self.uploader_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "uploader_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
