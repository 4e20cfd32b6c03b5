//! Treeline Configuration
//!
//! Shared configuration crate for the Treeline operator.
//!
//! Handles loading configuration from:
//! 1. TL_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.treeline/config.toml (user home)
//!
//! Environment variables take precedence over TOML config. The loaded
//! struct is passed explicitly to the components that need it; there is
//! no process-wide config singleton.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".treeline";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_TREE_DEPTH: usize = 4;
const DEFAULT_BATCH_EXPONENT: usize = 2;

const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8900/";
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8899";
const DEFAULT_ROLLUP_PROGRAM: &str = "9HXapBN9otLGnQNGv1HRk91DGqMNvMAvQqohL7gPW1sd";

const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreelineConfig {
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub solana: SolanaConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

/// Account tree geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Tree depth D; the tree holds 2^D account leaves
    #[serde(default = "default_tree_depth")]
    pub depth: usize,
    /// Batch size exponent k; deposits are committed in batches of 2^k
    #[serde(default = "default_batch_exponent")]
    pub batch_exponent: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_TREE_DEPTH,
            batch_exponent: DEFAULT_BATCH_EXPONENT,
        }
    }
}

fn default_tree_depth() -> usize {
    DEFAULT_TREE_DEPTH
}

fn default_batch_exponent() -> usize {
    DEFAULT_BATCH_EXPONENT
}

/// Solana connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_rollup_program")]
    pub rollup_program_id: String,
    /// Operator keypair path; without it the service runs against a mock ledger
    #[serde(default)]
    pub keypair_path: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.into(),
            rpc_url: DEFAULT_RPC_URL.into(),
            rollup_program_id: DEFAULT_ROLLUP_PROGRAM.into(),
            keypair_path: None,
            domain: None,
        }
    }
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.into()
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.into()
}

fn default_rollup_program() -> String {
    DEFAULT_ROLLUP_PROGRAM.into()
}

/// Deposit service tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Capacity of the deposit command channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Interval to poll for pending batch work (ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set Option<String> from env var if present
fn env_option_string(key: &str, field: &mut Option<String>) {
    if let Ok(v) = env::var(key) {
        *field = Some(v);
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        if let Ok(parsed) = v.parse() {
            *field = parsed;
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl TreelineConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check TL_CONFIG env var
        if let Ok(path) = env::var("TL_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.treeline/config.toml
        dirs::home_dir()
            .map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Tree geometry
        env_parse("TL_TREE_DEPTH", &mut self.tree.depth);
        env_parse("TL_BATCH_EXPONENT", &mut self.tree.batch_exponent);

        // Solana
        env_string("SOLANA_WS_URL", &mut self.solana.ws_url);
        env_string("SOLANA_RPC_URL", &mut self.solana.rpc_url);
        env_string("TL_ROLLUP_PROGRAM", &mut self.solana.rollup_program_id);
        env_option_string("TL_OPERATOR_KEYPAIR", &mut self.solana.keypair_path);
        env_option_string("TL_DOMAIN", &mut self.solana.domain);

        // Service
        env_parse("TL_CHANNEL_CAPACITY", &mut self.service.channel_capacity);
        env_parse("TL_POLL_INTERVAL_MS", &mut self.service.poll_interval_ms);
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.solana.domain = Some("solana".into());
        toml::to_string_pretty(&sample).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TreelineConfig::default();
        assert_eq!(config.tree.depth, DEFAULT_TREE_DEPTH);
        assert_eq!(config.tree.batch_exponent, DEFAULT_BATCH_EXPONENT);
        assert_eq!(config.solana.rpc_url, DEFAULT_RPC_URL);
        assert!(config.solana.keypair_path.is_none());
    }

    #[test]
    fn test_generate_sample() {
        let sample = TreelineConfig::generate_sample();
        assert!(sample.contains("[tree]"));
        assert!(sample.contains("[solana]"));
        assert!(sample.contains("[service]"));
    }

    #[test]
    fn test_parse_sample() {
        let sample = TreelineConfig::generate_sample();
        let parsed: TreelineConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.tree.depth, DEFAULT_TREE_DEPTH);
        assert_eq!(parsed.solana.ws_url, DEFAULT_WS_URL);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: TreelineConfig = toml::from_str("[tree]\ndepth = 8\n").unwrap();
        assert_eq!(parsed.tree.depth, 8);
        assert_eq!(parsed.tree.batch_exponent, DEFAULT_BATCH_EXPONENT);
        assert_eq!(parsed.service.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }
}
