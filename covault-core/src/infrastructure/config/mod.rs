//! Configuration loader using Figment for layered config management.
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. TOML config file
//! 3. Environment variables (COVAULT_* prefix)

use crate::foundation::constants::APPROVAL_TTL_SECS;
use crate::foundation::{Result, VaultError};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for config overrides.
///
/// Example: `COVAULT_CLIENT__PUBLISH_TIMEOUT_SECS` -> `client.publish_timeout_secs`
const ENV_PREFIX: &str = "COVAULT_";

const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 20;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Relay endpoints; each holds a partial, possibly duplicated view of
    /// the event stream.
    #[serde(default)]
    pub relays: Vec<String>,
    /// Network label: mainnet, testnet, signet, regtest.
    #[serde(default = "default_network")]
    pub network: String,
    /// Bound on the first-ack-or-total-failure publish wait.
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
    /// Lifetime of a co-signer approval.
    #[serde(default = "default_approval_ttl")]
    pub approval_ttl_secs: u64,
}

fn default_network() -> String {
    "testnet".to_string()
}

fn default_publish_timeout() -> u64 {
    DEFAULT_PUBLISH_TIMEOUT_SECS
}

fn default_approval_ttl() -> u64 {
    APPROVAL_TTL_SECS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            network: default_network(),
            publish_timeout_secs: default_publish_timeout(),
            approval_ttl_secs: default_approval_ttl(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
struct AppConfigRaw {
    #[serde(default)]
    client: ClientConfig,
}

/// Loads configuration from an optional TOML file plus the environment.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfigRaw::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    let raw: AppConfigRaw = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| VaultError::ConfigError(format!("config extraction failed: {e}")))?;
    validate(&raw.client)?;
    Ok(raw.client)
}

fn validate(config: &ClientConfig) -> Result<()> {
    for relay in &config.relays {
        if !relay.starts_with("ws://") && !relay.starts_with("wss://") {
            return Err(VaultError::ConfigError(format!("malformed relay url: {relay}")));
        }
    }
    if config.approval_ttl_secs == 0 {
        return Err(VaultError::ConfigError("approval_ttl_secs must be positive".to_string()));
    }
    if config.publish_timeout_secs == 0 {
        return Err(VaultError::ConfigError("publish_timeout_secs must be positive".to_string()));
    }
    Ok(())
}
