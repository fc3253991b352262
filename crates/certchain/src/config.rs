//! Pipeline configuration.

use std::time::Duration;

use tracing::warn;

use certchain_anchor::Network;

/// Configuration for the [`Certifier`](crate::Certifier).
#[derive(Debug, Clone)]
pub struct CertifierConfig {
    /// Network new batches are tagged with.
    pub network: String,
    /// Metadata URI for a submitted batch is `{prefix}{batchId}`.
    pub metadata_uri_prefix: String,
    /// Salt for prompt hashes.
    pub prompt_salt: String,
    /// Operator recorded when a request names none.
    pub default_operator: String,
    /// Product data source recorded when a request names none.
    pub default_mcp_source: String,
    /// Period of the auto-batching task.
    pub auto_batch_interval: Duration,
    /// Submit batches created by the auto-batching task.
    pub auto_submit: bool,
}

impl Default for CertifierConfig {
    fn default() -> Self {
        Self {
            network: Network::DEFAULT.to_string(),
            metadata_uri_prefix: "ipfs://pending-".to_string(),
            prompt_salt: "certchain-prompt-v1".to_string(),
            default_operator: "anonymous".to_string(),
            default_mcp_source: "certchain".to_string(),
            auto_batch_interval: Duration::from_secs(5 * 60),
            auto_submit: false,
        }
    }
}

impl CertifierConfig {
    /// Defaults overridden by `CERTCHAIN_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(network) = lookup("CERTCHAIN_NETWORK") {
            if Network::by_name(&network).is_err() {
                warn!(%network, "Unknown network name, using it as given");
            }
            config.network = network;
        }
        if let Some(prefix) = lookup("CERTCHAIN_METADATA_URI_PREFIX") {
            config.metadata_uri_prefix = prefix;
        }
        if let Some(salt) = lookup("CERTCHAIN_PROMPT_SALT") {
            config.prompt_salt = salt;
        }
        if let Some(secs) = lookup("CERTCHAIN_AUTO_BATCH_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.auto_batch_interval = Duration::from_secs(secs),
                _ => warn!(value = %secs, "Ignoring invalid CERTCHAIN_AUTO_BATCH_SECS"),
            }
        }
        if let Some(flag) = lookup("CERTCHAIN_AUTO_SUBMIT") {
            config.auto_submit = matches!(flag.trim(), "1" | "true" | "yes");
        }

        config
    }

    /// Metadata URI for a batch.
    pub fn metadata_uri(&self, batch_id: u64) -> String {
        format!("{}{}", self.metadata_uri_prefix, batch_id)
    }
}
