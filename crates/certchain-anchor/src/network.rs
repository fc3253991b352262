//! Known ledger networks.

use serde::{Deserialize, Serialize};

use crate::error::{AnchorError, Result};

/// A ledger network and its block explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// Stable network name, e.g. `base-mainnet`.
    pub name: String,
    /// EVM chain id.
    pub chain_id: u64,
    /// Block explorer base URL without trailing slash.
    pub explorer_url: String,
}

impl Network {
    /// Name of the default network.
    pub const DEFAULT: &'static str = "base-mainnet";

    /// Base mainnet.
    pub fn base_mainnet() -> Self {
        Self {
            name: "base-mainnet".to_string(),
            chain_id: 8453,
            explorer_url: "https://basescan.org".to_string(),
        }
    }

    /// Base Sepolia testnet.
    pub fn base_sepolia() -> Self {
        Self {
            name: "base-sepolia".to_string(),
            chain_id: 84532,
            explorer_url: "https://sepolia.basescan.org".to_string(),
        }
    }

    /// Look up a known network by name.
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "base-mainnet" => Ok(Self::base_mainnet()),
            "base-sepolia" => Ok(Self::base_sepolia()),
            other => Err(AnchorError::UnknownNetwork(other.to_string())),
        }
    }

    /// Explorer link for a transaction.
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url, tx_hash)
    }

    /// Explorer link for a contract or account.
    pub fn address_url(&self, address: &str) -> String {
        format!("{}/address/{}", self.explorer_url, address)
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::base_mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_networks() {
        let main = Network::by_name("base-mainnet").unwrap();
        assert_eq!(main.chain_id, 8453);
        let sepolia = Network::by_name("base-sepolia").unwrap();
        assert_eq!(sepolia.chain_id, 84532);
        assert!(Network::by_name("goerli").is_err());
        assert_eq!(Network::default().name, Network::DEFAULT);
    }

    #[test]
    fn test_explorer_links() {
        let net = Network::base_sepolia();
        assert_eq!(net.tx_url("0xabc"), "https://sepolia.basescan.org/tx/0xabc");
        assert_eq!(
            net.address_url("0xdef"),
            "https://sepolia.basescan.org/address/0xdef"
        );
    }
}
