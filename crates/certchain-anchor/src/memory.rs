//! In-memory ledger simulation.
//!
//! Behaves like a certification contract: every anchored root gets the next
//! on-chain id and its own block. Tests can disconnect it, make it reject the
//! next submission, or slow it down to widen race windows.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use certchain_core::{now_millis, verify_proof, Digest, ProofStep};

use crate::client::{AnchorReceipt, LedgerClient, LedgerStatus, OnChainCertification};
use crate::error::{AnchorError, Result};
use crate::network::Network;

/// Settings for a simulated ledger.
#[derive(Debug, Clone)]
pub struct MemoryLedgerConfig {
    pub network: Network,
    pub contract_address: Option<String>,
    /// Address reported as issuer of every certification.
    pub issuer: String,
    /// First block number handed out.
    pub genesis_block: u64,
}

impl Default for MemoryLedgerConfig {
    fn default() -> Self {
        Self {
            network: Network::base_sepolia(),
            contract_address: Some(format!("0x{}", "c0".repeat(20))),
            issuer: format!("0x{}", "11".repeat(20)),
            genesis_block: 1_000,
        }
    }
}

struct LedgerState {
    certifications: BTreeMap<u64, OnChainCertification>,
    next_id: u64,
    block_number: u64,
    connected: bool,
    reject_next: Option<String>,
    latency: Duration,
}

/// Simulated ledger client.
pub struct MemoryLedger {
    config: MemoryLedgerConfig,
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    /// Create a connected ledger with default settings.
    pub fn new() -> Self {
        Self::with_config(MemoryLedgerConfig::default())
    }

    pub fn with_config(config: MemoryLedgerConfig) -> Self {
        let state = LedgerState {
            certifications: BTreeMap::new(),
            next_id: 1,
            block_number: config.genesis_block,
            connected: true,
            reject_next: None,
            latency: Duration::ZERO,
        };
        Self {
            config,
            state: RwLock::new(state),
        }
    }

    pub fn network(&self) -> &Network {
        &self.config.network
    }

    /// Simulate losing (`false`) or regaining (`true`) the connection.
    pub async fn set_connected(&self, connected: bool) {
        self.state.write().await.connected = connected;
    }

    /// Reject the next `certify_batch` call with the given reason.
    pub async fn reject_next(&self, reason: impl Into<String>) {
        self.state.write().await.reject_next = Some(reason.into());
    }

    /// Delay every `certify_batch` call by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }

    /// Number of roots anchored so far.
    pub async fn certification_count(&self) -> usize {
        self.state.read().await.certifications.len()
    }

    fn tx_hash(root: &Digest, on_chain_id: u64, block: u64) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(root.as_bytes());
        hasher.update(&on_chain_id.to_be_bytes());
        hasher.update(&block.to_be_bytes());
        format!("0x{}", hex::encode(hasher.finalize().as_bytes()))
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.state.read().await.connected {
            Ok(())
        } else {
            Err(AnchorError::NotConnected(self.config.network.name.clone()))
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn get_status(&self) -> Result<LedgerStatus> {
        let state = self.state.read().await;
        Ok(LedgerStatus {
            connected: state.connected,
            network: self.config.network.name.clone(),
            contract_address: self.config.contract_address.clone(),
            wallet_address: Some(self.config.issuer.clone()),
            balance: state.connected.then(|| "1.0".to_string()),
        })
    }

    async fn certify_batch(
        &self,
        merkle_root: &Digest,
        metadata_uri: &str,
        item_count: u32,
    ) -> Result<AnchorReceipt> {
        let latency = self.state.read().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.write().await;
        if !state.connected {
            return Err(AnchorError::NotConnected(self.config.network.name.clone()));
        }
        if let Some(reason) = state.reject_next.take() {
            debug!(root = %merkle_root, %reason, "Simulated ledger rejected submission");
            return Err(AnchorError::Rejected(reason));
        }
        if item_count == 0 {
            return Err(AnchorError::Rejected("empty batch".to_string()));
        }

        let on_chain_batch_id = state.next_id;
        state.next_id += 1;
        state.block_number += 1;
        let block_number = state.block_number;

        state.certifications.insert(
            on_chain_batch_id,
            OnChainCertification {
                merkle_root: *merkle_root,
                timestamp: now_millis(),
                metadata_uri: metadata_uri.to_string(),
                item_count,
                issuer: self.config.issuer.clone(),
            },
        );

        let tx_hash = Self::tx_hash(merkle_root, on_chain_batch_id, block_number);
        info!(
            root = %merkle_root,
            on_chain_batch_id,
            block_number,
            "Anchored batch root"
        );

        Ok(AnchorReceipt {
            tx_hash,
            block_number,
            on_chain_batch_id,
        })
    }

    async fn verify_certification(
        &self,
        on_chain_batch_id: u64,
        content_hash: &Digest,
        proof: &[ProofStep],
    ) -> Result<bool> {
        self.ensure_connected().await?;
        let state = self.state.read().await;
        let cert = state
            .certifications
            .get(&on_chain_batch_id)
            .ok_or(AnchorError::UnknownBatch(on_chain_batch_id))?;
        Ok(verify_proof(content_hash, proof, &cert.merkle_root))
    }

    async fn get_certification(
        &self,
        on_chain_batch_id: u64,
    ) -> Result<Option<OnChainCertification>> {
        self.ensure_connected().await?;
        Ok(self
            .state
            .read()
            .await
            .certifications
            .get(&on_chain_batch_id)
            .cloned())
    }

    fn explorer_url(&self, tx_hash: &str) -> String {
        self.config.network.tx_url(tx_hash)
    }

    fn contract_address(&self) -> Option<String> {
        self.config.contract_address.clone()
    }

    fn contract_url(&self) -> Option<String> {
        self.config
            .contract_address
            .as_deref()
            .map(|addr| self.config.network.address_url(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_core::MerkleTree;

    fn leaves(n: usize) -> Vec<Digest> {
        (0..n).map(|i| Digest::hash(&[i as u8])).collect()
    }

    #[tokio::test]
    async fn test_certify_and_read_back() {
        let ledger = MemoryLedger::new();
        let tree = MerkleTree::from_leaves(leaves(3)).unwrap();

        let receipt = ledger
            .certify_batch(&tree.root(), "ipfs://pending-1", 3)
            .await
            .unwrap();
        assert_eq!(receipt.on_chain_batch_id, 1);
        assert_eq!(receipt.block_number, 1_001);
        assert!(receipt.tx_hash.starts_with("0x"));
        assert_eq!(receipt.tx_hash.len(), 66);

        let cert = ledger.get_certification(1).await.unwrap().unwrap();
        assert_eq!(cert.merkle_root, tree.root());
        assert_eq!(cert.item_count, 3);
        assert_eq!(cert.metadata_uri, "ipfs://pending-1");
        assert!(ledger.get_certification(2).await.unwrap().is_none());

        let second = ledger
            .certify_batch(&tree.root(), "ipfs://pending-2", 3)
            .await
            .unwrap();
        assert_eq!(second.on_chain_batch_id, 2);
        assert_ne!(second.tx_hash, receipt.tx_hash);
        assert_eq!(ledger.certification_count().await, 2);
    }

    #[tokio::test]
    async fn test_verify_certification() {
        let ledger = MemoryLedger::new();
        let set = leaves(5);
        let tree = MerkleTree::from_leaves(set.clone()).unwrap();
        let receipt = ledger.certify_batch(&tree.root(), "uri", 5).await.unwrap();

        let proof = tree.proof(2).unwrap();
        assert!(ledger
            .verify_certification(receipt.on_chain_batch_id, &set[2], &proof)
            .await
            .unwrap());
        assert!(!ledger
            .verify_certification(receipt.on_chain_batch_id, &set[3], &proof)
            .await
            .unwrap());
        assert!(matches!(
            ledger.verify_certification(99, &set[2], &proof).await,
            Err(AnchorError::UnknownBatch(99))
        ));
    }

    #[tokio::test]
    async fn test_disconnected() {
        let ledger = MemoryLedger::new();
        ledger.set_connected(false).await;

        let status = ledger.get_status().await.unwrap();
        assert!(!status.connected);
        assert!(status.balance.is_none());

        let root = Digest::hash(b"root");
        assert!(matches!(
            ledger.certify_batch(&root, "uri", 1).await,
            Err(AnchorError::NotConnected(_))
        ));
        assert_eq!(ledger.certification_count().await, 0);

        ledger.set_connected(true).await;
        assert!(ledger.certify_batch(&root, "uri", 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_reject_next_is_one_shot() {
        let ledger = MemoryLedger::new();
        ledger.reject_next("out of gas").await;

        let root = Digest::hash(b"root");
        match ledger.certify_batch(&root, "uri", 1).await {
            Err(AnchorError::Rejected(reason)) => assert_eq!(reason, "out of gas"),
            other => panic!("expected rejection, got {other:?}"),
        }
        let receipt = ledger.certify_batch(&root, "uri", 1).await.unwrap();
        assert_eq!(receipt.on_chain_batch_id, 1);
    }

    #[tokio::test]
    async fn test_links() {
        let ledger = MemoryLedger::new();
        assert_eq!(
            ledger.explorer_url("0xabc"),
            "https://sepolia.basescan.org/tx/0xabc"
        );
        let url = ledger.contract_url().unwrap();
        assert!(url.starts_with("https://sepolia.basescan.org/address/0x"));

        let bare = MemoryLedger::with_config(MemoryLedgerConfig {
            contract_address: None,
            ..Default::default()
        });
        assert!(bare.contract_url().is_none());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = LedgerStatus {
            connected: true,
            network: "base-sepolia".to_string(),
            contract_address: None,
            wallet_address: Some("0x1".to_string()),
            balance: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["walletAddress"], "0x1");
        assert_eq!(json["contractAddress"], serde_json::Value::Null);
    }
}
