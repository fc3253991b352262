//! Ledger client abstraction.
//!
//! The pipeline anchors batch roots and reads them back through this trait.
//! Implementations may talk to an EVM contract over JSON-RPC, a relay
//! service, or simulate a ledger in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use certchain_core::{Digest, ProofStep};

use crate::error::Result;

/// Connectivity and identity of a ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStatus {
    pub connected: bool,
    pub network: String,
    pub contract_address: Option<String>,
    pub wallet_address: Option<String>,
    /// Wallet balance as reported by the ledger, unformatted.
    pub balance: Option<String>,
}

/// Successful anchoring of a batch root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    /// Identifier the ledger assigned to the certification.
    pub on_chain_batch_id: u64,
}

/// A certification as recorded on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChainCertification {
    pub merkle_root: Digest,
    /// Block timestamp (Unix ms).
    pub timestamp: i64,
    pub metadata_uri: String,
    pub item_count: u32,
    /// Address of the account that anchored the root.
    pub issuer: String,
}

/// Narrow submission/query interface to the ledger.
///
/// Implementations must be thread-safe (Send + Sync). Nothing here retries;
/// retry policy belongs to the caller.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Report connectivity and identity.
    async fn get_status(&self) -> Result<LedgerStatus>;

    /// Anchor a Merkle root.
    ///
    /// # Arguments
    /// - `merkle_root`: The batch root to anchor.
    /// - `metadata_uri`: Where batch metadata can be fetched.
    /// - `item_count`: Number of leaves under the root.
    ///
    /// # Returns
    /// The transaction reference, or `Rejected` if the ledger refused it.
    async fn certify_batch(
        &self,
        merkle_root: &Digest,
        metadata_uri: &str,
        item_count: u32,
    ) -> Result<AnchorReceipt>;

    /// Ask the ledger whether `content_hash` is included under the root
    /// anchored as `on_chain_batch_id`.
    async fn verify_certification(
        &self,
        on_chain_batch_id: u64,
        content_hash: &Digest,
        proof: &[ProofStep],
    ) -> Result<bool>;

    /// Fetch the anchored record, if any.
    async fn get_certification(&self, on_chain_batch_id: u64)
        -> Result<Option<OnChainCertification>>;

    /// Explorer link for a transaction.
    fn explorer_url(&self, tx_hash: &str) -> String;

    /// Address of the certification contract, if deployed.
    fn contract_address(&self) -> Option<String>;

    /// Explorer link for the certification contract, if deployed.
    fn contract_url(&self) -> Option<String>;
}
