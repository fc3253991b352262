//! Four-step content verification.
//!
//! Verification runs an ordered list of independent [`Probe`]s over one
//! report. Each probe fills in what it can find; a probe that fails adds a
//! warning and the remaining probes still run, so the report always
//! reflects whatever could be established.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use certchain_anchor::{LedgerClient, OnChainCertification};
use certchain_core::{verify_proof, Batch, CertificationManifest, Digest, MerkleProof, ProofStep};
use certchain_store::Store;

use crate::certify::ManifestRegistry;
use crate::error::Result;
use crate::ledger::BatchLedger;

/// On-chain part of a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainCheck {
    /// The ledger accepted the inclusion proof.
    pub verified: bool,
    /// The ledger answered for the batch.
    pub on_chain: bool,
    pub details: Option<OnChainCertification>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Links {
    pub explorer: Option<String>,
    pub contract: Option<String>,
}

/// Everything known about a content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub content_hash: Digest,
    /// A certification record exists locally or in the durable store.
    pub verified: bool,
    pub manifest: Option<CertificationManifest>,
    pub batch: Option<Batch>,
    pub merkle_proof: Option<MerkleProof>,
    /// The proof reproduces the batch root.
    pub merkle_proof_valid: Option<bool>,
    pub blockchain: BlockchainCheck,
    pub links: Links,
    pub warnings: Vec<String>,
}

impl VerificationReport {
    pub fn new(content_hash: Digest) -> Self {
        Self {
            content_hash,
            verified: false,
            manifest: None,
            batch: None,
            merkle_proof: None,
            merkle_proof_valid: None,
            blockchain: BlockchainCheck::default(),
            links: Links::default(),
            warnings: Vec::new(),
        }
    }
}

/// One verification step.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Short name used in warnings.
    fn name(&self) -> &'static str;

    /// Add findings to the report. An error becomes a report warning.
    async fn run(&self, report: &mut VerificationReport) -> Result<()>;
}

/// Runs probes in order and assembles the report.
#[derive(Default)]
pub struct ProofVerifier {
    probes: Vec<Box<dyn Probe>>,
}

impl ProofVerifier {
    /// A verifier with no probes.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard four probes: local registry, durable store, inclusion
    /// proof, ledger.
    pub fn standard<S, L>(
        registry: Arc<ManifestRegistry>,
        store: Arc<S>,
        batches: Arc<BatchLedger<S>>,
        client: Arc<L>,
    ) -> Self
    where
        S: Store + 'static,
        L: LedgerClient + 'static,
    {
        Self::new()
            .with_probe(LocalRegistryProbe { registry })
            .with_probe(StoredManifestProbe {
                store: store.clone(),
            })
            .with_probe(InclusionProofProbe { batches, store })
            .with_probe(LedgerProbe { client })
    }

    /// Append a probe.
    pub fn with_probe(mut self, probe: impl Probe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    /// Verify a content hash. Never fails.
    pub async fn verify(&self, content_hash: Digest) -> VerificationReport {
        let mut report = VerificationReport::new(content_hash);
        for probe in &self.probes {
            if let Err(e) = probe.run(&mut report).await {
                warn!(probe = probe.name(), hash = %content_hash, error = %e, "Verification probe failed");
                report.warnings.push(format!("{}: {}", probe.name(), e));
            }
        }
        debug!(
            hash = %content_hash,
            verified = report.verified,
            on_chain = report.blockchain.verified,
            "Verification complete"
        );
        report
    }
}

/// Pure inclusion check: walk the sibling path and compare with the root.
pub fn check_proof(content_hash: &Digest, path: &[ProofStep], root: &Digest) -> bool {
    verify_proof(content_hash, path, root)
}

// ─────────────────────────────────────────────────────────────────────────────
// Probes
// ─────────────────────────────────────────────────────────────────────────────

/// Step 1: manifests certified by this process.
pub struct LocalRegistryProbe {
    registry: Arc<ManifestRegistry>,
}

#[async_trait]
impl Probe for LocalRegistryProbe {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn run(&self, report: &mut VerificationReport) -> Result<()> {
        if let Some(record) = self.registry.get(&report.content_hash) {
            report.manifest = Some(record.manifest);
            report.verified = true;
        }
        Ok(())
    }
}

/// Step 2: manifests in the durable store.
pub struct StoredManifestProbe<S: Store> {
    store: Arc<S>,
}

#[async_trait]
impl<S: Store> Probe for StoredManifestProbe<S> {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn run(&self, report: &mut VerificationReport) -> Result<()> {
        if report.verified {
            return Ok(());
        }
        if let Some(record) = self.store.get_manifest(&report.content_hash).await? {
            report.manifest = Some(record.manifest);
            report.verified = true;
        }
        Ok(())
    }
}

/// Step 3: inclusion proof and owning batch.
pub struct InclusionProofProbe<S: Store> {
    batches: Arc<BatchLedger<S>>,
    store: Arc<S>,
}

#[async_trait]
impl<S: Store> Probe for InclusionProofProbe<S> {
    fn name(&self) -> &'static str {
        "proof"
    }

    async fn run(&self, report: &mut VerificationReport) -> Result<()> {
        let proof = match self.batches.get_by_hash(&report.content_hash) {
            Some(proof) => proof,
            None => match self.store.get_proof(&report.content_hash).await? {
                Some(proof) => proof,
                None => return Ok(()),
            },
        };
        report.merkle_proof = Some(proof.clone());

        let batch = match self.batches.get(proof.batch_id) {
            Some(batch) => Some(batch),
            None => self.store.get_batch(proof.batch_id).await?,
        };
        let Some(batch) = batch else {
            report
                .warnings
                .push(format!("proof refers to unknown batch {}", proof.batch_id));
            return Ok(());
        };

        let valid = check_proof(&proof.content_hash, &proof.sibling_path, &batch.merkle_root);
        if !valid {
            report.warnings.push(format!(
                "inclusion proof does not reproduce the root of batch {}",
                batch.batch_id
            ));
        }
        report.merkle_proof_valid = Some(valid);
        report.batch = Some(batch);
        Ok(())
    }
}

/// Step 4: ask the ledger, for confirmed batches only.
pub struct LedgerProbe<L: LedgerClient> {
    client: Arc<L>,
}

#[async_trait]
impl<L: LedgerClient> Probe for LedgerProbe<L> {
    fn name(&self) -> &'static str {
        "ledger"
    }

    async fn run(&self, report: &mut VerificationReport) -> Result<()> {
        report.links.contract = self.client.contract_url();

        let (Some(batch), Some(proof)) = (&report.batch, &report.merkle_proof) else {
            return Ok(());
        };
        if !batch.is_confirmed() {
            return Ok(());
        }
        let on_chain_id = batch.ledger_batch_id();
        report.links.explorer = batch.tx_hash.as_deref().map(|tx| self.client.explorer_url(tx));

        let accepted = self
            .client
            .verify_certification(on_chain_id, &report.content_hash, &proof.sibling_path)
            .await?;
        report.blockchain.on_chain = true;
        report.blockchain.verified = accepted;
        if !accepted {
            report
                .warnings
                .push("ledger rejected the inclusion proof".to_string());
        }

        report.blockchain.details = self.client.get_certification(on_chain_id).await?;
        Ok(())
    }
}
