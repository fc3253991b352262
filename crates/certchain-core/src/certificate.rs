//! Certification manifests: the provenance record kept for each certified item.

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::Result;
use crate::hash::ContentHasher;
use crate::types::ContentType;

/// Where the content was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Cloud,
    Local,
    Hybrid,
}

/// Outcome of a single compliance rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComplianceStatus {
    Passed,
    Warning,
    Failed,
}

/// A compliance check recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceResult {
    pub rule: String,
    pub version: String,
    pub result: ComplianceStatus,
    pub details: String,
    /// When the check ran (Unix ms).
    pub checked_at: i64,
}

/// Product data the content was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductContext {
    pub product_id: String,
    pub mcp_source: String,
    pub mcp_data_hash: Digest,
}

/// The provenance record for one certified item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificationManifest {
    pub content_hash: Digest,
    pub content_type: ContentType,
    /// Hash over the model id and generation parameters.
    pub workflow_hash: Digest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    /// Salted hash of the prompt; the prompt itself is never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_hash: Option<Digest>,
    pub parameters: serde_json::Value,
    pub generated_at: i64,
    pub operator_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    pub execution_mode: ExecutionMode,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_context: Option<ProductContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_version: Option<String>,
    pub compliance: Vec<ComplianceResult>,
    pub certified_at: i64,
}

impl CertificationManifest {
    /// Canonical hash of the whole manifest.
    pub fn manifest_hash(&self) -> Result<Digest> {
        ContentHasher::hash_structured(self)
    }

    /// Whether any compliance rule produced a warning or failure.
    pub fn has_compliance_findings(&self) -> bool {
        self.compliance
            .iter()
            .any(|c| c.result != ComplianceStatus::Passed)
    }
}
