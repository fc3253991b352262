//! Certification requests: manifest creation, compliance checks and the
//! in-process manifest registry.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use certchain_core::{
    now_millis, CertificationManifest, ComplianceResult, ComplianceStatus, ContentHasher,
    ContentType, Digest, ExecutionMode, ProductContext,
};
use certchain_manifest::{Citation, SignedManifestEnvelope};
use certchain_store::ManifestRecord;

use crate::config::CertifierConfig;
use crate::error::{Result, StorageWarning};

/// Terms flagged by the greenwashing check.
const GREENWASHING_TERMS: &[&str] = &[
    "nachhaltig",
    "sustainable",
    "umweltfreundlich",
    "eco-friendly",
    "grün",
    "green",
    "klimaneutral",
    "carbon-neutral",
    "co2-neutral",
];

const RULE_VERSION: &str = "1.0";

/// Which optional compliance rules to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceChecks {
    /// Flag unsubstantiated sustainability claims.
    pub ecgt: bool,
    /// Check against the brand's guidelines (needs a brand id).
    pub brand: bool,
    /// Flag email addresses and phone numbers.
    pub pii: bool,
}

impl ComplianceChecks {
    pub fn all() -> Self {
        Self {
            ecgt: true,
            brand: true,
            pii: true,
        }
    }
}

/// A request to certify one piece of content.
#[derive(Debug, Clone)]
pub struct CertificationRequest {
    pub content: Bytes,
    pub content_type: ContentType,
    pub model_id: Option<String>,
    pub model_version: Option<String>,
    /// Hashed with the configured salt; never stored.
    pub prompt: Option<String>,
    pub parameters: Value,
    pub operator_id: Option<String>,
    pub organization_id: Option<String>,
    pub execution_mode: Option<ExecutionMode>,
    pub provider: Option<String>,
    pub product_id: Option<String>,
    pub mcp_source: Option<String>,
    pub brand_id: Option<String>,
    pub compliance: ComplianceChecks,
    /// When the content was produced (Unix ms). Defaults to now.
    pub generated_at: Option<i64>,
    /// Also wrap the content in a signed manifest envelope.
    pub sign: bool,
    /// Title for the signed manifest. Defaults to the content hash.
    pub title: Option<String>,
    /// Source documents listed as ingredients of the signed manifest.
    pub citations: Vec<String>,
}

impl CertificationRequest {
    pub fn new(content: impl Into<Bytes>, content_type: ContentType) -> Self {
        Self {
            content: content.into(),
            content_type,
            model_id: None,
            model_version: None,
            prompt: None,
            parameters: Value::Object(Default::default()),
            operator_id: None,
            organization_id: None,
            execution_mode: None,
            provider: None,
            product_id: None,
            mcp_source: None,
            brand_id: None,
            compliance: ComplianceChecks::default(),
            generated_at: None,
            sign: false,
            title: None,
            citations: Vec::new(),
        }
    }

    pub fn model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn operator(mut self, operator_id: impl Into<String>) -> Self {
        self.operator_id = Some(operator_id.into());
        self
    }

    pub fn organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = Some(mode);
        self
    }

    pub fn product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    pub fn brand(mut self, brand_id: impl Into<String>) -> Self {
        self.brand_id = Some(brand_id.into());
        self
    }

    pub fn compliance(mut self, checks: ComplianceChecks) -> Self {
        self.compliance = checks;
        self
    }

    /// Request a signed manifest envelope with the given title.
    pub fn signed(mut self, title: impl Into<String>) -> Self {
        self.sign = true;
        self.title = Some(title.into());
        self
    }

    pub fn cite(mut self, document_id: impl Into<String>) -> Self {
        self.citations.push(document_id.into());
        self
    }

    pub(crate) fn citations(&self) -> Vec<Citation> {
        self.citations.iter().cloned().map(Citation::new).collect()
    }
}

/// What `certify` hands back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertifyResponse {
    pub content_hash: Digest,
    pub manifest_hash: Digest,
    pub manifest: CertificationManifest,
    /// `false` when identical content was already waiting in the queue; the
    /// manifest is then the one recorded for the earlier request.
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_envelope: Option<SignedManifestEnvelope>,
    pub warnings: Vec<StorageWarning>,
    pub signing_warnings: Vec<String>,
}

/// Build the provenance manifest for a request, compliance included.
pub fn create_manifest(
    request: &CertificationRequest,
    config: &CertifierConfig,
) -> Result<CertificationManifest> {
    let now = now_millis();
    let content_hash = ContentHasher::hash_content(&request.content);
    let workflow_hash = ContentHasher::hash_structured(&json!({
        "model": request.model_id,
        "params": request.parameters,
    }))?;
    let prompt_hash = request
        .prompt
        .as_deref()
        .map(|p| ContentHasher::hash_salted(&config.prompt_salt, p));

    let product_context = request.product_id.as_ref().map(|product_id| ProductContext {
        product_id: product_id.clone(),
        mcp_source: request
            .mcp_source
            .clone()
            .unwrap_or_else(|| config.default_mcp_source.clone()),
        mcp_data_hash: ContentHasher::hash_content(product_id.as_bytes()),
    });

    Ok(CertificationManifest {
        content_hash,
        content_type: request.content_type,
        workflow_hash,
        model_id: request.model_id.clone(),
        model_version: request.model_version.clone(),
        prompt_hash,
        parameters: request.parameters.clone(),
        generated_at: request.generated_at.unwrap_or(now),
        operator_id: request
            .operator_id
            .clone()
            .unwrap_or_else(|| config.default_operator.clone()),
        organization_id: request.organization_id.clone(),
        execution_mode: request.execution_mode.unwrap_or_default(),
        provider: request
            .provider
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        product_context,
        brand_id: request.brand_id.clone(),
        brand_version: request.brand_id.as_ref().map(|_| RULE_VERSION.to_string()),
        compliance: run_compliance(request, now),
        certified_at: now,
    })
}

fn run_compliance(request: &CertificationRequest, now: i64) -> Vec<ComplianceResult> {
    let prompt = request.prompt.as_deref().unwrap_or("");
    let mut results = Vec::new();

    if request.compliance.ecgt {
        results.push(greenwashing_check(prompt, now));
    }
    if request.compliance.brand {
        if let Some(brand_id) = &request.brand_id {
            results.push(ComplianceResult {
                rule: format!("brand_{brand_id}_guidelines"),
                version: RULE_VERSION.to_string(),
                result: ComplianceStatus::Passed,
                details: "Brand check passed".to_string(),
                checked_at: now,
            });
        }
    }
    if request.compliance.pii {
        results.push(pii_check(prompt, now));
    }

    results.push(ComplianceResult {
        rule: "ai_act_art50_provenance".to_string(),
        version: RULE_VERSION.to_string(),
        result: ComplianceStatus::Passed,
        details: "Certification provides machine-readable provenance".to_string(),
        checked_at: now,
    });
    results
}

fn greenwashing_check(text: &str, now: i64) -> ComplianceResult {
    let lower = text.to_lowercase();
    let found: Vec<&str> = GREENWASHING_TERMS
        .iter()
        .copied()
        .filter(|term| lower.contains(term))
        .collect();

    let (result, details) = if found.is_empty() {
        (ComplianceStatus::Passed, "No restricted terms found".to_string())
    } else {
        (
            ComplianceStatus::Warning,
            format!("Found potentially restricted terms: {}", found.join(", ")),
        )
    };
    ComplianceResult {
        rule: "ecgt_no_greenwashing".to_string(),
        version: RULE_VERSION.to_string(),
        result,
        details,
        checked_at: now,
    }
}

fn pii_check(text: &str, now: i64) -> ComplianceResult {
    let found = contains_email(text) || contains_phone(text);
    ComplianceResult {
        rule: "dsgvo_no_pii".to_string(),
        version: RULE_VERSION.to_string(),
        result: if found {
            ComplianceStatus::Warning
        } else {
            ComplianceStatus::Passed
        },
        details: if found {
            "Potential PII detected (email or phone pattern)".to_string()
        } else {
            "No PII patterns detected".to_string()
        },
        checked_at: now,
    }
}

/// `local@domain.tld` with a tld of at least two letters.
fn contains_email(text: &str) -> bool {
    let bytes = text.as_bytes();
    let is_local = |b: u8| b.is_ascii_alphanumeric() || b"._%+-".contains(&b);
    let is_domain = |b: u8| b.is_ascii_alphanumeric() || b == b'.' || b == b'-';

    bytes.iter().enumerate().any(|(at, &b)| {
        if b != b'@' || at == 0 || !is_local(bytes[at - 1]) {
            return false;
        }
        let domain: Vec<u8> = bytes[at + 1..]
            .iter()
            .copied()
            .take_while(|&b| is_domain(b))
            .collect();
        (1..domain.len()).any(|dot| {
            domain[dot] == b'.'
                && domain.len() > dot + 2
                && domain[dot + 1].is_ascii_alphabetic()
                && domain[dot + 2].is_ascii_alphabetic()
        })
    })
}

/// Ten digits grouped 3-3-4, optionally with an area code in parentheses
/// and `-` or `.` separators.
fn contains_phone(text: &str) -> bool {
    let bytes = text.as_bytes();
    (0..bytes.len()).any(|start| phone_at(&bytes[start..]))
}

fn phone_at(s: &[u8]) -> bool {
    let mut i = 0;
    let paren = s.first() == Some(&b'(');
    if paren {
        i += 1;
    }
    for (group, len) in [3usize, 3, 4].into_iter().enumerate() {
        if s.len() < i + len || !s[i..i + len].iter().all(u8::is_ascii_digit) {
            return false;
        }
        i += len;
        if group == 0 && paren && s.get(i) == Some(&b')') {
            i += 1;
        }
        if group < 2 && matches!(s.get(i), Some(b'-' | b'.')) {
            i += 1;
        }
    }
    true
}

/// In-process registry of certified manifests, keyed by content hash.
#[derive(Debug, Default)]
pub struct ManifestRegistry {
    records: RwLock<HashMap<Digest, ManifestRecord>>,
}

impl ManifestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ManifestRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.content_hash, record);
    }

    pub fn get(&self, content_hash: &Digest) -> Option<ManifestRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(content_hash)
            .cloned()
    }

    /// Record the batch a manifest was included in.
    pub fn assign_batch(&self, content_hash: &Digest, batch_id: u64) -> bool {
        match self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(content_hash)
        {
            Some(record) => {
                record.batch_id = Some(batch_id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
