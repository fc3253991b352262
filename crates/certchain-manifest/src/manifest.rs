//! Provenance manifest model.
//!
//! The layout follows the C2PA claim structure: a claim with signature
//! info, a list of labelled assertions, actions and ingredients. All
//! structs reject unknown fields so that any edit to a signed manifest is
//! either detected by the MAC or refused by the parser.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use certchain_core::{ContentHasher, Digest};

/// Assertion label for the content hash.
pub const HASH_DATA_LABEL: &str = "c2pa.hash.data";
/// Assertion label for schema.org metadata.
pub const CREATIVE_WORK_LABEL: &str = "stds.schema-org.CreativeWork";
/// Assertion label for container identity.
pub const CONTAINER_LABEL: &str = "certchain.container";
/// Action recorded when a manifest is created.
pub const CREATED_ACTION: &str = "c2pa.created";

/// A signed-claim manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Manifest {
    /// Claim UUID (v4).
    pub claim_id: String,
    pub format: String,
    /// `urn:uuid:<v4>`.
    pub instance_id: String,
    pub title: String,
    pub claim_generator: String,
    pub signature: SignatureInfo,
    pub assertions: Vec<Assertion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<Vec<Ingredient>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignatureInfo {
    pub issuer: String,
    /// Signing time (Unix ms).
    pub time: i64,
    pub algorithm: String,
}

/// A labelled claim about the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Assertion {
    pub label: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Action {
    pub action: String,
    /// Unix ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_agent: Option<String>,
}

/// How an ingredient relates to the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Relationship {
    ParentOf,
    ComponentOf,
    InputTo,
}

/// A source document the content was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Ingredient {
    pub title: String,
    pub format: String,
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub relationship: Relationship,
}

impl Manifest {
    /// Find an assertion by label.
    pub fn assertion(&self, label: &str) -> Option<&Assertion> {
        self.assertions.iter().find(|a| a.label == label)
    }

    /// Content hash recorded in the `c2pa.hash.data` assertion.
    pub fn content_hash(&self) -> Option<Digest> {
        self.assertion(HASH_DATA_LABEL)?
            .data
            .get("hash")?
            .as_str()
            .and_then(|h| Digest::from_hex(h).ok())
    }
}

/// A cited source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub document_id: String,
}

impl Citation {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
        }
    }
}

/// A piece of content to be described by a signed manifest.
#[derive(Debug, Clone)]
pub struct SignableContent {
    pub id: String,
    pub container_type: String,
    pub namespace: String,
    pub version: u32,
    /// Human-readable name, used as the manifest title.
    pub name: String,
    pub author: Option<String>,
    /// Unix ms.
    pub created_at: i64,
    /// Unix ms.
    pub updated_at: i64,
    /// Raw content bytes; hashed into the `c2pa.hash.data` assertion.
    pub body: Vec<u8>,
    pub citations: Vec<Citation>,
}

/// Identity and labels stamped into every manifest.
#[derive(Debug, Clone)]
pub(crate) struct ClaimIdentity<'a> {
    pub claim_generator: &'a str,
    pub issuer: &'a str,
    pub software_agent: &'a str,
    pub algorithm: &'a str,
}

/// Build the unsigned manifest describing `content`.
pub(crate) fn build_manifest(
    content: &SignableContent,
    identity: &ClaimIdentity<'_>,
    signed_at: i64,
) -> Manifest {
    let content_hash = ContentHasher::hash_content(&content.body);

    let mut creative_work = json!({
        "@context": "https://schema.org/",
        "@type": "CreativeWork",
        "name": content.name,
        "dateCreated": content.created_at,
        "dateModified": content.updated_at,
    });
    if let Some(author) = &content.author {
        creative_work["author"] = json!(author);
    }

    let assertions = vec![
        Assertion {
            label: HASH_DATA_LABEL.to_string(),
            data: json!({ "name": "blake3", "hash": content_hash.to_hex() }),
        },
        Assertion {
            label: CREATIVE_WORK_LABEL.to_string(),
            data: creative_work,
        },
        Assertion {
            label: CONTAINER_LABEL.to_string(),
            data: json!({
                "id": content.id,
                "type": content.container_type,
                "namespace": content.namespace,
                "version": content.version,
            }),
        },
    ];

    let ingredients = (!content.citations.is_empty()).then(|| {
        content
            .citations
            .iter()
            .map(|c| Ingredient {
                title: c.document_id.clone(),
                format: "application/pdf".to_string(),
                instance_id: format!("urn:certchain:{}", c.document_id),
                document_id: Some(c.document_id.clone()),
                relationship: Relationship::InputTo,
            })
            .collect()
    });

    Manifest {
        claim_id: Uuid::new_v4().to_string(),
        format: "c2pa".to_string(),
        instance_id: format!("urn:uuid:{}", Uuid::new_v4()),
        title: content.name.clone(),
        claim_generator: identity.claim_generator.to_string(),
        signature: SignatureInfo {
            issuer: identity.issuer.to_string(),
            time: signed_at,
            algorithm: identity.algorithm.to_string(),
        },
        assertions,
        actions: Some(vec![Action {
            action: CREATED_ACTION.to_string(),
            when: Some(content.created_at),
            software_agent: Some(identity.software_agent.to_string()),
        }]),
        ingredients,
    }
}
