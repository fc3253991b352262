//! Small shared types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The kind of content being certified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Image,
    Video,
    Audio,
    Text,
    Document,
    Product,
}

impl ContentType {
    /// Stable lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ContentType::Image => "image",
            ContentType::Video => "video",
            ContentType::Audio => "audio",
            ContentType::Text => "text",
            ContentType::Document => "document",
            ContentType::Product => "product",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(ContentType::Image),
            "video" => Ok(ContentType::Video),
            "audio" => Ok(ContentType::Audio),
            "text" => Ok(ContentType::Text),
            "document" => Ok(ContentType::Document),
            "product" => Ok(ContentType::Product),
            other => Err(CoreError::UnknownContentType(other.to_string())),
        }
    }
}

/// Opaque reference from a queued item back to whatever the caller keeps
/// about it (for certified content, the manifest hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadRef(pub String);

impl PayloadRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PayloadRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_roundtrip() {
        for ct in [
            ContentType::Image,
            ContentType::Video,
            ContentType::Audio,
            ContentType::Text,
            ContentType::Document,
            ContentType::Product,
        ] {
            assert_eq!(ct.as_str().parse::<ContentType>().unwrap(), ct);
            assert_eq!(
                serde_json::to_string(&ct).unwrap(),
                format!("\"{}\"", ct.as_str())
            );
        }
        assert!("hologram".parse::<ContentType>().is_err());
    }
}
