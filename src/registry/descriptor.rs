//! Converter descriptors and their manifest format.

use crate::error::{Error, Result};
use crate::mime::MimeType;
use serde::{Deserialize, Deserializer, Serialize};

/// Whether a converter can be used without asking it first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// Always usable.
    #[default]
    Always,
    /// Usable only if its factory probe succeeds.
    Probe,
}

/// Static description of one converter plugin.
///
/// Usually deserialized from plugin metadata:
///
/// ```json
/// { "name": "csv-import", "import": "text/csv,text/plain",
///   "export": ["application/x-sheet"], "weight": 1, "availability": "always" }
/// ```
///
/// `import` and `export` accept a list or a comma-separated string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterDescriptor {
    /// Human-readable converter name.
    pub name: String,

    /// MIME types this converter reads.
    #[serde(deserialize_with = "mime_list")]
    pub import: Vec<MimeType>,

    /// MIME types this converter writes.
    #[serde(deserialize_with = "mime_list")]
    pub export: Vec<MimeType>,

    /// Relative cost. `0` and `u32::MAX` mark the converter unusable.
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Availability mode.
    #[serde(default)]
    pub availability: Availability,
}

fn default_weight() -> u32 {
    1
}

impl ConverterDescriptor {
    /// Create a descriptor with weight 1, always available.
    pub fn new(name: &str, import: &[&str], export: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            import: import.iter().map(|m| MimeType::from(*m)).collect(),
            export: export.iter().map(|m| MimeType::from(*m)).collect(),
            weight: 1,
            availability: Availability::Always,
        }
    }

    /// Set the weight (builder pattern).
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Set the availability mode (builder pattern).
    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// Parse a descriptor from a JSON manifest.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a JSON array of manifests.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        Ok(serde_json::from_str(json)?)
    }

    /// Weight usable for an edge: `None` for the zero and `u32::MAX` sentinels.
    pub fn edge_weight(&self) -> Option<u32> {
        match self.weight {
            0 | u32::MAX => None,
            w => Some(w),
        }
    }

    /// Check the registration rules.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidDescriptor {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("empty name"));
        }
        if self.import.is_empty() {
            return Err(invalid("no import MIME types"));
        }
        if self.export.is_empty() {
            return Err(invalid("no export MIME types"));
        }
        if self.import.iter().chain(&self.export).any(MimeType::is_empty) {
            return Err(invalid("empty MIME type"));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MimeListRepr {
    List(Vec<String>),
    Joined(String),
}

fn mime_list<'de, D>(deserializer: D) -> std::result::Result<Vec<MimeType>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match MimeListRepr::deserialize(deserializer)? {
        MimeListRepr::List(items) => items,
        MimeListRepr::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };
    Ok(items
        .into_iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .map(MimeType::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_with_joined_lists() {
        let desc = ConverterDescriptor::from_json(
            r#"{"name":"csv","import":"text/csv, text/plain","export":["application/x-sheet"],"weight":3,"availability":"probe"}"#,
        )
        .unwrap();
        assert_eq!(desc.import, vec![MimeType::from("text/csv"), MimeType::from("text/plain")]);
        assert_eq!(desc.export, vec![MimeType::from("application/x-sheet")]);
        assert_eq!(desc.weight, 3);
        assert_eq!(desc.availability, Availability::Probe);
    }

    #[test]
    fn test_manifest_defaults() {
        let desc = ConverterDescriptor::from_json(r#"{"name":"x","import":["a"],"export":"b"}"#).unwrap();
        assert_eq!(desc.weight, 1);
        assert_eq!(desc.availability, Availability::Always);
    }

    #[test]
    fn test_manifest_rejects_unknown_availability() {
        assert!(ConverterDescriptor::from_json(r#"{"name":"x","import":"a","export":"b","availability":"sometimes"}"#).is_err());
    }

    #[test]
    fn test_edge_weight_sentinels() {
        let desc = ConverterDescriptor::new("x", &["a"], &["b"]);
        assert_eq!(desc.clone().with_weight(0).edge_weight(), None);
        assert_eq!(desc.clone().with_weight(u32::MAX).edge_weight(), None);
        assert_eq!(desc.with_weight(7).edge_weight(), Some(7));
    }

    #[test]
    fn test_validate() {
        assert!(ConverterDescriptor::new("x", &["a"], &["b"]).validate().is_ok());
        assert!(ConverterDescriptor::new("x", &[], &["b"]).validate().is_err());
        assert!(ConverterDescriptor::new("x", &["a"], &[]).validate().is_err());
        assert!(ConverterDescriptor::new(" ", &["a"], &["b"]).validate().is_err());
        assert!(ConverterDescriptor::new("x", &["a", ""], &["b"]).validate().is_err());
    }
}
