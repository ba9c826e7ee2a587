//! CMS signature table - routes fingerprint text to specialized scanners

use std::collections::BTreeMap;

/// Keywords identifying one CMS family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmsSignature {
    /// Name of the specialized scanner this signature dispatches to
    pub name: String,
    /// Lowercase substrings; any one matching is enough
    pub keywords: Vec<String>,
}

impl CmsSignature {
    pub fn new(name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            name: name.into(),
            keywords: keywords.iter().map(|k| k.to_ascii_lowercase()).collect(),
        }
    }

    /// Case-insensitive substring match against fingerprint text
    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// A signature that fired, with the URL whose fingerprint triggered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatch {
    pub signature: String,
    pub url: String,
}

/// Ordered pattern to scanner mapping
#[derive(Debug, Clone)]
pub struct SignatureTable {
    signatures: Vec<CmsSignature>,
}

impl Default for SignatureTable {
    fn default() -> Self {
        Self::new(vec![
            CmsSignature::new("wordpress", &["wordpress", "wp-"]),
            CmsSignature::new("bitrix", &["bitrix"]),
        ])
    }
}

impl SignatureTable {
    pub fn new(signatures: Vec<CmsSignature>) -> Self {
        Self { signatures }
    }

    pub fn signatures(&self) -> &[CmsSignature] {
        &self.signatures
    }

    /// Evaluate the table once over a target's fingerprints (URL -> text).
    ///
    /// Each signature fires at most once, on the first URL whose text matches.
    /// Several signatures may fire for the same target.
    pub fn evaluate(&self, fingerprints: &BTreeMap<String, String>) -> Vec<SignatureMatch> {
        self.signatures
            .iter()
            .filter_map(|signature| {
                fingerprints
                    .iter()
                    .find(|(_, text)| signature.matches(text))
                    .map(|(url, _)| SignatureMatch {
                        signature: signature.name.clone(),
                        url: url.clone(),
                    })
            })
            .collect()
    }
}
