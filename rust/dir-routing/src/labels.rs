use std::fmt;

use crate::{config::MIN_LABEL_KEY_PARTS, error::RoutingError, record::Record};

/// Schema prefix carried by some record extensions; stripped before a label
/// value is formed.
const OASF_SCHEMA_PREFIX: &str = "schema.oasf.agntcy.org/";

/// The label namespaces the index is partitioned by. `/features/` is the
/// historical spelling of the module namespace and parses to
/// [LabelKind::Module]; new keys are written under `/modules/`.
pub const LABEL_PREFIXES: [&str; 5] = [
    "/skills/",
    "/domains/",
    "/modules/",
    "/features/",
    "/locators/",
];

/// The namespace a [Label] belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LabelKind {
    /// `/skills/...`
    Skill,
    /// `/domains/...`
    Domain,
    /// `/modules/...` (or the historical `/features/...`)
    Module,
    /// `/locators/...`
    Locator,
    /// Anything outside the known namespaces
    Unknown,
}

impl LabelKind {
    /// The namespace of a label in string form
    pub fn of(label: &str) -> LabelKind {
        if label.starts_with("/skills/") {
            LabelKind::Skill
        } else if label.starts_with("/domains/") {
            LabelKind::Domain
        } else if label.starts_with("/modules/") || label.starts_with("/features/") {
            LabelKind::Module
        } else if label.starts_with("/locators/") {
            LabelKind::Locator
        } else {
            LabelKind::Unknown
        }
    }

    fn namespace(&self) -> &'static str {
        match self {
            LabelKind::Skill => "skills",
            LabelKind::Domain => "domains",
            LabelKind::Module => "modules",
            LabelKind::Locator => "locators",
            LabelKind::Unknown => "unknown",
        }
    }
}

/// A typed classifier extracted from a record, e.g. `/skills/AI/ML`.
///
/// Labels are derived freshly from a record and never mutated; the string
/// form appears only at the persistence boundary.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Label {
    kind: LabelKind,
    value: String,
}

impl Label {
    /// A skill label
    pub fn skill<S: Into<String>>(value: S) -> Self {
        Label {
            kind: LabelKind::Skill,
            value: value.into(),
        }
    }

    /// A domain label
    pub fn domain<S: Into<String>>(value: S) -> Self {
        Label {
            kind: LabelKind::Domain,
            value: value.into(),
        }
    }

    /// A module label
    pub fn module<S: Into<String>>(value: S) -> Self {
        Label {
            kind: LabelKind::Module,
            value: value.into(),
        }
    }

    /// A locator label
    pub fn locator<S: Into<String>>(value: S) -> Self {
        Label {
            kind: LabelKind::Locator,
            value: value.into(),
        }
    }

    /// Parse a label from its string form. The historical `/features/`
    /// prefix normalizes to [LabelKind::Module].
    pub fn parse(label: &str) -> Result<Label, RoutingError> {
        let kind = LabelKind::of(label);
        if kind == LabelKind::Unknown {
            return Err(RoutingError::InvalidKey(format!(
                "unknown label namespace in '{label}'"
            )));
        }
        // Safe: LabelKind::of only recognized a known "/<ns>/" prefix.
        let value = label
            .splitn(3, '/')
            .nth(2)
            .unwrap_or_default()
            .to_string();
        Ok(Label { kind, value })
    }

    /// The label's namespace discriminant
    pub fn kind(&self) -> LabelKind {
        self.kind
    }

    /// The hierarchical value, without its namespace prefix
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "/{}/{}", self.kind.namespace(), self.value)
    }
}

/// The canonical per-peer/per-record index key:
/// `/<namespace>/<value>/<CID>/<PeerID>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LabelKey {
    label: Label,
    cid: String,
    peer_id: String,
}

impl LabelKey {
    /// Build a key from its parts
    pub fn new<C: Into<String>, P: Into<String>>(label: Label, cid: C, peer_id: P) -> Self {
        LabelKey {
            label,
            cid: cid.into(),
            peer_id: peer_id.into(),
        }
    }

    /// Parse a stored key back into its parts. The final two segments are
    /// the peer ID and CID; everything before them is the label. Keys with
    /// fewer than [MIN_LABEL_KEY_PARTS] slash-separated parts, or without a
    /// leading slash, are malformed.
    pub fn parse(key: &str) -> Result<LabelKey, RoutingError> {
        if !key.starts_with('/') {
            return Err(RoutingError::InvalidKey(format!(
                "label key '{key}' lacks a leading '/'"
            )));
        }

        let parts: Vec<&str> = key.split('/').collect();
        if parts.len() < MIN_LABEL_KEY_PARTS {
            return Err(RoutingError::InvalidKey(format!(
                "label key '{key}' has fewer than {MIN_LABEL_KEY_PARTS} parts"
            )));
        }

        let peer_id = parts[parts.len() - 1];
        let cid = parts[parts.len() - 2];
        if cid.is_empty() || peer_id.is_empty() {
            return Err(RoutingError::InvalidKey(format!(
                "label key '{key}' has an empty CID or peer segment"
            )));
        }

        let label = Label::parse(&parts[..parts.len() - 2].join("/"))?;

        Ok(LabelKey {
            label,
            cid: cid.to_string(),
            peer_id: peer_id.to_string(),
        })
    }

    /// The label portion of the key
    pub fn label(&self) -> &Label {
        &self.label
    }

    /// The CID segment
    pub fn cid(&self) -> &str {
        &self.cid
    }

    /// The trailing peer ID segment
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }
}

impl fmt::Display for LabelKey {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}/{}/{}", self.label, self.cid, self.peer_id)
    }
}

/// Derive every label a record advertises. Missing payload fields produce an
/// empty set, never an error.
pub fn extract_labels(record: &Record) -> Vec<Label> {
    let content = record.content();
    let mut labels = Vec::new();

    for skill in content.skills() {
        labels.push(Label::skill(skill));
    }
    for locator in content.locators() {
        labels.push(Label::locator(locator));
    }
    for module in content.modules() {
        labels.push(label_for_module(&module));
    }

    labels
}

/// Module and extension names may carry the OASF schema prefix; domains only
/// ever arrive that way. The prefix is stripped before the value is formed.
fn label_for_module(name: &str) -> Label {
    let stripped = name.strip_prefix(OASF_SCHEMA_PREFIX).unwrap_or(name);
    if let Some(domain) = stripped.strip_prefix("domains/") {
        Label::domain(domain)
    } else if let Some(feature) = stripped.strip_prefix("features/") {
        Label::module(feature)
    } else {
        Label::module(stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn it_round_trips_label_keys() -> Result<(), RoutingError> {
        let cases = [
            Label::skill("AI/ML"),
            Label::domain("research"),
            Label::module("runtime/language"),
            Label::locator("docker-image"),
        ];

        for label in cases {
            let key = LabelKey::new(label.clone(), "bafycid", "12D3KooWPeer");
            let parsed = LabelKey::parse(&key.to_string())?;
            assert_eq!(parsed.label(), &label);
            assert_eq!(parsed.cid(), "bafycid");
            assert_eq!(parsed.peer_id(), "12D3KooWPeer");
        }
        Ok(())
    }

    #[test]
    fn it_rejects_malformed_keys() {
        for key in ["skills/AI/cid/peer", "/skills/cid/peer", "/metrics", ""] {
            assert!(LabelKey::parse(key).is_err(), "'{key}' should not parse");
        }
    }

    #[test]
    fn it_normalizes_the_features_prefix() -> Result<(), RoutingError> {
        let label = Label::parse("/features/runtime/language")?;
        assert_eq!(label.kind(), LabelKind::Module);
        assert_eq!(label.value(), "runtime/language");
        // Normalized on write: the string form uses the current namespace.
        assert_eq!(label.to_string(), "/modules/runtime/language");
        Ok(())
    }

    #[test]
    fn it_types_labels_by_prefix() {
        assert_eq!(LabelKind::of("/skills/AI"), LabelKind::Skill);
        assert_eq!(LabelKind::of("/domains/x"), LabelKind::Domain);
        assert_eq!(LabelKind::of("/modules/x"), LabelKind::Module);
        assert_eq!(LabelKind::of("/features/x"), LabelKind::Module);
        assert_eq!(LabelKind::of("/locators/x"), LabelKind::Locator);
        assert_eq!(LabelKind::of("/records/x"), LabelKind::Unknown);
    }

    #[test]
    fn it_extracts_labels_from_a_record() {
        let record = Record::new(
            "bafytest",
            json!({
                "schema_version": "v1",
                "skills": [{ "name": "NLP/Text Completion" }],
                "locators": [{ "type": "docker-image" }],
                "modules": [
                    { "name": "schema.oasf.agntcy.org/domains/research" },
                    { "name": "schema.oasf.agntcy.org/features/runtime/model" },
                    { "name": "runtime/language" },
                ],
            }),
        );

        let labels: Vec<String> = extract_labels(&record)
            .iter()
            .map(Label::to_string)
            .collect();

        assert_eq!(
            labels,
            vec![
                "/skills/NLP/Text Completion",
                "/locators/docker-image",
                "/domains/research",
                "/modules/runtime/model",
                "/modules/runtime/language",
            ]
        );
    }

    #[test]
    fn it_extracts_nothing_from_an_empty_record() {
        let record = Record::new("bafytest", json!({}));
        assert!(extract_labels(&record).is_empty());
    }
}
