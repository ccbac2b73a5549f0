use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::RoutingError,
    types::{RecordMeta, RecordRef},
};

/// An immutable, JSON-described artifact identified by a CID.
///
/// The routing core never interprets the payload beyond the fields exposed
/// through [RecordContent]; everything else travels opaquely. Records are
/// serialized as-is (JSON over the store, CBOR-encoded JSON over the peer
/// RPC).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    cid: String,
    data: Value,
}

impl Record {
    /// Wrap an already-addressed payload
    pub fn new<S: Into<String>>(cid: S, data: Value) -> Self {
        Record {
            cid: cid.into(),
            data,
        }
    }

    /// String form of the record's CID
    pub fn cid(&self) -> &str {
        &self.cid
    }

    /// A [RecordRef] pointing at this record
    pub fn reference(&self) -> RecordRef {
        RecordRef::new(&self.cid)
    }

    /// The schema version discriminator carried in the envelope. Records
    /// predating the discriminator are treated as the current schema.
    pub fn schema_version(&self) -> &str {
        self.data
            .get("schema_version")
            .and_then(Value::as_str)
            .unwrap_or("v1")
    }

    /// Summary metadata for lookups
    pub fn meta(&self) -> RecordMeta {
        RecordMeta {
            cid: self.cid.clone(),
            schema_version: self.schema_version().to_string(),
        }
    }

    /// A version-agnostic view over the payload. Dispatches on the schema
    /// discriminator so callers never branch on versions themselves.
    pub fn content(&self) -> Box<dyn RecordContent + '_> {
        if self.schema_version().starts_with("v1alpha") {
            Box::new(V1AlphaContent { data: &self.data })
        } else {
            Box::new(V1Content { data: &self.data })
        }
    }

    /// The raw payload
    pub fn data(&self) -> &Value {
        &self.data
    }
}

/// Version-agnostic access to the record fields the routing core reads.
/// Missing or malformed fields yield empty collections, never errors.
pub trait RecordContent {
    /// Skill names, hierarchical segments joined by `/`
    fn skills(&self) -> Vec<String>;
    /// Locator types (not URLs)
    fn locators(&self) -> Vec<String>;
    /// Module/extension names, possibly carrying a schema prefix
    fn modules(&self) -> Vec<String>;
}

fn string_items(data: &Value, field: &str, name: impl Fn(&Value) -> Option<String>) -> Vec<String> {
    match data.get(field).and_then(Value::as_array) {
        Some(items) => items.iter().filter_map(name).collect(),
        None => Vec::new(),
    }
}

/// The `v1alpha*` payload shape: skills as category/class pairs, modules
/// under the historical `extensions` field.
struct V1AlphaContent<'a> {
    data: &'a Value,
}

impl RecordContent for V1AlphaContent<'_> {
    fn skills(&self) -> Vec<String> {
        string_items(self.data, "skills", |item| {
            match (
                item.get("category_name").and_then(Value::as_str),
                item.get("class_name").and_then(Value::as_str),
            ) {
                (Some(category), Some(class)) => Some(format!("{category}/{class}")),
                (Some(category), None) => Some(category.to_string()),
                _ => item.as_str().map(str::to_string),
            }
        })
    }

    fn locators(&self) -> Vec<String> {
        string_items(self.data, "locators", |item| {
            item.get("type").and_then(Value::as_str).map(str::to_string)
        })
    }

    fn modules(&self) -> Vec<String> {
        string_items(self.data, "extensions", |item| {
            item.get("name").and_then(Value::as_str).map(str::to_string)
        })
    }
}

/// The current (`v1`) payload shape.
struct V1Content<'a> {
    data: &'a Value,
}

impl RecordContent for V1Content<'_> {
    fn skills(&self) -> Vec<String> {
        string_items(self.data, "skills", |item| {
            item.get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| item.as_str().map(str::to_string))
        })
    }

    fn locators(&self) -> Vec<String> {
        string_items(self.data, "locators", |item| {
            item.get("type").and_then(Value::as_str).map(str::to_string)
        })
    }

    fn modules(&self) -> Vec<String> {
        string_items(self.data, "modules", |item| {
            item.get("name").and_then(Value::as_str).map(str::to_string)
        })
    }
}

/// The external record store the routing core collaborates with. Publishing
/// record bytes (`push`) happens outside the core; the core only reads.
#[async_trait]
pub trait StoreApi: Send + Sync {
    /// Summary metadata for a stored record, or [RoutingError::NotFound]
    async fn lookup(&self, record_ref: &RecordRef) -> Result<RecordMeta, RoutingError>;

    /// The full record, or [RoutingError::NotFound]
    async fn pull(&self, record_ref: &RecordRef) -> Result<Record, RoutingError>;

    /// Store a record and return its reference
    async fn push(&self, record: &Record) -> Result<RecordRef, RoutingError>;
}

impl Record {
    /// Deserialize a record from its JSON wire form
    pub fn from_json(bytes: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(bytes).map_err(|error| anyhow!(error))
    }

    /// Serialize the record into its JSON wire form
    pub fn to_json(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|error| anyhow!(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn it_reads_v1_content() {
        let record = Record::new(
            "bafytest",
            json!({
                "schema_version": "v1",
                "skills": [{ "name": "NLP/Text Completion" }],
                "locators": [{ "type": "docker-image", "url": "https://example.test/image" }],
                "modules": [{ "name": "runtime/language" }],
            }),
        );

        let content = record.content();
        assert_eq!(content.skills(), vec!["NLP/Text Completion"]);
        assert_eq!(content.locators(), vec!["docker-image"]);
        assert_eq!(content.modules(), vec!["runtime/language"]);
    }

    #[test]
    fn it_reads_v1alpha_content() {
        let record = Record::new(
            "bafytest",
            json!({
                "schema_version": "v1alpha1",
                "skills": [
                    { "category_name": "NLP", "class_name": "Problem Solving" },
                    { "category_name": "Audio" },
                ],
                "extensions": [
                    { "name": "schema.oasf.agntcy.org/domains/research" },
                ],
            }),
        );

        let content = record.content();
        assert_eq!(content.skills(), vec!["NLP/Problem Solving", "Audio"]);
        assert!(content.locators().is_empty());
        assert_eq!(
            content.modules(),
            vec!["schema.oasf.agntcy.org/domains/research"]
        );
    }

    #[test]
    fn it_yields_empty_collections_for_missing_fields() {
        let record = Record::new("bafytest", json!({ "name": "bare" }));
        let content = record.content();
        assert!(content.skills().is_empty());
        assert!(content.locators().is_empty());
        assert!(content.modules().is_empty());
    }

    #[test]
    fn it_round_trips_through_json() -> anyhow::Result<()> {
        let record = Record::new("bafytest", json!({ "schema_version": "v1", "name": "x" }));
        let bytes = record.to_json()?;
        assert_eq!(Record::from_json(&bytes)?, record);
        Ok(())
    }
}
