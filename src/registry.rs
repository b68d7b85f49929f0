//! Content-addressed tool registry.
//!
//! A tool's id is `name:schema_hash`, where the hash covers the canonical
//! form of its input and output schemas. Canonical means object keys are
//! sorted at every depth and `required` lists are sorted and deduplicated,
//! so reordering a schema never changes the id while any semantic edit does.

use crate::capability::Capability;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value, json};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

const SCHEMA_HASH_LEN: usize = 16;
/// 2^53; every integer below it is exact as an `f64`.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A tool as listed by the backend (`tools/list` entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default = "empty_object")]
    pub input_schema: Value,
    #[serde(
        rename = "outputSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub output_schema: Option<Value>,
}

fn empty_object() -> Value {
    json!({})
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
}

/// Normalized, immutable form of a [`ToolDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolRecord {
    pub tool_id: String,
    pub name: String,
    pub description: String,
    pub schema_hash: String,
    pub normalized_input_schema: Value,
    pub normalized_output_schema: Option<Value>,
    pub parameters: Vec<Parameter>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_capability: Option<Capability>,
}

impl ToolRecord {
    pub fn from_descriptor(descriptor: ToolDescriptor) -> Self {
        let name = descriptor.name.trim().to_string();
        let description = descriptor.description.trim().to_string();
        let input = canonicalize(&descriptor.input_schema);
        let output = descriptor.output_schema.as_ref().map(canonicalize);
        let schema_hash = schema_hash(&input, output.as_ref());
        let parameters = parameters(&input);
        let tags = detect_tags(&name, &description);
        let required_capability = Capability::for_tool_name(&name);

        Self {
            tool_id: format!("{name}:{schema_hash}"),
            name,
            description,
            schema_hash,
            normalized_input_schema: input,
            normalized_output_schema: output,
            parameters,
            tags,
            required_capability,
        }
    }

    /// Text the retrieval index tokenizes for this tool.
    pub fn search_text(&self) -> String {
        format!("{} {} {}", self.name, self.description, self.tags.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate tool name in backend listing: {name}")]
    DuplicateToolName { name: String },
    #[error("invalid tool descriptor at position {index}: {reason}")]
    InvalidDescriptor { index: usize, reason: String },
    #[error("tool_id not found: {tool_id}")]
    NotFound {
        tool_id: String,
        current_tool_id: Option<String>,
    },
}

/// Immutable set of tool records keyed by `tool_id`.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    records: Vec<ToolRecord>,
    by_id: BTreeMap<String, usize>,
    by_name: BTreeMap<String, usize>,
}

impl Registry {
    pub fn build(descriptors: Vec<ToolDescriptor>) -> Result<Self, RegistryError> {
        let mut seen = BTreeSet::new();
        let mut records = Vec::with_capacity(descriptors.len());
        for (index, descriptor) in descriptors.into_iter().enumerate() {
            if descriptor.name.trim().is_empty() {
                return Err(RegistryError::InvalidDescriptor {
                    index,
                    reason: "name must not be empty".to_string(),
                });
            }
            if !descriptor.input_schema.is_object() {
                return Err(RegistryError::InvalidDescriptor {
                    index,
                    reason: format!("inputSchema of {} must be an object", descriptor.name),
                });
            }
            let record = ToolRecord::from_descriptor(descriptor);
            if !seen.insert(record.name.clone()) {
                return Err(RegistryError::DuplicateToolName { name: record.name });
            }
            records.push(record);
        }

        records.sort_by(|a, b| a.tool_id.cmp(&b.tool_id));
        let by_id = records
            .iter()
            .enumerate()
            .map(|(index, record)| (record.tool_id.clone(), index))
            .collect();
        let by_name = records
            .iter()
            .enumerate()
            .map(|(index, record)| (record.name.clone(), index))
            .collect();

        Ok(Self {
            records,
            by_id,
            by_name,
        })
    }

    pub fn lookup(&self, tool_id: &str) -> Result<&ToolRecord, RegistryError> {
        if let Some(&index) = self.by_id.get(tool_id) {
            return Ok(&self.records[index]);
        }
        // A known name under a stale hash means the backend schema drifted.
        let current_tool_id = tool_id
            .rsplit_once(':')
            .and_then(|(name, _)| self.find_by_name(name))
            .map(|record| record.tool_id.clone());
        Err(RegistryError::NotFound {
            tool_id: tool_id.to_string(),
            current_tool_id,
        })
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ToolRecord> {
        self.by_name.get(name).map(|&index| &self.records[index])
    }

    /// Records in `tool_id` order.
    pub fn records(&self) -> &[ToolRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                let child = &map[key];
                let normalized = if key == "required" {
                    canonical_required(child)
                } else {
                    canonicalize(child)
                };
                sorted.insert(key.clone(), normalized);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(number) => canonical_number(number),
        other => other.clone(),
    }
}

/// Integral floats become integers, so `"minimum": 1.0` hashes like `1`.
fn canonical_number(number: &Number) -> Value {
    if number.is_f64()
        && let Some(float) = number.as_f64()
        && float.fract() == 0.0
        && float.abs() < MAX_EXACT_INTEGER
    {
        return Value::from(float as i64);
    }
    Value::Number(number.clone())
}

fn canonical_required(value: &Value) -> Value {
    let Some(items) = value.as_array() else {
        return canonicalize(value);
    };
    if !items.iter().all(Value::is_string) {
        return canonicalize(value);
    }
    let names: BTreeSet<&str> = items.iter().filter_map(Value::as_str).collect();
    Value::Array(names.into_iter().map(|name| json!(name)).collect())
}

fn schema_hash(input: &Value, output: Option<&Value>) -> String {
    let payload = json!({
        "inputSchema": input,
        "outputSchema": output,
    });
    // Compact serialization of canonical values is byte-stable.
    let encoded = payload.to_string();
    let digest = Sha256::digest(encoded.as_bytes());
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    hex[..SCHEMA_HASH_LEN].to_string()
}

fn parameters(schema: &Value) -> Vec<Parameter> {
    let required: BTreeSet<&str> = schema
        .get("required")
        .and_then(|value| value.as_array())
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema.get("properties").and_then(|value| value.as_object()) else {
        return Vec::new();
    };

    let mut params: Vec<Parameter> = properties
        .iter()
        .map(|(name, property)| Parameter {
            name: name.clone(),
            kind: property_type(property),
            description: property
                .get("description")
                .and_then(|value| value.as_str())
                .map(str::to_string),
            required: required.contains(name.as_str()),
        })
        .collect();
    params.sort_by(|a, b| a.name.cmp(&b.name));
    params
}

fn property_type(property: &Value) -> String {
    match property.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        Some(Value::Array(kinds)) => kinds
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("|"),
        _ => "any".to_string(),
    }
}

fn detect_tags(name: &str, description: &str) -> Vec<String> {
    let lowered = format!("{name} {description}").to_lowercase();
    let mut tags = Vec::new();
    if lowered.contains("windows") {
        tags.push("windows-only".to_string());
    }
    if ["xml", "xpath", "hwpx"]
        .iter()
        .any(|token| lowered.contains(token))
    {
        tags.push("xml".to_string());
    }
    if ["pdf", "html", "convert", "export"]
        .iter()
        .any(|token| lowered.contains(token))
    {
        tags.push("export".to_string());
    }
    if tags.is_empty() {
        tags.push("generic".to_string());
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, input: Value) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{name} tool"),
            input_schema: input,
            output_schema: None,
        }
    }

    #[test]
    fn key_order_does_not_change_tool_id() {
        let a: Value = serde_json::from_str(
            r#"{"type":"object","properties":{"text":{"type":"string"},"size":{"type":"integer"}},"required":["text","size"]}"#,
        )
        .expect("json");
        let b: Value = serde_json::from_str(
            r#"{ "required": ["size", "text"],
                 "properties": { "size": {"type": "integer"}, "text": {"type": "string"} },
                 "type": "object" }"#,
        )
        .expect("json");

        let first = ToolRecord::from_descriptor(descriptor("hwp_insert_text", a));
        let second = ToolRecord::from_descriptor(descriptor("hwp_insert_text", b));
        assert_eq!(first.tool_id, second.tool_id);
        assert!(first.tool_id.starts_with("hwp_insert_text:"));
        assert_eq!(first.schema_hash.len(), SCHEMA_HASH_LEN);
    }

    #[test]
    fn semantic_change_changes_tool_id() {
        let base = json!({"type": "object", "properties": {"text": {"type": "string"}}});
        let retyped = json!({"type": "object", "properties": {"text": {"type": "integer"}}});
        let required = json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        });

        let ids: BTreeSet<String> = [base, retyped, required]
            .into_iter()
            .map(|schema| ToolRecord::from_descriptor(descriptor("hwp_insert_text", schema)).tool_id)
            .collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn integral_floats_hash_like_integers() {
        let integer = json!({"type": "object", "properties": {"rows": {"type": "integer", "minimum": 1}}});
        let float = json!({"type": "object", "properties": {"rows": {"type": "integer", "minimum": 1.0}}});
        let fraction =
            json!({"type": "object", "properties": {"rows": {"type": "integer", "minimum": 1.5}}});
        let id = |schema| ToolRecord::from_descriptor(descriptor("hwp_create_table", schema)).tool_id;
        assert_eq!(id(integer.clone()), id(float));
        assert_ne!(id(integer), id(fraction));
        assert_eq!(canonicalize(&json!([-0.0, 2.0, 3])), json!([0, 2, 3]));
    }

    #[test]
    fn output_schema_participates_in_hash() {
        let mut with_output = descriptor("hwp_get_text", json!({"type": "object"}));
        let plain = ToolRecord::from_descriptor(with_output.clone());
        with_output.output_schema = Some(json!({"type": "object", "properties": {"text": {"type": "string"}}}));
        let changed = ToolRecord::from_descriptor(with_output);
        assert_ne!(plain.tool_id, changed.tool_id);
    }

    #[test]
    fn duplicate_names_are_fatal() {
        let err = Registry::build(vec![
            descriptor("hwp_ping", json!({})),
            descriptor("hwp_ping", json!({"type": "object"})),
        ])
        .expect_err("duplicate");
        assert_eq!(
            err,
            RegistryError::DuplicateToolName {
                name: "hwp_ping".to_string()
            }
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = Registry::build(vec![descriptor("  ", json!({}))]).expect_err("invalid");
        assert!(matches!(err, RegistryError::InvalidDescriptor { index: 0, .. }));
    }

    #[test]
    fn identical_listings_build_identical_ids() {
        let listing = || {
            vec![
                descriptor("hwp_save", json!({"type": "object"})),
                descriptor("hwp_open", json!({"type": "object", "properties": {"path": {"type": "string"}}})),
            ]
        };
        let first = Registry::build(listing()).expect("registry");
        let mut reversed = listing();
        reversed.reverse();
        let second = Registry::build(reversed).expect("registry");
        let first_ids: Vec<&str> = first.records().iter().map(|r| r.tool_id.as_str()).collect();
        let second_ids: Vec<&str> = second.records().iter().map(|r| r.tool_id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn lookup_reports_current_id_after_drift() {
        let old = ToolRecord::from_descriptor(descriptor("hwp_open", json!({"type": "object"})));
        let registry = Registry::build(vec![descriptor(
            "hwp_open",
            json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        )])
        .expect("registry");

        let err = registry.lookup(&old.tool_id).expect_err("stale id");
        let RegistryError::NotFound {
            current_tool_id, ..
        } = err
        else {
            panic!("expected not found");
        };
        assert_eq!(
            current_tool_id.as_deref(),
            registry.find_by_name("hwp_open").map(|r| r.tool_id.as_str())
        );
        assert!(registry.lookup("missing:0000").is_err());
    }

    #[test]
    fn parameters_are_flattened() {
        let record = ToolRecord::from_descriptor(descriptor(
            "hwp_create_table",
            json!({
                "type": "object",
                "properties": {
                    "rows": {"type": "integer", "description": "Row count"},
                    "cols": {"type": "integer"},
                    "data": {"type": ["array", "null"]}
                },
                "required": ["rows", "cols"]
            }),
        ));
        let names: Vec<&str> = record.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["cols", "data", "rows"]);
        assert_eq!(record.parameters[1].kind, "array|null");
        assert!(!record.parameters[1].required);
        assert!(record.parameters[2].required);
        assert_eq!(record.parameters[2].description.as_deref(), Some("Row count"));
        assert_eq!(record.required_capability, Some(Capability::CreateTable));
    }

    #[test]
    fn tags_follow_name_and_description() {
        let record = ToolRecord::from_descriptor(ToolDescriptor {
            name: "hwp_export_pdf".to_string(),
            description: "Export the document to PDF (Windows)".to_string(),
            input_schema: json!({}),
            output_schema: None,
        });
        assert_eq!(record.tags, ["windows-only", "export"]);

        let generic = ToolRecord::from_descriptor(descriptor("hwp_ping", json!({})));
        assert_eq!(generic.tags, ["generic"]);
    }
}
