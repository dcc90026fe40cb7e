//! Typed record model for extracted sensor data.
//!
//! Model output is an untyped JSON object whose shape drifts page to page:
//! a field that is a string on one page may be an object on the next, and
//! "no information" arrives as `null`, `"null"` or `""`. Everything is
//! normalised into a small tagged tree ([`Node`]) at parse time so the
//! merger can match on shapes exhaustively instead of probing JSON values.
//!
//! ```text
//! Node ::= Leaf(String)                 "3.3 V", "42", "true"
//!        | List([Node])                 ["DIN rail", "panel"]
//!        | Group({ key → Node })        { "range": "0-10 bar" }
//! ```
//!
//! Absent values never become nodes, so a present node always carries
//! information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A map of named nodes, ordered by key for deterministic output.
pub type Group = BTreeMap<String, Node>;

/// The specification sub-groups the extraction prompt asks for.
pub const SPEC_GROUPS: [&str; 4] = ["performance", "electrical", "mechanical", "environmental"];

/// One value in the extracted tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Leaf(String),
    List(Vec<Node>),
    Group(Group),
}

impl Node {
    /// Convert a JSON value, dropping everything that carries no information.
    ///
    /// Numbers and booleans become leaves holding their JSON text. Arrays and
    /// objects that are empty once their absent members are dropped are
    /// themselves absent.
    pub fn from_value(value: Value) -> Option<Node> {
        match value {
            Value::Null => None,
            Value::String(s) => {
                if is_blank(&s) {
                    None
                } else {
                    Some(Node::Leaf(s))
                }
            }
            Value::Bool(b) => Some(Node::Leaf(b.to_string())),
            Value::Number(n) => Some(Node::Leaf(n.to_string())),
            Value::Array(items) => {
                let items: Vec<Node> = items.into_iter().filter_map(Node::from_value).collect();
                if items.is_empty() {
                    None
                } else {
                    Some(Node::List(items))
                }
            }
            Value::Object(map) => {
                let group = group_from_map(map);
                if group.is_empty() {
                    None
                } else {
                    Some(Node::Group(group))
                }
            }
        }
    }

    /// `true` for leaves and lists, the values the merge policies compare.
    pub fn is_leaf_like(&self) -> bool {
        !matches!(self, Node::Group(_))
    }

    /// Number of filled leaves under this node.
    pub fn filled_leaves(&self) -> usize {
        match self {
            Node::Leaf(s) => usize::from(!is_blank(s)),
            Node::List(items) => items.iter().map(Node::filled_leaves).sum(),
            Node::Group(group) => group.values().map(Node::filled_leaves).sum(),
        }
    }

    /// Flat text form used for scoring: leaves as-is, lists joined with `", "`.
    pub fn text(&self) -> String {
        match self {
            Node::Leaf(s) => s.clone(),
            Node::List(items) => items
                .iter()
                .map(Node::text)
                .collect::<Vec<_>>()
                .join(", "),
            Node::Group(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    /// Short shape name for log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Leaf(_) => "leaf",
            Node::List(_) => "list",
            Node::Group(_) => "group",
        }
    }
}

/// `true` when a string carries no information: blank or the literal `null`.
pub fn is_blank(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || t.eq_ignore_ascii_case("null")
}

fn group_from_map(map: Map<String, Value>) -> Group {
    map.into_iter()
        .filter_map(|(k, v)| Node::from_value(v).map(|node| (k, node)))
        .collect()
}

/// Structured data recovered from a single page's model response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialRecord {
    pub sensor_type: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub specifications: Group,
    pub extra_fields: Group,
}

impl PartialRecord {
    /// Build a record from a recovered JSON object.
    ///
    /// Identity fields must be scalars; a structured value there is logged
    /// and ignored. `specifications` and `extra_fields` must be objects.
    /// Unknown top-level keys are ignored.
    pub fn from_object(object: Map<String, Value>) -> Self {
        let mut record = PartialRecord::default();
        for (key, value) in object {
            match key.as_str() {
                "sensor_type" => record.sensor_type = identity_field(&key, value),
                "manufacturer" => record.manufacturer = identity_field(&key, value),
                "model" => record.model = identity_field(&key, value),
                "specifications" | "extra_fields" => {
                    let target = if key == "specifications" {
                        &mut record.specifications
                    } else {
                        &mut record.extra_fields
                    };
                    match value {
                        Value::Object(map) => *target = group_from_map(map),
                        Value::Null => {}
                        other => warn!(
                            field = %key,
                            "Skipping non-object {} in model output: {}",
                            key,
                            json_kind(&other)
                        ),
                    }
                }
                other => debug!("Ignoring unexpected top-level field '{}'", other),
            }
        }
        record
    }

    /// `true` when no field carries information.
    pub fn is_empty(&self) -> bool {
        self.sensor_type.is_none()
            && self.manufacturer.is_none()
            && self.model.is_none()
            && self.specifications.is_empty()
            && self.extra_fields.is_empty()
    }

    /// Number of filled leaves, identity fields included.
    pub fn filled_fields(&self) -> usize {
        [&self.sensor_type, &self.manufacturer, &self.model]
            .iter()
            .filter(|f| f.is_some())
            .count()
            + self.specifications.values().map(Node::filled_leaves).sum::<usize>()
            + self.extra_fields.values().map(Node::filled_leaves).sum::<usize>()
    }
}

fn identity_field(key: &str, value: Value) -> Option<String> {
    match Node::from_value(value) {
        Some(Node::Leaf(s)) => Some(s.trim().to_string()),
        Some(other) => {
            warn!(field = %key, "Ignoring {} value for identity field", other.kind());
            None
        }
        None => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Provenance attached to the merged record just before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub filename: String,
    pub upload_date: DateTime<Utc>,
    pub page_count: usize,
}

/// The single reconciled document produced for a whole PDF.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub specifications: Group,
    #[serde(default, skip_serializing_if = "Group::is_empty")]
    pub extra_fields: Group,
    /// LLM identifier that produced the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceInfo>,
}

impl MergedRecord {
    /// `true` when nothing has been merged in yet.
    pub fn is_empty(&self) -> bool {
        self.sensor_type.is_none()
            && self.manufacturer.is_none()
            && self.model.is_none()
            && self.specifications.values().all(|n| n.filled_leaves() == 0)
            && self.extra_fields.is_empty()
    }

    /// Remove specification groups (and nested groups) without a filled
    /// leaf, and empty extra fields.
    pub fn prune(&mut self) {
        prune_group(&mut self.specifications);
        prune_group(&mut self.extra_fields);
    }

    /// Names of specification sub-groups that hold at least one value.
    ///
    /// A bare value directly under `specifications` is not a sub-group.
    pub fn filled_groups(&self) -> Vec<&str> {
        self.specifications
            .iter()
            .filter(|(_, node)| matches!(node, Node::Group(_)) && node.filled_leaves() > 0)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Serialise to the persisted document shape.
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn prune_group(group: &mut Group) {
    for node in group.values_mut() {
        if let Node::Group(inner) = node {
            prune_group(inner);
        }
    }
    group.retain(|_, node| node.filled_leaves() > 0);
}
