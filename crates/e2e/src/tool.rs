//! Tool records served by the tool rental API
//!
//! The API owns these records. Probes only read them to check shape and
//! field values.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields every tool record must carry
pub const REQUIRED_FIELDS: [&str; 4] = ["id", "name", "category", "inStock"];

/// Identifier of a tool. The API uses numbers, but strings are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolId {
    Number(u64),
    Text(String),
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolId::Number(n) => write!(f, "{}", n),
            ToolId::Text(s) => f.write_str(s),
        }
    }
}

/// A rentable tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: ToolId,
    pub name: String,
    pub category: String,
    #[serde(rename = "inStock")]
    pub in_stock: bool,
}

/// Names of required fields missing from a JSON object.
///
/// Non-objects are missing every field.
pub fn missing_fields<'a>(value: &Value, fields: &[&'a str]) -> Vec<&'a str> {
    match value.as_object() {
        Some(obj) => fields.iter().copied().filter(|f| !obj.contains_key(*f)).collect(),
        None => fields.to_vec(),
    }
}

/// Check that a body is a single tool record
pub fn check_tool(value: &Value) -> Result<Tool, String> {
    let missing = missing_fields(value, &REQUIRED_FIELDS);
    if !missing.is_empty() {
        return Err(format!("tool is missing fields: {}", missing.join(", ")));
    }
    Tool::deserialize(value).map_err(|e| format!("tool has unexpected field types: {}", e))
}

/// Check that a body is an array of tool records
pub fn check_tool_list(value: &Value) -> Result<Vec<Tool>, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("expected an array of tools, got {}", json_kind(value)))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| check_tool(item).map_err(|e| format!("element {}: {}", i, e)))
        .collect()
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
