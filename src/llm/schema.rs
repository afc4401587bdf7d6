//! The wire shape an LLM response must parse into before normalization
//! (spec §4.6 step 1), plus the JSON schema sent to the provider so it has
//! a fighting chance of emitting that shape.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNode {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawGraph {
    pub nodes: Vec<RawNode>,
}

/// A JSON schema description, sent as part of the compile/mutate prompt so
/// the provider is steered toward the shape `RawGraph` expects. Not
/// mechanically enforced — the repair loop (spec §4.6 step 4) is what
/// actually guarantees a parseable response.
pub fn response_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["nodes"],
        "properties": {
            "nodes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "kind"],
                    "properties": {
                        "id": {"type": "string"},
                        "kind": {"type": "string"},
                        "params": {"type": "object"},
                        "inputs": {
                            "type": "object",
                            "additionalProperties": {"type": "string"}
                        }
                    }
                }
            }
        }
    })
}

pub fn parse_raw_graph(text: &str) -> Result<RawGraph, serde_json::Error> {
    serde_json::from_str(text)
}
