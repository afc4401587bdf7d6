//! Normalization pass (spec §4.6 step 3): rewrites comparator synonyms and
//! node-type spelling to canonical form, and injects schema defaults for
//! missing optional params. Runs before graph construction/validation.

use std::str::FromStr;

use serde_json::Value;

use crate::{
    error::GraphError,
    graph::{Node, NodeKind, ParamValue, PortRef},
};

use super::schema::RawGraph;

fn json_to_param(value: &Value) -> ParamValue {
    match value {
        Value::Number(n) => ParamValue::Number(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => ParamValue::Text(s.clone()),
        Value::Bool(b) => ParamValue::Bool(*b),
        _ => ParamValue::Null,
    }
}

/// Converts a freshly-parsed `RawGraph` into typed `Node`s, rewriting
/// textual synonyms into canonical form along the way:
///
/// - `kind` is parsed through `NodeKind::FromStr` (case-insensitive), which
///   rejects unknown node types outright (I4/closed catalogue).
/// - Any `Compare` node's `op` param is re-serialized through
///   `ComparisonOp`, which *is* the I5 synonym rewrite.
/// - Missing-but-required params declared in `NodeKind::param_schema` are
///   left absent here; the graph validator reports them explicitly rather
///   than silently defaulting a value the LLM never specified.
/// - Missing *optional* params (e.g. `RiskManagerDaily.max_loss_pct`) are
///   injected here as an explicit `ParamValue::Null`, so "absent" and
///   "explicitly disabled" are the same value everywhere downstream (spec
///   §4.6 step 3).
pub fn normalize(raw: RawGraph) -> Result<Vec<Node>, GraphError> {
    let mut nodes = Vec::with_capacity(raw.nodes.len());

    for raw_node in raw.nodes {
        let kind = NodeKind::from_str(&raw_node.kind)
            .map_err(|_| GraphError::UnknownNodeType(raw_node.kind.clone()))?;

        let mut node = Node::new(raw_node.id.clone(), kind);

        for (name, value) in &raw_node.params {
            let mut param = json_to_param(value);
            if name == "op" {
                if let ParamValue::Text(raw_op) = &param {
                    let canonical: crate::graph::ComparisonOp =
                        raw_op.parse().map_err(|_| GraphError::InvalidParam {
                            node: raw_node.id.clone(),
                            param: "op".to_string(),
                            msg: format!("unrecognized comparison operator '{raw_op}'"),
                        })?;
                    param = ParamValue::Text(canonical.to_string());
                }
            }
            node = node.with_param(name.clone(), param);
        }

        for decl in kind.param_schema() {
            if !decl.required && !node.params.contains_key(decl.name) {
                node = node.with_param(decl.name, ParamValue::Null);
            }
        }

        for (port, raw_ref) in &raw_node.inputs {
            let port_ref = PortRef::parse(raw_ref).ok_or_else(|| GraphError::InvalidParam {
                node: raw_node.id.clone(),
                param: port.clone(),
                msg: format!("malformed port reference '{raw_ref}'"),
            })?;
            node = node.with_input(port.clone(), port_ref);
        }

        nodes.push(node);
    }

    Ok(nodes)
}
