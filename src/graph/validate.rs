use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{EvoResult, GraphError};

use super::{ComparisonOp, NodeKind, OutputType, StrategyGraph};

fn node_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Checks invariants I1-I5 (spec §3) against an already-built graph.
///
/// I5 (canonical comparison symbols) is enforced structurally: a node's `op`
/// param is only ever read back out through [`ComparisonOp::from_str`], so a
/// residual textual synonym surfaces here as `InvalidParam` rather than
/// silently passing through to the executor.
pub fn validate_graph(graph: &StrategyGraph) -> EvoResult<()> {
    check_duplicate_ids(graph)?;
    check_node_id_format(graph)?;
    // I1: no cycles.
    graph.topo_sort()?;
    // I2 + I3: every input resolves and port types match.
    check_inputs_resolve_and_typecheck(graph)?;
    // I4: at least one MarketData source and a terminal order node.
    check_required_nodes_present(graph)?;
    // I5: comparison operators parse to the canonical symbol form.
    check_comparisons_canonical(graph)?;
    Ok(())
}

fn check_duplicate_ids(graph: &StrategyGraph) -> EvoResult<()> {
    let mut seen = std::collections::HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(&node.id) {
            return Err(GraphError::DuplicateNodeId(node.id.to_string()).into());
        }
    }
    Ok(())
}

/// Rejects node ids the LLM compiler could emit that would otherwise break
/// `PortRef` parsing downstream (e.g. an id containing a literal `.`).
fn check_node_id_format(graph: &StrategyGraph) -> EvoResult<()> {
    for node in &graph.nodes {
        if !node_id_pattern().is_match(&node.id.0) {
            return Err(GraphError::InvalidParam {
                node: node.id.to_string(),
                param: "id".into(),
                msg: "node id must match [A-Za-z_][A-Za-z0-9_]*".into(),
            }
            .into());
        }
    }
    Ok(())
}

fn check_inputs_resolve_and_typecheck(graph: &StrategyGraph) -> EvoResult<()> {
    for node in &graph.nodes {
        let input_decls = node.kind.input_ports();
        for (port_name, src) in &node.inputs {
            let Some(src_node) = graph.node(&src.node) else {
                return Err(GraphError::UnresolvedInput(
                    node.id.to_string(),
                    src.to_string(),
                )
                .into());
            };
            let Some(out_decl) = src_node
                .kind
                .output_ports()
                .iter()
                .find(|p| p.name == src.output)
            else {
                return Err(GraphError::UnresolvedInput(
                    node.id.to_string(),
                    src.to_string(),
                )
                .into());
            };
            let Some(expected) = input_decls.iter().find(|p| &p.name == port_name) else {
                continue;
            };
            if expected.ty != out_decl.ty {
                return Err(GraphError::PortTypeMismatch {
                    node: node.id.to_string(),
                    port: port_name.clone(),
                    expected: format_output_type(expected.ty),
                    got: format_output_type(out_decl.ty),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn format_output_type(ty: OutputType) -> String {
    ty.to_string()
}

fn check_required_nodes_present(graph: &StrategyGraph) -> EvoResult<()> {
    let has_market_data = graph.nodes.iter().any(|n| n.kind.is_market_data_source());
    if !has_market_data {
        return Err(GraphError::MissingRequiredNode("MarketData".into()).into());
    }
    let has_terminal = graph
        .nodes
        .iter()
        .any(|n| n.kind.is_terminal_order_node());
    if !has_terminal {
        return Err(GraphError::MissingRequiredNode("BracketOrder".into()).into());
    }
    Ok(())
}

fn check_comparisons_canonical(graph: &StrategyGraph) -> EvoResult<()> {
    for node in &graph.nodes {
        if node.kind != NodeKind::Compare {
            continue;
        }
        let raw = node.params.get("op").and_then(|v| v.as_str()).ok_or_else(|| {
            GraphError::InvalidParam {
                node: node.id.to_string(),
                param: "op".into(),
                msg: "missing".into(),
            }
        })?;
        ComparisonOp::from_str(raw).map_err(|_| GraphError::InvalidParam {
            node: node.id.to_string(),
            param: "op".into(),
            msg: format!("'{raw}' is not a recognized comparison operator"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Generation, Node, ParamValue, PortRef};

    fn minimal_valid_nodes() -> Vec<Node> {
        vec![
            Node::new("md", NodeKind::MarketData).with_param("symbol", ParamValue::Text("AAPL".into())),
            Node::new("cmp", NodeKind::Compare)
                .with_param("op", ParamValue::Text(ComparisonOp::Gt.to_string()))
                .with_input("lhs", PortRef::parse("md.close").unwrap())
                .with_input("rhs", PortRef::parse("md.close").unwrap()),
            Node::new("entry", NodeKind::EntrySignal)
                .with_input("condition", PortRef::parse("cmp.value").unwrap()),
            Node::new("exit", NodeKind::ExitSignal)
                .with_input("condition", PortRef::parse("cmp.value").unwrap()),
            Node::new("sl", NodeKind::StopLossFixed).with_param("offset", ParamValue::Number(1.0)),
            Node::new("tp", NodeKind::TakeProfitFixed).with_param("offset", ParamValue::Number(1.0)),
            Node::new("size", NodeKind::PositionSizingFixed)
                .with_param("dollars", ParamValue::Number(100.0)),
            Node::new("bracket", NodeKind::BracketOrder)
                .with_input("entry", PortRef::parse("entry.value").unwrap())
                .with_input("exit", PortRef::parse("exit.value").unwrap())
                .with_input("stop_loss", PortRef::parse("sl.offset").unwrap())
                .with_input("take_profit", PortRef::parse("tp.offset").unwrap())
                .with_input("size", PortRef::parse("size.size").unwrap()),
        ]
    }

    #[test]
    fn minimal_graph_validates() {
        let graph = StrategyGraph::new(minimal_valid_nodes(), None, Generation(0));
        assert!(validate_graph(&graph).is_ok());
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let mut nodes = minimal_valid_nodes();
        nodes.push(Node::new("md", NodeKind::MarketData).with_param("symbol", ParamValue::Text("MSFT".into())));
        let graph = StrategyGraph::new(nodes, None, Generation(0));
        assert!(validate_graph(&graph).is_err());
    }

    #[test]
    fn node_id_with_a_dot_is_rejected() {
        let mut nodes = minimal_valid_nodes();
        nodes[0].id = crate::graph::NodeId("md.bad".to_string());
        let graph = StrategyGraph::new(nodes, None, Generation(0));
        assert!(validate_graph(&graph).is_err());
    }

    #[test]
    fn missing_market_data_source_is_rejected() {
        let nodes: Vec<Node> = minimal_valid_nodes().into_iter().filter(|n| n.id.0 != "md").collect();
        let graph = StrategyGraph::new(nodes, None, Generation(0));
        assert!(validate_graph(&graph).is_err());
    }

    #[test]
    fn comparison_op_synonym_is_accepted() {
        let mut nodes = minimal_valid_nodes();
        let cmp = nodes.iter_mut().find(|n| n.id.0 == "cmp").unwrap();
        cmp.params.insert("op".into(), ParamValue::Text("less_than".into()));
        let graph = StrategyGraph::new(nodes, None, Generation(0));
        assert!(validate_graph(&graph).is_ok());
    }

    #[test]
    fn unrecognized_comparison_op_is_rejected() {
        let mut nodes = minimal_valid_nodes();
        let cmp = nodes.iter_mut().find(|n| n.id.0 == "cmp").unwrap();
        cmp.params.insert("op".into(), ParamValue::Text("sideways".into()));
        let graph = StrategyGraph::new(nodes, None, Generation(0));
        assert!(validate_graph(&graph).is_err());
    }
}
