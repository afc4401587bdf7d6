//! DAG Executor: evaluates a validated `StrategyGraph` against one
//! contiguous `BarFrame`, producing an `EpisodeResult` (spec §4.1).

mod fitness;
mod nodes;
mod order_sim;

pub use fitness::FitnessInputs;
pub use order_sim::{OrderIntent, TradeDirection};

use std::collections::HashMap;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    bars::BarFrame,
    config::FitnessWeights,
    error::ExecutionError,
    graph::{GraphId, StrategyGraph},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Survive,
    Kill,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub traceback: Option<String>,
}

impl From<ExecutionError> for ErrorDetails {
    fn from(e: ExecutionError) -> Self {
        Self {
            kind: "episode_failure".to_string(),
            message: e.to_string(),
            traceback: None,
        }
    }
}

/// The per-episode result of one backtest (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub label: String,
    pub fitness: f64,
    pub decision: Decision,
    pub kill_reason: Vec<String>,
    pub n_trades: usize,
    pub error_details: Option<ErrorDetails>,
}

impl EpisodeResult {
    fn execution_failure(label: &str, err: ExecutionError) -> Self {
        Self {
            label: label.to_string(),
            fitness: -1.0,
            decision: Decision::Kill,
            kill_reason: vec!["episode_failure".to_string()],
            n_trades: 0,
            error_details: Some(err.into()),
        }
    }
}

/// Values a node can produce, time-aligned to the frame's bar index unless
/// noted otherwise (spec §3).
#[derive(Debug, Clone)]
pub(crate) enum NodeValue {
    Series(Vec<f64>),
    BoolSeries(Vec<bool>),
    Signal(Vec<i8>),
    Scalar(f64),
    OrderBatch(Vec<OrderIntent>),
}

/// Evaluates strategy graphs against bar frames (spec §4.1).
pub struct DagExecutor<'a> {
    pub warmup_bars: usize,
    pub min_trades_per_episode: usize,
    pub fitness_weights: &'a FitnessWeights,
}

impl<'a> DagExecutor<'a> {
    pub fn new(
        warmup_bars: usize,
        min_trades_per_episode: usize,
        fitness_weights: &'a FitnessWeights,
    ) -> Self {
        Self {
            warmup_bars,
            min_trades_per_episode,
            fitness_weights,
        }
    }

    /// Runs one backtest. Never panics on a malformed/partial graph or
    /// frame: every failure mode named in spec §4.1 is caught and encoded
    /// into the returned `EpisodeResult` instead.
    #[tracing::instrument(skip(self, graph, frame), fields(graph_id = %graph.graph_id))]
    pub fn run(
        &self,
        graph: &StrategyGraph,
        frame: &BarFrame,
        initial_capital: f64,
        label: &str,
    ) -> EpisodeResult {
        match self.run_inner(graph, frame, initial_capital, label) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "episode execution failed");
                EpisodeResult::execution_failure(label, e)
            }
        }
    }

    fn run_inner(
        &self,
        graph: &StrategyGraph,
        frame: &BarFrame,
        initial_capital: f64,
        label: &str,
    ) -> Result<EpisodeResult, ExecutionError> {
        if frame.height() < self.warmup_bars {
            return Err(ExecutionError::InsufficientWarmup {
                needed: self.warmup_bars,
                had: frame.height(),
            });
        }

        let order = graph
            .topo_sort()
            .map_err(|_| ExecutionError::UnresolvedInput("cycle detected".to_string()))?;

        // RNG seeded from (graph_id, episode.label) for any tie-breaking
        // decisions made during order simulation (spec §4.1 determinism).
        let seed = deterministic_seed(&graph.graph_id, label);
        let mut rng = StdRng::seed_from_u64(seed);

        // Keyed by `"<node_id>.<output_name>"` (same shape as `PortRef`'s
        // `Display`), since several node kinds expose more than one output.
        let mut values: HashMap<String, NodeValue> = HashMap::new();
        for node_id in &order {
            let node = graph
                .node(node_id)
                .ok_or_else(|| ExecutionError::UnresolvedInput(node_id.to_string()))?;
            let outputs = nodes::evaluate_node(node, frame, &values)?;
            for (output_name, value) in outputs {
                values.insert(format!("{node_id}.{output_name}"), value);
            }
        }

        let order_batch = nodes::final_order_batch(graph, &values)?;
        let sim = order_sim::simulate(&order_batch, frame, initial_capital, &mut rng)?;

        let inputs = FitnessInputs {
            total_return: sim.total_return,
            max_drawdown: sim.max_drawdown,
            n_trades: sim.n_trades,
            min_trades_per_episode: self.min_trades_per_episode,
        };
        let fitness = fitness::compute(&inputs, self.fitness_weights);

        let mut kill_reason = Vec::new();
        if sim.n_trades < self.min_trades_per_episode {
            kill_reason.push("too_few_holdout_trades".to_string());
        }

        let decision = if kill_reason.is_empty() {
            Decision::Survive
        } else {
            Decision::Kill
        };

        Ok(EpisodeResult {
            label: label.to_string(),
            fitness,
            decision,
            kill_reason,
            n_trades: sim.n_trades,
            error_details: None,
        })
    }
}

fn deterministic_seed(graph_id: &GraphId, label: &str) -> u64 {
    let hash = blake3::hash(format!("{graph_id}:{label}").as_bytes());
    let bytes = hash.as_bytes();
    u64::from_le_bytes(bytes[0..8].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComparisonOp, Generation, Node, NodeKind, ParamValue, PortRef};
    use polars::prelude::*;

    fn rsi_cross_graph() -> StrategyGraph {
        let nodes = vec![
            Node::new("md", NodeKind::MarketData).with_param("symbol", ParamValue::Text("AAPL".into())),
            Node::new("rsi", NodeKind::Rsi)
                .with_param("period", ParamValue::Number(14.0))
                .with_input("source", PortRef::parse("md.close").unwrap()),
            Node::new("thirty", NodeKind::Constant).with_param("value", ParamValue::Number(30.0)),
            Node::new("entry_cmp", NodeKind::Compare)
                .with_param("op", ParamValue::Text(ComparisonOp::Lt.to_string()))
                .with_input("lhs", PortRef::parse("rsi.value").unwrap())
                .with_input("rhs", PortRef::parse("thirty.value").unwrap()),
            Node::new("entry", NodeKind::EntrySignal)
                .with_input("condition", PortRef::parse("entry_cmp.value").unwrap()),
            Node::new("seventy", NodeKind::Constant).with_param("value", ParamValue::Number(70.0)),
            Node::new("exit_cmp", NodeKind::Compare)
                .with_param("op", ParamValue::Text(ComparisonOp::Gt.to_string()))
                .with_input("lhs", PortRef::parse("rsi.value").unwrap())
                .with_input("rhs", PortRef::parse("seventy.value").unwrap()),
            Node::new("exit", NodeKind::ExitSignal)
                .with_input("condition", PortRef::parse("exit_cmp.value").unwrap()),
            Node::new("sl", NodeKind::StopLossFixed).with_param("offset", ParamValue::Number(2.0)),
            Node::new("tp", NodeKind::TakeProfitFixed).with_param("offset", ParamValue::Number(3.0)),
            Node::new("size", NodeKind::PositionSizingFixed)
                .with_param("dollars", ParamValue::Number(1000.0)),
            Node::new("risk", NodeKind::RiskManagerDaily)
                .with_param("max_trades", ParamValue::Number(5.0))
                .with_param("max_loss_pct", ParamValue::Number(0.02))
                .with_param("max_profit_pct", ParamValue::Null),
            Node::new("bracket", NodeKind::BracketOrder)
                .with_input("entry", PortRef::parse("entry.value").unwrap())
                .with_input("exit", PortRef::parse("exit.value").unwrap())
                .with_input("stop_loss", PortRef::parse("sl.offset").unwrap())
                .with_input("take_profit", PortRef::parse("tp.offset").unwrap())
                .with_input("size", PortRef::parse("size.size").unwrap()),
        ];
        StrategyGraph::new(nodes, None, Generation(0))
    }

    fn sample_frame(n: usize) -> BarFrame {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + 10.0 * ((i as f64) / 5.0).sin())
            .collect();
        let ts: Vec<i64> = (0..n as i64).map(|i| 1_700_000_000_000 + i * 60_000).collect();
        let df = df![
            "timestamp" => ts,
            "open" => closes.clone(),
            "high" => closes.iter().map(|c| c + 0.3).collect::<Vec<_>>(),
            "low" => closes.iter().map(|c| c - 0.3).collect::<Vec<_>>(),
            "close" => closes,
            "volume" => vec![1000.0; n],
        ]
        .unwrap();
        let df = df
            .lazy()
            .with_column(col("timestamp").cast(DataType::Datetime(TimeUnit::Milliseconds, None)))
            .collect()
            .unwrap();
        BarFrame::from_dataframe(df).unwrap()
    }

    #[test]
    fn executor_is_deterministic_for_same_graph_and_frame() {
        let graph = rsi_cross_graph();
        let frame = sample_frame(300);
        let weights = FitnessWeights::default();
        let exec = DagExecutor::new(14, 1, &weights);
        let r1 = exec.run(&graph, &frame, 100_000.0, "ep");
        let r2 = exec.run(&graph, &frame, 100_000.0, "ep");
        assert_eq!(r1.fitness, r2.fitness);
        assert_eq!(r1.n_trades, r2.n_trades);
        assert_eq!(r1.kill_reason, r2.kill_reason);
    }

    #[test]
    fn null_max_profit_pct_does_not_raise() {
        let graph = rsi_cross_graph();
        let frame = sample_frame(300);
        let weights = FitnessWeights::default();
        let exec = DagExecutor::new(14, 1, &weights);
        let result = exec.run(&graph, &frame, 100_000.0, "ep");
        assert!(result.error_details.is_none());
    }

    #[test]
    fn insufficient_warmup_is_reported_not_panicked() {
        let graph = rsi_cross_graph();
        let frame = sample_frame(5);
        let weights = FitnessWeights::default();
        let exec = DagExecutor::new(14, 1, &weights);
        let result = exec.run(&graph, &frame, 100_000.0, "ep");
        assert_eq!(result.decision, Decision::Kill);
        assert_eq!(result.fitness, -1.0);
        assert!(result.error_details.is_some());
    }
}
