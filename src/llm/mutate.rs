//! Mutate: parent `StrategyGraph` + its evaluation result -> child graph
//! (spec §4.6 step 1), sharing the same bounded repair loop as compile.

use crate::{
    aggregate::RobustAggregate,
    error::{EvoResult, LlmError},
    graph::{validate_graph, StrategyGraph},
};

use super::{
    cache::LlmCache,
    client::{LlmClient, LlmRequest},
    normalize::normalize,
    schema::{parse_raw_graph, response_schema},
    transcript::{LlmStage, LlmTranscript},
};

/// Two attempts total: the original plus one repair (spec §4.6).
const MAX_ATTEMPTS: usize = 2;

#[tracing::instrument(
    skip(parent, evaluation, client, cache),
    fields(provider = %provider, model = %model, parent_id = %parent.graph_id, graph_id)
)]
pub async fn mutate(
    parent: &StrategyGraph,
    evaluation: &RobustAggregate,
    provider: &str,
    model: &str,
    client: &dyn LlmClient,
    cache: &LlmCache,
) -> EvoResult<(StrategyGraph, Vec<LlmTranscript>)> {
    let mut transcripts = Vec::new();
    let mut last_error: Option<String> = None;

    let parent_json = serde_json::to_string(parent)
        .map_err(|e| LlmError::MutateFailed(format!("cannot serialize parent graph: {e}")))?;
    let evaluation_json = serde_json::to_string(evaluation)
        .map_err(|e| LlmError::MutateFailed(format!("cannot serialize evaluation: {e}")))?;

    for attempt in 0..MAX_ATTEMPTS {
        let stage = if attempt == 0 { LlmStage::Mutate } else { LlmStage::MutateRepair };
        let prompt = render_prompt(&parent_json, &evaluation_json, last_error.as_deref());

        let request = LlmRequest {
            provider: provider.to_string(),
            model: model.to_string(),
            prompt: prompt.clone(),
            params: serde_json::json!({"schema": response_schema(), "attempt": attempt}),
        };

        let (response, cached) = cache.get_or_complete(client, request).await?;

        transcripts.push(LlmTranscript {
            stage,
            prompt,
            response_text: response.text.clone(),
            cached,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            attempt,
        });

        let raw = match parse_raw_graph(&response.text) {
            Ok(raw) => raw,
            Err(e) => {
                last_error = Some(format!("response did not parse as JSON: {e}"));
                continue;
            }
        };

        let nodes = match normalize(raw) {
            Ok(nodes) => nodes,
            Err(e) => {
                last_error = Some(e.to_string());
                continue;
            }
        };

        let child = StrategyGraph::new(
            nodes,
            Some(parent.graph_id),
            crate::graph::Generation(parent.generation.0 + 1),
        );
        match validate_graph(&child) {
            Ok(()) => {
                tracing::Span::current().record("graph_id", tracing::field::display(child.graph_id));
                tracing::info!(attempt, "mutated a validating child graph");
                return Ok((child, transcripts));
            }
            Err(e) => {
                last_error = Some(e.to_string());
                continue;
            }
        }
    }

    let reason = last_error.unwrap_or_else(|| "exhausted attempts".to_string());
    tracing::warn!(reason = %reason, "mutate exhausted all repair attempts");
    Err(LlmError::MutateFailed(reason).into())
}

fn render_prompt(parent_json: &str, evaluation_json: &str, prior_error: Option<&str>) -> String {
    let base = format!(
        "Mutate the following StrategyGraph to improve its robustness, given its \
         evaluation result. Keep changes targeted rather than rewriting from scratch.\n\n\
         Parent graph:\n{parent_json}\n\nEvaluation:\n{evaluation_json}"
    );
    match prior_error {
        None => base,
        Some(err) => format!(
            "The previous mutated StrategyGraph JSON document was rejected: {err}\n\
             Repair it and resubmit a complete, valid document.\n\n{base}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        executor::Decision,
        graph::{Generation, Node, NodeKind, ParamValue},
        llm::client::MockLlmClient,
    };

    fn parent_graph() -> StrategyGraph {
        let nodes = vec![
            Node::new("md", NodeKind::MarketData).with_param("symbol", ParamValue::Text("AAPL".into())),
        ];
        StrategyGraph::new(nodes, None, Generation(0))
    }

    fn evaluation() -> RobustAggregate {
        RobustAggregate {
            median_fitness: -0.2,
            worst_fitness: -0.6,
            best_fitness: 0.1,
            std_fitness: 0.2,
            worst_case_penalty: 0.5,
            dispersion_penalty: 0.0,
            single_regime_penalty: 0.0,
            aggregated_fitness: -0.7,
            decision: Decision::Kill,
            kill_reason: vec!["phase3_negative_aggregate".to_string()],
            n_episodes: 3,
            n_survived: 1,
        }
    }

    #[tokio::test]
    async fn child_graph_records_parent_lineage_and_incremented_generation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LlmCache::new(dir.path()).unwrap();
        let mut mock = MockLlmClient::new();
        mock.expect_complete().times(1).returning(|_| {
            Ok(crate::llm::client::LlmResponse {
                text: serde_json::json!({
                    "nodes": [
                        {"id": "md", "kind": "MarketData", "params": {"symbol": "AAPL"}},
                        {"id": "rsi", "kind": "Rsi", "params": {"period": 21.0},
                         "inputs": {"source": "md.close"}},
                        {"id": "thirty", "kind": "Constant", "params": {"value": 25.0}},
                        {"id": "cmp", "kind": "Compare", "params": {"op": "lt"},
                         "inputs": {"lhs": "rsi.value", "rhs": "thirty.value"}},
                        {"id": "entry", "kind": "EntrySignal", "inputs": {"condition": "cmp.value"}},
                        {"id": "seventy", "kind": "Constant", "params": {"value": 75.0}},
                        {"id": "cmp2", "kind": "Compare", "params": {"op": "gt"},
                         "inputs": {"lhs": "rsi.value", "rhs": "seventy.value"}},
                        {"id": "exit", "kind": "ExitSignal", "inputs": {"condition": "cmp2.value"}},
                        {"id": "sl", "kind": "StopLossFixed", "params": {"offset": 2.0}},
                        {"id": "tp", "kind": "TakeProfitFixed", "params": {"offset": 3.0}},
                        {"id": "size", "kind": "PositionSizingFixed", "params": {"dollars": 1000.0}},
                        {"id": "bracket", "kind": "BracketOrder",
                         "inputs": {"entry": "entry.value", "exit": "exit.value",
                                    "stop_loss": "sl.offset", "take_profit": "tp.offset",
                                    "size": "size.size"}}
                    ]
                })
                .to_string(),
                prompt_tokens: 1,
                completion_tokens: 1,
            })
        });

        let parent = parent_graph();
        let (child, transcripts) = mutate(&parent, &evaluation(), "test", "test-model", &mock, &cache)
            .await
            .unwrap();
        assert_eq!(child.parent_graph_id, Some(parent.graph_id));
        assert_eq!(child.generation.0, 1);
        assert_eq!(transcripts[0].stage, LlmStage::Mutate);
    }
}
