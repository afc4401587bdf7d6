//! Compile: natural-language strategy idea -> validated `StrategyGraph`
//! (spec §4.6 step 1), with a bounded repair loop for malformed or
//! non-validating responses.

use crate::{
    error::{EvoResult, LlmError},
    graph::{validate_graph, Generation, StrategyGraph},
};

use super::{
    cache::LlmCache,
    client::{LlmClient, LlmRequest},
    normalize::normalize,
    schema::{parse_raw_graph, response_schema},
    transcript::{LlmStage, LlmTranscript},
};

/// Attempts a compile, feeding the prior attempt's failure back into the
/// prompt on retry. Two attempts total: the original plus one repair.
const MAX_ATTEMPTS: usize = 2;

#[tracing::instrument(skip(nl_text, client, cache), fields(provider = %provider, model = %model, graph_id))]
pub async fn compile(
    nl_text: &str,
    provider: &str,
    model: &str,
    client: &dyn LlmClient,
    cache: &LlmCache,
) -> EvoResult<(StrategyGraph, Vec<LlmTranscript>)> {
    let mut transcripts = Vec::new();
    let mut last_error: Option<String> = None;

    for attempt in 0..MAX_ATTEMPTS {
        let stage = if attempt == 0 { LlmStage::Compile } else { LlmStage::CompileRepair };
        let prompt = render_prompt(nl_text, last_error.as_deref());

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

        let graph = StrategyGraph::new(nodes, None, Generation(0));
        match validate_graph(&graph) {
            Ok(()) => {
                tracing::Span::current().record("graph_id", tracing::field::display(graph.graph_id));
                tracing::info!(attempt, "compiled a validating strategy graph");
                return Ok((graph, transcripts));
            }
            Err(e) => {
                last_error = Some(e.to_string());
                continue;
            }
        }
    }

    let reason = last_error.unwrap_or_else(|| "exhausted attempts".to_string());
    tracing::warn!(reason = %reason, "compile exhausted all repair attempts");
    Err(LlmError::CompileFailed(reason).into())
}

fn render_prompt(nl_text: &str, prior_error: Option<&str>) -> String {
    match prior_error {
        None => format!(
            "Compile the following trading strategy idea into a StrategyGraph JSON document:\n\n{nl_text}"
        ),
        Some(err) => format!(
            "The previous StrategyGraph JSON document was rejected: {err}\n\
             Repair it and resubmit a complete, valid document for:\n\n{nl_text}"
        ),
    }
}
