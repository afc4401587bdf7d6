//! Compile/mutate transcripts: every LLM exchange is recorded verbatim for
//! later audit (spec §4.6, §6 `llm_transcripts/`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmStage {
    Compile,
    CompileRepair,
    Mutate,
    MutateRepair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmTranscript {
    pub stage: LlmStage,
    pub prompt: String,
    pub response_text: String,
    pub cached: bool,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub attempt: usize,
}
