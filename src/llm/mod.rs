//! LLM Compile/Mutate Interface: turns natural-language strategy ideas into
//! `StrategyGraph`s, and mutates a parent graph given its evaluation
//! results (spec §4.6).

mod cache;
mod client;
mod compile;
mod mutate;
mod normalize;
mod schema;
mod transcript;

pub use cache::LlmCache;
pub use client::{HttpLlmClient, LlmClient, LlmRequest, LlmResponse};
pub use compile::compile;
pub use mutate::mutate;
pub use transcript::{LlmStage, LlmTranscript};

#[cfg(test)]
pub(crate) use client::MockLlmClient;
