//! The generational loop: compile Adam, evaluate, select survivors, mutate,
//! repeat until `evolution.depth` generations have run or
//! `evolution.max_total_evals` is exhausted (spec §4.5).

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    aggregate::{self, RobustAggregate},
    bars::BarFrame,
    config::{Phase3Mode, RunConfig},
    episode::EpisodeSampler,
    error::{EvolutionError, EvoResult},
    executor::{Decision, DagExecutor, EpisodeResult},
    graph::{GraphId, StrategyGraph},
    llm::{self, LlmCache, LlmClient, LlmTranscript},
    regime::RegimeTagger,
};

use super::{
    lineage::LineageLog,
    progress::{ProgressEvent, ProgressHub},
    selection::{select_survivors, CandidateRef},
};

use crate::sorted_vec_map::SortedVecMap;

/// One evaluated graph carried between generations.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub graph: StrategyGraph,
    pub fitness: f64,
    pub decision: Decision,
    pub aggregate: Option<RobustAggregate>,
}

/// Per-generation selection outcome, ordered by generation index (spec §5
/// "the final `generation_stats` list is ordered by generation index").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub index: u32,
    pub population_size: usize,
    pub best_fitness: f64,
    pub survivor_floor_triggered: bool,
    pub rescue_from_best_dead_triggered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub best_graph_id: GraphId,
    pub best_fitness: f64,
    pub generations_run: u32,
    pub evals_completed: u32,
    pub generation_stats: Vec<Generation>,
}

/// Folds one evaluation's kill reasons into the run-wide `kill_stats` tally
/// (spec §6's `progress.kill_stats`). Baseline-mode evaluations carry no
/// aggregate and so never contribute a kill reason here.
fn record_kill_stats(kill_stats: &mut SortedVecMap<String, u32>, aggregate: &Option<RobustAggregate>) {
    if let Some(agg) = aggregate {
        for reason in &agg.kill_reason {
            *kill_stats.entry(reason.clone()).or_insert(0) += 1;
        }
    }
}

pub struct Driver<'a> {
    cfg: RunConfig,
    full_data: &'a BarFrame,
    provider: String,
    model: String,
    tagger: Option<RegimeTagger>,
    progress: ProgressHub,
    lineage: LineageLog,
    evals_completed: u32,
    warmup_bars: usize,
    /// The episode-sampling seed used for every graph evaluated this run.
    /// Resolved once here (from `phase3.seed`, or a process-derived
    /// fallback) rather than per graph, so every candidate in a generation
    /// is scored against the same sampled windows (spec §4.3/§9).
    episode_seed: u64,
    cancel: CancellationToken,
}

impl<'a> Driver<'a> {
    pub fn new(
        cfg: RunConfig,
        full_data: &'a BarFrame,
        provider: impl Into<String>,
        model: impl Into<String>,
        tagger: Option<RegimeTagger>,
        warmup_bars: usize,
    ) -> Self {
        let episode_seed = cfg.phase3.seed.unwrap_or_else(|| rand::random::<u64>());
        Self {
            cfg,
            full_data,
            provider: provider.into(),
            model: model.into(),
            tagger,
            progress: ProgressHub::new(),
            lineage: LineageLog::new(),
            evals_completed: 0,
            warmup_bars,
            episode_seed,
            cancel: CancellationToken::new(),
        }
    }

    /// The episode-sampling seed actually used this run — the configured
    /// `phase3.seed` if one was set, otherwise the resolved fallback.
    /// Callers persisting `run_config.json` should write this back onto
    /// `phase3.seed` so the artifact is self-describing (spec §9).
    pub fn resolved_episode_seed(&self) -> u64 {
        self.episode_seed
    }

    /// A token callers can cancel (from another task) to stop the run at
    /// the next generation boundary, surfaced as `EvolutionError::Cancelled`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    pub fn lineage(&self) -> &LineageLog {
        &self.lineage
    }

    fn emit_status(&mut self, generation: u32, best_fitness: f64, kill_stats: &SortedVecMap<String, u32>) {
        self.progress.emit(ProgressEvent::Status {
            generation,
            evals_completed: self.evals_completed,
            max_total_evals: self.cfg.evolution.max_total_evals,
            best_fitness,
            kill_stats: kill_stats.clone(),
        });
    }

    /// Evaluates one graph against the configured Phase 3 mode, returning
    /// its scalar fitness, survive/kill decision, and (when episodes mode
    /// is active) the full aggregate breakdown.
    fn evaluate(&mut self, graph: &StrategyGraph) -> EvoResult<(f64, Decision, Option<RobustAggregate>)> {
        let executor = DagExecutor::new(
            self.warmup_bars,
            self.cfg.phase3.min_trades_per_episode as usize,
            &self.cfg.fitness_weights,
        );

        match self.cfg.phase3.mode {
            Phase3Mode::Baseline => {
                let result = executor.run(graph, self.full_data, self.cfg.initial_capital, "baseline");
                self.evals_completed += 1;
                Ok((result.fitness, result.decision, None))
            }
            Phase3Mode::Episodes => {
                let sampler = EpisodeSampler::new(self.full_data, &self.cfg.phase3, self.tagger.as_ref());
                let windows = sampler.sample(self.cfg.phase3.n_episodes as usize, self.episode_seed)?;

                // Independent episodes within one graph evaluation run on the
                // default rayon pool (spec §5: "MAY be executed in a bounded
                // thread pool when the executor is pure"). `DagExecutor::run`
                // touches only its own arguments and returns an owned result,
                // so this is safe without a lock.
                let per_episode: Vec<(EpisodeResult, (String, String, String))> = windows
                    .par_iter()
                    .map(|(spec, window)| {
                        let result = executor.run(graph, window, self.cfg.initial_capital, &spec.label);
                        let tags = (
                            spec.tags.trend.clone(),
                            spec.tags.vol_bucket.clone(),
                            spec.tags.chop_bucket.clone(),
                        );
                        (result, tags)
                    })
                    .collect();
                self.evals_completed += per_episode.len() as u32;

                let (episodes, regimes): (Vec<EpisodeResult>, Vec<(String, String, String)>) =
                    per_episode.into_iter().unzip();

                let verdict = aggregate::aggregate(
                    &episodes,
                    &regimes,
                    self.cfg.phase3.regime_penalty_weight,
                    self.cfg.phase3.abort_on_all_episode_failures,
                )?;
                Ok((verdict.aggregated_fitness, verdict.decision, Some(verdict)))
            }
        }
    }

    /// Runs the full generational loop, returning the best candidate seen
    /// and every LLM transcript produced along the way.
    #[tracing::instrument(skip(self, seed_nl_text, client, cache), fields(depth = self.cfg.evolution.depth))]
    pub async fn run(
        &mut self,
        seed_nl_text: &str,
        client: &dyn LlmClient,
        cache: &LlmCache,
    ) -> EvoResult<(RunSummary, Vec<LlmTranscript>)> {
        if self.cfg.evolution.max_total_evals == 0 {
            return Err(EvolutionError::InvalidConfig("max_total_evals must be > 0".to_string()).into());
        }

        self.progress.emit(ProgressEvent::RunStarted { run_id: "run".to_string() });

        let (adam, mut transcripts) = llm::compile(seed_nl_text, &self.provider, &self.model, client, cache)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to compile the seed graph; run cannot continue");
                EvolutionError::FailedCompileAdam(e.to_string())
            })?;

        let (fitness, decision, aggregate) = self.evaluate(&adam)?;
        let mut kill_stats: SortedVecMap<String, u32> = SortedVecMap::new();
        record_kill_stats(&mut kill_stats, &aggregate);
        let mut population = vec![Candidate { graph: adam, fitness, decision, aggregate }];
        let mut best = population[0].clone();

        self.emit_status(0, best.fitness, &kill_stats);

        let mut generations_run = 0u32;
        let mut generation_stats: Vec<Generation> = Vec::new();

        for generation in 0..self.cfg.evolution.depth {
            if self.cancel.is_cancelled() {
                self.progress.emit(ProgressEvent::Error {
                    message: "run cancelled".to_string(),
                });
                return Err(EvolutionError::Cancelled(generation as usize).into());
            }
            if self.evals_completed >= self.cfg.evolution.max_total_evals {
                self.progress.emit(ProgressEvent::Log {
                    message: "max_total_evals reached; stopping early".to_string(),
                });
                break;
            }

            tracing::info!(generation, population = population.len(), "starting generation");

            let refs: Vec<CandidateRef> = population
                .iter()
                .map(|c| CandidateRef { graph_id: c.graph.graph_id, fitness: c.fitness, decision: c.decision })
                .collect();
            let selection = select_survivors(
                &refs,
                self.cfg.evolution.survivors_per_layer as usize,
                self.cfg.evolution.min_survivors_floor as usize,
                self.cfg.evolution.rescue_mode,
            );
            if selection.survivor_floor_triggered {
                tracing::warn!(generation, "survivor floor triggered, promoting killed candidates");
            }
            if selection.rescue_from_best_dead_triggered {
                tracing::warn!(generation, "rescuing best dead candidates, no natural survivors");
            }

            let mut next_population = Vec::new();
            'parents: for &idx in &selection.survivors {
                let parent = population[idx].clone();
                for _ in 0..self.cfg.evolution.branching {
                    if self.cancel.is_cancelled() {
                        self.progress.emit(ProgressEvent::Error {
                            message: "run cancelled".to_string(),
                        });
                        return Err(EvolutionError::Cancelled(generation as usize).into());
                    }
                    if self.evals_completed >= self.cfg.evolution.max_total_evals {
                        break 'parents;
                    }
                    let evaluation = parent.aggregate.clone().unwrap_or(RobustAggregate {
                        median_fitness: parent.fitness,
                        worst_fitness: parent.fitness,
                        best_fitness: parent.fitness,
                        std_fitness: 0.0,
                        worst_case_penalty: 0.0,
                        dispersion_penalty: 0.0,
                        single_regime_penalty: 0.0,
                        aggregated_fitness: parent.fitness,
                        decision: parent.decision,
                        kill_reason: vec![],
                        n_episodes: 1,
                        n_survived: if parent.decision == Decision::Survive { 1 } else { 0 },
                    });

                    let mutation = llm::mutate(&parent.graph, &evaluation, &self.provider, &self.model, client, cache).await;
                    let (child, child_transcripts) = match mutation {
                        Ok(pair) => pair,
                        Err(e) => {
                            self.progress.emit(ProgressEvent::Error { message: e.to_string() });
                            continue;
                        }
                    };
                    transcripts.extend(child_transcripts);
                    self.lineage.record(parent.graph.graph_id, child.graph_id, generation + 1);

                    let (fitness, decision, aggregate) = self.evaluate(&child)?;
                    record_kill_stats(&mut kill_stats, &aggregate);
                    let candidate = Candidate { graph: child, fitness, decision, aggregate };
                    if candidate.fitness > best.fitness {
                        best = candidate.clone();
                    }
                    next_population.push(candidate);

                    // One Status event per evaluation, not just per generation
                    // (spec §5: `evals_completed` is emitted monotonically).
                    self.emit_status(generation + 1, best.fitness, &kill_stats);
                }
            }

            generations_run = generation + 1;
            let generation_best =
                next_population.iter().map(|c| c.fitness).fold(best.fitness, f64::max);
            generation_stats.push(Generation {
                index: generations_run,
                population_size: next_population.len(),
                best_fitness: generation_best,
                survivor_floor_triggered: selection.survivor_floor_triggered,
                rescue_from_best_dead_triggered: selection.rescue_from_best_dead_triggered,
            });

            if next_population.is_empty() {
                break;
            }
            population = next_population;
        }

        self.progress.emit(ProgressEvent::RunFinished {
            best_fitness: best.fitness,
            evals_completed: self.evals_completed,
        });

        let summary = RunSummary {
            best_graph_id: best.graph.graph_id,
            best_fitness: best.fitness,
            generations_run,
            evals_completed: self.evals_completed,
            generation_stats,
        };
        Ok((summary, transcripts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SamplingMode, llm::client::MockLlmClient};
    use polars::prelude::*;

    fn sample_frame(n: usize) -> BarFrame {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + 10.0 * ((i as f64) / 5.0).sin()).collect();
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

    fn rsi_graph_json() -> String {
        serde_json::json!({
            "nodes": [
                {"id": "md", "kind": "MarketData", "params": {"symbol": "AAPL"}},
                {"id": "rsi", "kind": "Rsi", "params": {"period": 14.0}, "inputs": {"source": "md.close"}},
                {"id": "thirty", "kind": "Constant", "params": {"value": 30.0}},
                {"id": "cmp", "kind": "Compare", "params": {"op": "lt"},
                 "inputs": {"lhs": "rsi.value", "rhs": "thirty.value"}},
                {"id": "entry", "kind": "EntrySignal", "inputs": {"condition": "cmp.value"}},
                {"id": "seventy", "kind": "Constant", "params": {"value": 70.0}},
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
        .to_string()
    }

    #[tokio::test]
    async fn single_generation_run_produces_a_summary() {
        let frame = sample_frame(300);
        let mut cfg = RunConfig::default();
        cfg.evolution.depth = 1;
        cfg.evolution.branching = 1;
        cfg.evolution.survivors_per_layer = 1;
        cfg.phase3.mode = Phase3Mode::Baseline;
        cfg.phase3.min_trades_per_episode = 0;

        let mut driver = Driver::new(cfg, &frame, "test", "test-model", None, 14);

        let dir = tempfile::tempdir().unwrap();
        let cache = LlmCache::new(dir.path()).unwrap();
        let mut mock = MockLlmClient::new();
        mock.expect_complete().returning(|_| {
            Ok(crate::llm::client::LlmResponse {
                text: rsi_graph_json(),
                prompt_tokens: 1,
                completion_tokens: 1,
            })
        });

        let (summary, transcripts) = driver.run("buy RSI dips", &mock, &cache).await.unwrap();
        assert_eq!(summary.generations_run, 1);
        assert!(summary.evals_completed >= 2);
        assert!(!transcripts.is_empty());
    }

    #[tokio::test]
    async fn impossible_trade_floor_triggers_survivor_floor_on_generation_one() {
        let frame = sample_frame(300);
        let mut cfg = RunConfig::default();
        cfg.evolution.depth = 1;
        cfg.evolution.branching = 1;
        cfg.evolution.survivors_per_layer = 1;
        cfg.evolution.min_survivors_floor = 1;
        cfg.phase3.mode = Phase3Mode::Baseline;
        cfg.phase3.min_trades_per_episode = 100;

        let mut driver = Driver::new(cfg, &frame, "test", "test-model", None, 14);

        let dir = tempfile::tempdir().unwrap();
        let cache = LlmCache::new(dir.path()).unwrap();
        let mut mock = MockLlmClient::new();
        mock.expect_complete().returning(|_| {
            Ok(crate::llm::client::LlmResponse {
                text: rsi_graph_json(),
                prompt_tokens: 1,
                completion_tokens: 1,
            })
        });

        let (summary, _transcripts) = driver.run("buy RSI dips", &mock, &cache).await.unwrap();
        assert_eq!(summary.generation_stats.len(), 1);
        assert_eq!(summary.generation_stats[0].index, 1);
        assert!(summary.generation_stats[0].survivor_floor_triggered);
    }

    #[tokio::test]
    async fn zero_budget_is_rejected_before_any_compile_call() {
        let frame = sample_frame(50);
        let mut cfg = RunConfig::default();
        cfg.evolution.max_total_evals = 0;
        let mut driver = Driver::new(cfg, &frame, "test", "test-model", None, 14);

        let dir = tempfile::tempdir().unwrap();
        let cache = LlmCache::new(dir.path()).unwrap();
        let mock = MockLlmClient::new();

        let result = driver.run("buy RSI dips", &mock, &cache).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancelling_before_the_first_generation_stops_the_run() {
        let frame = sample_frame(300);
        let mut cfg = RunConfig::default();
        cfg.evolution.depth = 3;
        cfg.phase3.mode = Phase3Mode::Baseline;
        cfg.phase3.min_trades_per_episode = 0;
        let mut driver = Driver::new(cfg, &frame, "test", "test-model", None, 14);
        driver.cancellation_token().cancel();

        let dir = tempfile::tempdir().unwrap();
        let cache = LlmCache::new(dir.path()).unwrap();
        let mut mock = MockLlmClient::new();
        mock.expect_complete().returning(|_| {
            Ok(crate::llm::client::LlmResponse {
                text: rsi_graph_json(),
                prompt_tokens: 1,
                completion_tokens: 1,
            })
        });

        let result = driver.run("buy RSI dips", &mock, &cache).await;
        assert!(matches!(
            result,
            Err(crate::error::EvoError::Evolution(EvolutionError::Cancelled(0)))
        ));
    }

    #[test]
    fn sampling_mode_is_exercised_in_imports() {
        let _ = SamplingMode::Random;
    }

    #[test]
    fn cancellation_token_is_only_cancelled_after_an_explicit_cancel() {
        let frame = sample_frame(50);
        let driver = Driver::new(RunConfig::default(), &frame, "test", "test-model", None, 14);
        let token = driver.cancellation_token();

        tokio_test::block_on(async {
            tokio::select! {
                _ = token.cancelled() => panic!("token must not be cancelled yet"),
                _ = tokio::time::sleep(std::time::Duration::from_millis(1)) => {}
            }
        });

        token.cancel();
        tokio_test::block_on(token.cancelled());
    }
}
