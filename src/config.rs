//! Run configuration (spec §6, §9). A single record with the enumerated
//! fields; unknown fields are rejected and defaults are applied exactly
//! once, at construction, mirroring `gym/trading/config.rs::EnvConfig`.

use serde::{Deserialize, Serialize};

/// Sampling mode for the Episode Sampler (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    Random,
    StratifiedByRegime,
}

/// Phase 3 mode: plain single-window backtest, or multi-episode robustness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase3Mode {
    Baseline,
    Episodes,
}

/// Generational evolution parameters (spec §4.5, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvolutionConfig {
    pub depth: u32,
    pub branching: u32,
    pub survivors_per_layer: u32,
    pub min_survivors_floor: u32,
    pub rescue_mode: bool,
    pub max_total_evals: u32,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            depth: 3,
            branching: 3,
            survivors_per_layer: 5,
            min_survivors_floor: 1,
            rescue_mode: false,
            max_total_evals: 200,
        }
    }
}

/// Multi-Episode Robustness Evaluator parameters (spec §4.4, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Phase3Config {
    pub enabled: bool,
    pub mode: Phase3Mode,
    pub n_episodes: u32,
    pub min_months: u32,
    pub max_months: u32,
    pub min_bars: u32,
    pub seed: Option<u64>,
    pub sampling_mode: SamplingMode,
    pub min_trades_per_episode: u32,
    pub regime_penalty_weight: f64,
    pub abort_on_all_episode_failures: bool,
}

impl Default for Phase3Config {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: Phase3Mode::Baseline,
            n_episodes: 8,
            min_months: 6,
            max_months: 12,
            min_bars: 120,
            seed: None,
            sampling_mode: SamplingMode::Random,
            min_trades_per_episode: 3,
            regime_penalty_weight: 0.3,
            abort_on_all_episode_failures: true,
        }
    }
}

/// The weights behind the per-episode fitness scalar (spec §4.1, open
/// question in §8/§9: implementers must fix and persist the chosen form).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FitnessWeights {
    /// Drawdown penalty coefficient in `total_return - lambda * max_drawdown`.
    pub lambda: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self { lambda: 2.0 }
    }
}

/// The single configuration record for one evolution run (spec §6, §9).
///
/// Defaults are applied exactly once via [`RunConfig::default`]; callers
/// override fields before the run starts. The *resolved* `phase3.seed` and
/// `fitness_weights` are written back here before persistence to
/// `run_config.json`, so the artifact is self-describing (spec §9 open
/// question).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub evolution: EvolutionConfig,
    pub phase3: Phase3Config,
    pub fitness_weights: FitnessWeights,
    pub initial_capital: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            evolution: EvolutionConfig::default(),
            phase3: Phase3Config::default(),
            fitness_weights: FitnessWeights::default(),
            initial_capital: 100_000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = r#"{
            "evolution": {"depth": 1, "branching": 1, "survivors_per_layer": 1,
                "min_survivors_floor": 1, "rescue_mode": false, "max_total_evals": 10,
                "bogus": true},
            "phase3": {"enabled": false, "mode": "baseline", "n_episodes": 1,
                "min_months": 1, "max_months": 1, "min_bars": 1, "seed": null,
                "sampling_mode": "random", "min_trades_per_episode": 1,
                "regime_penalty_weight": 0.1, "abort_on_all_episode_failures": true},
            "fitness_weights": {"lambda": 1.0},
            "initial_capital": 1.0
        }"#;
        assert!(serde_json::from_str::<RunConfig>(raw).is_err());
    }

    #[test]
    fn defaults_match_spec_section_6() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.evolution.depth, 3);
        assert_eq!(cfg.evolution.max_total_evals, 200);
        assert_eq!(cfg.phase3.n_episodes, 8);
        assert_eq!(cfg.phase3.regime_penalty_weight, 0.3);
    }
}
