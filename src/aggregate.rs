//! Robust Aggregator: folds a set of per-episode results into one robustness
//! verdict for the parent graph (spec §4.4).

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AggregateError, EvoResult},
    executor::{Decision, EpisodeResult},
};

/// Worst-case fitness below this floor draws a fixed penalty rather than a
/// proportional one: a single catastrophic episode should dominate the
/// verdict regardless of how good the median looks.
const WORST_CASE_FLOOR: f64 = -0.5;
const WORST_CASE_PENALTY: f64 = 0.5;

/// Fitness dispersion above this threshold draws a fixed penalty.
const DISPERSION_FLOOR: f64 = 0.3;
const DISPERSION_PENALTY: f64 = 0.25;

/// A single regime holding at least this share of the positive-fitness
/// episodes is treated as "the graph only works in one regime" (spec §4.4).
const SINGLE_REGIME_SHARE: f64 = 0.8;

/// Episodes failing in regimes associated with drawdown are tolerated up to
/// this fraction before the aggregate kill policy fires (spec §4.4).
const MAX_DRAWDOWN_REGIME_FAILURE_SHARE: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustAggregate {
    pub median_fitness: f64,
    pub worst_fitness: f64,
    pub best_fitness: f64,
    pub std_fitness: f64,
    pub worst_case_penalty: f64,
    pub dispersion_penalty: f64,
    pub single_regime_penalty: f64,
    pub aggregated_fitness: f64,
    pub decision: Decision,
    pub kill_reason: Vec<String>,
    pub n_episodes: usize,
    pub n_survived: usize,
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Folds a batch of episode results, tagged with their sampled regime
/// labels, into one `RobustAggregate` verdict (spec §4.4).
///
/// `regime_of` maps each episode's index to its `(trend, vol, chop)` tuple;
/// episodes that errored out still count toward `n_episodes`.
pub fn aggregate(
    episodes: &[EpisodeResult],
    regimes: &[(String, String, String)],
    regime_penalty_weight: f64,
    abort_on_all_episode_failures: bool,
) -> EvoResult<RobustAggregate> {
    let n_episodes = episodes.len();

    let all_failed = episodes.iter().all(|e| e.error_details.is_some());
    if all_failed && abort_on_all_episode_failures {
        let first_failures: Vec<String> = episodes
            .iter()
            .filter_map(|e| e.error_details.as_ref().map(|d| d.message.clone()))
            .take(3)
            .collect();
        return Err(AggregateError::AllEpisodesFailed { n_episodes, first_failures }.into());
    }

    let mut fitnesses: Vec<f64> = episodes.iter().map(|e| e.fitness).collect();
    fitnesses.sort_by_key(|&f| OrderedFloat(f));

    let worst_fitness = fitnesses.first().copied().unwrap_or(-1.0);
    let best_fitness = fitnesses.last().copied().unwrap_or(-1.0);
    let mean_fitness = if fitnesses.is_empty() {
        0.0
    } else {
        fitnesses.iter().sum::<f64>() / fitnesses.len() as f64
    };
    let median_fitness = median(&fitnesses);
    let std_fitness = std_dev(&fitnesses, mean_fitness);

    let worst_case_penalty = if worst_fitness < WORST_CASE_FLOOR { WORST_CASE_PENALTY } else { 0.0 };
    let dispersion_penalty = if std_fitness > DISPERSION_FLOOR { DISPERSION_PENALTY } else { 0.0 };

    let single_regime_penalty = if is_single_regime_dependent(episodes, regimes) {
        regime_penalty_weight
    } else {
        0.0
    };

    let aggregated_fitness =
        median_fitness - worst_case_penalty - dispersion_penalty - single_regime_penalty;

    // "Drawdown regimes" are windows tagged with a downward trend (spec
    // §4.2's `Trend::Down`); the 50% cap only applies within that subset,
    // not across every sampled episode.
    let drawdown_episodes: Vec<&EpisodeResult> = episodes
        .iter()
        .zip(regimes.iter())
        .filter(|(_, regime)| regime.0 == "down")
        .map(|(e, _)| e)
        .collect();
    let n_drawdown_regime_failures =
        drawdown_episodes.iter().filter(|e| e.decision == Decision::Kill).count();
    let drawdown_failure_share = if !drawdown_episodes.is_empty() {
        n_drawdown_regime_failures as f64 / drawdown_episodes.len() as f64
    } else {
        0.0
    };

    let mut kill_reason = Vec::new();
    if aggregated_fitness < 0.0 {
        kill_reason.push("phase3_negative_aggregate".to_string());
    }
    if dispersion_penalty > 0.0 {
        kill_reason.push("phase3_dispersion".to_string());
    }
    if drawdown_failure_share > MAX_DRAWDOWN_REGIME_FAILURE_SHARE {
        kill_reason.push("too_many_regime_failures".to_string());
    }

    let decision = if kill_reason.is_empty() { Decision::Survive } else { Decision::Kill };
    let n_survived = episodes.iter().filter(|e| e.decision == Decision::Survive).count();

    Ok(RobustAggregate {
        median_fitness,
        worst_fitness,
        best_fitness,
        std_fitness,
        worst_case_penalty,
        dispersion_penalty,
        single_regime_penalty,
        aggregated_fitness,
        decision,
        kill_reason,
        n_episodes,
        n_survived,
    })
}

/// True when either only one distinct regime tuple was sampled, or one
/// regime tuple accounts for `>= SINGLE_REGIME_SHARE` of the episodes with
/// positive fitness (spec §4.4: "only works in one regime").
fn is_single_regime_dependent(
    episodes: &[EpisodeResult],
    regimes: &[(String, String, String)],
) -> bool {
    use std::collections::HashMap;

    let distinct: std::collections::HashSet<_> = regimes.iter().collect();
    if distinct.len() <= 1 {
        return regimes.len() > 1;
    }

    let positive_count = episodes.iter().filter(|e| e.fitness > 0.0).count();
    if positive_count == 0 {
        return false;
    }

    let mut counts: HashMap<&(String, String, String), usize> = HashMap::new();
    for (episode, regime) in episodes.iter().zip(regimes.iter()) {
        if episode.fitness > 0.0 {
            *counts.entry(regime).or_insert(0) += 1;
        }
    }

    counts
        .values()
        .any(|&c| c as f64 / positive_count as f64 >= SINGLE_REGIME_SHARE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Decision;

    fn episode(fitness: f64, decision: Decision) -> EpisodeResult {
        EpisodeResult {
            label: "ep".to_string(),
            fitness,
            decision,
            kill_reason: if decision == Decision::Kill {
                vec!["too_few_holdout_trades".to_string()]
            } else {
                vec![]
            },
            n_trades: 5,
            error_details: None,
        }
    }

    #[test]
    fn one_catastrophic_episode_draws_worst_case_penalty() {
        let episodes = vec![
            episode(0.3, Decision::Survive),
            episode(0.3, Decision::Survive),
            episode(-0.9, Decision::Kill),
        ];
        let regimes = vec![
            ("up".into(), "low".into(), "trending".into()),
            ("down".into(), "mid".into(), "choppy".into()),
            ("flat".into(), "high".into(), "choppy".into()),
        ];
        let result = aggregate(&episodes, &regimes, 0.3, true).unwrap();
        assert_eq!(result.worst_case_penalty, WORST_CASE_PENALTY);
    }

    #[test]
    fn all_episodes_failing_aborts_when_configured() {
        let mut e = episode(-1.0, Decision::Kill);
        e.error_details = Some(crate::executor::ErrorDetails {
            kind: "episode_failure".into(),
            message: "boom".into(),
            traceback: None,
        });
        let episodes = vec![e.clone(), e.clone(), e];
        let regimes = vec![("up".into(), "low".into(), "trending".into()); 3];
        let result = aggregate(&episodes, &regimes, 0.3, true);
        assert!(result.is_err());
    }

    #[test]
    fn kill_reasons_use_the_contractual_phase3_tokens() {
        let episodes = vec![episode(-0.9, Decision::Kill), episode(-0.9, Decision::Kill)];
        let regimes = vec![
            ("down".into(), "high".into(), "choppy".into()),
            ("down".into(), "high".into(), "choppy".into()),
        ];
        let result = aggregate(&episodes, &regimes, 0.3, true).unwrap();
        assert!(result.kill_reason.contains(&"phase3_negative_aggregate".to_string()));
    }

    #[test]
    fn drawdown_failure_share_ignores_non_drawdown_episodes() {
        // 3 of 4 episodes fail overall (75%), but only 1 of the 2 episodes
        // actually tagged as a down-trend regime fails (50%), which must not
        // trip the "too_many_regime_failures" kill reason.
        let episodes = vec![
            episode(0.3, Decision::Survive),
            episode(-0.2, Decision::Kill),
            episode(0.1, Decision::Survive),
            episode(-0.2, Decision::Kill),
        ];
        let regimes = vec![
            ("up".into(), "low".into(), "trending".into()),
            ("up".into(), "low".into(), "trending".into()),
            ("down".into(), "high".into(), "choppy".into()),
            ("down".into(), "high".into(), "choppy".into()),
        ];
        let result = aggregate(&episodes, &regimes, 0.3, true).unwrap();
        assert!(!result.kill_reason.contains(&"too_many_regime_failures".to_string()));
    }

    #[test]
    fn diverse_regimes_with_consistent_positive_fitness_survive() {
        let episodes = vec![
            episode(0.2, Decision::Survive),
            episode(0.25, Decision::Survive),
            episode(0.3, Decision::Survive),
        ];
        let regimes = vec![
            ("up".into(), "low".into(), "trending".into()),
            ("down".into(), "mid".into(), "choppy".into()),
            ("flat".into(), "high".into(), "choppy".into()),
        ];
        let result = aggregate(&episodes, &regimes, 0.3, true).unwrap();
        assert_eq!(result.decision, Decision::Survive);
    }
}
