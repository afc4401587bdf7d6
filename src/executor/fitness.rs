//! Per-episode fitness scalar (spec §4.1, open question fixed in DESIGN.md):
//! `(total_return - lambda * max_drawdown) * trade_count_adequacy(n_trades)`.

use crate::config::FitnessWeights;

pub struct FitnessInputs {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub n_trades: usize,
    pub min_trades_per_episode: usize,
}

/// Scales the raw risk-adjusted return down when a run produced too few
/// trades to trust, rather than letting a single lucky trade dominate.
/// Reaches 1.0 once `n_trades` meets the configured minimum.
fn trade_count_adequacy(n_trades: usize, min_trades: usize) -> f64 {
    if min_trades == 0 {
        return 1.0;
    }
    (n_trades as f64 / min_trades as f64).min(1.0)
}

pub fn compute(inputs: &FitnessInputs, weights: &FitnessWeights) -> f64 {
    let risk_adjusted = inputs.total_return - weights.lambda * inputs.max_drawdown;
    risk_adjusted * trade_count_adequacy(inputs.n_trades, inputs.min_trades_per_episode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_trades_than_minimum_scales_fitness_down() {
        let weights = FitnessWeights::default();
        let full = FitnessInputs {
            total_return: 0.2,
            max_drawdown: 0.05,
            n_trades: 5,
            min_trades_per_episode: 5,
        };
        let partial = FitnessInputs {
            total_return: 0.2,
            max_drawdown: 0.05,
            n_trades: 1,
            min_trades_per_episode: 5,
        };
        assert!(compute(&partial, &weights) < compute(&full, &weights));
    }

    #[test]
    fn drawdown_penalizes_fitness() {
        let weights = FitnessWeights::default();
        let calm = FitnessInputs {
            total_return: 0.2,
            max_drawdown: 0.01,
            n_trades: 10,
            min_trades_per_episode: 3,
        };
        let rough = FitnessInputs {
            total_return: 0.2,
            max_drawdown: 0.3,
            n_trades: 10,
            min_trades_per_episode: 3,
        };
        assert!(compute(&calm, &weights) > compute(&rough, &weights));
    }
}
