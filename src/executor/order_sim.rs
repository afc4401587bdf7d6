//! Order simulator: walks bars forward from each entry to resolve a trade
//! against its stop-loss/take-profit offsets or an exit signal, then rolls
//! the realized P&L into an equity curve (spec §4.1).

use rand::{rngs::StdRng, Rng};

use crate::{bars::BarFrame, error::ExecutionError};

use super::nodes::column_f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    Long,
}

/// One candidate entry produced by a `BracketOrder` node. `exit_mask` is the
/// full exit-signal series shared across every intent from the same node.
#[derive(Debug, Clone)]
pub struct OrderIntent {
    pub bar_index: usize,
    pub direction: TradeDirection,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub exit_mask: std::rc::Rc<[bool]>,
}

pub struct SimulationOutput {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub n_trades: usize,
}

enum ExitReason {
    Stop,
    Target,
    Signal,
    EndOfData,
}

/// Resolves one trade from its entry bar forward, never reading past the
/// bar it actually exits on (no lookahead).
fn resolve_trade(
    intent: &OrderIntent,
    closes: &[f64],
    highs: &[f64],
    lows: &[f64],
    rng: &mut StdRng,
) -> (f64, usize) {
    let entry_price = closes[intent.bar_index];
    let stop_price = entry_price - intent.stop_loss;
    let target_price = entry_price + intent.take_profit;

    for i in (intent.bar_index + 1)..closes.len() {
        let hit_stop = lows[i] <= stop_price;
        let hit_target = highs[i] >= target_price;
        let (exit_price, reason) = if hit_stop && hit_target {
            // Ambiguous same-bar hit: break the tie with the episode's
            // deterministic RNG rather than assuming favorable fills.
            if rng.random_bool(0.5) {
                (stop_price, ExitReason::Stop)
            } else {
                (target_price, ExitReason::Target)
            }
        } else if hit_stop {
            (stop_price, ExitReason::Stop)
        } else if hit_target {
            (target_price, ExitReason::Target)
        } else if intent.exit_mask.get(i).copied().unwrap_or(false) {
            (closes[i], ExitReason::Signal)
        } else {
            continue;
        };
        let _ = reason;
        return (exit_price, i);
    }

    let last = closes.len() - 1;
    let _ = ExitReason::EndOfData;
    (closes[last], last)
}

/// Simulates every order intent in entry-bar order, enforcing at most one
/// open position at a time (a later entry inside an already-open position's
/// window is skipped).
pub fn simulate(
    orders: &[OrderIntent],
    frame: &BarFrame,
    initial_capital: f64,
    rng: &mut StdRng,
) -> Result<SimulationOutput, ExecutionError> {
    let closes = column_f64(frame, "close")?;
    let highs = column_f64(frame, "high")?;
    let lows = column_f64(frame, "low")?;

    let mut sorted: Vec<&OrderIntent> = orders.iter().collect();
    sorted.sort_by_key(|o| o.bar_index);

    let mut equity = initial_capital;
    let mut peak = initial_capital;
    let mut max_drawdown: f64 = 0.0;
    let mut n_trades = 0usize;
    let mut open_until: usize = 0;

    for intent in sorted {
        if intent.bar_index < open_until {
            continue;
        }
        if closes.is_empty() || intent.bar_index >= closes.len() {
            continue;
        }
        let entry_price = closes[intent.bar_index];
        if entry_price.abs() < f64::EPSILON {
            continue;
        }
        let (exit_price, exit_index) = resolve_trade(intent, &closes, &highs, &lows, rng);
        let shares = intent.size / entry_price;
        let pnl = match intent.direction {
            TradeDirection::Long => shares * (exit_price - entry_price),
        };
        equity += pnl;
        n_trades += 1;
        open_until = exit_index + 1;

        peak = peak.max(equity);
        let drawdown = if peak > 0.0 { (peak - equity) / peak } else { 0.0 };
        max_drawdown = max_drawdown.max(drawdown);
    }

    let total_return = if initial_capital.abs() > f64::EPSILON {
        (equity - initial_capital) / initial_capital
    } else {
        0.0
    };

    Ok(SimulationOutput {
        total_return,
        max_drawdown,
        n_trades,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use rand::SeedableRng;

    fn frame(closes: &[f64]) -> BarFrame {
        let n = closes.len();
        let df = df![
            "timestamp" => (0..n as i64).collect::<Vec<_>>(),
            "open" => closes.to_vec(),
            "high" => closes.iter().map(|c| c + 0.2).collect::<Vec<_>>(),
            "low" => closes.iter().map(|c| c - 0.2).collect::<Vec<_>>(),
            "close" => closes.to_vec(),
            "volume" => vec![100.0; n],
        ]
        .unwrap();
        BarFrame::from_dataframe(df).unwrap()
    }

    #[test]
    fn take_profit_resolves_before_stop_when_only_target_hit() {
        let closes = vec![100.0, 101.0, 102.0, 103.0, 104.0];
        let f = frame(&closes);
        let exit_mask: std::rc::Rc<[bool]> = vec![false; closes.len()].into();
        let orders = vec![OrderIntent {
            bar_index: 0,
            direction: TradeDirection::Long,
            stop_loss: 50.0,
            take_profit: 2.0,
            size: 1000.0,
            exit_mask,
        }];
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let out = simulate(&orders, &f, 10_000.0, &mut rng).unwrap();
        assert_eq!(out.n_trades, 1);
        assert!(out.total_return > 0.0);
    }

    #[test]
    fn no_orders_yields_zero_return_and_drawdown() {
        let closes = vec![100.0, 101.0, 99.0];
        let f = frame(&closes);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let out = simulate(&[], &f, 10_000.0, &mut rng).unwrap();
        assert_eq!(out.n_trades, 0);
        assert_eq!(out.total_return, 0.0);
        assert_eq!(out.max_drawdown, 0.0);
    }
}
