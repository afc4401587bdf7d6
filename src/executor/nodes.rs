//! Per-`NodeKind` pure compute functions. Each node reads its resolved
//! inputs from the already-evaluated `values` map and returns its declared
//! outputs; nothing here looks ahead of the current bar index.

use std::collections::HashMap;

use polars::prelude::*;

use crate::{
    bars::BarFrame,
    error::ExecutionError,
    graph::{ComparisonOp, Node, NodeKind, ParamValue, PortRef},
};

use super::{NodeValue, OrderIntent, TradeDirection};

fn param_f64(node: &Node, name: &str) -> Result<f64, ExecutionError> {
    node.params
        .get(name)
        .and_then(ParamValue::as_f64)
        .ok_or_else(|| ExecutionError::TypeMismatch(format!("{}: missing numeric param '{name}'", node.id)))
}

fn param_f64_opt(node: &Node, name: &str) -> Option<f64> {
    node.params.get(name).and_then(ParamValue::as_f64)
}

fn param_str_opt<'a>(node: &'a Node, name: &str) -> Option<&'a str> {
    node.params.get(name).and_then(ParamValue::as_str)
}

fn input_ref<'a>(node: &'a Node, port: &str) -> Result<&'a PortRef, ExecutionError> {
    node.inputs
        .get(port)
        .ok_or_else(|| ExecutionError::UnresolvedInput(format!("{}.{port}", node.id)))
}

fn resolve<'a>(
    node: &Node,
    port: &str,
    values: &'a HashMap<String, NodeValue>,
) -> Result<&'a NodeValue, ExecutionError> {
    let port_ref = input_ref(node, port)?;
    let key = port_ref.to_string();
    values
        .get(&key)
        .ok_or_else(|| ExecutionError::UnresolvedInput(key))
}

fn as_series(value: &NodeValue) -> Result<&[f64], ExecutionError> {
    match value {
        NodeValue::Series(s) => Ok(s),
        _ => Err(ExecutionError::TypeMismatch("expected Series".to_string())),
    }
}

fn as_bool_series(value: &NodeValue) -> Result<&[bool], ExecutionError> {
    match value {
        NodeValue::BoolSeries(s) => Ok(s),
        _ => Err(ExecutionError::TypeMismatch("expected BoolSeries".to_string())),
    }
}

fn as_signal(value: &NodeValue) -> Result<&[i8], ExecutionError> {
    match value {
        NodeValue::Signal(s) => Ok(s),
        _ => Err(ExecutionError::TypeMismatch("expected Signal".to_string())),
    }
}

fn as_scalar(value: &NodeValue) -> Result<f64, ExecutionError> {
    match value {
        NodeValue::Scalar(v) => Ok(*v),
        _ => Err(ExecutionError::TypeMismatch("expected Scalar".to_string())),
    }
}

fn as_order_batch(value: &NodeValue) -> Result<&[OrderIntent], ExecutionError> {
    match value {
        NodeValue::OrderBatch(b) => Ok(b),
        _ => Err(ExecutionError::TypeMismatch("expected OrderBatch".to_string())),
    }
}

pub(super) fn column_f64(frame: &BarFrame, name: &str) -> Result<Vec<f64>, ExecutionError> {
    frame
        .as_dataframe()
        .column(name)
        .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?
        .f64()
        .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?
        .into_iter()
        .map(|v| Ok(v.unwrap_or(f64::NAN)))
        .collect()
}

/// Rolling simple moving average, causal: window `[i - period + 1, i]`,
/// leading bars with fewer than `period` samples carry forward the partial
/// mean rather than a lookahead-biased full-window value.
fn rolling_sma(series: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(series.len());
    let mut sum = 0.0;
    let mut window: std::collections::VecDeque<f64> = std::collections::VecDeque::new();
    for &x in series {
        window.push_back(x);
        sum += x;
        if window.len() > period {
            sum -= window.pop_front().unwrap();
        }
        out.push(sum / window.len() as f64);
    }
    out
}

/// Exponential moving average, seeded with the first value (causal, no
/// lookahead): `ema[0] = x[0]`, `ema[i] = alpha * x[i] + (1 - alpha) * ema[i-1]`.
fn ewm_mean(series: &[f64], period: usize) -> Vec<f64> {
    if series.is_empty() {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(series.len());
    let mut prev = series[0];
    out.push(prev);
    for &x in &series[1..] {
        prev = alpha * x + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Wilder's RSI, causal rolling average of gains/losses.
fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![50.0; n];
    if n < 2 {
        return out;
    }
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..n {
        let delta = closes[i] - closes[i - 1];
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        if i <= period {
            avg_gain = (avg_gain * (i - 1) as f64 + gain) / i as f64;
            avg_loss = (avg_loss * (i - 1) as f64 + loss) / i as f64;
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }
        out[i] = if avg_loss.abs() < f64::EPSILON {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };
    }
    out
}

/// True range series, causal (uses the prior bar's close).
fn true_range(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![0.0; n];
    for i in 1..n {
        out[i] = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
    }
    out
}

fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    rolling_sma(&true_range(highs, lows, closes), period)
}

fn compare(op: ComparisonOp, lhs: &[f64], rhs: &[f64]) -> Vec<bool> {
    let n = lhs.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let l = lhs[i];
        let r = rhs[i.min(rhs.len().saturating_sub(1))];
        let cur = match op {
            ComparisonOp::Lt => l < r,
            ComparisonOp::Le => l <= r,
            ComparisonOp::Gt => l > r,
            ComparisonOp::Ge => l >= r,
            ComparisonOp::Eq => (l - r).abs() < f64::EPSILON,
            ComparisonOp::Ne => (l - r).abs() >= f64::EPSILON,
            ComparisonOp::CrossUp | ComparisonOp::CrossDown => {
                if i == 0 {
                    false
                } else {
                    let prev_l = lhs[i - 1];
                    let prev_r = rhs[(i - 1).min(rhs.len().saturating_sub(1))];
                    match op {
                        ComparisonOp::CrossUp => prev_l <= prev_r && l > r,
                        ComparisonOp::CrossDown => prev_l >= prev_r && l < r,
                        _ => unreachable!(),
                    }
                }
            }
        };
        out.push(cur);
    }
    out
}

/// Broadcasts a scalar into a series matching `len`, used when one side of a
/// `Compare` node is a `Constant` rather than an indicator series.
fn broadcast(value: &NodeValue, len: usize) -> Result<Vec<f64>, ExecutionError> {
    match value {
        NodeValue::Series(s) => Ok(s.clone()),
        NodeValue::Scalar(v) => Ok(vec![*v; len]),
        _ => Err(ExecutionError::TypeMismatch("expected Series or Scalar".to_string())),
    }
}

/// Evaluates one node, returning its named outputs.
pub(super) fn evaluate_node(
    node: &Node,
    frame: &BarFrame,
    values: &HashMap<String, NodeValue>,
) -> Result<Vec<(&'static str, NodeValue)>, ExecutionError> {
    let height = frame.height();
    match node.kind {
        NodeKind::MarketData => {
            let open = column_f64(frame, "open")?;
            let high = column_f64(frame, "high")?;
            let low = column_f64(frame, "low")?;
            let close = column_f64(frame, "close")?;
            let volume = column_f64(frame, "volume")?;
            Ok(vec![
                ("open", NodeValue::Series(open)),
                ("high", NodeValue::Series(high)),
                ("low", NodeValue::Series(low)),
                ("close", NodeValue::Series(close)),
                ("volume", NodeValue::Series(volume)),
            ])
        }
        NodeKind::Sma => {
            let period = param_f64(node, "period")? as usize;
            let source = as_series(resolve(node, "source", values)?)?;
            Ok(vec![("value", NodeValue::Series(rolling_sma(source, period.max(1))))])
        }
        NodeKind::Ema => {
            let period = param_f64(node, "period")? as usize;
            let source = as_series(resolve(node, "source", values)?)?;
            Ok(vec![("value", NodeValue::Series(ewm_mean(source, period.max(1))))])
        }
        NodeKind::Rsi => {
            let period = param_f64(node, "period")? as usize;
            let source = as_series(resolve(node, "source", values)?)?;
            Ok(vec![("value", NodeValue::Series(rsi(source, period.max(1))))])
        }
        NodeKind::Atr => {
            let period = param_f64(node, "period")? as usize;
            let _ = as_series(resolve(node, "source", values)?)?;
            let highs = column_f64(frame, "high")?;
            let lows = column_f64(frame, "low")?;
            let closes = column_f64(frame, "close")?;
            Ok(vec![("value", NodeValue::Series(atr(&highs, &lows, &closes, period.max(1))))])
        }
        NodeKind::Constant => {
            let v = param_f64(node, "value")?;
            Ok(vec![("value", NodeValue::Scalar(v))])
        }
        NodeKind::Compare => {
            let op_raw = node
                .params
                .get("op")
                .and_then(ParamValue::as_str)
                .ok_or_else(|| ExecutionError::TypeMismatch(format!("{}: missing 'op'", node.id)))?;
            let op: ComparisonOp = op_raw
                .parse()
                .map_err(|_| ExecutionError::TypeMismatch(format!("{}: unknown comparison op '{op_raw}'", node.id)))?;
            let lhs = resolve(node, "lhs", values)?;
            let rhs = resolve(node, "rhs", values)?;
            let lhs_series = broadcast(lhs, height)?;
            let rhs_series = broadcast(rhs, height)?;
            Ok(vec![("value", NodeValue::BoolSeries(compare(op, &lhs_series, &rhs_series)))])
        }
        NodeKind::EntrySignal | NodeKind::ExitSignal => {
            let condition = as_bool_series(resolve(node, "condition", values)?)?;
            let signal = condition.iter().map(|&b| if b { 1 } else { 0 }).collect();
            Ok(vec![("value", NodeValue::Signal(signal))])
        }
        NodeKind::StopLossFixed | NodeKind::TakeProfitFixed => {
            let offset = param_f64(node, "offset")?;
            Ok(vec![("offset", NodeValue::Scalar(offset))])
        }
        NodeKind::StopLossAtr | NodeKind::TakeProfitAtr => {
            let multiple = param_f64(node, "multiple")?;
            let atr_series = as_series(resolve(node, "atr", values)?)?;
            let last_atr = atr_series.last().copied().unwrap_or(0.0);
            Ok(vec![("offset", NodeValue::Scalar(multiple * last_atr))])
        }
        NodeKind::PositionSizingFixed => {
            let dollars = param_f64(node, "dollars")?;
            Ok(vec![("size", NodeValue::Scalar(dollars))])
        }
        NodeKind::BracketOrder => {
            let entry = as_signal(resolve(node, "entry", values)?)?;
            let exit = as_signal(resolve(node, "exit", values)?)?;
            let stop_loss = as_scalar(resolve(node, "stop_loss", values)?)?;
            let take_profit = as_scalar(resolve(node, "take_profit", values)?)?;
            let size = as_scalar(resolve(node, "size", values)?)?;

            let exit_mask: std::rc::Rc<[bool]> =
                exit.iter().map(|&v| v != 0).collect::<Vec<_>>().into();

            let mut intents = Vec::new();
            for i in 0..height {
                if entry.get(i).copied().unwrap_or(0) != 0 {
                    intents.push(OrderIntent {
                        bar_index: i,
                        direction: TradeDirection::Long,
                        stop_loss,
                        take_profit,
                        size,
                        exit_mask: exit_mask.clone(),
                    });
                }
            }
            Ok(vec![("orders", NodeValue::OrderBatch(intents))])
        }
        NodeKind::RiskManagerDaily => {
            let mut orders = as_order_batch(resolve(node, "orders", values)?)?.to_vec();
            let max_trades = param_f64_opt(node, "max_trades").map(|v| v as usize);
            let max_loss_pct = param_f64_opt(node, "max_loss_pct");
            let max_profit_pct = param_f64_opt(node, "max_profit_pct");

            let closes = column_f64(frame, "close")?;
            let ts = frame
                .timestamp_series()
                .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?;
            let dt = ts
                .datetime()
                .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?;
            let bar_day = |i: usize| -> Option<chrono::NaiveDate> {
                dt.get(i)
                    .and_then(chrono::DateTime::from_timestamp_millis)
                    .map(|t| t.date_naive())
            };

            orders.sort_by_key(|o| o.bar_index);

            // Each of the three limits is an independent, running per-day
            // budget; a trade that would breach any set limit halts that
            // limit's budget for the rest of the calendar day, not the whole
            // batch. A limit left absent/null never constrains anything.
            let mut day: Option<chrono::NaiveDate> = None;
            let mut day_trades = 0usize;
            let mut day_loss_budget = 0.0f64;
            let mut day_profit_budget = 0.0f64;
            let mut filtered = Vec::with_capacity(orders.len());

            for order in orders {
                let this_day = bar_day(order.bar_index);
                if day != this_day {
                    day = this_day;
                    day_trades = 0;
                    day_loss_budget = 0.0;
                    day_profit_budget = 0.0;
                }

                if max_trades.is_some_and(|limit| day_trades >= limit) {
                    continue;
                }

                let entry_price = closes.get(order.bar_index).copied().unwrap_or(0.0);
                let risk_pct = if entry_price.abs() > f64::EPSILON {
                    order.stop_loss / entry_price
                } else {
                    0.0
                };
                let reward_pct = if entry_price.abs() > f64::EPSILON {
                    order.take_profit / entry_price
                } else {
                    0.0
                };

                if max_loss_pct.is_some_and(|limit| day_loss_budget + risk_pct > limit) {
                    continue;
                }
                if max_profit_pct.is_some_and(|limit| day_profit_budget + reward_pct > limit) {
                    continue;
                }

                day_trades += 1;
                day_loss_budget += risk_pct;
                day_profit_budget += reward_pct;
                filtered.push(order);
            }

            Ok(vec![("orders", NodeValue::OrderBatch(filtered))])
        }
        NodeKind::SessionTimeFilter => {
            let orders = as_order_batch(resolve(node, "orders", values)?)?.to_vec();
            let start_hour = param_f64(node, "start_hour")? as u32;
            let end_hour = param_f64(node, "end_hour")? as u32;
            // Bar timestamps are stored as naive UTC millis; the session
            // window is specified in exchange-local hours, so it must be
            // converted through the named zone rather than read off raw UTC.
            let tz: chrono_tz::Tz = param_str_opt(node, "tz")
                .unwrap_or("America/New_York")
                .parse()
                .map_err(|_| ExecutionError::TypeMismatch(format!("{}: invalid tz param", node.id)))?;
            let ts = frame
                .timestamp_series()
                .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?;
            let dt = ts
                .datetime()
                .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?;
            let filtered: Vec<OrderIntent> = orders
                .into_iter()
                .filter(|o| {
                    dt.get(o.bar_index)
                        .and_then(|ms| chrono::DateTime::from_timestamp_millis(ms))
                        .map(|t| {
                            let hour = t.with_timezone(&tz).time().hour();
                            if start_hour <= end_hour {
                                hour >= start_hour && hour < end_hour
                            } else {
                                hour >= start_hour || hour < end_hour
                            }
                        })
                        .unwrap_or(false)
                })
                .collect();
            Ok(vec![("orders", NodeValue::OrderBatch(filtered))])
        }
    }
}

/// Locates the graph's terminal order-emitting node's output (I4 guarantees
/// exactly one `BracketOrder`-derived terminal is present after any
/// session/risk filters have been chained onto it).
pub(super) fn final_order_batch(
    graph: &crate::graph::StrategyGraph,
    values: &HashMap<String, NodeValue>,
) -> Result<Vec<OrderIntent>, ExecutionError> {
    let terminal = graph
        .nodes
        .iter()
        .find(|n| n.kind.is_terminal_order_node())
        .ok_or_else(|| ExecutionError::UnresolvedInput("no terminal order node".to_string()))?;

    // Follow the chain of nodes downstream of the bracket: a filter node
    // (risk/session) whose `orders` input points at this node's output, if
    // any, supersedes the bracket's own batch.
    let mut current = terminal;
    loop {
        let next = graph.nodes.iter().find(|n| {
            matches!(n.kind, NodeKind::RiskManagerDaily | NodeKind::SessionTimeFilter)
                && n.inputs
                    .get("orders")
                    .map(|p| p.node == current.id)
                    .unwrap_or(false)
        });
        match next {
            Some(n) => current = n,
            None => break,
        }
    }

    let key = format!("{}.orders", current.id);
    match values.get(&key) {
        Some(NodeValue::OrderBatch(b)) => Ok(b.clone()),
        _ => Err(ExecutionError::UnresolvedInput(key)),
    }
}

use chrono::Timelike;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_stays_within_bounds() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let values = rsi(&closes, 14);
        for v in values {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn sma_is_causal_no_lookahead() {
        let series = vec![1.0, 2.0, 3.0, 100.0, 5.0];
        let sma = rolling_sma(&series, 3);
        // value at index 1 must not be influenced by the spike at index 3
        assert!(sma[1] < 10.0);
    }

    #[test]
    fn cross_up_requires_prior_bar_at_or_below() {
        let lhs = vec![1.0, 1.0, 2.0];
        let rhs = vec![1.5, 1.5, 1.5];
        let out = compare(ComparisonOp::CrossUp, &lhs, &rhs);
        assert_eq!(out, vec![false, false, true]);
    }

    fn single_bar_frame_at(utc_hour: u32) -> BarFrame {
        use chrono::TimeZone;
        use polars::prelude::*;
        // 2024-01-02 is a Tuesday; the exact date doesn't matter, only the hour.
        let ts_ms = chrono::Utc
            .with_ymd_and_hms(2024, 1, 2, utc_hour, 0, 0)
            .unwrap()
            .timestamp_millis();
        let df = df![
            "timestamp" => vec![ts_ms],
            "open" => vec![1.0],
            "high" => vec![1.0],
            "low" => vec![1.0],
            "close" => vec![1.0],
            "volume" => vec![1.0],
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
    fn session_time_filter_converts_through_the_named_timezone() {
        let frame = single_bar_frame_at(14); // 14:00 UTC == 09:00 America/New_York (EST, UTC-5)
        let node = Node::new("filt", NodeKind::SessionTimeFilter)
            .with_param("start_hour", ParamValue::Number(9.0))
            .with_param("end_hour", ParamValue::Number(16.0))
            .with_param("tz", ParamValue::Text("America/New_York".into()))
            .with_input("orders", PortRef::parse("bracket.orders").unwrap());

        let intent = OrderIntent {
            bar_index: 0,
            direction: TradeDirection::Long,
            stop_loss: 1.0,
            take_profit: 1.0,
            size: 1.0,
            exit_mask: std::rc::Rc::from(vec![false]),
        };
        let mut values = HashMap::new();
        values.insert("bracket.orders".to_string(), NodeValue::OrderBatch(vec![intent]));

        let out = evaluate_node(&node, &frame, &values).unwrap();
        let (_, NodeValue::OrderBatch(filtered)) = &out[0] else { panic!("expected OrderBatch") };
        assert_eq!(filtered.len(), 1, "14:00 UTC is 09:00 in America/New_York, inside the session window");
    }

    fn two_day_frame() -> BarFrame {
        use chrono::TimeZone;
        use polars::prelude::*;
        let day1 = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let day2 = chrono::Utc.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap();
        let ts: Vec<i64> = vec![
            day1.timestamp_millis(),
            (day1 + chrono::Duration::hours(1)).timestamp_millis(),
            day2.timestamp_millis(),
        ];
        let df = df![
            "timestamp" => ts,
            "open" => vec![100.0, 100.0, 100.0],
            "high" => vec![100.0, 100.0, 100.0],
            "low" => vec![100.0, 100.0, 100.0],
            "close" => vec![100.0, 100.0, 100.0],
            "volume" => vec![1.0, 1.0, 1.0],
        ]
        .unwrap();
        let df = df
            .lazy()
            .with_column(col("timestamp").cast(DataType::Datetime(TimeUnit::Milliseconds, None)))
            .collect()
            .unwrap();
        BarFrame::from_dataframe(df).unwrap()
    }

    fn intent(bar_index: usize, stop_loss: f64, take_profit: f64) -> OrderIntent {
        OrderIntent {
            bar_index,
            direction: TradeDirection::Long,
            stop_loss,
            take_profit,
            size: 1.0,
            exit_mask: std::rc::Rc::from(vec![false, false, false]),
        }
    }

    #[test]
    fn risk_manager_caps_trades_per_calendar_day() {
        let frame = two_day_frame();
        let node = Node::new("risk", NodeKind::RiskManagerDaily)
            .with_param("max_trades", ParamValue::Number(1.0))
            .with_input("orders", PortRef::parse("bracket.orders").unwrap());
        let orders = vec![intent(0, 1.0, 1.0), intent(1, 1.0, 1.0), intent(2, 1.0, 1.0)];
        let mut values = HashMap::new();
        values.insert("bracket.orders".to_string(), NodeValue::OrderBatch(orders));

        let out = evaluate_node(&node, &frame, &values).unwrap();
        let (_, NodeValue::OrderBatch(filtered)) = &out[0] else { panic!("expected OrderBatch") };
        let kept: Vec<usize> = filtered.iter().map(|o| o.bar_index).collect();
        // bars 0 and 1 fall on day 1 (only the first survives), bar 2 is a
        // fresh day and gets its own budget.
        assert_eq!(kept, vec![0, 2]);
    }

    #[test]
    fn risk_manager_halts_the_day_once_loss_budget_is_exhausted() {
        let frame = two_day_frame();
        let node = Node::new("risk", NodeKind::RiskManagerDaily)
            .with_param("max_loss_pct", ParamValue::Number(0.02))
            .with_input("orders", PortRef::parse("bracket.orders").unwrap());
        // stop_loss of 1.0 against a close of 100.0 is 1% risk per trade.
        let orders = vec![intent(0, 1.0, 1.0), intent(1, 1.5, 1.0), intent(2, 1.0, 1.0)];
        let mut values = HashMap::new();
        values.insert("bracket.orders".to_string(), NodeValue::OrderBatch(orders));

        let out = evaluate_node(&node, &frame, &values).unwrap();
        let (_, NodeValue::OrderBatch(filtered)) = &out[0] else { panic!("expected OrderBatch") };
        let kept: Vec<usize> = filtered.iter().map(|o| o.bar_index).collect();
        // bar 0 spends 1% of the 2% day-1 budget; bar 1 would add 1.5% more
        // (2.5% total), breaching the cap, so it is skipped. Bar 2 is day 2.
        assert_eq!(kept, vec![0, 2]);
    }

    #[test]
    fn risk_manager_with_no_params_passes_every_order_through() {
        let frame = two_day_frame();
        let node = Node::new("risk", NodeKind::RiskManagerDaily)
            .with_input("orders", PortRef::parse("bracket.orders").unwrap());
        let orders = vec![intent(0, 1.0, 1.0), intent(1, 1.0, 1.0), intent(2, 1.0, 1.0)];
        let mut values = HashMap::new();
        values.insert("bracket.orders".to_string(), NodeValue::OrderBatch(orders));

        let out = evaluate_node(&node, &frame, &values).unwrap();
        let (_, NodeValue::OrderBatch(filtered)) = &out[0] else { panic!("expected OrderBatch") };
        assert_eq!(filtered.len(), 3, "every limit is absent so nothing is capped");
    }
}
