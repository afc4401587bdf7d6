//! Regime Tagger: assigns `(trend, volatility, choppiness)` and an optional
//! `event_day` flag to a sampled window (spec §4.2).

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    bars::BarFrame,
    error::{EvoResult, ExecutionError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VolBucket {
    Low,
    Mid,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChopBucket {
    Trending,
    Choppy,
}

/// The regime tuple assigned to one episode window (spec §2, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegimeTags {
    pub trend: Trend,
    pub vol_bucket: VolBucket,
    pub chop_bucket: ChopBucket,
    pub event_day: Option<bool>,
}

/// Threshold used for trend classification: a window whose close moves less
/// than this fraction is `Flat`.
const TREND_THRESHOLD: f64 = 0.03;
/// Above this ratio of `|close_end - close_start| / sum(|delta close|)`, a
/// window is classified `Trending` rather than `Choppy` (spec §4.2).
const CHOP_THRESHOLD: f64 = 0.4;
/// Guard against near-zero open prices when computing percentage trend.
const MIN_OPEN_FOR_PCT: f64 = 1e-6;

/// Dataset-wide volatility quantile thresholds, computed once over the full
/// dataset and reused for every window's volatility bucketing (spec §4.2:
/// "bucketed by quantiles computed over the full dataset, or fixed
/// thresholds when dataset-relative stats unavailable").
#[derive(Debug, Clone, Copy)]
pub struct VolatilityThresholds {
    pub low_high_boundary: f64,
    pub high_extreme_boundary: f64,
}

impl Default for VolatilityThresholds {
    /// Fixed fallback thresholds (ATR / mean close), used when no
    /// dataset-relative quantiles are available.
    fn default() -> Self {
        Self {
            low_high_boundary: 0.01,
            high_extreme_boundary: 0.025,
        }
    }
}

impl VolatilityThresholds {
    /// Computes the 1/3 and 2/3 quantiles of the per-bar ATR-ratio across
    /// the full dataset.
    pub fn from_dataset(full: &BarFrame) -> EvoResult<Self> {
        let ratios = atr_ratio_series(full)?;
        if ratios.is_empty() {
            return Ok(Self::default());
        }
        let mut sorted = ratios;
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let q = |p: f64| -> f64 {
            let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
            sorted[idx]
        };
        Ok(Self {
            low_high_boundary: q(1.0 / 3.0),
            high_extreme_boundary: q(2.0 / 3.0),
        })
    }
}

/// A calendar of high-impact dates (FOMC, scheduled earnings) used for the
/// optional `event_day` tag (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct EventCalendar(HashSet<NaiveDate>);

impl EventCalendar {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self(dates.into_iter().collect())
    }

    pub fn intersects(&self, start: NaiveDate, end: NaiveDate) -> bool {
        let mut day = start;
        while day <= end {
            if self.0.contains(&day) {
                return true;
            }
            day += chrono::Duration::days(1);
        }
        false
    }
}

fn close_values(frame: &BarFrame) -> EvoResult<Vec<f64>> {
    frame
        .close_series()?
        .f64()
        .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?
        .into_no_null_iter()
        .map(Ok)
        .collect()
}

fn high_low_values(frame: &BarFrame) -> EvoResult<(Vec<f64>, Vec<f64>)> {
    let df = frame.as_dataframe();
    let high: Vec<f64> = df
        .column("high")
        .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?
        .f64()
        .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?
        .into_no_null_iter()
        .collect();
    let low: Vec<f64> = df
        .column("low")
        .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?
        .f64()
        .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?
        .into_no_null_iter()
        .collect();
    Ok((high, low))
}

/// Average true range over the whole window, divided by the window's mean
/// close — this is the "ATR over window / mean close" quantity spec §4.2
/// buckets into low/mid/high.
fn atr_ratio(frame: &BarFrame) -> EvoResult<f64> {
    let closes = close_values(frame)?;
    let (highs, lows) = high_low_values(frame)?;
    if closes.len() < 2 {
        return Ok(0.0);
    }
    let mut true_ranges = Vec::with_capacity(closes.len() - 1);
    for i in 1..closes.len() {
        let tr = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
        true_ranges.push(tr);
    }
    let atr = true_ranges.iter().sum::<f64>() / true_ranges.len() as f64;
    let mean_close = closes.iter().sum::<f64>() / closes.len() as f64;
    if mean_close.abs() < MIN_OPEN_FOR_PCT {
        return Ok(0.0);
    }
    Ok(atr / mean_close)
}

/// The per-bar ATR-ratio across an entire dataset, used to derive dataset
/// quantile thresholds (a rolling, not windowed, computation).
fn atr_ratio_series(frame: &BarFrame) -> EvoResult<Vec<f64>> {
    let closes = close_values(frame)?;
    let (highs, lows) = high_low_values(frame)?;
    if closes.len() < 2 {
        return Ok(vec![]);
    }
    let mut out = Vec::with_capacity(closes.len() - 1);
    for i in 1..closes.len() {
        let tr = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
        if closes[i].abs() > MIN_OPEN_FOR_PCT {
            out.push(tr / closes[i]);
        }
    }
    Ok(out)
}

fn classify_trend(closes: &[f64]) -> Trend {
    let (first, last) = (closes[0], *closes.last().unwrap());
    if first.abs() < MIN_OPEN_FOR_PCT {
        return Trend::Flat;
    }
    let pct_change = (last - first) / first;
    if pct_change > TREND_THRESHOLD {
        Trend::Up
    } else if pct_change < -TREND_THRESHOLD {
        Trend::Down
    } else {
        Trend::Flat
    }
}

fn classify_chop(closes: &[f64]) -> ChopBucket {
    let net_move = (closes.last().unwrap() - closes[0]).abs();
    let total_move: f64 = closes.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    if total_move.abs() < f64::EPSILON {
        return ChopBucket::Choppy;
    }
    if net_move / total_move > CHOP_THRESHOLD {
        ChopBucket::Trending
    } else {
        ChopBucket::Choppy
    }
}

fn classify_vol(ratio: f64, thresholds: &VolatilityThresholds) -> VolBucket {
    if ratio < thresholds.low_high_boundary {
        VolBucket::Low
    } else if ratio < thresholds.high_extreme_boundary {
        VolBucket::Mid
    } else {
        VolBucket::High
    }
}

/// Tags one sampled window with its regime tuple (spec §4.2).
pub struct RegimeTagger {
    pub thresholds: VolatilityThresholds,
    pub calendar: Option<EventCalendar>,
}

impl RegimeTagger {
    pub fn new(thresholds: VolatilityThresholds, calendar: Option<EventCalendar>) -> Self {
        Self { thresholds, calendar }
    }

    pub fn tag(&self, window: &BarFrame) -> EvoResult<RegimeTags> {
        let closes = close_values(window)?;
        if closes.len() < 2 {
            return Err(ExecutionError::InsufficientWarmup { needed: 2, had: closes.len() }.into());
        }
        let trend = classify_trend(&closes);
        let chop_bucket = classify_chop(&closes);
        let ratio = atr_ratio(window)?;
        let vol_bucket = classify_vol(ratio, &self.thresholds);

        let event_day = self.calendar.as_ref().and_then(|cal| {
            let ts = window.timestamp_series().ok()?;
            let ts = ts.datetime().ok()?;
            let start = ts.get(0)?;
            let end = ts.get(ts.len() - 1)?;
            let start_date = chrono::DateTime::from_timestamp_millis(start / 1_000)?.date_naive();
            let end_date = chrono::DateTime::from_timestamp_millis(end / 1_000)?.date_naive();
            Some(cal.intersects(start_date, end_date))
        });

        Ok(RegimeTags { trend, vol_bucket, chop_bucket, event_day })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn frame(closes: &[f64]) -> BarFrame {
        let n = closes.len();
        let df = df![
            "timestamp" => (0..n as i64).collect::<Vec<_>>(),
            "open" => closes.to_vec(),
            "high" => closes.iter().map(|c| c + 0.5).collect::<Vec<_>>(),
            "low" => closes.iter().map(|c| c - 0.5).collect::<Vec<_>>(),
            "close" => closes.to_vec(),
            "volume" => vec![100.0; n],
        ]
        .unwrap();
        BarFrame::from_dataframe(df).unwrap()
    }

    #[test]
    fn strong_uptrend_tags_up_and_trending() {
        let tagger = RegimeTagger::new(VolatilityThresholds::default(), None);
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 * 2.0).collect();
        let tags = tagger.tag(&frame(&closes)).unwrap();
        assert_eq!(tags.trend, Trend::Up);
        assert_eq!(tags.chop_bucket, ChopBucket::Trending);
    }

    #[test]
    fn flat_oscillation_tags_flat_and_choppy() {
        let tagger = RegimeTagger::new(VolatilityThresholds::default(), None);
        let closes: Vec<f64> = (0..20)
            .map(|i| 100.0 + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        let tags = tagger.tag(&frame(&closes)).unwrap();
        assert_eq!(tags.trend, Trend::Flat);
        assert_eq!(tags.chop_bucket, ChopBucket::Choppy);
    }
}
