//! Episode Sampler: draws N time windows from a dataset, optionally
//! stratified for regime diversity (spec §4.3).

use chrono::{DateTime, Utc};
use itertools::Itertools;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{
    bars::BarFrame,
    config::{Phase3Config, SamplingMode},
    error::{EvoResult, SamplingError},
    regime::{RegimeTagger, RegimeTags},
};

/// The regime tuple attached to one sampled window, serialized alongside it
/// (spec §3 `EpisodeSpec.tags`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeTags {
    pub trend: String,
    pub vol_bucket: String,
    pub chop_bucket: String,
    pub event_day: Option<bool>,
}

impl From<RegimeTags> for EpisodeTags {
    fn from(t: RegimeTags) -> Self {
        Self {
            trend: t.trend.to_string(),
            vol_bucket: t.vol_bucket.to_string(),
            chop_bucket: t.chop_bucket.to_string(),
            event_day: t.event_day,
        }
    }
}

/// One sampled, tagged window (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSpec {
    pub label: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub tags: EpisodeTags,
}

/// Half-open bar-index ranges `[start, end)` overlap iff each starts before
/// the other ends.
fn ranges_overlap(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Average bars-per-day used to convert a month count into a bar count,
/// derived once from the dataset's actual density rather than assumed.
fn bars_per_day(full: &BarFrame) -> EvoResult<f64> {
    let ts = full.timestamp_series()?;
    let n = ts.len();
    if n < 2 {
        return Ok(1.0);
    }
    let dt = ts
        .datetime()
        .map_err(|e| crate::error::ExecutionError::TypeMismatch(e.to_string()))?;
    let first = dt.get(0).unwrap_or(0);
    let last = dt.get(n - 1).unwrap_or(0);
    let span_ms = (last - first).max(1) as f64;
    let span_days = (span_ms / 1000.0 / 86_400.0).max(1.0);
    Ok((n as f64 / span_days).max(1.0))
}

/// Samples episode windows from a dataset per spec §4.3.
pub struct EpisodeSampler<'a> {
    full: &'a BarFrame,
    cfg: &'a Phase3Config,
    tagger: Option<&'a RegimeTagger>,
}

impl<'a> EpisodeSampler<'a> {
    pub fn new(full: &'a BarFrame, cfg: &'a Phase3Config, tagger: Option<&'a RegimeTagger>) -> Self {
        Self { full, cfg, tagger }
    }

    /// Draws `n` episode windows, returning `(spec, frame)` pairs so callers
    /// can evaluate each window without re-slicing the dataset.
    pub fn sample(&self, n: usize, seed: u64) -> EvoResult<Vec<(EpisodeSpec, BarFrame)>> {
        match self.cfg.sampling_mode {
            SamplingMode::Random => self.sample_random(n, seed),
            SamplingMode::StratifiedByRegime => self.sample_stratified(n, seed),
        }
    }

    fn candidate_windows(
        &self,
        count: usize,
        rng: &mut StdRng,
    ) -> EvoResult<Vec<(EpisodeSpec, BarFrame)>> {
        let bpd = bars_per_day(self.full)?;
        let total = self.full.height();
        let min_months = self.cfg.min_months.max(1) as f64;
        let max_months = self.cfg.max_months.max(self.cfg.min_months).max(1) as f64;

        // Disjoint windows (spec §4.3): each accepted (offset, offset+bars)
        // range is checked against every prior accepted range before a draw
        // is kept; a draw that overlaps is rejected and redrawn, bounded so
        // a dataset too small for `count` disjoint windows fails loudly
        // instead of looping forever.
        const MAX_ATTEMPTS_PER_WINDOW: usize = 200;
        let mut occupied: Vec<(usize, usize)> = Vec::with_capacity(count);

        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let months = if (max_months - min_months).abs() < f64::EPSILON {
                min_months
            } else {
                rng.random_range(min_months..=max_months)
            };
            let bars = ((months * 30.0 * bpd) as usize).max(self.cfg.min_bars as usize);
            if bars > total {
                return Err(SamplingError::InsufficientBars {
                    min_bars: self.cfg.min_bars as usize,
                }
                .into());
            }
            let max_offset = total - bars;

            let mut offset = 0usize;
            let mut placed = false;
            for _ in 0..MAX_ATTEMPTS_PER_WINDOW {
                let candidate = if max_offset == 0 { 0 } else { rng.random_range(0..=max_offset) };
                let range = (candidate, candidate + bars);
                if !occupied.iter().any(|&existing| ranges_overlap(range, existing)) {
                    offset = candidate;
                    placed = true;
                    break;
                }
            }
            if !placed {
                return Err(SamplingError::CannotSatisfyRequestedCount {
                    requested: count,
                    available: out.len(),
                }
                .into());
            }
            occupied.push((offset, offset + bars));

            let window = self.full.slice(offset as i64, bars)?;
            let ts = window.timestamp_series()?;
            let dt = ts
                .datetime()
                .map_err(|e| crate::error::ExecutionError::TypeMismatch(e.to_string()))?;
            let start_ms = dt.get(0).unwrap_or(0);
            let end_ms = dt.get(dt.len() - 1).unwrap_or(0);
            let start_ts = DateTime::from_timestamp_millis(start_ms).unwrap_or_default();
            let end_ts = DateTime::from_timestamp_millis(end_ms).unwrap_or_default();

            let tags = match self.tagger {
                Some(tagger) => EpisodeTags::from(tagger.tag(&window)?),
                None => EpisodeTags {
                    trend: "unknown".into(),
                    vol_bucket: "unknown".into(),
                    chop_bucket: "unknown".into(),
                    event_day: None,
                },
            };

            out.push((
                EpisodeSpec {
                    label: format!("episode_{i}"),
                    start_ts,
                    end_ts,
                    tags,
                },
                window,
            ));
        }
        Ok(out)
    }

    fn sample_random(&self, n: usize, seed: u64) -> EvoResult<Vec<(EpisodeSpec, BarFrame)>> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.candidate_windows(n, &mut rng)
    }

    /// Oversamples 2-3x candidates, then greedily picks to maximize unique
    /// `(trend, vol_bucket, chop_bucket)` tuples; falls back to random
    /// selection when insufficient diversity exists (spec §4.3).
    fn sample_stratified(&self, n: usize, seed: u64) -> EvoResult<Vec<(EpisodeSpec, BarFrame)>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let oversample_factor = 3;
        let candidates = self.candidate_windows(n * oversample_factor, &mut rng)?;

        let mut seen: HashSet<(String, String, String)> = HashSet::new();
        let mut picked = Vec::with_capacity(n);
        for (spec, frame) in &candidates {
            let key = (
                spec.tags.trend.clone(),
                spec.tags.vol_bucket.clone(),
                spec.tags.chop_bucket.clone(),
            );
            if seen.insert(key) {
                picked.push((spec.clone(), frame.clone()));
            }
            if picked.len() == n {
                break;
            }
        }

        if picked.len() < n {
            // Insufficient diversity in the candidate pool: fall back to a
            // plain random selection from the same pool.
            let mut indices: Vec<usize> = (0..candidates.len()).collect();
            indices.shuffle_with(&mut rng);
            picked = indices
                .into_iter()
                .take(n)
                .map(|i| candidates[i].clone())
                .collect();
        }

        if picked.len() < n {
            return Err(SamplingError::CannotSatisfyRequestedCount {
                requested: n,
                available: picked.len(),
            }
            .into());
        }

        // Deterministic, stable ordering of the final spec sequence.
        picked.sort_by(|a, b| a.0.start_ts.cmp(&b.0.start_ts));
        Ok(picked)
    }
}

/// Small local extension so the fallback shuffle doesn't pull in a second
/// RNG-shuffle dependency; Fisher-Yates over an explicit `StdRng`.
trait ShuffleWith {
    fn shuffle_with(&mut self, rng: &mut StdRng);
}

impl ShuffleWith for Vec<usize> {
    fn shuffle_with(&mut self, rng: &mut StdRng) {
        for i in (1..self.len()).rev() {
            let j = rng.random_range(0..=i);
            self.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn big_frame(n: usize) -> BarFrame {
        let start_ms: i64 = 1_700_000_000_000;
        let day_ms: i64 = 86_400_000;
        let ts: Vec<i64> = (0..n as i64).map(|i| start_ms + i * day_ms).collect();
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + (i % 50) as f64 * 0.1).collect();
        let df = df![
            "timestamp" => ts,
            "open" => closes.clone(),
            "high" => closes.iter().map(|c| c + 1.0).collect::<Vec<_>>(),
            "low" => closes.iter().map(|c| c - 1.0).collect::<Vec<_>>(),
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

    #[test]
    fn same_seed_yields_same_spec_sequence() {
        let full = big_frame(1000);
        let cfg = Phase3Config {
            min_months: 1,
            max_months: 2,
            min_bars: 10,
            sampling_mode: SamplingMode::Random,
            ..Phase3Config::default()
        };
        let sampler = EpisodeSampler::new(&full, &cfg, None);
        let a = sampler.sample(4, 42).unwrap();
        let b = sampler.sample(4, 42).unwrap();
        let labels_a: Vec<_> = a.iter().map(|(s, _)| (s.label.clone(), s.start_ts)).collect();
        let labels_b: Vec<_> = b.iter().map(|(s, _)| (s.label.clone(), s.start_ts)).collect();
        assert_eq!(labels_a, labels_b);
    }

    #[test]
    fn different_seeds_can_yield_different_sequences() {
        let full = big_frame(2000);
        let cfg = Phase3Config {
            min_months: 1,
            max_months: 3,
            min_bars: 10,
            sampling_mode: SamplingMode::Random,
            ..Phase3Config::default()
        };
        let sampler = EpisodeSampler::new(&full, &cfg, None);
        let a = sampler.sample(4, 1).unwrap();
        let b = sampler.sample(4, 2).unwrap();
        let starts_a: Vec<_> = a.iter().map(|(s, _)| s.start_ts).collect();
        let starts_b: Vec<_> = b.iter().map(|(s, _)| s.start_ts).collect();
        assert_ne!(starts_a, starts_b);
    }

    #[test]
    fn random_mode_windows_never_overlap() {
        let full = big_frame(500);
        let cfg = Phase3Config {
            min_months: 1,
            max_months: 2,
            min_bars: 10,
            sampling_mode: SamplingMode::Random,
            ..Phase3Config::default()
        };
        let sampler = EpisodeSampler::new(&full, &cfg, None);
        let windows = sampler.sample(8, 7).unwrap();

        let mut ranges: Vec<(i64, i64)> = windows
            .iter()
            .map(|(s, _)| (s.start_ts.timestamp_millis(), s.end_ts.timestamp_millis()))
            .collect();
        ranges.sort();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "windows {:?} and {:?} overlap", pair[0], pair[1]);
        }
    }

    #[test]
    fn too_many_disjoint_windows_requested_fails_loudly() {
        let full = big_frame(60);
        let cfg = Phase3Config {
            min_months: 1,
            max_months: 1,
            min_bars: 20,
            sampling_mode: SamplingMode::Random,
            ..Phase3Config::default()
        };
        let sampler = EpisodeSampler::new(&full, &cfg, None);
        // A 60-bar dataset can fit at most a couple of disjoint 20-bar
        // windows; asking for far more must fail rather than silently
        // returning overlapping windows.
        let result = sampler.sample(20, 1);
        assert!(result.is_err());
    }
}
