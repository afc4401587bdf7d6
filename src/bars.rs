//! `BarFrame`: a contiguous time-indexed frame of OHLCV data (spec §3).
//!
//! A past defect traced to a single-form timestamp assumption is why this
//! type accepts the timestamp either as an explicit `timestamp` column or
//! under one of the common positional-index column names a data provider
//! might emit (`date`, `time`, `index`) — both are normalized to a single
//! internal `timestamp` column before anything downstream looks at it.

use polars::prelude::*;
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::error::{EvoResult, ExecutionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BarCol {
    Timestamp,
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl From<BarCol> for PlSmallStr {
    fn from(value: BarCol) -> Self {
        <&str>::from(value).into()
    }
}

/// Column names that may carry the timestamp position on ingress, checked
/// in priority order. The first match is renamed to `timestamp`.
const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "date", "time", "index", "datetime"];

/// A validated, contiguous time-indexed OHLCV frame.
#[derive(Debug, Clone)]
pub struct BarFrame {
    df: DataFrame,
}

impl BarFrame {
    /// Builds a `BarFrame` from a raw `DataFrame`, accepting either an
    /// explicit `timestamp` column or one of [`TIMESTAMP_ALIASES`].
    pub fn from_dataframe(mut df: DataFrame) -> EvoResult<Self> {
        let existing: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        if !existing.iter().any(|c| c == "timestamp") {
            let found = TIMESTAMP_ALIASES
                .iter()
                .find(|alias| existing.iter().any(|c| c == *alias));
            match found {
                Some(alias) => {
                    df.rename(alias, "timestamp".into())
                        .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?;
                }
                None => return Err(ExecutionError::AbsentTimestamp.into()),
            }
        }

        for col in [BarCol::Open, BarCol::High, BarCol::Low, BarCol::Close, BarCol::Volume] {
            if !existing.iter().any(|c| c == <&str>::from(col)) {
                return Err(ExecutionError::TypeMismatch(format!(
                    "missing required column '{col}'"
                ))
                .into());
            }
        }

        let sorted = df
            .sort(["timestamp"], SortMultipleOptions::default())
            .map_err(|e| ExecutionError::TypeMismatch(e.to_string()))?;

        Ok(Self { df: sorted })
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn as_dataframe(&self) -> &DataFrame {
        &self.df
    }

    /// Returns a sub-frame covering `[start, end)` by row index, used by the
    /// Episode Sampler to carve out a window plus its warmup prefix.
    pub fn slice(&self, offset: i64, length: usize) -> EvoResult<Self> {
        let sliced = self.df.slice(offset, length);
        Ok(Self { df: sliced })
    }

    pub fn close_series(&self) -> EvoResult<&Series> {
        self.df
            .column("close")
            .map(|c| c.as_materialized_series())
            .map_err(|e| ExecutionError::TypeMismatch(e.to_string()).into())
    }

    pub fn timestamp_series(&self) -> EvoResult<&Series> {
        self.df
            .column("timestamp")
            .map(|c| c.as_materialized_series())
            .map_err(|e| ExecutionError::TypeMismatch(e.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_df(ts_col_name: &str) -> DataFrame {
        df![
            ts_col_name => [1_i64, 2, 3],
            "open" => [1.0, 2.0, 3.0],
            "high" => [1.5, 2.5, 3.5],
            "low" => [0.5, 1.5, 2.5],
            "close" => [1.2, 2.2, 3.2],
            "volume" => [100.0, 200.0, 300.0],
        ]
        .unwrap()
    }

    #[test]
    fn accepts_explicit_timestamp_column() {
        let bf = BarFrame::from_dataframe(make_df("timestamp")).unwrap();
        assert_eq!(bf.height(), 3);
    }

    #[test]
    fn accepts_index_style_timestamp_column() {
        let bf = BarFrame::from_dataframe(make_df("index")).unwrap();
        assert_eq!(bf.height(), 3);
        assert!(bf.timestamp_series().is_ok());
    }

    #[test]
    fn rejects_frame_with_no_timestamp_position() {
        let df = df![
            "open" => [1.0],
            "high" => [1.0],
            "low" => [1.0],
            "close" => [1.0],
            "volume" => [1.0],
        ]
        .unwrap();
        assert!(BarFrame::from_dataframe(df).is_err());
    }
}
