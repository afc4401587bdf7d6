//! Run directory writer: the on-disk layout a run leaves behind (spec §6).
//!
//! ```text
//! <root>/
//!   run_config.json
//!   summary.json
//!   graphs/<graph_id>.json
//!   evals/<graph_id>.json
//!   lineage.jsonl
//!   llm_transcripts/<timestamp>_<stage>_<graph_id>.json
//!   phase3_reports/<graph_id>.json       (only when phase3.enabled)
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::{
    config::RunConfig,
    error::{EvoResult, IoError},
    evolution::{LineageLog, RunSummary},
    graph::{GraphId, StrategyGraph},
    llm::LlmTranscript,
};

pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> EvoResult<Self> {
        let root = root.into();
        for sub in ["graphs", "evals", "llm_transcripts", "phase3_reports"] {
            std::fs::create_dir_all(root.join(sub)).map_err(IoError::Io)?;
        }
        Ok(Self { root })
    }

    fn guarded(&self, relative: &str) -> EvoResult<PathBuf> {
        let path = self.root.join(relative);
        let canonical_root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let canonical_parent = path
            .parent()
            .and_then(|p| p.canonicalize().ok())
            .unwrap_or_else(|| self.root.clone());
        if !canonical_parent.starts_with(&canonical_root) {
            return Err(IoError::PathEscape(relative.to_string()).into());
        }
        Ok(path)
    }

    fn write_json<T: Serialize>(&self, relative: &str, value: &T) -> EvoResult<()> {
        let path = self.guarded(relative)?;
        let bytes = serde_json::to_vec_pretty(value).map_err(IoError::Json)?;
        std::fs::write(path, bytes).map_err(IoError::Io)?;
        Ok(())
    }

    pub fn write_run_config(&self, cfg: &RunConfig) -> EvoResult<()> {
        self.write_json("run_config.json", cfg)
    }

    pub fn write_summary(&self, summary: &RunSummary) -> EvoResult<()> {
        self.write_json("summary.json", summary)
    }

    pub fn write_graph(&self, graph: &StrategyGraph) -> EvoResult<()> {
        self.write_json(&format!("graphs/{}.json", graph.graph_id), graph)
    }

    pub fn write_eval<T: Serialize>(&self, graph_id: GraphId, eval: &T) -> EvoResult<()> {
        self.write_json(&format!("evals/{graph_id}.json"), eval)
    }

    pub fn write_phase3_report<T: Serialize>(&self, graph_id: GraphId, report: &T) -> EvoResult<()> {
        self.write_json(&format!("phase3_reports/{graph_id}.json"), report)
    }

    pub fn write_transcript(
        &self,
        timestamp_ms: i64,
        stage: &str,
        graph_id: GraphId,
        transcript: &LlmTranscript,
    ) -> EvoResult<()> {
        let relative = format!("llm_transcripts/{timestamp_ms}_{stage}_{graph_id}.json");
        self.write_json(&relative, transcript)
    }

    /// Overwrites `lineage.jsonl` with the log's current contents, one edge
    /// per line. Safe to call repeatedly as the run progresses since the
    /// log itself is append-only in memory.
    pub fn write_lineage(&self, log: &LineageLog) -> EvoResult<()> {
        let path = self.guarded("lineage.jsonl")?;
        let mut body = String::new();
        for edge in &log.edges {
            let line = serde_json::to_string(edge).map_err(IoError::Json)?;
            body.push_str(&line);
            body.push('\n');
        }
        std::fs::write(path, body).map_err(IoError::Io)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_expected_layout() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();

        writer.write_run_config(&RunConfig::default()).unwrap();
        assert!(dir.path().join("run_config.json").exists());

        let log = LineageLog::new();
        writer.write_lineage(&log).unwrap();
        assert!(dir.path().join("lineage.jsonl").exists());

        assert!(dir.path().join("graphs").is_dir());
        assert!(dir.path().join("evals").is_dir());
        assert!(dir.path().join("llm_transcripts").is_dir());
        assert!(dir.path().join("phase3_reports").is_dir());
    }

    #[test]
    fn persisted_run_config_reads_back_identical() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let writer = ArtifactWriter::new(dir.path())?;
        let cfg = RunConfig::default();

        writer.write_run_config(&cfg)?;
        let bytes = std::fs::read(dir.path().join("run_config.json"))?;
        let roundtripped: RunConfig = serde_json::from_slice(&bytes)?;

        assert_eq!(cfg, roundtripped);
        Ok(())
    }
}
