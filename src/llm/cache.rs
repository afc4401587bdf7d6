//! Content-addressed LLM response cache (spec §4.6 step 2): keyed by
//! `sha256(provider + model + prompt + params)`, race-free for concurrent
//! lookups, and persisted to disk so a cache hit survives process restarts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::LlmError;

use super::client::{LlmClient, LlmRequest, LlmResponse};

fn cache_key(request: &LlmRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.provider.as_bytes());
    hasher.update(request.model.as_bytes());
    hasher.update(request.prompt.as_bytes());
    hasher.update(request.params.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// An on-disk, in-memory-fronted cache of LLM completions.
pub struct LlmCache {
    dir: PathBuf,
    mem: DashMap<String, LlmResponse>,
    hits: AtomicU64,
    /// Per-key async locks so concurrent misses on the same key serialize
    /// onto a single provider call instead of stampeding it. Entries are
    /// never removed; the set of distinct keys is bounded by the set of
    /// distinct prompts a run actually issues.
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl LlmCache {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            mem: DashMap::new(),
            hits: AtomicU64::new(0),
            inflight: DashMap::new(),
        })
    }

    pub fn cache_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn disk_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn load_from_disk(&self, key: &str) -> Option<LlmResponse> {
        let path = self.disk_path(key);
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn save_to_disk(&self, key: &str, response: &LlmResponse) -> Result<(), LlmError> {
        let path = self.disk_path(key);
        let bytes = serde_json::to_vec_pretty(response)
            .map_err(|e| LlmError::Cache(e.to_string()))?;
        std::fs::write(path, bytes).map_err(|e| LlmError::Cache(e.to_string()))
    }

    /// Returns the cached response and whether it was a cache hit. A hit
    /// never calls the provider and never increments its token usage —
    /// only this cache's own `cache_hits` counter moves.
    ///
    /// Concurrent misses on the same key are not independent: each waits on
    /// that key's lock before touching the provider, so only the first to
    /// acquire it actually calls out, and the rest find its result already
    /// cached once they get their turn (spec §5: "identical keys deduplicate
    /// to a single provider call").
    pub async fn get_or_complete(
        &self,
        client: &dyn LlmClient,
        request: LlmRequest,
    ) -> Result<(LlmResponse, bool), LlmError> {
        let key = cache_key(&request);

        if let Some(response) = self.check_cache(&key) {
            return Ok((response, true));
        }

        let lock = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have completed this key while we waited for
        // the lock; re-check before calling the provider ourselves.
        if let Some(response) = self.check_cache(&key) {
            return Ok((response, true));
        }

        tracing::info!(key = %key, "llm cache miss, calling provider");
        let response = client.complete(request).await?;

        self.mem.insert(key.clone(), response.clone());
        self.save_to_disk(&key, &response)?;
        Ok((response, false))
    }

    fn check_cache(&self, key: &str) -> Option<LlmResponse> {
        if let Some(entry) = self.mem.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::info!(key = %key, "llm cache hit (memory)");
            return Some(entry.clone());
        }
        if let Some(response) = self.load_from_disk(key) {
            self.mem.insert(key.to_string(), response.clone());
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::info!(key = %key, "llm cache hit (disk)");
            return Some(response);
        }
        None
    }
}
