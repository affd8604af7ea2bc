use std::path::{Path, PathBuf};

use llmflow_core::{ChatRequest, ChatResponse};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::fingerprint::fingerprint_request;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    cached_at: OffsetDateTime,
    response: ChatResponse,
}

/// File-based response cache, one JSON file per request fingerprint.
///
/// Mirrors the original `LLMCache`'s locking model (a single process-wide
/// lock around every cache operation, not a per-entry lock): simple, and
/// correct for the single-writer-process deployment `spec.md`'s Non-goals
/// assume. A lost race between two processes just means one of them
/// redownloads; see `DESIGN.md` OQ-3.
pub struct ResponseCache {
    cache_dir: PathBuf,
    enabled: bool,
    ttl: time::Duration,
    max_cache_size_bytes: u64,
    lock: Mutex<()>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub total_entries: usize,
    pub expired_entries: usize,
    pub cache_size_bytes: u64,
    pub max_cache_size_bytes: u64,
}

impl ResponseCache {
    pub fn new(cache_dir: impl Into<PathBuf>, enabled: bool, ttl_hours: i64, max_cache_size_mb: u64) -> Self {
        ResponseCache {
            cache_dir: cache_dir.into(),
            enabled,
            ttl: time::Duration::hours(ttl_hours),
            max_cache_size_bytes: max_cache_size_mb * 1024 * 1024,
            lock: Mutex::new(()),
        }
    }

    async fn ensure_dir(&self) -> std::io::Result<()> {
        if self.enabled {
            tokio::fs::create_dir_all(&self.cache_dir).await?;
        }
        Ok(())
    }

    fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.cache_dir.join(format!("{fingerprint}.json"))
    }

    pub async fn get(&self, request: &ChatRequest) -> Option<ChatResponse> {
        if !self.enabled {
            return None;
        }
        let _guard = self.lock.lock().await;

        let fingerprint = fingerprint_request(request);
        let path = self.path_for(&fingerprint);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => return None,
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => {
                if OffsetDateTime::now_utc() - entry.cached_at > self.ttl {
                    let _ = tokio::fs::remove_file(&path).await;
                    None
                } else {
                    debug!(fingerprint = %fingerprint[..8.min(fingerprint.len())], "cache hit");
                    Some(entry.response)
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "removing corrupted cache entry");
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }

    pub async fn set(&self, request: &ChatRequest, response: &ChatResponse) {
        if !self.enabled {
            return;
        }
        let _guard = self.lock.lock().await;

        if self.ensure_dir().await.is_err() {
            return;
        }

        self.cleanup_expired_locked().await;
        if Self::directory_size(&self.cache_dir).await >= self.max_cache_size_bytes {
            self.cleanup_oldest_locked(0.5).await;
        }

        let fingerprint = fingerprint_request(request);
        let path = self.path_for(&fingerprint);
        let entry = CacheEntry { cached_at: OffsetDateTime::now_utc(), response: response.clone() };

        match serde_json::to_vec(&entry) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(&path, bytes).await {
                    warn!(path = %path.display(), error = %e, "failed to write cache entry");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize cache entry"),
        }
    }

    pub async fn clear(&self) {
        if !self.enabled {
            return;
        }
        let _guard = self.lock.lock().await;
        self.remove_all_json_files().await;
    }

    pub async fn stats(&self) -> CacheStats {
        if !self.enabled {
            return CacheStats { enabled: false, total_entries: 0, expired_entries: 0, cache_size_bytes: 0, max_cache_size_bytes: self.max_cache_size_bytes };
        }
        let _guard = self.lock.lock().await;

        let entries = self.list_entries().await;
        let mut expired = 0;
        for path in &entries {
            if self.entry_is_expired(path).await {
                expired += 1;
            }
        }

        CacheStats {
            enabled: true,
            total_entries: entries.len(),
            expired_entries: expired,
            cache_size_bytes: Self::directory_size(&self.cache_dir).await,
            max_cache_size_bytes: self.max_cache_size_bytes,
        }
    }

    async fn cleanup_expired_locked(&self) {
        for path in self.list_entries().await {
            if self.entry_is_expired(&path).await {
                let _ = tokio::fs::remove_file(&path).await;
            }
        }
    }

    /// Removes the oldest entries by mtime until only `keep_fraction` of
    /// the original file count remains. A no-op below 10 files, matching
    /// the original's "don't cleanup if we have few files" guard.
    async fn cleanup_oldest_locked(&self, keep_fraction: f64) {
        let mut entries = self.list_entries().await;
        if entries.len() < 10 {
            return;
        }

        let mut with_mtime = Vec::with_capacity(entries.len());
        for path in entries.drain(..) {
            let mtime = tokio::fs::metadata(&path).await.ok().and_then(|m| m.modified().ok());
            with_mtime.push((path, mtime));
        }
        with_mtime.sort_by_key(|(_, mtime)| *mtime);

        let keep_count = (with_mtime.len() as f64 * keep_fraction) as usize;
        let remove_count = with_mtime.len().saturating_sub(keep_count);
        for (path, _) in with_mtime.into_iter().take(remove_count) {
            let _ = tokio::fs::remove_file(&path).await;
        }
    }

    async fn entry_is_expired(&self, path: &Path) -> bool {
        match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<CacheEntry>(&bytes) {
                Ok(entry) => OffsetDateTime::now_utc() - entry.cached_at > self.ttl,
                Err(_) => true,
            },
            Err(_) => true,
        }
    }

    async fn list_entries(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let Ok(mut dir) = tokio::fs::read_dir(&self.cache_dir).await else {
            return out;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                out.push(path);
            }
        }
        out
    }

    async fn remove_all_json_files(&self) {
        for path in self.list_entries().await {
            let _ = tokio::fs::remove_file(&path).await;
        }
    }

    async fn directory_size(dir: &Path) -> u64 {
        let Ok(mut read_dir) = tokio::fs::read_dir(dir).await else {
            return 0;
        };
        let mut total = 0u64;
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            if let Ok(metadata) = entry.metadata().await {
                total += metadata.len();
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmflow_core::{ChatRequest, FinishReason, Message, Usage};

    fn sample_response() -> ChatResponse {
        ChatResponse {
            text: "hello".into(),
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
            usage: Usage { input_tokens: 1, output_tokens: 1 },
            raw: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), true, 24, 100);
        let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);

        assert!(cache.get(&request).await.is_none());
        cache.set(&request, &sample_response()).await;

        let cached = cache.get(&request).await.unwrap();
        assert_eq!(cached.text, "hello");
    }

    #[tokio::test]
    async fn expired_entry_is_evicted_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), true, 0, 100);
        let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        cache.set(&request, &sample_response()).await;

        // TTL of zero hours means any elapsed time counts as expired.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(cache.get(&request).await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_never_stores_anything() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), false, 24, 100);
        let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        cache.set(&request, &sample_response()).await;
        assert!(cache.get(&request).await.is_none());
        assert!(!cache.stats().await.enabled);
    }

    #[tokio::test]
    async fn clear_removes_all_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path(), true, 24, 100);
        let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        cache.set(&request, &sample_response()).await;

        cache.clear().await;
        assert!(cache.get(&request).await.is_none());
        assert_eq!(cache.stats().await.total_entries, 0);
    }
}
