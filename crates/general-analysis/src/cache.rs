/// Redis persistence for session state.
///
/// Everything is best-effort: a write failure is logged and ignored, a read
/// failure means starting fresh. Key schema (namespaced to avoid collisions):
/// - `ga:v1:results` — JSON `Vec<AnalysisResult>`, the live result list (no TTL)
/// - `ga:v1:criteria` — JSON `RegistrySnapshot` (no TTL)
/// - `ga:v1:raw:{sha256(analysis_name)}` — raw backend response text (TTL: 24h)
use sha2::{Digest, Sha256};
use tracing::warn;

use avalia_common::redis::RedisStore;

use crate::model::AnalysisResult;
use crate::registry::RegistrySnapshot;

const KEY_PREFIX: &str = "ga:v1:";
const RAW_RESPONSE_TTL_SECS: u64 = 24 * 3600;

pub struct StateCache {
    redis: RedisStore,
}

impl StateCache {
    pub fn new(redis: RedisStore) -> Self {
        Self { redis }
    }

    pub async fn is_available(&self) -> bool {
        self.redis.is_available().await
    }

    // --- Result list ---

    pub async fn get_results(&self) -> Option<Vec<AnalysisResult>> {
        let key = format!("{KEY_PREFIX}results");
        let json = self.redis.get(&key).await?;
        serde_json::from_str(&json)
            .inspect_err(|e| warn!(error = %e, key, "persisted results unreadable, ignoring"))
            .ok()
    }

    pub async fn set_results(&self, results: &[AnalysisResult]) {
        let key = format!("{KEY_PREFIX}results");
        if let Ok(json) = serde_json::to_string(results) {
            self.redis.set(&key, &json).await;
        }
    }

    // --- Criterion registry ---

    pub async fn get_registry(&self) -> Option<RegistrySnapshot> {
        let key = format!("{KEY_PREFIX}criteria");
        let json = self.redis.get(&key).await?;
        serde_json::from_str(&json)
            .inspect_err(|e| warn!(error = %e, key, "persisted criteria unreadable, ignoring"))
            .ok()
    }

    pub async fn set_registry(&self, snapshot: &RegistrySnapshot) {
        let key = format!("{KEY_PREFIX}criteria");
        if let Ok(json) = serde_json::to_string(snapshot) {
            self.redis.set(&key, &json).await;
        }
    }

    // --- Raw backend responses (debugging aid) ---

    pub async fn get_raw_response(&self, analysis_name: &str) -> Option<String> {
        self.redis.get(&raw_response_key(analysis_name)).await
    }

    pub async fn set_raw_response(&self, analysis_name: &str, raw: &str) {
        self.redis
            .set_with_ttl(&raw_response_key(analysis_name), raw, RAW_RESPONSE_TTL_SECS)
            .await;
    }

    /// Drop all persisted state. Used by the explicit clear operation.
    pub async fn invalidate_all(&self) {
        self.redis.delete_by_prefix(KEY_PREFIX).await;
    }
}

/// Hash the analysis name so arbitrary user-supplied names cannot produce
/// malformed or colliding keys.
fn raw_response_key(analysis_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(analysis_name.as_bytes());
    let hash = hasher.finalize();
    format!("{KEY_PREFIX}raw:{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_response_keys_are_stable_and_distinct() {
        let a = raw_response_key("Análise Geral");
        let b = raw_response_key("Análise Geral");
        let c = raw_response_key("outra análise");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("ga:v1:raw:"));
    }
}
