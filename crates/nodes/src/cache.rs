//! Response cache for the LLM gateway.
//!
//! Entries are keyed by a SHA-256 digest of the exact request (messages,
//! model, temperature and token limit). Entries expire after a TTL; when the
//! cache is full, expired entries are purged first and then the least
//! recently used entry is evicted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use pipeline::{LlmRequest, LlmResponse, MessageRole};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

/// Default time-to-live for a cached reply.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default maximum number of cached replies.
pub const DEFAULT_CACHE_ENTRIES: usize = 1000;

/// Sizing of a [`ResponseCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            max_entries: DEFAULT_CACHE_ENTRIES,
        }
    }
}

/// Hex SHA-256 digest identifying one exact request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(request: &LlmRequest) -> Self {
        let mut hasher = Sha256::new();
        for message in &request.messages {
            let role = match message.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            };
            hasher.update(role.as_bytes());
            hasher.update([0u8]);
            hasher.update(message.content.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(request.model.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(request.temperature.to_bits().to_be_bytes());
        hasher.update(request.max_tokens.to_be_bytes());

        let digest = hasher.finalize();
        let hex = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
struct Entry {
    response: LlmResponse,
    inserted_at: Instant,
    last_used: Instant,
}

/// TTL + LRU cache of provider replies.
#[derive(Debug, Default)]
pub struct ResponseCache {
    config: CacheConfig,
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached reply for `key` unless it has expired.
    pub async fn get(&self, key: &CacheKey) -> Option<LlmResponse> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let expired = match entries.get_mut(key) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.config.ttl => {
                entry.last_used = now;
                return Some(entry.response.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    /// Stores `response` under `key`, evicting to stay within capacity.
    pub async fn insert(&self, key: CacheKey, response: LlmResponse) {
        if self.config.max_entries == 0 {
            return;
        }
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            let ttl = self.config.ttl;
            entries.retain(|_, e| now.duration_since(e.inserted_at) < ttl);
        }
        while !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }

        entries.insert(
            key,
            Entry {
                response,
                inserted_at: now,
                last_used: now,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{ChatMessage, ModelName, TokenCount};

    fn request(text: &str) -> LlmRequest {
        LlmRequest {
            model: ModelName::new("claude-3-5-haiku-20241022").unwrap(),
            messages: vec![ChatMessage::system("role"), ChatMessage::user(text)],
            max_tokens: 1000,
            temperature: 0.4,
        }
    }

    fn response(text: &str) -> LlmResponse {
        LlmResponse {
            content: text.to_string(),
            model: ModelName::new("claude-3-5-haiku-20241022").unwrap(),
            input_tokens: TokenCount::new(10),
            output_tokens: TokenCount::new(5),
        }
    }

    #[test]
    fn key_depends_on_every_request_field() {
        let base = request("a");
        let same = CacheKey::for_request(&request("a"));
        assert_eq!(CacheKey::for_request(&base), same);
        assert_eq!(same.as_str().len(), 64);

        let mut hotter = base.clone();
        hotter.temperature = 0.9;
        let mut longer = base.clone();
        longer.max_tokens = 2000;
        let mut other_model = base.clone();
        other_model.model = ModelName::new("claude-sonnet-4-20250514").unwrap();

        for changed in [request("b"), hotter, longer, other_model] {
            assert_ne!(CacheKey::for_request(&changed), same);
        }
    }

    #[tokio::test]
    async fn expired_entries_are_not_served() {
        let cache = ResponseCache::new(CacheConfig {
            ttl: Duration::from_millis(20),
            max_entries: 10,
        });
        let key = CacheKey::for_request(&request("a"));
        cache.insert(key.clone(), response("one")).await;
        assert_eq!(cache.get(&key).await.unwrap().content, "one");

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(&key).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted_when_full() {
        let cache = ResponseCache::new(CacheConfig {
            ttl: Duration::from_secs(60),
            max_entries: 2,
        });
        let a = CacheKey::for_request(&request("a"));
        let b = CacheKey::for_request(&request("b"));
        let c = CacheKey::for_request(&request("c"));

        cache.insert(a.clone(), response("a")).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert(b.clone(), response("b")).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        // Touch `a` so `b` becomes the least recently used.
        assert!(cache.get(&a).await.is_some());
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert(c.clone(), response("c")).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&a).await.is_some());
        assert!(cache.get(&b).await.is_none());
        assert!(cache.get(&c).await.is_some());
    }
}
