use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedMessage {
    pub message_id: u64,
    pub author_name: String,
    pub content: String,
    pub from_bot: bool,
    pub at: DateTime<Utc>,
}

/// Recent channel chatter, bucketed per channel and minute. Only used to give
/// the model some context; nothing here is persisted.
#[derive(Clone)]
pub struct MessageCache {
    cache: Arc<Mutex<LruCache<(u64, i64), Vec<CachedMessage>>>>,
}

fn minute_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(60)
}

impl MessageCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn insert(&self, channel_id: u64, message: CachedMessage) {
        let key = (channel_id, minute_bucket(message.at));
        let mut cache = self.cache.lock();
        match cache.get_mut(&key) {
            Some(bucket) => bucket.push(message),
            None => {
                cache.put(key, vec![message]);
            }
        }
    }

    /// Messages from the last `window`, oldest first.
    pub fn recent(
        &self,
        channel_id: u64,
        now: DateTime<Utc>,
        window: Duration,
        exclude: Option<u64>,
    ) -> Vec<CachedMessage> {
        let cutoff = now - window;
        let cache = self.cache.lock();
        let mut messages: Vec<CachedMessage> = (minute_bucket(cutoff)..=minute_bucket(now))
            .filter_map(|bucket| cache.peek(&(channel_id, bucket)))
            .flatten()
            .filter(|m| m.at >= cutoff && m.at <= now)
            .filter(|m| Some(m.message_id) != exclude)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.at);
        messages
    }

    /// Looks a message up by id, newest buckets first.
    pub fn find(&self, channel_id: u64, message_id: u64) -> Option<CachedMessage> {
        let cache = self.cache.lock();
        cache
            .iter()
            .filter(|(key, _)| key.0 == channel_id)
            .flat_map(|(_, bucket)| bucket.iter())
            .find(|m| m.message_id == message_id)
            .cloned()
    }

    pub fn clear_channel(&self, channel_id: u64) -> usize {
        let mut cache = self.cache.lock();
        let keys: Vec<(u64, i64)> = cache
            .iter()
            .filter(|(key, _)| key.0 == channel_id)
            .map(|(key, _)| *key)
            .collect();
        keys.iter()
            .filter_map(|key| cache.pop(key))
            .map(|bucket| bucket.len())
            .sum()
    }

    /// Drops buckets older than `max_age`.
    pub fn prune(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let oldest = minute_bucket(now - max_age);
        let mut cache = self.cache.lock();
        let stale: Vec<(u64, i64)> = cache
            .iter()
            .filter(|(key, _)| key.1 < oldest)
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            cache.pop(key);
        }
        stale.len()
    }

    /// (message count, total characters) inside the window.
    pub fn channel_stats(&self, channel_id: u64, now: DateTime<Utc>, window: Duration) -> (usize, usize) {
        let messages = self.recent(channel_id, now, window, None);
        let chars = messages.iter().map(|m| m.content.chars().count()).sum();
        (messages.len(), chars)
    }
}
