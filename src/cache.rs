use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::{CredentialRecord, Region, SecretValue};

/// Everything that decides which plaintext a record resolves to.
///
/// Fields are compared one by one, so no choice of bucket, path or context
/// strings can make two different records share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    region: Region,
    bucket: String,
    path: String,
    context: Option<(String, String)>,
}

impl CacheKey {
    pub fn for_record(record: &CredentialRecord) -> Self {
        Self {
            region: record.region(),
            bucket: record.bucket_name().to_string(),
            path: record.bucket_path().to_string(),
            context: record
                .encryption_context()
                .map(|ctx| (ctx.key.to_string(), ctx.value.to_string())),
        }
    }
}

/// Entry stored in the DashMap with an expiry timestamp.
#[derive(Clone)]
pub(crate) struct CacheEntry {
    value: SecretValue,
    pub(crate) expires_at: Instant,
}

/// In-memory TTL cache of decrypted secrets.
///
/// Keys are the object coordinates and encryption context only, never
/// secret material. Entries are checked on read and evicted lazily;
/// `evict_expired()` sweeps the rest.
#[derive(Clone)]
pub struct SecretCache {
    pub(crate) local: Arc<DashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl SecretCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            local: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn key_for(record: &CredentialRecord) -> CacheKey {
        CacheKey::for_record(record)
    }

    pub fn get(&self, key: &CacheKey) -> Option<SecretValue> {
        if let Some(entry) = self.local.get(key) {
            if Instant::now() < entry.expires_at {
                return Some(entry.value.clone());
            }
            // expired; drop the ref before removing
            drop(entry);
            self.local.remove(key);
        }
        None
    }

    pub fn insert(&self, key: CacheKey, value: SecretValue) {
        self.local.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.local.remove(key);
    }

    pub fn clear(&self) {
        self.local.clear();
    }

    /// Remove all expired entries. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.local.len();
        self.local.retain(|_, entry| entry.expires_at > now);
        before - self.local.len()
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }
}
