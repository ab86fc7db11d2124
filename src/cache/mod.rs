/// Read-through tiered cache.
///
/// L1 is an in-process LRU, L2 a shared SQLite table with TTL expiry, and
/// the durable store acts as the final tier (tracked here only as
/// hit/miss counters). A hit in a lower tier is promoted upward. A tier
/// failure logs a warning and falls through to the next tier; the cache
/// never takes the pipeline down.
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::warn;

pub trait CacheTier: Send + Sync {
    fn name(&self) -> &'static str;
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn put(&self, key: &str, value: &[u8]);
    fn remove(&self, key: &str);
}

/// L1: in-process LRU.
pub struct MemoryTier {
    entries: Mutex<LruCache<String, Vec<u8>>>,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl CacheTier for MemoryTier {
    fn name(&self) -> &'static str {
        "l1"
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.entries.lock() {
            Ok(mut entries) => entries.get(key).cloned(),
            Err(_) => None,
        }
    }

    fn put(&self, key: &str, value: &[u8]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key.to_string(), value.to_vec());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.pop(key);
        }
    }
}

/// L2: shared SQLite table with TTL expiry.
pub struct SqliteTier {
    conn: Mutex<Connection>,
    ttl_secs: u64,
}

impl SqliteTier {
    pub fn open(path: &Path, ttl_secs: u64) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        Self::init(conn, ttl_secs)
    }

    pub fn open_in_memory(ttl_secs: u64) -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?, ttl_secs)
    }

    fn init(conn: Connection, ttl_secs: u64) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                 key TEXT PRIMARY KEY,
                 payload BLOB NOT NULL,
                 expires_at INTEGER NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl_secs,
        })
    }
}

impl CacheTier for SqliteTier {
    fn name(&self) -> &'static str {
        "l2"
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(_) => return None,
        };
        let now = chrono::Utc::now().timestamp();
        let row: Option<(Vec<u8>, i64)> = match conn
            .query_row(
                "SELECT payload, expires_at FROM cache_entries WHERE key = ?1",
                params![key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
        {
            Ok(row) => row,
            Err(e) => {
                warn!(tier = self.name(), error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let (payload, expires_at) = row?;
        if expires_at <= now {
            let _ = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key]);
            return None;
        }
        Some(payload)
    }

    fn put(&self, key: &str, value: &[u8]) {
        let Ok(conn) = self.conn.lock() else {
            return;
        };
        let expires_at = chrono::Utc::now().timestamp() + self.ttl_secs as i64;
        if let Err(e) = conn.execute(
            "INSERT INTO cache_entries (key, payload, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload,
                                            expires_at = excluded.expires_at",
            params![key, value, expires_at],
        ) {
            warn!(tier = self.name(), error = %e, "cache write failed, skipping tier");
        }
    }

    fn remove(&self, key: &str) {
        let Ok(conn) = self.conn.lock() else {
            return;
        };
        let _ = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key]);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TierStats {
    pub name: &'static str,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsReport {
    pub tiers: Vec<TierStats>,
    pub durable_hits: u64,
    pub durable_misses: u64,
}

struct CountedTier {
    tier: Box<dyn CacheTier>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// The read-through stack. Lookup walks tiers in order and promotes hits
/// into every tier above the one that answered.
pub struct TieredCache {
    tiers: Vec<CountedTier>,
    durable_hits: AtomicU64,
    durable_misses: AtomicU64,
}

impl TieredCache {
    pub fn new(tiers: Vec<Box<dyn CacheTier>>) -> Self {
        Self {
            tiers: tiers
                .into_iter()
                .map(|tier| CountedTier {
                    tier,
                    hits: AtomicU64::new(0),
                    misses: AtomicU64::new(0),
                })
                .collect(),
            durable_hits: AtomicU64::new(0),
            durable_misses: AtomicU64::new(0),
        }
    }

    /// L1-only stack.
    pub fn memory_only(capacity: usize) -> Self {
        Self::new(vec![Box::new(MemoryTier::new(capacity))])
    }

    pub fn lookup(&self, key: &str) -> Option<Vec<u8>> {
        for (i, counted) in self.tiers.iter().enumerate() {
            if let Some(value) = counted.tier.get(key) {
                counted.hits.fetch_add(1, Ordering::Relaxed);
                for upper in &self.tiers[..i] {
                    upper.tier.put(key, &value);
                }
                return Some(value);
            }
            counted.misses.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    pub fn insert(&self, key: &str, value: &[u8]) {
        for counted in &self.tiers {
            counted.tier.put(key, value);
        }
    }

    pub fn invalidate(&self, key: &str) {
        for counted in &self.tiers {
            counted.tier.remove(key);
        }
    }

    /// Record the outcome of a durable-store check (the final tier).
    pub fn record_durable(&self, hit: bool) {
        if hit {
            self.durable_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.durable_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            tiers: self
                .tiers
                .iter()
                .map(|c| TierStats {
                    name: c.tier.name(),
                    hits: c.hits.load(Ordering::Relaxed),
                    misses: c.misses.load(Ordering::Relaxed),
                })
                .collect(),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            durable_misses: self.durable_misses.load(Ordering::Relaxed),
        }
    }
}

/// Content-addressed cache key: identical content under a different path
/// or name still hits.
pub fn content_key(namespace: &str, content: &[u8]) -> String {
    format!("{namespace}:{}", blake3::hash(content).to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_tier_roundtrip() {
        let tier = MemoryTier::new(4);
        tier.put("k", b"value");
        assert_eq!(tier.get("k").as_deref(), Some(b"value".as_slice()));
        tier.remove("k");
        assert!(tier.get("k").is_none());
    }

    #[test]
    fn test_memory_tier_evicts_lru() {
        let tier = MemoryTier::new(2);
        tier.put("a", b"1");
        tier.put("b", b"2");
        tier.put("c", b"3");
        assert!(tier.get("a").is_none(), "oldest entry evicted");
        assert!(tier.get("c").is_some());
    }

    #[test]
    fn test_sqlite_tier_ttl_expiry() {
        let tier = SqliteTier::open_in_memory(0).unwrap();
        tier.put("k", b"v");
        // ttl of zero expires immediately
        assert!(tier.get("k").is_none());

        let tier = SqliteTier::open_in_memory(3600).unwrap();
        tier.put("k", b"v");
        assert_eq!(tier.get("k").as_deref(), Some(b"v".as_slice()));
    }

    #[test]
    fn test_lookup_promotes_to_upper_tiers() {
        let l1 = Box::new(MemoryTier::new(8));
        let l2 = Box::new(SqliteTier::open_in_memory(3600).unwrap());
        let cache = TieredCache::new(vec![l1, l2]);

        // Seed only L2, bypassing the stack.
        cache.tiers[1].tier.put("k", b"v");

        assert_eq!(cache.lookup("k").as_deref(), Some(b"v".as_slice()));
        let stats = cache.stats();
        assert_eq!(stats.tiers[0].misses, 1);
        assert_eq!(stats.tiers[1].hits, 1);

        // Promotion: second lookup answers from L1.
        assert!(cache.lookup("k").is_some());
        let stats = cache.stats();
        assert_eq!(stats.tiers[0].hits, 1);
    }

    #[test]
    fn test_durable_counters() {
        let cache = TieredCache::memory_only(8);
        cache.record_durable(true);
        cache.record_durable(false);
        cache.record_durable(false);
        let stats = cache.stats();
        assert_eq!(stats.durable_hits, 1);
        assert_eq!(stats.durable_misses, 2);
    }

    #[test]
    fn test_content_key_is_content_addressed() {
        let a = content_key("emb", b"same bytes");
        let b = content_key("emb", b"same bytes");
        let c = content_key("emb", b"different");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("emb:"));
    }
}
