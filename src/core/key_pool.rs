//! Upstream API key pool with rotation and temporary blacklisting.
//!
//! The pool owns the full set of upstream keys, the round-robin cursor, and
//! the blacklist state. All mutation goes through one mutex; nothing here is
//! held across an await point. Blacklist expiry is checked lazily inside
//! [`KeyPool::acquire`] and additionally swept by a background task calling
//! [`KeyPool::reinstate_expired`].

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// A single upstream API key.
///
/// The secret is only ever logged through [`ApiKey::masked`].
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    secret: Arc<str>,
}

impl ApiKey {
    fn new(secret: String) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// The raw secret, for the upstream request and rate-limiter keying.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Masked identity prefix for logs.
    pub fn masked(&self) -> String {
        let prefix: String = self.secret.chars().take(11).collect();
        format!("{prefix}...")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&self.masked()).finish()
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyStatus {
    Available,
    /// `until: None` means blacklisted for the rest of the process lifetime.
    Blacklisted { until: Option<Instant> },
}

struct KeyEntry {
    key: ApiKey,
    status: KeyStatus,
}

struct PoolInner {
    entries: Vec<KeyEntry>,
    /// Next candidate index; always in `[0, entries.len())`.
    cursor: usize,
    /// Index of the process-wide active key, if any.
    current: Option<usize>,
}

/// Round-robin pool of upstream API keys with blacklist-and-expiry.
pub struct KeyPool {
    inner: Mutex<PoolInner>,
}

impl KeyPool {
    /// Build a pool from the configured key list. Insertion order is the
    /// rotation order; the starting cursor is randomized so restarts do not
    /// hammer the first key.
    pub fn new(secrets: Vec<String>) -> Self {
        use rand::Rng;

        let entries: Vec<KeyEntry> = secrets
            .into_iter()
            .map(|secret| KeyEntry {
                key: ApiKey::new(secret),
                status: KeyStatus::Available,
            })
            .collect();

        let cursor = if entries.is_empty() {
            0
        } else {
            rand::thread_rng().gen_range(0..entries.len())
        };

        let pool = Self {
            inner: Mutex::new(PoolInner {
                entries,
                cursor,
                current: None,
            }),
        };
        // Seed the active key.
        pool.rotate();
        pool
    }

    /// Log the pool size and each key's masked identity.
    pub fn log_keys(&self) {
        let inner = self.inner.lock().unwrap();
        tracing::info!(count = inner.entries.len(), "Loaded API keys");
        for (i, entry) in inner.entries.iter().enumerate() {
            tracing::info!("API key {i}: {}", entry.key.masked());
        }
    }

    /// Scan at most `len` candidates starting at the cursor and return the
    /// first available key, leaving the cursor just past it. Timed blacklists
    /// whose expiry has passed are reinstated on the way. Returns `None` iff
    /// every key is blacklisted.
    pub fn acquire(&self) -> Option<ApiKey> {
        let mut inner = self.inner.lock().unwrap();
        Self::acquire_locked(&mut inner).map(|idx| inner.entries[idx].key.clone())
    }

    fn acquire_locked(inner: &mut PoolInner) -> Option<usize> {
        let len = inner.entries.len();
        if len == 0 {
            return None;
        }
        let now = Instant::now();
        for _ in 0..len {
            let idx = inner.cursor;
            inner.cursor = (inner.cursor + 1) % len;

            let entry = &mut inner.entries[idx];
            if let KeyStatus::Blacklisted { until: Some(until) } = entry.status {
                if until <= now {
                    tracing::info!("{} → blacklist expired, reinstated", entry.key.masked());
                    entry.status = KeyStatus::Available;
                }
            }
            if entry.status == KeyStatus::Available {
                return Some(idx);
            }
        }
        tracing::error!("All API keys are exhausted or temporarily disabled");
        None
    }

    /// The process-wide active key for the next request. If the active key
    /// has been blacklisted in the meantime, a replacement is acquired first.
    pub fn current(&self) -> Option<ApiKey> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let usable = inner.current.is_some_and(|idx| match inner.entries[idx].status {
            KeyStatus::Available => true,
            KeyStatus::Blacklisted { until: Some(until) } => until <= now,
            KeyStatus::Blacklisted { until: None } => false,
        });
        if !usable {
            inner.current = Self::acquire_locked(&mut inner);
        }
        let idx = inner.current?;
        // A lazily expired current key becomes available again.
        inner.entries[idx].status = KeyStatus::Available;
        Some(inner.entries[idx].key.clone())
    }

    /// Replace the active key with the next acquirable one.
    pub fn rotate(&self) -> Option<ApiKey> {
        let mut inner = self.inner.lock().unwrap();
        match Self::acquire_locked(&mut inner) {
            Some(idx) => {
                inner.current = Some(idx);
                let key = inner.entries[idx].key.clone();
                tracing::info!("API key switched to {}", key.masked());
                Some(key)
            }
            None => {
                inner.current = None;
                tracing::error!("API key switch failed: no available keys");
                None
            }
        }
    }

    /// Blacklist a key for `duration`, or for the rest of the process run if
    /// `duration` is `None`. Idempotent: a repeated blacklist keeps the later
    /// of the two expiries, with indefinite counting as the latest possible.
    pub fn blacklist(&self, secret: &str, duration: Option<Duration>) {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.entries.iter_mut().find(|e| e.key.secret() == secret) else {
            return;
        };

        let new_until = duration.map(|d| Instant::now() + d);
        let until = match (entry.status, new_until) {
            (KeyStatus::Blacklisted { until: None }, _) | (_, None) => None,
            (KeyStatus::Blacklisted { until: Some(old) }, Some(new)) => Some(old.max(new)),
            (KeyStatus::Available, Some(new)) => Some(new),
        };
        entry.status = KeyStatus::Blacklisted { until };

        match duration {
            Some(d) => tracing::warn!(
                "{} → temporarily disabled for {} seconds",
                entry.key.masked(),
                d.as_secs()
            ),
            None => tracing::warn!(
                "{} → disabled for the rest of this run",
                entry.key.masked()
            ),
        }
    }

    /// Reinstate every timed blacklist whose expiry has passed. Called from
    /// the background sweeper task.
    pub fn reinstate_expired(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        for entry in &mut inner.entries {
            if let KeyStatus::Blacklisted { until: Some(until) } = entry.status {
                if until <= now {
                    tracing::info!("{} → blacklist expired, reinstated", entry.key.masked());
                    entry.status = KeyStatus::Available;
                }
            }
        }
    }

    /// Number of keys currently blacklisted (expired-but-unswept ones count).
    pub fn blacklisted_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .iter()
            .filter(|e| matches!(e.status, KeyStatus::Blacklisted { .. }))
            .count()
    }

    /// Total number of keys in the pool.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
