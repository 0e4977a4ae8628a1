// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Advisory distributed lock over the KV store.
//!
//! Short-TTL mutual exclusion with bounded retry. The lock is advisory:
//! after retry exhaustion the critical section runs anyway, because the
//! operations inside are idempotent and contention is rare. The TTL must
//! exceed the longest critical section.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use despacho_core::{DespachoError, KvStore};

/// Lock acquisition parameters, taken from `queue.*` config.
#[derive(Debug, Clone)]
pub struct LockSettings {
    pub ttl: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            retries: 8,
            retry_delay: Duration::from_millis(120),
        }
    }
}

/// Mutual exclusion scoped to a single KV key.
#[derive(Clone)]
pub struct AdvisoryLock {
    kv: Arc<dyn KvStore>,
    settings: LockSettings,
}

impl AdvisoryLock {
    pub fn new(kv: Arc<dyn KvStore>, settings: LockSettings) -> Self {
        Self { kv, settings }
    }

    /// Run `f` holding the lock at `key`.
    ///
    /// Retries acquisition up to the configured count; when all attempts
    /// fail, `f` still runs (best-effort fallback) and a warning is logged.
    /// The lock is released afterwards only if this call acquired it, so a
    /// fallback run never deletes a competitor's lock.
    pub async fn with_lock<T, F, Fut>(&self, key: &str, f: F) -> Result<T, DespachoError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DespachoError>>,
    {
        let nonce = Uuid::new_v4().to_string();
        let mut acquired = false;

        for attempt in 0..=self.settings.retries {
            if self
                .kv
                .set_if_absent(key, &nonce, self.settings.ttl)
                .await?
            {
                acquired = true;
                break;
            }
            if attempt < self.settings.retries {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }

        if !acquired {
            warn!(key, "lock retries exhausted, running critical section unlocked");
        }

        let result = f().await;

        if acquired {
            // Best-effort unlock; TTL cleans up after a failed DEL.
            if let Err(e) = self.kv.del(key).await {
                warn!(key, error = %e, "failed to release lock, ttl will expire it");
            }
        }

        result
    }
}
