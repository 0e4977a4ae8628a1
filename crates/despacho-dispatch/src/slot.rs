// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Active-slot controller: the single-active-driver-per-group invariant.
//!
//! Two keys per group: `queue:active:<group>` (short TTL, bounds the
//! service window) and `queue:active:meta:<group>` (longer TTL, outlives
//! the slot so a crashed holder can be observed and reclaimed without
//! ambiguity). Every operation returns the chats the caller must notify
//! or time out; no chat I/O ever happens inside a lock scope.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use despacho_core::{DespachoError, KvStore, QueueGroup};
use despacho_kv::{AdvisoryLock, keys};

use crate::queue::QueueEngine;

/// Slot windows, from `queue.*` config.
#[derive(Debug, Clone)]
pub struct SlotTuning {
    pub slot_ttl: std::time::Duration,
    pub meta_ttl: std::time::Duration,
}

impl Default for SlotTuning {
    fn default() -> Self {
        Self {
            slot_ttl: std::time::Duration::from_secs(30),
            meta_ttl: std::time::Duration::from_secs(60),
        }
    }
}

/// Persisted record of the slot holder and start instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotMeta {
    pub chat_id: String,
    pub started_at: i64,
}

/// What `try_acquire` decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller already holds the slot.
    Held,
    /// The caller just became the active driver.
    Activated,
    /// Someone ahead of the caller was activated instead; notify them.
    OtherActivated(String),
    /// The slot stays busy or the queue had nobody to serve; keep waiting.
    Queued,
}

/// Result of an acquisition attempt. `expired` carries a stale holder the
/// caller must run the timeout flow for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquire {
    pub outcome: AcquireOutcome,
    pub expired: Option<String>,
}

pub struct SlotController {
    kv: Arc<dyn KvStore>,
    lock: AdvisoryLock,
    queue: Arc<QueueEngine>,
    group: QueueGroup,
    tuning: SlotTuning,
}

impl SlotController {
    pub fn new(
        kv: Arc<dyn KvStore>,
        lock: AdvisoryLock,
        queue: Arc<QueueEngine>,
        group: QueueGroup,
        tuning: SlotTuning,
    ) -> Self {
        Self {
            kv,
            lock,
            queue,
            group,
            tuning,
        }
    }

    pub fn group(&self) -> QueueGroup {
        self.group
    }

    pub fn queue(&self) -> &Arc<QueueEngine> {
        &self.queue
    }

    /// Current slot holder, if any.
    pub async fn holder(&self) -> Result<Option<String>, DespachoError> {
        self.kv.get(&keys::active(self.group)).await
    }

    /// Attempt to make `chat_id` the active driver.
    ///
    /// Idempotent when the caller already holds the slot. A busy slot is
    /// first checked for expiry; a reclaimed stale holder is returned in
    /// `expired` so the caller can run its timeout flow outside any lock.
    pub async fn try_acquire(&self, chat_id: &str) -> Result<Acquire, DespachoError> {
        let active_key = keys::active(self.group);

        match self.kv.get(&active_key).await? {
            Some(holder) if holder == chat_id => {
                return Ok(Acquire {
                    outcome: AcquireOutcome::Held,
                    expired: None,
                });
            }
            Some(_) => {
                let expired = self.reclaim_expired().await?;
                if expired.is_none() {
                    return Ok(Acquire {
                        outcome: AcquireOutcome::Queued,
                        expired: None,
                    });
                }
                let outcome = self.activate_locked(Some(chat_id)).await?;
                return Ok(Acquire { outcome, expired });
            }
            None => {}
        }

        let outcome = self.activate_locked(Some(chat_id)).await?;
        Ok(Acquire {
            outcome,
            expired: None,
        })
    }

    /// Re-stamp the service window for the current holder.
    ///
    /// Called each time the holder is served a routes menu, so a driver
    /// actively choosing keeps the slot alive.
    pub async fn refresh_meta(&self, chat_id: &str) -> Result<(), DespachoError> {
        let meta = SlotMeta {
            chat_id: chat_id.to_string(),
            started_at: Utc::now().timestamp(),
        };
        let raw = serde_json::to_string(&meta)
            .map_err(|e| DespachoError::Internal(format!("slot meta encode: {e}")))?;
        self.kv
            .set_ttl(&keys::active_meta(self.group), &raw, self.tuning.meta_ttl)
            .await?;

        let active_key = keys::active(self.group);
        if !self.kv.expire(&active_key, self.tuning.slot_ttl).await? {
            // The short key lapsed between serves; reinstate it.
            self.kv
                .set_ttl(&active_key, chat_id, self.tuning.slot_ttl)
                .await?;
        }
        Ok(())
    }

    /// Clear the slot and activate the next waiter, returning who to notify.
    pub async fn release_and_next(&self) -> Result<Option<String>, DespachoError> {
        let lock_key = keys::group_lock(self.group);
        self.lock
            .with_lock(&lock_key, || async {
                self.kv.del(&keys::active(self.group)).await?;
                self.kv.del(&keys::active_meta(self.group)).await?;
                self.install_next().await
            })
            .await
    }

    /// Activate the next waiter if the slot is free. Sweeper entry point.
    pub async fn activate_next(&self) -> Result<Option<String>, DespachoError> {
        match self.activate_locked(None).await? {
            AcquireOutcome::OtherActivated(chat) => Ok(Some(chat)),
            _ => Ok(None),
        }
    }

    /// Reclaim an abandoned slot.
    ///
    /// Runs under the group's secondary reclaim lock; a contended lock means
    /// another process is already reclaiming, so this call just reports
    /// nothing. Returns the stale holder so the caller can run the timeout
    /// flow for it.
    pub async fn reclaim_expired(&self) -> Result<Option<String>, DespachoError> {
        let reclaim_key = keys::reclaim_lock(self.group);
        let nonce = Uuid::new_v4().to_string();
        if !self
            .kv
            .set_if_absent(&reclaim_key, &nonce, self.tuning.slot_ttl)
            .await?
        {
            return Ok(None);
        }

        let result = self.reclaim_inner().await;

        if let Err(e) = self.kv.del(&reclaim_key).await {
            warn!(group = %self.group, error = %e, "failed to release reclaim lock");
        }
        result
    }

    async fn reclaim_inner(&self) -> Result<Option<String>, DespachoError> {
        let meta_key = keys::active_meta(self.group);
        let Some(raw) = self.kv.get(&meta_key).await? else {
            return Ok(None);
        };

        let meta: SlotMeta = match serde_json::from_str(&raw) {
            Ok(meta) => meta,
            Err(e) => {
                // Unreadable meta cannot be aged; drop the slot outright.
                warn!(group = %self.group, error = %e, "corrupt slot meta, clearing slot");
                self.kv.del(&keys::active(self.group)).await?;
                self.kv.del(&meta_key).await?;
                return Ok(None);
            }
        };

        let age = Utc::now().timestamp() - meta.started_at;
        if age < self.tuning.slot_ttl.as_secs() as i64 {
            return Ok(None);
        }

        self.kv.del(&keys::active(self.group)).await?;
        self.kv.del(&meta_key).await?;
        debug!(group = %self.group, chat_id = meta.chat_id.as_str(), age, "reclaimed expired slot");
        Ok(Some(meta.chat_id))
    }

    /// Pick the next waiter and install it, under the group lock.
    ///
    /// With `preferred` set, reports `Held`/`Activated` relative to that
    /// chat; without it, any activation comes back as `OtherActivated`.
    async fn activate_locked(
        &self,
        preferred: Option<&str>,
    ) -> Result<AcquireOutcome, DespachoError> {
        let lock_key = keys::group_lock(self.group);
        self.lock
            .with_lock(&lock_key, || async {
                // Re-check under the lock; a competitor may have installed.
                match self.kv.get(&keys::active(self.group)).await? {
                    Some(holder) if preferred == Some(holder.as_str()) => {
                        return Ok(AcquireOutcome::Held);
                    }
                    Some(_) => return Ok(AcquireOutcome::Queued),
                    None => {}
                }

                match self.install_next().await? {
                    None => Ok(AcquireOutcome::Queued),
                    Some(next) if preferred == Some(next.as_str()) => {
                        Ok(AcquireOutcome::Activated)
                    }
                    Some(next) => Ok(AcquireOutcome::OtherActivated(next)),
                }
            })
            .await
    }

    /// Pop the queue and write the slot keys. Lock must be held.
    async fn install_next(&self) -> Result<Option<String>, DespachoError> {
        let Some(next) = self.queue.pick_next().await? else {
            return Ok(None);
        };

        let meta = SlotMeta {
            chat_id: next.clone(),
            started_at: Utc::now().timestamp(),
        };
        let raw = serde_json::to_string(&meta)
            .map_err(|e| DespachoError::Internal(format!("slot meta encode: {e}")))?;

        self.kv
            .set_ttl(&keys::active(self.group), &next, self.tuning.slot_ttl)
            .await?;
        self.kv
            .set_ttl(&keys::active_meta(self.group), &raw, self.tuning.meta_ttl)
            .await?;

        debug!(group = %self.group, chat_id = next.as_str(), "slot activated");
        Ok(Some(next))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use despacho_kv::LockSettings;
    use despacho_test_utils::MemoryKv;

    use super::*;
    use crate::queue::QueueTuning;
    use crate::queue::tests::StaticRanks;

    struct Fixture {
        kv: Arc<dyn KvStore>,
        ranks: Arc<StaticRanks>,
        slot: SlotController,
    }

    fn fixture() -> Fixture {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let ranks = Arc::new(StaticRanks::new());
        let lock = AdvisoryLock::new(kv.clone(), LockSettings::default());
        let queue = Arc::new(QueueEngine::new(
            kv.clone(),
            lock.clone(),
            ranks.clone(),
            QueueGroup::General,
            QueueTuning::default(),
        ));
        let slot = SlotController::new(
            kv.clone(),
            lock,
            queue,
            QueueGroup::General,
            SlotTuning::default(),
        );
        Fixture { kv, ranks, slot }
    }

    async fn backdate_meta(kv: &Arc<dyn KvStore>, chat: &str, age_secs: i64) {
        let meta = SlotMeta {
            chat_id: chat.to_string(),
            started_at: Utc::now().timestamp() - age_secs,
        };
        kv.set_ttl(
            &keys::active_meta(QueueGroup::General),
            &serde_json::to_string(&meta).unwrap(),
            Duration::from_secs(600),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn first_caller_activates_itself() {
        let f = fixture();
        f.ranks.set("1001", 50, false, false);
        f.slot.queue().enqueue("1001").await.unwrap();

        let acquire = f.slot.try_acquire("1001").await.unwrap();
        assert_eq!(acquire.outcome, AcquireOutcome::Activated);
        assert_eq!(acquire.expired, None);
        assert_eq!(f.slot.holder().await.unwrap().as_deref(), Some("1001"));
    }

    #[tokio::test]
    async fn try_acquire_is_idempotent_for_holder() {
        let f = fixture();
        f.ranks.set("1001", 50, false, false);
        f.slot.queue().enqueue("1001").await.unwrap();
        f.slot.try_acquire("1001").await.unwrap();

        let again = f.slot.try_acquire("1001").await.unwrap();
        assert_eq!(again.outcome, AcquireOutcome::Held);
    }

    #[tokio::test]
    async fn second_caller_queues_behind_live_holder() {
        let f = fixture();
        f.ranks.set("1001", 50, false, false);
        f.ranks.set("1002", 50, false, false);
        f.slot.queue().enqueue("1001").await.unwrap();
        f.slot.try_acquire("1001").await.unwrap();

        f.slot.queue().enqueue("1002").await.unwrap();
        let acquire = f.slot.try_acquire("1002").await.unwrap();
        assert_eq!(acquire.outcome, AcquireOutcome::Queued);
        assert_eq!(f.slot.holder().await.unwrap().as_deref(), Some("1001"));
        assert_eq!(f.slot.queue().waiting().await.unwrap(), ["1002"]);
    }

    #[tokio::test]
    async fn higher_priority_waiter_is_activated_instead_of_caller() {
        let f = fixture();
        f.ranks.set("vip", 99, false, false);
        f.ranks.set("low", 1, false, false);
        f.slot.queue().enqueue("vip").await.unwrap();
        f.slot.queue().enqueue("low").await.unwrap();

        let acquire = f.slot.try_acquire("low").await.unwrap();
        assert_eq!(
            acquire.outcome,
            AcquireOutcome::OtherActivated("vip".into())
        );
        assert_eq!(f.slot.holder().await.unwrap().as_deref(), Some("vip"));
        // The caller stays queued for the next hand-off.
        assert_eq!(f.slot.queue().waiting().await.unwrap(), ["low"]);
    }

    #[tokio::test]
    async fn release_hands_slot_to_next_waiter() {
        let f = fixture();
        f.ranks.set("1001", 50, false, false);
        f.ranks.set("1002", 40, false, false);
        f.slot.queue().enqueue("1001").await.unwrap();
        f.slot.try_acquire("1001").await.unwrap();
        f.slot.queue().enqueue("1002").await.unwrap();

        let next = f.slot.release_and_next().await.unwrap();
        assert_eq!(next.as_deref(), Some("1002"));
        assert_eq!(f.slot.holder().await.unwrap().as_deref(), Some("1002"));
    }

    #[tokio::test]
    async fn release_with_empty_queue_leaves_slot_free() {
        let f = fixture();
        f.ranks.set("1001", 50, false, false);
        f.slot.queue().enqueue("1001").await.unwrap();
        f.slot.try_acquire("1001").await.unwrap();

        assert_eq!(f.slot.release_and_next().await.unwrap(), None);
        assert_eq!(f.slot.holder().await.unwrap(), None);
    }

    #[tokio::test]
    async fn reclaim_ignores_fresh_slot() {
        let f = fixture();
        f.ranks.set("1001", 50, false, false);
        f.slot.queue().enqueue("1001").await.unwrap();
        f.slot.try_acquire("1001").await.unwrap();

        assert_eq!(f.slot.reclaim_expired().await.unwrap(), None);
        assert_eq!(f.slot.holder().await.unwrap().as_deref(), Some("1001"));
    }

    #[tokio::test]
    async fn reclaim_clears_stale_slot_and_reports_holder() {
        let f = fixture();
        f.kv
            .set_ttl(
                &keys::active(QueueGroup::General),
                "1001",
                Duration::from_secs(600),
            )
            .await
            .unwrap();
        backdate_meta(&f.kv, "1001", 31).await;

        let expired = f.slot.reclaim_expired().await.unwrap();
        assert_eq!(expired.as_deref(), Some("1001"));
        assert_eq!(f.slot.holder().await.unwrap(), None);
    }

    #[tokio::test]
    async fn try_acquire_reclaims_stale_holder_then_activates() {
        let f = fixture();
        f.ranks.set("1002", 50, false, false);

        // A crashed holder: active key lingering, meta 31s old.
        f.kv
            .set_ttl(
                &keys::active(QueueGroup::General),
                "1001",
                Duration::from_secs(600),
            )
            .await
            .unwrap();
        backdate_meta(&f.kv, "1001", 31).await;

        f.slot.queue().enqueue("1002").await.unwrap();
        let acquire = f.slot.try_acquire("1002").await.unwrap();

        assert_eq!(acquire.expired.as_deref(), Some("1001"));
        assert_eq!(acquire.outcome, AcquireOutcome::Activated);
        assert_eq!(f.slot.holder().await.unwrap().as_deref(), Some("1002"));
    }

    #[tokio::test]
    async fn activate_next_noop_while_slot_held() {
        let f = fixture();
        f.ranks.set("1001", 50, false, false);
        f.ranks.set("1002", 40, false, false);
        f.slot.queue().enqueue("1001").await.unwrap();
        f.slot.try_acquire("1001").await.unwrap();
        f.slot.queue().enqueue("1002").await.unwrap();

        assert_eq!(f.slot.activate_next().await.unwrap(), None);
        assert_eq!(f.slot.holder().await.unwrap().as_deref(), Some("1001"));
    }

    #[tokio::test]
    async fn activate_next_installs_waiter_on_free_slot() {
        let f = fixture();
        f.ranks.set("1002", 40, false, false);
        f.slot.queue().enqueue("1002").await.unwrap();

        assert_eq!(
            f.slot.activate_next().await.unwrap().as_deref(),
            Some("1002")
        );
        assert_eq!(f.slot.holder().await.unwrap().as_deref(), Some("1002"));
    }

    #[tokio::test]
    async fn refresh_meta_restamps_window() {
        let f = fixture();
        f.ranks.set("1001", 50, false, false);
        f.slot.queue().enqueue("1001").await.unwrap();
        f.slot.try_acquire("1001").await.unwrap();
        backdate_meta(&f.kv, "1001", 29).await;

        f.slot.refresh_meta("1001").await.unwrap();

        let raw = f
            .kv
            .get(&keys::active_meta(QueueGroup::General))
            .await
            .unwrap()
            .unwrap();
        let meta: SlotMeta = serde_json::from_str(&raw).unwrap();
        assert!(Utc::now().timestamp() - meta.started_at < 2);
        assert_eq!(f.slot.holder().await.unwrap().as_deref(), Some("1001"));
    }
}
