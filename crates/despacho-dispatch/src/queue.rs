// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-group fair-priority queue with blocklist deferral.
//!
//! One engine per [`QueueGroup`]. The waiting list lives at
//! `queue:list:<group>`; every mutation re-resolves ranks for all members
//! and rewrites the list in order, so the head is always the next driver
//! to serve. Mutations run under the group's advisory lock; `pick_next`
//! does not lock because the slot controller already holds it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use despacho_core::{DespachoError, KvStore, QueueGroup};
use despacho_kv::{AdvisoryLock, keys};

use crate::ranking::{Member, RankSource, sort_members};

/// Queue windows, from `queue.*` config.
#[derive(Debug, Clone)]
pub struct QueueTuning {
    /// TTL of membership markers (matches the session idle expiry).
    pub member_ttl: Duration,
    /// Deferral before a queue of only blocklisted drivers is served.
    pub blocklist_wait: Duration,
}

impl Default for QueueTuning {
    fn default() -> Self {
        Self {
            member_ttl: Duration::from_secs(10_800),
            blocklist_wait: Duration::from_secs(120),
        }
    }
}

pub struct QueueEngine {
    kv: Arc<dyn KvStore>,
    lock: AdvisoryLock,
    rank: Arc<dyn RankSource>,
    group: QueueGroup,
    tuning: QueueTuning,
}

impl QueueEngine {
    pub fn new(
        kv: Arc<dyn KvStore>,
        lock: AdvisoryLock,
        rank: Arc<dyn RankSource>,
        group: QueueGroup,
        tuning: QueueTuning,
    ) -> Self {
        Self {
            kv,
            lock,
            rank,
            group,
            tuning,
        }
    }

    pub fn group(&self) -> QueueGroup {
        self.group
    }

    /// Add (or re-rank) a chat in the waiting list.
    ///
    /// Idempotent: an existing occurrence is removed before the list is
    /// re-ranked, so enqueueing twice yields the same position as once.
    /// Returns the 1-based position after ranking.
    pub async fn enqueue(&self, chat_id: &str) -> Result<usize, DespachoError> {
        let lock_key = keys::group_lock(self.group);
        self.lock
            .with_lock(&lock_key, || self.enqueue_locked(chat_id))
            .await
    }

    async fn enqueue_locked(&self, chat_id: &str) -> Result<usize, DespachoError> {
        let list_key = keys::queue_list(self.group);
        let mut chats = self.kv.lrange(&list_key, 0, -1).await?;
        chats.retain(|c| c != chat_id);
        chats.push(chat_id.to_string());

        let mut members = self.resolve_members(&chats).await?;
        sort_members(&mut members);

        self.rewrite_list(&list_key, &members).await?;
        self.kv
            .set_ttl(
                &keys::member(chat_id),
                &self.group.to_string(),
                self.tuning.member_ttl,
            )
            .await?;

        let position = members
            .iter()
            .position(|m| m.chat_id == chat_id)
            .map(|i| i + 1)
            .ok_or_else(|| DespachoError::Internal("enqueued chat missing after sort".into()))?;

        debug!(group = %self.group, chat_id, position, "enqueued");
        Ok(position)
    }

    /// Pop the next chat to serve, honoring the blocklist deferral.
    ///
    /// Must be called while holding the group lock (the slot controller's
    /// critical sections do). Blocklisted drivers are only served once the
    /// queue has held nothing else for the full deferral window; the
    /// deferral timestamp is global per group, so consecutive blocklisted
    /// drivers do not restart it between them.
    pub async fn pick_next(&self) -> Result<Option<String>, DespachoError> {
        let list_key = keys::queue_list(self.group);
        let deferral_key = keys::empty_since(self.group);

        let chats = self.kv.lrange(&list_key, 0, -1).await?;
        if chats.is_empty() {
            self.kv.del(&deferral_key).await?;
            return Ok(None);
        }

        let members = self.resolve_members(&chats).await?;
        let (mut blocked, mut clear): (Vec<Member>, Vec<Member>) =
            members.into_iter().partition(|m| m.inputs.blocklisted);
        sort_members(&mut clear);
        sort_members(&mut blocked);

        if let Some(head) = clear.first() {
            self.kv.del(&deferral_key).await?;
            let chat = head.chat_id.clone();
            self.take(&list_key, &chat).await?;
            return Ok(Some(chat));
        }

        // Only blocklisted drivers remain: age the queue before serving.
        let now = Utc::now().timestamp();
        match self.kv.get(&deferral_key).await? {
            None => {
                self.kv
                    .set_ttl(&deferral_key, &now.to_string(), self.tuning.member_ttl)
                    .await?;
                Ok(None)
            }
            Some(since) => {
                let since: i64 = since.parse().unwrap_or(now);
                if now - since < self.tuning.blocklist_wait.as_secs() as i64 {
                    return Ok(None);
                }
                self.kv.del(&deferral_key).await?;
                let Some(head) = blocked.first() else {
                    return Ok(None);
                };
                let chat = head.chat_id.clone();
                self.take(&list_key, &chat).await?;
                debug!(group = %self.group, chat_id = chat.as_str(), "serving blocklisted driver after deferral");
                Ok(Some(chat))
            }
        }
    }

    /// Remove a chat from the waiting list and clear its marker.
    pub async fn remove(&self, chat_id: &str) -> Result<(), DespachoError> {
        let lock_key = keys::group_lock(self.group);
        self.lock
            .with_lock(&lock_key, || async {
                self.take(&keys::queue_list(self.group), chat_id).await
            })
            .await
    }

    /// Current waiting list, head first (observability and tests).
    pub async fn waiting(&self) -> Result<Vec<String>, DespachoError> {
        self.kv.lrange(&keys::queue_list(self.group), 0, -1).await
    }

    async fn take(&self, list_key: &str, chat_id: &str) -> Result<(), DespachoError> {
        self.kv.lrem(list_key, 0, chat_id).await?;
        self.kv.del(&keys::member(chat_id)).await?;
        Ok(())
    }

    async fn resolve_members(&self, chats: &[String]) -> Result<Vec<Member>, DespachoError> {
        let mut members = Vec::with_capacity(chats.len());
        for (original_index, chat_id) in chats.iter().enumerate() {
            let inputs = match self.rank.rank_inputs(chat_id).await {
                Ok(inputs) => inputs,
                Err(e) => {
                    // A member we cannot rank still waits; it just ranks last.
                    warn!(chat_id, error = %e, "rank resolution failed, using defaults");
                    Default::default()
                }
            };
            members.push(Member {
                chat_id: chat_id.clone(),
                inputs,
                original_index,
            });
        }
        Ok(members)
    }

    async fn rewrite_list(&self, list_key: &str, members: &[Member]) -> Result<(), DespachoError> {
        self.kv.del(list_key).await?;
        for member in members {
            self.kv.rpush(list_key, &member.chat_id).await?;
        }
        Ok(())
    }
}
