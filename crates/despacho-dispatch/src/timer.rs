// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response-timer tokens.
//!
//! Arming a timer writes a fresh nonce at `route:timeout:<chatId>`; the
//! deferred callback is authoritative only while the persisted token still
//! matches. Re-arming or disarming invalidates any callback still in
//! flight, which is what makes `handle_timeout` safe to schedule from both
//! in-process timers and the sweeper.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use despacho_core::{DespachoError, KvStore};
use despacho_kv::keys;

pub struct TimerTokens {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl TimerTokens {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// The response window; in-process timers sleep this long before firing.
    pub fn window(&self) -> Duration {
        self.ttl
    }

    /// Write a fresh token for the chat, invalidating any armed callback.
    pub async fn arm(&self, chat_id: &str) -> Result<String, DespachoError> {
        let token = Uuid::new_v4().to_string();
        self.kv
            .set_ttl(&keys::timer(chat_id), &token, self.ttl)
            .await?;
        Ok(token)
    }

    /// Whether `token` is still the live token for the chat.
    pub async fn is_current(&self, chat_id: &str, token: &str) -> Result<bool, DespachoError> {
        Ok(self
            .kv
            .get(&keys::timer(chat_id))
            .await?
            .is_some_and(|live| live == token))
    }

    pub async fn disarm(&self, chat_id: &str) -> Result<(), DespachoError> {
        self.kv.del(&keys::timer(chat_id)).await
    }
}

#[cfg(test)]
mod tests {
    use despacho_test_utils::MemoryKv;

    use super::*;

    fn tokens() -> TimerTokens {
        TimerTokens::new(Arc::new(MemoryKv::new()), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn armed_token_is_current_until_disarmed() {
        let timers = tokens();
        let token = timers.arm("1001").await.unwrap();

        assert!(timers.is_current("1001", &token).await.unwrap());
        timers.disarm("1001").await.unwrap();
        assert!(!timers.is_current("1001", &token).await.unwrap());
    }

    #[tokio::test]
    async fn rearm_invalidates_previous_token() {
        let timers = tokens();
        let first = timers.arm("1001").await.unwrap();
        let second = timers.arm("1001").await.unwrap();

        assert_ne!(first, second);
        assert!(!timers.is_current("1001", &first).await.unwrap());
        assert!(timers.is_current("1001", &second).await.unwrap());
    }

    #[tokio::test]
    async fn tokens_are_scoped_per_chat() {
        let timers = tokens();
        let t1 = timers.arm("1001").await.unwrap();
        let t2 = timers.arm("1002").await.unwrap();

        timers.disarm("1001").await.unwrap();
        assert!(!timers.is_current("1001", &t1).await.unwrap());
        assert!(timers.is_current("1002", &t2).await.unwrap());
    }
}
