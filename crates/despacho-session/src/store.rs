// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! KV-backed session store.
//!
//! Sessions are JSON at `session:<chatId>`; every save refreshes the idle
//! TTL, so an active conversation never expires mid-flow and an abandoned
//! one disappears on its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use despacho_core::{DespachoError, DriverSession, KvStore};
use despacho_kv::keys;

#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub async fn load(&self, chat_id: &str) -> Result<Option<DriverSession>, DespachoError> {
        let Some(raw) = self.kv.get(&keys::session(chat_id)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| DespachoError::kv_msg(format!("corrupt session for {chat_id}: {e}")))
    }

    /// Persist the session, stamping `updated_at` and refreshing the TTL.
    pub async fn save(&self, session: &mut DriverSession) -> Result<(), DespachoError> {
        session.updated_at = Utc::now().to_rfc3339();
        let raw = serde_json::to_string(session)
            .map_err(|e| DespachoError::Internal(format!("session encode: {e}")))?;
        self.kv
            .set_ttl(&keys::session(&session.chat_id), &raw, self.ttl)
            .await
    }

    pub async fn clear(&self, chat_id: &str) -> Result<(), DespachoError> {
        self.kv.del(&keys::session(chat_id)).await
    }
}
