// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator commands: sync handshakes and the daily log dump.
//!
//! `/sync` (alias `/atualizar_dados`) and `/syncDriver` start a password
//! handshake; the next message from that chat is checked against the shared
//! secret. While a sync runs, the global gate at `sync:in_progress` turns
//! all non-admin traffic away.

use chrono::Utc;
use tracing::warn;

use despacho_core::{DespachoError, DriverSession, SessionState, SyncScope};
use despacho_kv::journal::CHUNK_CHARS;
use despacho_kv::{chunk_lines, keys};

use crate::engine::Engine;
use crate::messages;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AdminCommand {
    SyncAll,
    SyncDrivers,
    DumpLog,
}

pub(crate) fn parse_command(text: &str) -> Option<AdminCommand> {
    match text {
        "/sync" | "/atualizar_dados" => Some(AdminCommand::SyncAll),
        "/syncDriver" => Some(AdminCommand::SyncDrivers),
        "/logdiario" => Some(AdminCommand::DumpLog),
        _ => None,
    }
}

fn scope_name(scope: SyncScope) -> &'static str {
    match scope {
        SyncScope::All => "all",
        SyncScope::Drivers => "drivers",
    }
}

impl Engine {
    pub(crate) async fn handle_admin_command(
        &self,
        chat_id: &str,
        cmd: AdminCommand,
    ) -> Result<(), DespachoError> {
        match cmd {
            AdminCommand::DumpLog => self.dump_daily_log(chat_id).await,
            AdminCommand::SyncAll => self.begin_sync_handshake(chat_id, SyncScope::All).await,
            AdminCommand::SyncDrivers => {
                self.begin_sync_handshake(chat_id, SyncScope::Drivers).await
            }
        }
    }

    async fn dump_daily_log(&self, chat_id: &str) -> Result<(), DespachoError> {
        let lines = self.journal.today_lines().await?;
        if lines.is_empty() {
            self.say(chat_id, messages::LOG_EMPTY).await;
            return Ok(());
        }
        for chunk in chunk_lines(&lines, CHUNK_CHARS) {
            self.say(chat_id, &chunk).await;
        }
        Ok(())
    }

    async fn begin_sync_handshake(
        &self,
        chat_id: &str,
        scope: SyncScope,
    ) -> Result<(), DespachoError> {
        let mut session = match self.sessions.load(chat_id).await? {
            Some(session) => session,
            None => DriverSession::new(chat_id, Utc::now().to_rfc3339()),
        };
        session.state = SessionState::AwaitingSyncPassword { scope };
        self.sessions.save(&mut session).await?;
        self.say(chat_id, messages::ASK_SYNC_PASSWORD).await;
        Ok(())
    }

    /// The message after a sync command: the shared secret, or a rejection.
    pub(crate) async fn handle_sync_password(
        &self,
        session: &mut DriverSession,
        scope: SyncScope,
        text: &str,
    ) -> Result<(), DespachoError> {
        let chat_id = session.chat_id.clone();

        if text != self.sync_password {
            self.sessions.clear(&chat_id).await?;
            self.say(&chat_id, messages::SYNC_WRONG_PASSWORD).await;
            self.journal
                .append("sync_rejected", &[("chat", &chat_id)])
                .await;
            return Ok(());
        }

        // Close the gate before anything else; it expires on its own if the
        // process dies mid-sync.
        self.kv
            .set_ttl(&keys::sync_flag(), "1", self.sync_flag_ttl)
            .await?;
        self.sessions.clear(&chat_id).await?;
        self.journal
            .append(
                "sync_started",
                &[("chat", &chat_id), ("scope", scope_name(scope))],
            )
            .await;
        self.say(&chat_id, messages::SYNC_STARTED).await;

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_sync(chat_id, scope).await;
        });
        Ok(())
    }

    /// The long-running sync itself: trigger the ETL, reopen the gate,
    /// invalidate cached blocklist verdicts, report back to the admin.
    async fn run_sync(&self, admin_chat: String, scope: SyncScope) {
        let result = self.sync.run(scope).await;

        if let Err(e) = self.kv.del(&keys::sync_flag()).await {
            warn!(error = %e, "failed to clear sync gate, ttl will expire it");
        }

        match result {
            Ok(()) => {
                // The registry changed under the caches.
                match self.kv.scan("blocklist:cache:driver:*").await {
                    Ok(cache_keys) => {
                        for key in cache_keys {
                            let _ = self.kv.del(&key).await;
                        }
                    }
                    Err(e) => warn!(error = %e, "blocklist cache invalidation failed"),
                }
                self.journal
                    .append("sync_done", &[("scope", scope_name(scope))])
                    .await;
                self.say(&admin_chat, messages::SYNC_DONE).await;
            }
            Err(e) => {
                warn!(error = %e, "external sync failed");
                self.journal
                    .append("sync_failed", &[("scope", scope_name(scope))])
                    .await;
                self.say(&admin_chat, messages::SYNC_FAILED).await;
            }
        }
    }
}
