// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only per-day ring of operational events.
//!
//! One `log:YYYY-MM-DD` list per day, right-pushed text lines trimmed to the
//! last 500. Feeds the operator dashboard and `/logdiario`; not authoritative
//! for recovery, so appends are best-effort and never fail the caller.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use despacho_core::{DespachoError, KvStore};

use crate::keys;

/// Maximum lines kept per day key.
const MAX_LINES: i64 = 500;

/// Maximum characters per outbound chat message when dumping the log.
pub const CHUNK_CHARS: usize = 3_500;

#[derive(Clone)]
pub struct EventJournal {
    kv: Arc<dyn KvStore>,
}

impl EventJournal {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Append one event line: `[HH:MM:SS] action=X k=v k=v...`.
    ///
    /// Best-effort: a KV failure is logged and swallowed so journaling never
    /// blocks a state transition.
    pub async fn append(&self, action: &str, fields: &[(&str, &str)]) {
        let now = Utc::now();
        let line = format_line(&now.format("%H:%M:%S").to_string(), action, fields);
        let key = keys::day_log(&now.format("%Y-%m-%d").to_string());

        if let Err(e) = self.push_trimmed(&key, &line).await {
            warn!(action, error = %e, "failed to append journal event");
        }
    }

    async fn push_trimmed(&self, key: &str, line: &str) -> Result<(), DespachoError> {
        self.kv.rpush(key, line).await?;
        self.kv.ltrim(key, -MAX_LINES, -1).await?;
        Ok(())
    }

    /// All lines recorded today, oldest first.
    pub async fn today_lines(&self) -> Result<Vec<String>, DespachoError> {
        let key = keys::day_log(&Utc::now().format("%Y-%m-%d").to_string());
        self.kv.lrange(&key, 0, -1).await
    }
}

fn format_line(clock: &str, action: &str, fields: &[(&str, &str)]) -> String {
    let mut line = format!("[{clock}] action={action}");
    for (k, v) in fields {
        line.push(' ');
        line.push_str(k);
        line.push('=');
        line.push_str(v);
    }
    line
}

/// Split journal lines into chat-sized chunks, each at most `max_chars`.
///
/// Lines are never split mid-line; a single oversized line becomes its own
/// chunk (the transport truncates, which is acceptable for a dashboard dump).
pub fn chunk_lines(lines: &[String], max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in lines {
        let needed = line.len() + usize::from(!current.is_empty());
        if !current.is_empty() && current.len() + needed > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
