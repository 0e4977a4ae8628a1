// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound sender over the Telegram Bot API via teloxide.
//!
//! Long texts (the daily log dump) are split at line boundaries into
//! chunks under the transport limit. Failures surface as transient
//! channel errors; callers log and move on.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Recipient};
use tracing::debug;

use despacho_core::{ChatSender, DespachoError};

/// Characters per outbound message, under Telegram's 4096 hard cap.
pub const MAX_MESSAGE_CHARS: usize = 3_500;

pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot_token: &str) -> Result<Self, DespachoError> {
        if bot_token.is_empty() {
            return Err(DespachoError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }
        Ok(Self {
            bot: Bot::new(bot_token),
        })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

#[async_trait]
impl ChatSender for TelegramSender {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), DespachoError> {
        let id: i64 = chat_id.parse().map_err(|_| DespachoError::Channel {
            message: format!("invalid chat id: {chat_id}"),
            source: None,
        })?;

        for chunk in split_chunks(text, MAX_MESSAGE_CHARS) {
            self.bot
                .send_message(Recipient::Id(ChatId(id)), chunk)
                .await
                .map_err(|e| DespachoError::Channel {
                    message: format!("failed to send message: {e}"),
                    source: Some(Box::new(e)),
                })?;
        }

        debug!(chat_id, chars = text.len(), "message delivered");
        Ok(())
    }
}

/// Split text into chunks of at most `max` characters, preferring line
/// boundaries. A single line longer than `max` is split mid-line.
pub fn split_chunks(text: &str, max: usize) -> Vec<String> {
    if text.len() <= max {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split('\n') {
        let mut line = line;
        // Hard-split oversized lines.
        while line.len() > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let (head, tail) = line.split_at(floor_char_boundary(line, max));
            chunks.push(head.to_string());
            line = tail;
        }

        let needed = line.len() + usize::from(!current.is_empty());
        if !current.is_empty() && current.len() + needed > max {
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

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
