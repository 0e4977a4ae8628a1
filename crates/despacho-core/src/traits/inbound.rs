// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound update handling trait, implemented by the session engine and
//! consumed by the webhook adapter.

use async_trait::async_trait;

use crate::error::DespachoError;

/// Processes one inbound text message from a chat.
///
/// The caller guarantees per-chat ordering: two updates from the same chat
/// are never in flight concurrently. Updates from different chats run in
/// parallel.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle_update(&self, chat_id: &str, text: &str) -> Result<(), DespachoError>;
}
