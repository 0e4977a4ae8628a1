// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound chat transport trait.

use async_trait::async_trait;

use crate::error::DespachoError;

/// Sends a text message to a chat.
///
/// Delivery failures surface as transient [`DespachoError::Channel`] and are
/// logged by callers, never allowed to block a state transition: the driver
/// can resend, and response timers guarantee eventual progress.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), DespachoError>;
}
