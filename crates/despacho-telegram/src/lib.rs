// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram adapter for the despacho dispatcher: the inbound webhook
//! server (with per-chat ordered processing) and the outbound sender.

pub mod sender;
pub mod webhook;

pub use sender::{MAX_MESSAGE_CHARS, TelegramSender, split_chunks};
pub use webhook::{WebhookState, router, start_webhook};
