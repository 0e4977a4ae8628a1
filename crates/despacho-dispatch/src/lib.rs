// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch orchestration core: per-group fair-priority queues with
//! blocklist deferral, the single-active-slot controller, and response
//! timer tokens.
//!
//! Everything here is pure coordination over the shared KV store. Chat
//! sends, session mutation, and repository access belong to the session
//! layer; operations return the chat ids to act on instead of acting.

pub mod queue;
pub mod ranking;
pub mod slot;
pub mod timer;

pub use queue::{QueueEngine, QueueTuning};
pub use ranking::{Member, RankInputs, RankSource, cmp_members, sort_members};
pub use slot::{Acquire, AcquireOutcome, SlotController, SlotMeta, SlotTuning};
pub use timer::TimerTokens;
