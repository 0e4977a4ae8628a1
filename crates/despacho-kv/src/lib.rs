// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared KV layer for the despacho dispatcher.
//!
//! Provides the Redis [`despacho_core::KvStore`] implementation, the advisory
//! distributed lock, the per-day event journal, and the persisted-state key
//! layout every other crate goes through.

pub mod journal;
pub mod keys;
pub mod lock;
pub mod redis;

pub use journal::{EventJournal, chunk_lines};
pub use lock::{AdvisoryLock, LockSettings};
pub use redis::RedisKv;
