// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared KV store trait.
//!
//! Thin interface over a networked key-value store. All cross-task
//! coordination in despacho goes through an implementation of this trait;
//! no cross-key atomicity is assumed, and every method may fail with a
//! transient [`DespachoError::Kv`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DespachoError;

/// Atomic primitives the orchestration core is built on.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, DespachoError>;

    /// Set a value with an expiry. A zero TTL is rounded up to one second.
    async fn set_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DespachoError>;

    /// Set only if the key does not exist. Returns whether the write won.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, DespachoError>;

    async fn del(&self, key: &str) -> Result<(), DespachoError>;

    /// Refresh the TTL of an existing key. Returns false if the key is gone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DespachoError>;

    /// Append to the tail of a list; returns the new length.
    async fn rpush(&self, key: &str, value: &str) -> Result<i64, DespachoError>;

    /// Inclusive range read; negative indices count from the tail.
    async fn lrange(&self, key: &str, start: i64, stop: i64)
    -> Result<Vec<String>, DespachoError>;

    /// Remove up to `count` occurrences of `value`; returns how many went.
    async fn lrem(&self, key: &str, count: i64, value: &str) -> Result<i64, DespachoError>;

    /// Pop from the head of a list.
    async fn lpop(&self, key: &str) -> Result<Option<String>, DespachoError>;

    /// Keep only the inclusive range, dropping everything else.
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), DespachoError>;

    /// Non-blocking key scan by glob pattern.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, DespachoError>;
}
