// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted-state key layout.
//!
//! Every key the dispatcher writes to the shared KV store is built here, so
//! the layout stays greppable and collision-free.

use despacho_core::QueueGroup;

pub fn session(chat_id: &str) -> String {
    format!("session:{chat_id}")
}

pub fn queue_list(group: QueueGroup) -> String {
    format!("queue:list:{group}")
}

pub fn active(group: QueueGroup) -> String {
    format!("queue:active:{group}")
}

pub fn active_meta(group: QueueGroup) -> String {
    format!("queue:active:meta:{group}")
}

pub fn group_lock(group: QueueGroup) -> String {
    format!("queue:lock:{group}")
}

pub fn reclaim_lock(group: QueueGroup) -> String {
    format!("queue:reclaim:lock:{group}")
}

pub fn member(chat_id: &str) -> String {
    format!("queue:member:{chat_id}")
}

pub fn empty_since(group: QueueGroup) -> String {
    format!("queue:empty_since:{group}")
}

pub fn timer(chat_id: &str) -> String {
    format!("route:timeout:{chat_id}")
}

pub fn day_log(date: &str) -> String {
    format!("log:{date}")
}

pub fn blocklist_cache(driver_id: &str) -> String {
    format!("blocklist:cache:driver:{driver_id}")
}

pub fn sync_flag() -> String {
    "sync:in_progress".to_string()
}
