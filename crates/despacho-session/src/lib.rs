// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driver session layer: the conversational state machine, its KV-backed
//! session store, rank resolution for the queue engine, operator commands,
//! and the per-group slot sweepers.

pub mod admin;
pub mod engine;
pub mod faq;
pub mod messages;
pub mod ranks;
pub mod store;
pub mod sweeper;

pub use engine::{Engine, EngineParts};
pub use ranks::SessionRanks;
pub use store::SessionStore;
pub use sweeper::spawn_sweepers;
