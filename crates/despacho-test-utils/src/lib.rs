// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for the despacho workspace: an in-memory KV store honoring
//! TTLs, fake driver/route repositories with an atomic claim, a recording
//! chat sender, and counting export/sync stubs.

pub mod fakes;
pub mod memory_kv;

pub use fakes::{CountingExport, FakeDrivers, FakeRoutes, RecordingSender, RecordingSync};
pub use memory_kv::MemoryKv;
