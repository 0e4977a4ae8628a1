// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits. External collaborators (chat transport, registry,
//! route table, export sink, ETL trigger) and the shared KV store all sit
//! behind these seams so the orchestration core stays testable.

pub mod chat;
pub mod drivers;
pub mod export;
pub mod inbound;
pub mod kv;
pub mod routes;
pub mod sync;

pub use chat::ChatSender;
pub use drivers::DriverRepository;
pub use export::ExportSink;
pub use inbound::UpdateHandler;
pub use kv::KvStore;
pub use routes::RouteRepository;
pub use sync::SyncRunner;
