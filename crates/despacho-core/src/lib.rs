// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the despacho route dispatcher.
//!
//! Provides the foundational error type, domain types, and adapter traits
//! used throughout the despacho workspace. Adapter implementations live in
//! their own crates and are wired together by the binary's composition root.

pub mod error;
pub mod traits;
pub mod types;

pub use error::DespachoError;
pub use traits::{
    ChatSender, DriverRepository, ExportSink, KvStore, RouteRepository, SyncRunner, UpdateHandler,
};
pub use types::{
    BlocklistStatus, Driver, DriverSession, QueueGroup, Route, RouteRef, RouteStatus,
    SessionState, SyncScope, VehicleType, menu_order,
};
