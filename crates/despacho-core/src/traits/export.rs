// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assignment export sink (spreadsheet writeback). Best-effort only: the
//! route table is authoritative, a failed export is journaled and never
//! reverses a claim.

use async_trait::async_trait;

use crate::error::DespachoError;

#[async_trait]
pub trait ExportSink: Send + Sync {
    async fn set_assigned(&self, route_id: &str, driver_id: &str) -> Result<(), DespachoError>;
}
