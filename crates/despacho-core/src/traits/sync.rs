// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trigger for the external ETL that refreshes driver and route tables.
//! The ETL itself is an external collaborator; the core only starts it and
//! waits, holding the global sync gate meanwhile.

use async_trait::async_trait;

use crate::error::DespachoError;
use crate::types::SyncScope;

#[async_trait]
pub trait SyncRunner: Send + Sync {
    async fn run(&self, scope: SyncScope) -> Result<(), DespachoError>;
}
