// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driver registry trait. The registry is populated by the external ETL;
//! the core only reads it.

use async_trait::async_trait;

use crate::error::DespachoError;
use crate::types::{BlocklistStatus, Driver};

#[async_trait]
pub trait DriverRepository: Send + Sync {
    async fn find_by_id(&self, driver_id: &str) -> Result<Option<Driver>, DespachoError>;

    /// Administrative blocklist state. Unknown drivers are `Inactive`.
    async fn blocklist_status(&self, driver_id: &str) -> Result<BlocklistStatus, DespachoError>;
}
