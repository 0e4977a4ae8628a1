// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assignment-overview export sink.
//!
//! Posts each claim to the external spreadsheet writeback endpoint. The
//! route table is authoritative: a failed export surfaces as a transient
//! [`DespachoError::Export`] for the caller to journal, nothing more.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use despacho_core::{DespachoError, ExportSink};

#[derive(Debug, Serialize)]
struct ExportPayload<'a> {
    route_id: &'a str,
    driver_id: &'a str,
}

/// HTTP JSON export to the configured writeback endpoint.
#[derive(Clone)]
pub struct HttpExportSink {
    client: reqwest::Client,
    url: String,
}

impl HttpExportSink {
    pub fn new(url: String) -> Result<Self, DespachoError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| DespachoError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ExportSink for HttpExportSink {
    async fn set_assigned(&self, route_id: &str, driver_id: &str) -> Result<(), DespachoError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ExportPayload {
                route_id,
                driver_id,
            })
            .send()
            .await
            .map_err(|e| DespachoError::Export(format!("export request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DespachoError::Export(format!(
                "export endpoint returned {status}: {body}"
            )));
        }

        debug!(route_id, driver_id, "assignment exported");
        Ok(())
    }
}

/// Sink used when no export endpoint is configured.
pub struct DisabledExportSink;

#[async_trait]
impl ExportSink for DisabledExportSink {
    async fn set_assigned(&self, route_id: &str, driver_id: &str) -> Result<(), DespachoError> {
        debug!(route_id, driver_id, "export disabled, skipping writeback");
        Ok(())
    }
}
