// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External ETL trigger.
//!
//! The spreadsheet import that refreshes driver and route tables runs as a
//! separate service; an admin sync here just calls its endpoint and waits.
//! The request timeout matches the global sync gate: the ETL is allowed up
//! to half an hour.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use despacho_core::{DespachoError, SyncRunner, SyncScope};

#[derive(Debug, Serialize)]
struct SyncRequest {
    scope: SyncScope,
}

/// HTTP trigger for the external ETL endpoint.
#[derive(Clone)]
pub struct HttpSyncRunner {
    client: reqwest::Client,
    url: String,
}

impl HttpSyncRunner {
    pub fn new(url: String, max_wait: Duration) -> Result<Self, DespachoError> {
        let client = reqwest::Client::builder()
            .timeout(max_wait)
            .build()
            .map_err(|e| DespachoError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl SyncRunner for HttpSyncRunner {
    async fn run(&self, scope: SyncScope) -> Result<(), DespachoError> {
        info!(?scope, "triggering external sync");

        let response = self
            .client
            .post(&self.url)
            .json(&SyncRequest { scope })
            .send()
            .await
            .map_err(|e| DespachoError::Internal(format!("sync trigger failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DespachoError::Internal(format!(
                "sync endpoint returned {status}: {body}"
            )));
        }

        info!(?scope, "external sync finished");
        Ok(())
    }
}

/// Runner used when no ETL endpoint is configured; admin syncs fail fast
/// with a clear message instead of silently doing nothing.
pub struct DisabledSyncRunner;

#[async_trait]
impl SyncRunner for DisabledSyncRunner {
    async fn run(&self, _scope: SyncScope) -> Result<(), DespachoError> {
        Err(DespachoError::Config(
            "sync.etl_url is not configured".into(),
        ))
    }
}
