// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relational store and outbound HTTP adapters for despacho: the Postgres
//! driver registry and route table (with the conditional claim), the
//! assignment export sink, and the external ETL trigger.

pub mod drivers;
pub mod export;
pub mod routes;
pub mod sync;

use despacho_core::DespachoError;
use sqlx::postgres::PgPoolOptions;

pub use drivers::PgDriverRepository;
pub use export::{DisabledExportSink, HttpExportSink};
pub use routes::PgRouteRepository;
pub use sync::{DisabledSyncRunner, HttpSyncRunner};

/// Open the shared Postgres pool for both repositories.
pub async fn connect(url: &str, max_connections: u32) -> Result<sqlx::PgPool, DespachoError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(|e| DespachoError::Database {
            source: Box::new(e),
        })
}
