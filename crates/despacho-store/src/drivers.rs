// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Postgres driver registry. Populated by the external ETL; read-only here.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::Row;

use despacho_core::{BlocklistStatus, DespachoError, Driver, DriverRepository, VehicleType};

#[derive(Clone)]
pub struct PgDriverRepository {
    pool: PgPool,
}

impl PgDriverRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> DespachoError {
    DespachoError::Database {
        source: Box::new(e),
    }
}

#[async_trait]
impl DriverRepository for PgDriverRepository {
    async fn find_by_id(&self, driver_id: &str) -> Result<Option<Driver>, DespachoError> {
        let row = sqlx::query(
            "SELECT id, name, vehicle_type, priority_score
             FROM drivers
             WHERE id = $1",
        )
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let score: i32 = row.try_get("priority_score").map_err(db_err)?;
        Ok(Some(Driver {
            id: row.try_get("id").map_err(db_err)?,
            name: row.try_get("name").map_err(db_err)?,
            vehicle_type: VehicleType::new(row.try_get::<String, _>("vehicle_type").map_err(db_err)?),
            priority_score: score.clamp(0, 100) as u8,
        }))
    }

    async fn blocklist_status(&self, driver_id: &str) -> Result<BlocklistStatus, DespachoError> {
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM blocklist WHERE driver_id = $1",
        )
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        // Absent rows and anything but ACTIVE mean the driver is clear.
        Ok(match status.as_deref() {
            Some("ACTIVE") => BlocklistStatus::Active,
            _ => BlocklistStatus::Inactive,
        })
    }
}
