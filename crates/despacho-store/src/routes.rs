// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Postgres route table: listing and the conditional claim.
//!
//! The claim is a single predicate UPDATE; its affected-row count is the
//! whole concurrency story. Two drivers racing for the same route hit the
//! same row, the predicate holds for exactly one of them, and the loser
//! re-renders the menu.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::Row;
use tracing::debug;

use despacho_core::{
    DespachoError, Route, RouteRepository, RouteStatus, VehicleType, menu_order,
};

#[derive(Clone)]
pub struct PgRouteRepository {
    pool: PgPool,
}

impl PgRouteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> DespachoError {
    DespachoError::Database {
        source: Box::new(e),
    }
}

fn parse_status(raw: &str) -> Result<RouteStatus, DespachoError> {
    raw.parse().map_err(|_| {
        DespachoError::Internal(format!("unknown route status in table: {raw}"))
    })
}

#[async_trait]
impl RouteRepository for PgRouteRepository {
    async fn list_available_for_vehicle(
        &self,
        vehicle: &VehicleType,
    ) -> Result<Vec<Route>, DespachoError> {
        let rows = sqlx::query(
            "SELECT id, vehicle_type, label, region, driver_id, status, assigned_at
             FROM routes
             WHERE status = 'AVAILABLE' AND driver_id IS NULL
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut routes = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.try_get("status").map_err(db_err)?;
            let assigned_at: Option<DateTime<Utc>> =
                row.try_get("assigned_at").map_err(db_err)?;
            routes.push(Route {
                id: row.try_get("id").map_err(db_err)?,
                vehicle_type: VehicleType::new(
                    row.try_get::<String, _>("vehicle_type").map_err(db_err)?,
                ),
                label: row.try_get("label").map_err(db_err)?,
                region: row.try_get("region").map_err(db_err)?,
                driver_id: row.try_get("driver_id").map_err(db_err)?,
                status: parse_status(&status)?,
                assigned_at: assigned_at.map(|t| t.to_rfc3339()),
            });
        }

        Ok(menu_order(routes, vehicle))
    }

    async fn assign_if_available(
        &self,
        route_id: &str,
        driver_id: &str,
    ) -> Result<bool, DespachoError> {
        let result = sqlx::query(
            "UPDATE routes
             SET driver_id = $2, status = 'ASSIGNED', assigned_at = now()
             WHERE id = $1 AND status = 'AVAILABLE' AND driver_id IS NULL",
        )
        .bind(route_id)
        .bind(driver_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let claimed = result.rows_affected() == 1;
        debug!(route_id, driver_id, claimed, "conditional claim executed");
        Ok(claimed)
    }

    async fn driver_already_assigned(&self, driver_id: &str) -> Result<bool, DespachoError> {
        // Belt and braces: the route table is authoritative, the assignment
        // overview catches rows the last export saw but a manual edit hid.
        let assigned: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                 SELECT 1 FROM routes
                 WHERE driver_id = $1 AND status = 'ASSIGNED'
             ) OR EXISTS(
                 SELECT 1 FROM assignment_overview WHERE driver_id = $1
             )",
        )
        .bind(driver_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_accepts_table_values() {
        assert_eq!(parse_status("AVAILABLE").unwrap(), RouteStatus::Available);
        assert_eq!(parse_status("ASSIGNED").unwrap(), RouteStatus::Assigned);
        assert_eq!(parse_status("BLOCKED").unwrap(), RouteStatus::Blocked);
        assert!(parse_status("PENDING").is_err());
    }
}
