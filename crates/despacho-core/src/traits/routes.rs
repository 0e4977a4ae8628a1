// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route table trait: listing and the conditional claim.

use async_trait::async_trait;

use crate::error::DespachoError;
use crate::types::{Route, VehicleType};

#[async_trait]
pub trait RouteRepository: Send + Sync {
    /// Available routes a driver with this vehicle may take, in menu order:
    /// moto-only drivers see only moto routes; everyone else sees non-moto
    /// routes first, then moto.
    async fn list_available_for_vehicle(
        &self,
        vehicle: &VehicleType,
    ) -> Result<Vec<Route>, DespachoError>;

    /// The conditional claim: AVAILABLE → ASSIGNED bound to `driver_id`,
    /// atomic against concurrent claimants. Returns whether this call won.
    async fn assign_if_available(
        &self,
        route_id: &str,
        driver_id: &str,
    ) -> Result<bool, DespachoError>;

    /// Whether the driver already holds an assigned route, per the route
    /// table or the assignment overview. Checked before entering the queue
    /// and again before each claim.
    async fn driver_already_assigned(&self, driver_id: &str) -> Result<bool, DespachoError>;
}
