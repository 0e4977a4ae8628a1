// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the despacho workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Free-form vehicle label as it appears in the driver registry
/// ("Moto", "Fiorino Baú", "Passeio", ...).
///
/// The registry is not normalized, so the derived predicates match by
/// case-insensitive prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VehicleType(pub String);

impl VehicleType {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn is_moto(&self) -> bool {
        self.0.trim().to_lowercase().starts_with("moto")
    }

    pub fn is_fiorino(&self) -> bool {
        self.0.trim().to_lowercase().starts_with("fiorino")
    }
}

impl std::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Queue partition. Moto drivers wait in their own line; everyone else
/// shares the general one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueGroup {
    Moto,
    General,
}

impl QueueGroup {
    pub const ALL: [QueueGroup; 2] = [QueueGroup::Moto, QueueGroup::General];

    /// Derived once when the driver identifies; never changes afterwards.
    pub fn from_vehicle(vehicle: &VehicleType) -> Self {
        if vehicle.is_moto() {
            QueueGroup::Moto
        } else {
            QueueGroup::General
        }
    }
}

/// A driver record from the registry. Read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub vehicle_type: VehicleType,
    /// Dispatch priority in [0, 100].
    pub priority_score: u8,
}

/// Administrative blocklist state for a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum BlocklistStatus {
    Active,
    Inactive,
}

impl BlocklistStatus {
    pub fn is_blocked(self) -> bool {
        matches!(self, BlocklistStatus::Active)
    }
}

/// Route lifecycle state in the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteStatus {
    Available,
    Assigned,
    Blocked,
}

/// A delivery route. `driver_id`, `status`, and `assigned_at` are the only
/// fields the core mutates, and only through the conditional claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub vehicle_type: VehicleType,
    /// Human-readable route label shown in the selection menu.
    pub label: String,
    /// Neighborhood / region hint, when the import provides one.
    pub region: Option<String>,
    pub driver_id: Option<String>,
    pub status: RouteStatus,
    /// RFC 3339 instant of the claim, set by the conditional update.
    pub assigned_at: Option<String>,
}

/// Snapshot of a route stored inside a session while the driver is choosing.
///
/// A snapshot, not a live reference: the route may be claimed by someone
/// else between render and reply, which the claim executor detects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRef {
    pub id: String,
    pub label: String,
    pub region: Option<String>,
}

impl RouteRef {
    pub fn from_route(route: &Route) -> Self {
        Self {
            id: route.id.clone(),
            label: route.label.clone(),
            region: route.region.clone(),
        }
    }
}

/// Menu ordering for the route-selection screen.
///
/// Moto-only drivers see only moto routes. Everyone else sees every
/// available route, non-moto first, then moto, each partition keeping the
/// repository's order.
pub fn menu_order(routes: Vec<Route>, vehicle: &VehicleType) -> Vec<Route> {
    if vehicle.is_moto() {
        return routes
            .into_iter()
            .filter(|r| r.vehicle_type.is_moto())
            .collect();
    }
    let (moto, rest): (Vec<_>, Vec<_>) = routes
        .into_iter()
        .partition(|r| r.vehicle_type.is_moto());
    let mut ordered = rest;
    ordered.extend(moto);
    ordered
}

/// Which tables an admin-triggered sync refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncScope {
    All,
    Drivers,
}

/// Conversational state of a driver session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the driver to send their registry id.
    WaitingId,
    /// Admin typed a sync command; the next message is the shared secret.
    AwaitingSyncPassword { scope: SyncScope },
    Menu,
    HelpMenu,
    /// Holding the active slot, picking from `available_routes`.
    ChoosingRoute,
}

/// The stateful conversational context for a single chat.
///
/// Persisted as JSON at `session:<chatId>`; every save refreshes the idle
/// TTL. Destroyed on terminal transitions or idle expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSession {
    pub chat_id: String,
    pub state: SessionState,
    /// Set while the chat waits in a queue group for the active slot.
    #[serde(default)]
    pub in_queue: bool,
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,
    pub vehicle_type: Option<VehicleType>,
    pub priority_score: Option<u8>,
    pub queue_group: Option<QueueGroup>,
    /// Present only in `ChoosingRoute`; ordered as rendered to the driver.
    #[serde(default)]
    pub available_routes: Vec<RouteRef>,
    pub created_at: String,
    pub updated_at: String,
}

impl DriverSession {
    pub fn new(chat_id: impl Into<String>, now: impl Into<String>) -> Self {
        let now = now.into();
        Self {
            chat_id: chat_id.into(),
            state: SessionState::WaitingId,
            in_queue: false,
            driver_id: None,
            driver_name: None,
            vehicle_type: None,
            priority_score: None,
            queue_group: None,
            available_routes: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Caches registry data in the session once identity is confirmed.
    pub fn identify(&mut self, driver: &Driver) {
        self.driver_id = Some(driver.id.clone());
        self.driver_name = Some(driver.name.clone());
        self.vehicle_type = Some(driver.vehicle_type.clone());
        self.priority_score = Some(driver.priority_score);
        self.queue_group = Some(QueueGroup::from_vehicle(&driver.vehicle_type));
    }

    pub fn is_identified(&self) -> bool {
        self.driver_id.is_some()
    }

    /// The group this session queues in. Only meaningful after `identify`.
    pub fn group(&self) -> QueueGroup {
        self.queue_group.unwrap_or(QueueGroup::General)
    }
}
