// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fake adapters for the external collaborators: driver registry, route
//! table with atomic claim, chat sender, export sink, and ETL trigger.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use despacho_core::{
    BlocklistStatus, ChatSender, DespachoError, Driver, DriverRepository, ExportSink, Route,
    RouteRepository, RouteStatus, SyncRunner, SyncScope, VehicleType, menu_order,
};

/// In-memory driver registry with a blocklist set.
#[derive(Default)]
pub struct FakeDrivers {
    drivers: Mutex<HashMap<String, Driver>>,
    blocked: Mutex<HashSet<String>>,
}

impl FakeDrivers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, driver: Driver) {
        self.drivers.lock().unwrap().insert(driver.id.clone(), driver);
    }

    pub fn with_driver(self, id: &str, name: &str, vehicle: &str, score: u8) -> Self {
        self.insert(Driver {
            id: id.into(),
            name: name.into(),
            vehicle_type: VehicleType::new(vehicle),
            priority_score: score,
        });
        self
    }

    pub fn block(&self, driver_id: &str) {
        self.blocked.lock().unwrap().insert(driver_id.to_string());
    }

    pub fn unblock(&self, driver_id: &str) {
        self.blocked.lock().unwrap().remove(driver_id);
    }
}

#[async_trait]
impl DriverRepository for FakeDrivers {
    async fn find_by_id(&self, driver_id: &str) -> Result<Option<Driver>, DespachoError> {
        Ok(self.drivers.lock().unwrap().get(driver_id).cloned())
    }

    async fn blocklist_status(&self, driver_id: &str) -> Result<BlocklistStatus, DespachoError> {
        if self.blocked.lock().unwrap().contains(driver_id) {
            Ok(BlocklistStatus::Active)
        } else {
            Ok(BlocklistStatus::Inactive)
        }
    }
}

/// In-memory route table. The claim is atomic under one mutex, mirroring the
/// conditional UPDATE of the production repository.
#[derive(Default)]
pub struct FakeRoutes {
    routes: Mutex<Vec<Route>>,
}

impl FakeRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_available(&self, id: &str, vehicle: &str, label: &str) {
        self.routes.lock().unwrap().push(Route {
            id: id.into(),
            vehicle_type: VehicleType::new(vehicle),
            label: label.into(),
            region: None,
            driver_id: None,
            status: RouteStatus::Available,
            assigned_at: None,
        });
    }

    pub fn with_route(self, id: &str, vehicle: &str, label: &str) -> Self {
        self.add_available(id, vehicle, label);
        self
    }

    /// Current snapshot, for assertions.
    pub fn all(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RouteRepository for FakeRoutes {
    async fn list_available_for_vehicle(
        &self,
        vehicle: &VehicleType,
    ) -> Result<Vec<Route>, DespachoError> {
        let available: Vec<Route> = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == RouteStatus::Available)
            .cloned()
            .collect();
        Ok(menu_order(available, vehicle))
    }

    async fn assign_if_available(
        &self,
        route_id: &str,
        driver_id: &str,
    ) -> Result<bool, DespachoError> {
        let mut routes = self.routes.lock().unwrap();
        for route in routes.iter_mut() {
            if route.id == route_id
                && route.status == RouteStatus::Available
                && route.driver_id.is_none()
            {
                route.status = RouteStatus::Assigned;
                route.driver_id = Some(driver_id.to_string());
                route.assigned_at = Some("2026-01-01T00:00:00Z".to_string());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn driver_already_assigned(&self, driver_id: &str) -> Result<bool, DespachoError> {
        Ok(self.routes.lock().unwrap().iter().any(|r| {
            r.status == RouteStatus::Assigned && r.driver_id.as_deref() == Some(driver_id)
        }))
    }
}

/// Chat sender that records every outbound message.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    fail_next: Mutex<bool>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(chat_id, text)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts sent to one chat, in order.
    pub fn sent_to(&self, chat_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == chat_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn last_to(&self, chat_id: &str) -> Option<String> {
        self.sent_to(chat_id).pop()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Make the next send fail with a transient channel error.
    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

#[async_trait]
impl ChatSender for RecordingSender {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), DespachoError> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(DespachoError::Channel {
                message: "simulated delivery failure".into(),
                source: None,
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Export sink counting writebacks; optionally failing them.
#[derive(Default)]
pub struct CountingExport {
    pub calls: AtomicUsize,
    fail: Mutex<bool>,
}

impl CountingExport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl ExportSink for CountingExport {
    async fn set_assigned(&self, _route_id: &str, _driver_id: &str) -> Result<(), DespachoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(DespachoError::Export("simulated writeback failure".into()));
        }
        Ok(())
    }
}

/// Sync runner recording requested scopes.
#[derive(Default)]
pub struct RecordingSync {
    pub runs: Mutex<Vec<SyncScope>>,
}

impl RecordingSync {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncRunner for RecordingSync {
    async fn run(&self, scope: SyncScope) -> Result<(), DespachoError> {
        self.runs.lock().unwrap().push(scope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_routes_claim_is_exclusive() {
        let routes = FakeRoutes::new().with_route("R1", "Passeio", "Centro");

        assert!(routes.assign_if_available("R1", "123").await.unwrap());
        assert!(!routes.assign_if_available("R1", "456").await.unwrap());
        // Idempotent re-issue by the same driver also fails: ASSIGNED is final.
        assert!(!routes.assign_if_available("R1", "123").await.unwrap());

        assert!(routes.driver_already_assigned("123").await.unwrap());
        assert!(!routes.driver_already_assigned("456").await.unwrap());
    }

    #[tokio::test]
    async fn fake_drivers_blocklist_round_trip() {
        let drivers = FakeDrivers::new().with_driver("123", "Ana", "Moto", 80);

        assert_eq!(
            drivers.blocklist_status("123").await.unwrap(),
            BlocklistStatus::Inactive
        );
        drivers.block("123");
        assert_eq!(
            drivers.blocklist_status("123").await.unwrap(),
            BlocklistStatus::Active
        );
        drivers.unblock("123");
        assert_eq!(
            drivers.blocklist_status("123").await.unwrap(),
            BlocklistStatus::Inactive
        );
    }

    #[tokio::test]
    async fn recording_sender_captures_order() {
        let sender = RecordingSender::new();
        sender.send("1001", "first").await.unwrap();
        sender.send("1002", "other chat").await.unwrap();
        sender.send("1001", "second").await.unwrap();

        assert_eq!(sender.sent_to("1001"), ["first", "second"]);
        assert_eq!(sender.last_to("1001").as_deref(), Some("second"));
        assert_eq!(sender.sent().len(), 3);
    }

    #[tokio::test]
    async fn recording_sender_fail_next_is_one_shot() {
        let sender = RecordingSender::new();
        sender.fail_next();
        assert!(sender.send("1001", "lost").await.is_err());
        assert!(sender.send("1001", "kept").await.is_ok());
        assert_eq!(sender.sent_to("1001"), ["kept"]);
    }
}
