// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end scenarios for the complete dispatch pipeline.
//!
//! Each test assembles an isolated stack: in-memory KV, fake repositories,
//! recording sender, and the real queue/slot/session machinery. Tests are
//! independent and order-insensitive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use despacho_core::{DriverSession, KvStore, QueueGroup, RouteRef, RouteRepository, SessionState};
use despacho_dispatch::{
    QueueEngine, QueueTuning, SlotController, SlotMeta, SlotTuning, TimerTokens,
};
use despacho_kv::{AdvisoryLock, EventJournal, LockSettings, keys};
use despacho_session::{Engine, EngineParts, SessionRanks, SessionStore};
use despacho_test_utils::{
    CountingExport, FakeDrivers, FakeRoutes, MemoryKv, RecordingSender, RecordingSync,
};

struct Harness {
    engine: Engine,
    kv: Arc<dyn KvStore>,
    sessions: SessionStore,
    sender: Arc<RecordingSender>,
    drivers: Arc<FakeDrivers>,
    routes: Arc<FakeRoutes>,
    export: Arc<CountingExport>,
    sync: Arc<RecordingSync>,
}

impl Harness {
    fn new() -> Self {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let sessions = SessionStore::new(kv.clone(), Duration::from_secs(10_800));
        let drivers = Arc::new(
            FakeDrivers::new()
                .with_driver("123", "Ana", "Passeio", 80)
                .with_driver("456", "Bruno", "Moto", 60)
                .with_driver("789", "Carla", "Fiorino", 30)
                .with_driver("321", "Davi", "Passeio", 50),
        );
        let routes = Arc::new(FakeRoutes::new());
        let sender = Arc::new(RecordingSender::new());
        let export = Arc::new(CountingExport::new());
        let sync = Arc::new(RecordingSync::new());

        let ranks = Arc::new(SessionRanks::new(
            kv.clone(),
            sessions.clone(),
            drivers.clone(),
        ));

        let mut slots = HashMap::new();
        for group in QueueGroup::ALL {
            let lock = AdvisoryLock::new(kv.clone(), LockSettings::default());
            let queue = Arc::new(QueueEngine::new(
                kv.clone(),
                lock.clone(),
                ranks.clone(),
                group,
                QueueTuning::default(),
            ));
            slots.insert(
                group,
                Arc::new(SlotController::new(
                    kv.clone(),
                    lock,
                    queue,
                    group,
                    SlotTuning::default(),
                )),
            );
        }

        let engine = Engine::new(EngineParts {
            kv: kv.clone(),
            sessions: sessions.clone(),
            drivers: drivers.clone(),
            routes: routes.clone(),
            sender: sender.clone(),
            export: export.clone(),
            sync: sync.clone(),
            journal: EventJournal::new(kv.clone()),
            timers: Arc::new(TimerTokens::new(kv.clone(), Duration::from_secs(30))),
            slots,
            sync_password: "segredo".into(),
            sync_flag_ttl: Duration::from_secs(1800),
        });

        Self {
            engine,
            kv,
            sessions,
            sender,
            drivers,
            routes,
            export,
            sync,
        }
    }

    async fn send(&self, chat: &str, text: &str) {
        self.engine.process(chat, text).await.unwrap();
    }

    async fn identify(&self, chat: &str, driver_id: &str) {
        self.send(chat, "oi").await;
        self.send(chat, driver_id).await;
    }

    async fn session(&self, chat: &str) -> Option<DriverSession> {
        self.sessions.load(chat).await.unwrap()
    }

    async fn holder(&self, group: QueueGroup) -> Option<String> {
        self.kv.get(&keys::active(group)).await.unwrap()
    }

    async fn waiting(&self, group: QueueGroup) -> Vec<String> {
        self.kv.lrange(&keys::queue_list(group), 0, -1).await.unwrap()
    }
}

// ---- S1: happy path, single driver ----

#[tokio::test]
async fn s1_happy_path_single_driver() {
    let h = Harness::new();
    h.routes.add_available("R001", "Passeio", "Centro");
    h.routes.add_available("R002", "Passeio", "Zona Sul");

    h.send("1001", "oi").await;
    h.send("1001", "123").await;

    let texts = h.sender.sent_to("1001");
    assert!(texts.iter().any(|t| t == "Olá, Ana!"));

    h.send("1001", "1").await;
    let menu = h.sender.last_to("1001").unwrap();
    assert!(menu.contains("1 - Centro"));
    assert!(menu.contains("2 - Zona Sul"));

    h.send("1001", "1").await;

    let all = h.routes.all();
    let claimed = all.iter().find(|r| r.id == "R001").unwrap();
    assert_eq!(claimed.driver_id.as_deref(), Some("123"));
    assert!(claimed.assigned_at.is_some());
    assert!(
        h.sender
            .sent_to("1001")
            .iter()
            .any(|t| t.contains("Rota confirmada"))
    );
    assert!(h.session("1001").await.is_none());
    assert_eq!(h.holder(QueueGroup::General).await, None);
    assert_eq!(
        h.export.calls.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

// ---- S2: two drivers contending for one slot ----

#[tokio::test]
async fn s2_two_drivers_contend_for_slot() {
    let h = Harness::new();
    h.routes.add_available("R001", "Passeio", "Centro");
    h.routes.add_available("R002", "Passeio", "Zona Sul");
    h.identify("1001", "123").await;
    h.identify("1002", "321").await;

    h.send("1001", "1").await;
    h.send("1002", "1").await;

    // First-processed caller wins the slot; the second waits.
    assert_eq!(h.holder(QueueGroup::General).await.as_deref(), Some("1001"));
    let waiting = h.session("1002").await.unwrap();
    assert!(waiting.in_queue);
    assert_eq!(waiting.state, SessionState::Menu);
    assert!(h.sender.last_to("1002").unwrap().contains("fila"));

    // The first driver claims; the release hands the slot to the second.
    h.send("1001", "1").await;

    assert_eq!(h.holder(QueueGroup::General).await.as_deref(), Some("1002"));
    let activated = h.session("1002").await.unwrap();
    assert_eq!(activated.state, SessionState::ChoosingRoute);
    assert!(!activated.in_queue);
    let menu = h.sender.last_to("1002").unwrap();
    assert!(menu.contains("Zona Sul"));
    assert!(!menu.contains("Centro"));
}

// ---- S3: response timeout ----

#[tokio::test]
async fn s3_timeout_closes_session_and_activates_next() {
    let h = Harness::new();
    h.routes.add_available("R001", "Passeio", "Centro");
    h.routes.add_available("R002", "Passeio", "Zona Sul");
    h.identify("1001", "123").await;
    h.identify("1002", "321").await;
    h.send("1001", "1").await;
    h.send("1002", "1").await;
    h.sender.clear();

    let token = h.kv.get(&keys::timer("1001")).await.unwrap().unwrap();
    h.engine
        .timeout_fire("1001", QueueGroup::General, &token)
        .await
        .unwrap();

    assert!(
        h.sender
            .sent_to("1001")
            .iter()
            .any(|t| t.contains("inatividade"))
    );
    assert!(h.session("1001").await.is_none());
    assert_eq!(h.holder(QueueGroup::General).await.as_deref(), Some("1002"));
}

// ---- S4: claim race during the hand-off window ----

#[tokio::test]
async fn s4_claim_race_exactly_one_winner() {
    let h = Harness::new();
    h.routes.add_available("R001", "Passeio", "Centro");
    h.routes.add_available("R002", "Passeio", "Zona Sul");
    h.identify("1001", "123").await;
    h.identify("1002", "321").await;
    h.send("1001", "1").await;

    // Put the second chat in CHOOSING_ROUTE with the same stale menu, as
    // happens inside the hand-off window.
    let snapshot: Vec<RouteRef> = h.session("1001").await.unwrap().available_routes;
    let mut racing = h.session("1002").await.unwrap();
    racing.state = SessionState::ChoosingRoute;
    racing.available_routes = snapshot;
    h.sessions.save(&mut racing).await.unwrap();

    h.send("1001", "1").await;
    h.sender.clear();
    h.send("1002", "1").await;

    // Exactly one claim landed.
    let all = h.routes.all();
    let r001 = all.iter().find(|r| r.id == "R001").unwrap();
    assert_eq!(r001.driver_id.as_deref(), Some("123"));

    // The loser is told and re-rendered without R001.
    let texts = h.sender.sent_to("1002");
    assert!(texts.iter().any(|t| t.contains("acabou de ser atribuída")));
    let menu = texts.last().unwrap();
    assert!(menu.contains("Zona Sul"));
    assert!(!menu.contains("Centro"));
}

// ---- S5: blocklisted starvation relief ----

#[tokio::test]
async fn s5_blocklisted_driver_served_after_deferral() {
    let h = Harness::new();
    h.routes.add_available("R001", "Passeio", "Centro");
    h.drivers.block("321");
    h.identify("2001", "321").await;

    h.send("2001", "1").await;

    // Queued but not served: deferral window open.
    assert_eq!(h.holder(QueueGroup::General).await, None);
    assert!(h.session("2001").await.unwrap().in_queue);

    // A sweep inside the window still does not activate.
    h.engine.sweep(QueueGroup::General).await.unwrap();
    assert_eq!(h.holder(QueueGroup::General).await, None);

    // Age the deferral timestamp past the window and sweep again.
    let stale = Utc::now().timestamp() - 121;
    h.kv.set_ttl(
        &keys::empty_since(QueueGroup::General),
        &stale.to_string(),
        Duration::from_secs(600),
    )
    .await
    .unwrap();

    h.engine.sweep(QueueGroup::General).await.unwrap();

    assert_eq!(h.holder(QueueGroup::General).await.as_deref(), Some("2001"));
    assert_eq!(
        h.session("2001").await.unwrap().state,
        SessionState::ChoosingRoute
    );
}

// ---- S6: sync in progress gates traffic ----

#[tokio::test]
async fn s6_sync_gate_and_admin_handshake() {
    let h = Harness::new();
    h.identify("9001", "123").await;

    // Admin starts the handshake and supplies the password.
    h.send("9001", "/sync").await;
    assert!(h.sender.last_to("9001").unwrap().contains("senha"));
    h.send("9001", "segredo").await;
    assert!(
        h.sender
            .sent_to("9001")
            .iter()
            .any(|t| t.contains("Sincronização iniciada"))
    );

    // The spawned sync task runs to completion.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.sync.runs.lock().unwrap().as_slice(), &[
        despacho_core::SyncScope::All
    ]);
    // Gate reopened and completion reported.
    assert!(h.kv.get(&keys::sync_flag()).await.unwrap().is_none());
    assert!(
        h.sender
            .sent_to("9001")
            .iter()
            .any(|t| t.contains("concluída"))
    );

    // With the gate closed, driver traffic is turned away untouched.
    h.kv.set_ttl(&keys::sync_flag(), "1", Duration::from_secs(60))
        .await
        .unwrap();
    h.identify("3001", "456").await;
    // identify() sent two messages; both should be the wait notice.
    let texts = h.sender.sent_to("3001");
    assert!(texts.iter().all(|t| t.contains("atualizando os dados")));
    assert!(h.session("3001").await.is_none());
}

#[tokio::test]
async fn wrong_sync_password_cancels_handshake() {
    let h = Harness::new();
    h.send("9001", "/syncDriver").await;
    h.send("9001", "errada").await;

    assert!(
        h.sender
            .sent_to("9001")
            .iter()
            .any(|t| t.contains("Senha incorreta"))
    );
    assert!(h.sync.runs.lock().unwrap().is_empty());
    assert!(h.kv.get(&keys::sync_flag()).await.unwrap().is_none());
}

// ---- Idempotence and invariant laws ----

#[tokio::test]
async fn reprocessing_invalid_input_is_idempotent() {
    let h = Harness::new();
    h.routes.add_available("R001", "Passeio", "Centro");
    h.identify("1001", "123").await;
    h.send("1001", "1").await;

    h.send("1001", "banana").await;
    let first_menu = h.sender.last_to("1001").unwrap();
    let first_state = h.session("1001").await.unwrap();

    h.send("1001", "banana").await;
    let second_menu = h.sender.last_to("1001").unwrap();
    let second_state = h.session("1001").await.unwrap();

    assert_eq!(first_menu, second_menu);
    assert_eq!(first_state.state, second_state.state);
    assert_eq!(first_state.available_routes, second_state.available_routes);
}

#[tokio::test]
async fn chat_never_appears_twice_across_queues() {
    let h = Harness::new();
    h.routes.add_available("R001", "Passeio", "Centro");
    h.identify("1001", "123").await;
    h.identify("1002", "321").await;
    h.send("1001", "1").await;

    // Repeated requests from the waiting driver keep one queue entry.
    h.send("1002", "1").await;
    h.send("1002", "1").await;
    h.send("1002", "oi").await;

    let general = h.waiting(QueueGroup::General).await;
    let moto = h.waiting(QueueGroup::Moto).await;
    let occurrences = general.iter().chain(moto.iter()).filter(|c| *c == "1002").count();
    assert_eq!(occurrences, 1);
}

#[tokio::test]
async fn assigned_route_rejects_every_later_claim() {
    let h = Harness::new();
    h.routes.add_available("R001", "Passeio", "Centro");

    assert!(h.routes.assign_if_available("R001", "123").await.unwrap());
    assert!(!h.routes.assign_if_available("R001", "321").await.unwrap());
    assert!(!h.routes.assign_if_available("R001", "123").await.unwrap());
}

#[tokio::test]
async fn sweeper_reclaims_abandoned_slot_within_window() {
    let h = Harness::new();
    h.routes.add_available("R001", "Passeio", "Centro");
    h.routes.add_available("R002", "Passeio", "Zona Sul");
    h.identify("1001", "123").await;
    h.identify("1002", "321").await;
    h.send("1001", "1").await;
    h.send("1002", "1").await;

    // Simulate the holder's process dying: back-date the slot meta.
    let meta = SlotMeta {
        chat_id: "1001".into(),
        started_at: Utc::now().timestamp() - 31,
    };
    h.kv.set_ttl(
        &keys::active_meta(QueueGroup::General),
        &serde_json::to_string(&meta).unwrap(),
        Duration::from_secs(600),
    )
    .await
    .unwrap();

    h.engine.sweep(QueueGroup::General).await.unwrap();

    assert_eq!(h.holder(QueueGroup::General).await.as_deref(), Some("1002"));
    assert!(h.session("1001").await.is_none());
}

#[tokio::test]
async fn fiorino_priority_holds_end_to_end() {
    let h = Harness::new();
    h.routes.add_available("R001", "Passeio", "Centro");
    h.routes.add_available("R002", "Passeio", "Zona Sul");
    h.routes.add_available("R003", "Passeio", "Zona Leste");
    // Ana (80, Passeio) takes the slot; Davi (50, Passeio) and Carla
    // (30, Fiorino) wait. Carla must be served before Davi.
    h.identify("1001", "123").await;
    h.identify("1002", "321").await;
    h.identify("1003", "789").await;
    h.send("1001", "1").await;
    h.send("1002", "1").await;
    h.send("1003", "1").await;

    assert_eq!(h.waiting(QueueGroup::General).await, ["1003", "1002"]);

    h.send("1001", "encerrar").await;
    assert_eq!(h.holder(QueueGroup::General).await.as_deref(), Some("1003"));
}

#[tokio::test]
async fn daily_log_records_the_flow() {
    let h = Harness::new();
    h.routes.add_available("R001", "Passeio", "Centro");
    h.identify("1001", "123").await;
    h.send("1001", "1").await;
    h.send("1001", "1").await;

    h.sender.clear();
    h.send("1001", "/logdiario").await;

    let dump = h.sender.sent_to("1001").join("\n");
    assert!(dump.contains("action=identified"));
    assert!(dump.contains("action=enqueue"));
    assert!(dump.contains("action=claim"));
    assert!(dump.contains("ok=true"));
}
