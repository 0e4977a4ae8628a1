// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-driver session state machine.
//!
//! [`Engine::handle_update`] is the single entry point for inbound chat
//! messages. Global preprocessing (admin commands, the sync gate, queue
//! re-entry) runs first, then the per-state handlers. The engine is cheap
//! to clone; response timers and the sync task clone it into spawned tasks.
//!
//! Lock discipline: the engine never sends chat messages while a dispatch
//! lock is held. Queue and slot operations return the chats to act on, and
//! all sends happen here, afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use despacho_core::{
    ChatSender, DespachoError, DriverRepository, DriverSession, ExportSink, KvStore, QueueGroup,
    RouteRef, RouteRepository, SessionState, SyncRunner, UpdateHandler,
};
use despacho_dispatch::{AcquireOutcome, SlotController, TimerTokens};
use despacho_kv::{EventJournal, keys};

use crate::admin;
use crate::faq;
use crate::messages;
use crate::store::SessionStore;

/// Everything the engine is wired with at boot.
pub struct EngineParts {
    pub kv: Arc<dyn KvStore>,
    pub sessions: SessionStore,
    pub drivers: Arc<dyn DriverRepository>,
    pub routes: Arc<dyn RouteRepository>,
    pub sender: Arc<dyn ChatSender>,
    pub export: Arc<dyn ExportSink>,
    pub sync: Arc<dyn SyncRunner>,
    pub journal: EventJournal,
    pub timers: Arc<TimerTokens>,
    pub slots: HashMap<QueueGroup, Arc<SlotController>>,
    pub sync_password: String,
    pub sync_flag_ttl: Duration,
}

#[derive(Clone)]
pub struct Engine {
    pub(crate) kv: Arc<dyn KvStore>,
    pub(crate) sessions: SessionStore,
    pub(crate) drivers: Arc<dyn DriverRepository>,
    pub(crate) routes: Arc<dyn RouteRepository>,
    pub(crate) sender: Arc<dyn ChatSender>,
    pub(crate) export: Arc<dyn ExportSink>,
    pub(crate) sync: Arc<dyn SyncRunner>,
    pub(crate) journal: EventJournal,
    pub(crate) timers: Arc<TimerTokens>,
    slots: Arc<HashMap<QueueGroup, Arc<SlotController>>>,
    pub(crate) sync_password: String,
    pub(crate) sync_flag_ttl: Duration,
}

/// Result of trying to serve a driver who asked for a route.
enum ServeOutcome {
    /// The driver holds the slot and was shown the routes menu.
    Entered,
    /// The driver waits; `position` is their 1-based spot in the queue.
    Waiting { position: usize },
}

impl Engine {
    pub fn new(parts: EngineParts) -> Self {
        Self {
            kv: parts.kv,
            sessions: parts.sessions,
            drivers: parts.drivers,
            routes: parts.routes,
            sender: parts.sender,
            export: parts.export,
            sync: parts.sync,
            journal: parts.journal,
            timers: parts.timers,
            slots: Arc::new(parts.slots),
            sync_password: parts.sync_password,
            sync_flag_ttl: parts.sync_flag_ttl,
        }
    }

    pub(crate) fn slot_for(&self, group: QueueGroup) -> Result<&Arc<SlotController>, DespachoError> {
        self.slots
            .get(&group)
            .ok_or_else(|| DespachoError::Internal(format!("no slot controller for group {group}")))
    }

    /// Best-effort outbound send. Delivery failures are logged and never
    /// block a state transition; the driver can resend and timers guarantee
    /// progress.
    pub(crate) async fn say(&self, chat_id: &str, text: &str) {
        if let Err(e) = self.sender.send(chat_id, text).await {
            warn!(chat_id, error = %e, "outbound send failed");
        }
    }

    pub(crate) async fn sync_in_progress(&self) -> Result<bool, DespachoError> {
        Ok(self.kv.get(&keys::sync_flag()).await?.is_some())
    }

    /// Process one inbound message. Callers serialize per chat.
    pub async fn process(&self, chat_id: &str, text: &str) -> Result<(), DespachoError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        // Admin commands take precedence over everything, including the gate.
        if let Some(cmd) = admin::parse_command(text) {
            return self.handle_admin_command(chat_id, cmd).await;
        }

        if self.sync_in_progress().await? {
            self.say(chat_id, messages::PLEASE_WAIT_SYNC).await;
            return Ok(());
        }

        let Some(mut session) = self.sessions.load(chat_id).await? else {
            let mut session = DriverSession::new(chat_id, Utc::now().to_rfc3339());
            self.sessions.save(&mut session).await?;
            self.journal.append("session_created", &[("chat", chat_id)]).await;
            self.say(chat_id, messages::GREET_ASK_ID).await;
            return Ok(());
        };

        // The next message after a sync command is the password, whatever it is.
        if let SessionState::AwaitingSyncPassword { scope } = session.state {
            return self.handle_sync_password(&mut session, scope, text).await;
        }

        if is_end_command(text, &session.state) {
            return self.end_session(&mut session).await;
        }

        if session.in_queue {
            return self.handle_in_queue(&mut session).await;
        }

        match session.state.clone() {
            SessionState::WaitingId => self.handle_waiting_id(&mut session, text).await,
            SessionState::Menu => self.handle_menu(&mut session, text).await,
            SessionState::HelpMenu => self.handle_help(&mut session, text).await,
            SessionState::ChoosingRoute => self.handle_choosing(&mut session, text).await,
            SessionState::AwaitingSyncPassword { .. } => Ok(()),
        }
    }

    // --- Per-state handlers ---

    async fn handle_waiting_id(
        &self,
        session: &mut DriverSession,
        text: &str,
    ) -> Result<(), DespachoError> {
        let chat_id = session.chat_id.clone();

        if is_numeric(text)
            && let Some(driver) = self.drivers.find_by_id(text).await?
        {
            session.identify(&driver);
            session.state = SessionState::Menu;
            self.sessions.save(session).await?;
            self.journal
                .append("identified", &[("chat", &chat_id), ("driver", &driver.id)])
                .await;
            self.say(&chat_id, &messages::greet_by_name(&driver.name)).await;
            self.say(&chat_id, messages::MAIN_MENU).await;
            return Ok(());
        }

        self.say(&chat_id, messages::INVALID_ID).await;
        Ok(())
    }

    async fn handle_menu(
        &self,
        session: &mut DriverSession,
        text: &str,
    ) -> Result<(), DespachoError> {
        let chat_id = session.chat_id.clone();

        match text {
            "1" => {
                let driver_id = session
                    .driver_id
                    .clone()
                    .ok_or_else(|| DespachoError::Internal("menu without identity".into()))?;

                if self.routes.driver_already_assigned(&driver_id).await? {
                    self.say(&chat_id, messages::ALREADY_ASSIGNED).await;
                    self.sessions.clear(&chat_id).await?;
                    self.journal
                        .append("session_closed", &[("chat", &chat_id), ("reason", "assigned")])
                        .await;
                    return Ok(());
                }

                match self.try_serve(session).await? {
                    ServeOutcome::Entered => Ok(()),
                    ServeOutcome::Waiting { position } => {
                        session.in_queue = true;
                        self.sessions.save(session).await?;
                        self.say(&chat_id, &messages::in_queue(position)).await;
                        Ok(())
                    }
                }
            }
            "2" => {
                session.state = SessionState::HelpMenu;
                self.sessions.save(session).await?;
                self.say(&chat_id, &faq::render_menu()).await;
                Ok(())
            }
            _ => {
                self.say(&chat_id, messages::INVALID_OPTION).await;
                self.say(&chat_id, messages::MAIN_MENU).await;
                Ok(())
            }
        }
    }

    async fn handle_help(
        &self,
        session: &mut DriverSession,
        text: &str,
    ) -> Result<(), DespachoError> {
        let chat_id = session.chat_id.clone();

        if text.eq_ignore_ascii_case("voltar") {
            session.state = SessionState::Menu;
            self.sessions.save(session).await?;
            self.say(&chat_id, messages::MAIN_MENU).await;
            return Ok(());
        }

        if let Some(entry) = faq::find(text) {
            self.say(&chat_id, entry.answer).await;
            self.say(&chat_id, &faq::render_menu()).await;
            return Ok(());
        }

        self.say(&chat_id, messages::INVALID_OPTION).await;
        self.say(&chat_id, &faq::render_menu()).await;
        Ok(())
    }

    async fn handle_choosing(
        &self,
        session: &mut DriverSession,
        text: &str,
    ) -> Result<(), DespachoError> {
        let chat_id = session.chat_id.clone();

        if let Some(n) = parse_index(text)
            && n >= 1
            && n <= session.available_routes.len()
        {
            let route = session.available_routes[n - 1].clone();
            let driver_id = session
                .driver_id
                .clone()
                .ok_or_else(|| DespachoError::Internal("choosing without identity".into()))?;

            // Belt and braces: the same human may be racing from another chat.
            if self.routes.driver_already_assigned(&driver_id).await? {
                self.say(&chat_id, messages::ALREADY_ASSIGNED).await;
                self.journal
                    .append("session_closed", &[("chat", &chat_id), ("reason", "assigned")])
                    .await;
                return self.close_slot_session(session).await;
            }

            if self.routes.assign_if_available(&route.id, &driver_id).await? {
                self.journal
                    .append(
                        "claim",
                        &[("chat", &chat_id), ("route", &route.id), ("ok", "true")],
                    )
                    .await;
                if let Err(e) = self.export.set_assigned(&route.id, &driver_id).await {
                    warn!(route_id = route.id.as_str(), error = %e, "assignment export failed");
                    self.journal
                        .append("export_failed", &[("route", &route.id)])
                        .await;
                }
                self.say(&chat_id, &messages::claim_success(&route)).await;
                info!(
                    chat_id = chat_id.as_str(),
                    route_id = route.id.as_str(),
                    driver_id = driver_id.as_str(),
                    "route claimed"
                );
                return self.close_slot_session(session).await;
            }

            // Raced: someone claimed it between render and reply.
            self.journal
                .append(
                    "claim",
                    &[("chat", &chat_id), ("route", &route.id), ("ok", "false")],
                )
                .await;
            self.say(&chat_id, messages::ROUTE_TAKEN).await;
            return self.re_render_routes(session).await;
        }

        self.say(&chat_id, messages::INVALID_OPTION).await;
        self.re_render_routes(session).await
    }

    /// Queue re-entry: any message from a waiting driver refreshes their
    /// membership and retries acquisition; `encerrar` is handled earlier.
    async fn handle_in_queue(&self, session: &mut DriverSession) -> Result<(), DespachoError> {
        let chat_id = session.chat_id.clone();
        match self.try_serve(session).await? {
            ServeOutcome::Entered => Ok(()),
            ServeOutcome::Waiting { .. } => {
                self.say(&chat_id, messages::STILL_IN_QUEUE).await;
                Ok(())
            }
        }
    }

    // --- Serving flow ---

    /// Enqueue (idempotently) and try to take the active slot.
    async fn try_serve(&self, session: &mut DriverSession) -> Result<ServeOutcome, DespachoError> {
        let chat_id = session.chat_id.clone();
        let group = session.group();
        let slot = self.slot_for(group)?.clone();

        let position = slot.queue().enqueue(&chat_id).await?;
        self.journal
            .append(
                "enqueue",
                &[
                    ("chat", &chat_id),
                    ("group", &group.to_string()),
                    ("pos", &position.to_string()),
                ],
            )
            .await;

        let acquire = slot.try_acquire(&chat_id).await?;

        if let Some(expired) = acquire.expired
            && expired != chat_id
        {
            self.expired_cleanup(&expired).await;
        }

        match acquire.outcome {
            AcquireOutcome::Held | AcquireOutcome::Activated => {
                let follow = self.enter_choosing_route(session).await?;
                self.activation_chain(group, follow).await?;
                Ok(ServeOutcome::Entered)
            }
            AcquireOutcome::OtherActivated(next) => {
                self.activation_chain(group, Some(next)).await?;
                Ok(ServeOutcome::Waiting { position })
            }
            AcquireOutcome::Queued => Ok(ServeOutcome::Waiting { position }),
        }
    }

    /// Show the routes menu to the slot holder and arm the response timer.
    ///
    /// Returns a follow-up chat to activate when the slot had to be released
    /// (no routes available), so callers can continue the hand-off without
    /// recursing.
    async fn enter_choosing_route(
        &self,
        session: &mut DriverSession,
    ) -> Result<Option<String>, DespachoError> {
        let chat_id = session.chat_id.clone();
        let group = session.group();
        let slot = self.slot_for(group)?.clone();

        let Some(vehicle) = session.vehicle_type.clone() else {
            // A slot was handed to a session that lost its identity; drop it.
            self.sessions.clear(&chat_id).await?;
            return slot.release_and_next().await;
        };

        let available = self.routes.list_available_for_vehicle(&vehicle).await?;
        if available.is_empty() {
            self.say(&chat_id, messages::NO_ROUTES).await;
            session.state = SessionState::Menu;
            session.in_queue = false;
            session.available_routes.clear();
            self.sessions.save(session).await?;
            self.say(&chat_id, messages::MAIN_MENU).await;
            return slot.release_and_next().await;
        }

        session.available_routes = available.iter().map(RouteRef::from_route).collect();
        session.state = SessionState::ChoosingRoute;
        session.in_queue = false;
        self.sessions.save(session).await?;

        self.say(&chat_id, &messages::routes_menu(&session.available_routes))
            .await;
        slot.refresh_meta(&chat_id).await?;
        self.arm_response_timer(&chat_id, group).await?;

        self.journal
            .append(
                "routes_offered",
                &[
                    ("chat", &chat_id),
                    ("count", &session.available_routes.len().to_string()),
                ],
            )
            .await;
        Ok(None)
    }

    /// Re-fetch and re-render the routes menu after an invalid pick or a
    /// raced claim. Falls back to the menu when nothing is left.
    async fn re_render_routes(&self, session: &mut DriverSession) -> Result<(), DespachoError> {
        let chat_id = session.chat_id.clone();
        let group = session.group();
        let vehicle = session
            .vehicle_type
            .clone()
            .ok_or_else(|| DespachoError::Internal("choosing without vehicle".into()))?;

        let fresh = self.routes.list_available_for_vehicle(&vehicle).await?;
        if fresh.is_empty() {
            self.say(&chat_id, messages::NO_ROUTES).await;
            session.state = SessionState::Menu;
            session.available_routes.clear();
            self.sessions.save(session).await?;
            let _ = self.timers.disarm(&chat_id).await;
            let next = self.slot_for(group)?.release_and_next().await?;
            self.say(&chat_id, messages::MAIN_MENU).await;
            return self.activation_chain(group, next).await;
        }

        session.available_routes = fresh.iter().map(RouteRef::from_route).collect();
        self.sessions.save(session).await?;
        self.say(&chat_id, &messages::routes_menu(&session.available_routes))
            .await;

        let slot = self.slot_for(group)?;
        slot.refresh_meta(&chat_id).await?;
        self.arm_response_timer(&chat_id, group).await?;
        Ok(())
    }

    /// Terminal path for a slot holder: disarm, clear, release, hand off.
    async fn close_slot_session(&self, session: &mut DriverSession) -> Result<(), DespachoError> {
        let chat_id = session.chat_id.clone();
        let group = session.group();

        let _ = self.timers.disarm(&chat_id).await;
        self.sessions.clear(&chat_id).await?;
        let next = self.slot_for(group)?.release_and_next().await?;
        self.activation_chain(group, next).await
    }

    /// `encerrar` from any state.
    async fn end_session(&self, session: &mut DriverSession) -> Result<(), DespachoError> {
        let chat_id = session.chat_id.clone();
        let group = session.group();

        if session.in_queue {
            self.slot_for(group)?.queue().remove(&chat_id).await?;
            self.journal.append("dequeue", &[("chat", &chat_id)]).await;
        }

        let mut follow = None;
        if session.state == SessionState::ChoosingRoute {
            let _ = self.timers.disarm(&chat_id).await;
            follow = self.slot_for(group)?.release_and_next().await?;
        }

        self.sessions.clear(&chat_id).await?;
        self.say(&chat_id, messages::SESSION_CLOSED).await;
        self.journal
            .append("session_closed", &[("chat", &chat_id), ("reason", "user")])
            .await;
        self.activation_chain(group, follow).await
    }

    /// Walk the hand-off chain: activate waiters until one sticks or the
    /// queue drains. Iterative on purpose; every step pops a queue member,
    /// so it terminates.
    async fn activation_chain(
        &self,
        group: QueueGroup,
        first: Option<String>,
    ) -> Result<(), DespachoError> {
        let mut cursor = first;
        while let Some(chat_id) = cursor {
            cursor = match self.sessions.load(&chat_id).await? {
                Some(mut session) if session.is_identified() => {
                    self.enter_choosing_route(&mut session).await?
                }
                _ => {
                    // The waiter's session idled out while queued.
                    debug!(chat_id = chat_id.as_str(), "skipping stale waiter");
                    self.journal
                        .append("skip_stale_waiter", &[("chat", &chat_id)])
                        .await;
                    self.slot_for(group)?.release_and_next().await?
                }
            };
        }
        Ok(())
    }

    // --- Timeouts ---

    /// Arm the response timer and schedule the in-process callback. The
    /// 5-second sweeper is the correctness backstop if this task dies with
    /// the process.
    ///
    /// Boxed (rather than `async fn`) to break the recursive opaque-type
    /// cycle with `timeout_fire` -> `activation_chain` ->
    /// `enter_choosing_route`, which otherwise defeats the compiler's
    /// auto-trait (`Send`) inference for the spawned callback below.
    fn arm_response_timer<'a>(
        &'a self,
        chat_id: &'a str,
        group: QueueGroup,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), DespachoError>> + Send + 'a>>
    {
        Box::pin(async move {
            let token = self.timers.arm(chat_id).await?;
            let window = self.timers.window();
            let engine = self.clone();
            let chat_id = chat_id.to_string();

            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                if let Err(e) = engine.timeout_fire(&chat_id, group, &token).await {
                    warn!(chat_id = chat_id.as_str(), error = %e, "timeout callback failed");
                }
            });
            Ok(())
        })
    }

    /// The deferred timeout callback: authoritative only while the token,
    /// the slot, and the session state all still match.
    pub async fn timeout_fire(
        &self,
        chat_id: &str,
        group: QueueGroup,
        token: &str,
    ) -> Result<(), DespachoError> {
        if !self.timers.is_current(chat_id, token).await? {
            return Ok(());
        }

        let slot = self.slot_for(group)?.clone();
        if slot.holder().await?.as_deref() != Some(chat_id) {
            self.timers.disarm(chat_id).await?;
            return Ok(());
        }

        match self.sessions.load(chat_id).await? {
            Some(session) if session.state == SessionState::ChoosingRoute => {}
            _ => {
                self.timers.disarm(chat_id).await?;
                return Ok(());
            }
        }

        self.timers.disarm(chat_id).await?;
        let next = slot.release_and_next().await?;
        self.sessions.clear(chat_id).await?;
        self.say(chat_id, messages::CLOSED_INACTIVITY).await;
        self.journal
            .append(
                "timeout",
                &[("chat", chat_id), ("group", &group.to_string())],
            )
            .await;
        info!(chat_id, %group, "session closed by response timeout");
        self.activation_chain(group, next).await
    }

    /// Cleanup for a holder whose slot the controller already reclaimed.
    pub(crate) async fn expired_cleanup(&self, chat_id: &str) {
        let _ = self.timers.disarm(chat_id).await;
        if let Err(e) = self.sessions.clear(chat_id).await {
            warn!(chat_id, error = %e, "failed to clear expired session");
        }
        self.say(chat_id, messages::CLOSED_INACTIVITY).await;
        self.journal
            .append("timeout", &[("chat", chat_id), ("by", "sweeper")])
            .await;
    }

    /// One sweeper pass for a group: reclaim an abandoned slot, then make
    /// sure a free slot does not sit idle while drivers wait.
    pub async fn sweep(&self, group: QueueGroup) -> Result<(), DespachoError> {
        let slot = self.slot_for(group)?.clone();

        if let Some(expired) = slot.reclaim_expired().await? {
            self.expired_cleanup(&expired).await;
        }

        if slot.holder().await?.is_none() {
            let next = slot.activate_next().await?;
            self.activation_chain(group, next).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl UpdateHandler for Engine {
    async fn handle_update(&self, chat_id: &str, text: &str) -> Result<(), DespachoError> {
        self.process(chat_id, text).await
    }
}

/// `encerrar` ends the session in any state; the legacy `0` alias is kept
/// everywhere except pre-identity states, where a bare digit is an id guess.
fn is_end_command(text: &str, state: &SessionState) -> bool {
    if text.eq_ignore_ascii_case("encerrar") {
        return true;
    }
    match state {
        SessionState::WaitingId | SessionState::AwaitingSyncPassword { .. } => false,
        _ => text == "0",
    }
}

fn is_numeric(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn parse_index(text: &str) -> Option<usize> {
    if is_numeric(text) { text.parse().ok() } else { None }
}
