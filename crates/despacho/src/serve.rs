// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `despacho serve` command implementation.
//!
//! The composition root: connects Redis and Postgres, builds the per-group
//! queue engines and slot controllers, wires the session engine, spawns the
//! sweepers, and runs the webhook server until SIGINT/SIGTERM. The KV
//! store's TTLs guarantee reconvergence after a restart, so shutdown simply
//! abandons in-flight timers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use despacho_config::DespachoConfig;
use despacho_core::{
    ChatSender, DespachoError, DriverRepository, ExportSink, KvStore, QueueGroup,
    RouteRepository, SyncRunner,
};
use despacho_dispatch::{
    QueueEngine, QueueTuning, SlotController, SlotTuning, TimerTokens,
};
use despacho_kv::{AdvisoryLock, EventJournal, LockSettings, RedisKv};
use despacho_session::{Engine, EngineParts, SessionRanks, SessionStore, spawn_sweepers};
use despacho_store::{
    DisabledExportSink, DisabledSyncRunner, HttpExportSink, HttpSyncRunner, PgDriverRepository,
    PgRouteRepository,
};
use despacho_telegram::{TelegramSender, WebhookState, start_webhook};

/// Runs the `despacho serve` command.
pub async fn run_serve(config: DespachoConfig) -> Result<(), DespachoError> {
    init_tracing(&config.agent.log_level);

    info!(agent = config.agent.name.as_str(), "starting despacho serve");

    config.validate_for_serve().inspect_err(|e| {
        eprintln!("error: {e}");
    })?;

    // Shared KV store: the only cross-task mutable resource.
    let kv: Arc<dyn KvStore> = Arc::new(RedisKv::connect(&config.kv.redis_url).await?);

    // Driver/route repositories over one Postgres pool.
    let pool = despacho_store::connect(
        config.database.url.as_deref().unwrap_or_default(),
        config.database.max_connections,
    )
    .await?;
    let drivers: Arc<dyn DriverRepository> = Arc::new(PgDriverRepository::new(pool.clone()));
    let routes: Arc<dyn RouteRepository> = Arc::new(PgRouteRepository::new(pool));

    // Best-effort assignment export.
    let export: Arc<dyn ExportSink> = match &config.sync.export_url {
        Some(url) => Arc::new(HttpExportSink::new(url.clone())?),
        None => {
            info!("assignment export disabled (no sync.export_url)");
            Arc::new(DisabledExportSink)
        }
    };

    // External ETL trigger for admin syncs.
    let sync: Arc<dyn SyncRunner> = match &config.sync.etl_url {
        Some(url) => Arc::new(HttpSyncRunner::new(
            url.clone(),
            Duration::from_secs(config.sync.flag_ttl_secs),
        )?),
        None => {
            warn!("sync.etl_url not configured; admin syncs will be rejected");
            Arc::new(DisabledSyncRunner)
        }
    };

    // Sessions and rank resolution.
    let sessions = SessionStore::new(
        kv.clone(),
        Duration::from_secs(config.queue.state_ttl_secs),
    );
    let ranks = Arc::new(SessionRanks::new(
        kv.clone(),
        sessions.clone(),
        drivers.clone(),
    ));

    // Per-group queue engines and slot controllers.
    let lock_settings = LockSettings {
        ttl: Duration::from_secs(config.queue.lock_ttl_secs),
        retries: config.queue.lock_retries,
        retry_delay: Duration::from_millis(config.queue.lock_retry_delay_ms),
    };
    let queue_tuning = QueueTuning {
        member_ttl: Duration::from_secs(config.queue.state_ttl_secs),
        blocklist_wait: Duration::from_secs(config.queue.blocklist_wait_secs),
    };
    let slot_tuning = SlotTuning {
        slot_ttl: Duration::from_secs(config.queue.slot_ttl_secs),
        meta_ttl: Duration::from_secs(config.queue.meta_ttl_secs),
    };

    let mut slots = HashMap::new();
    for group in QueueGroup::ALL {
        let lock = AdvisoryLock::new(kv.clone(), lock_settings.clone());
        let queue = Arc::new(QueueEngine::new(
            kv.clone(),
            lock.clone(),
            ranks.clone(),
            group,
            queue_tuning.clone(),
        ));
        slots.insert(
            group,
            Arc::new(SlotController::new(
                kv.clone(),
                lock,
                queue,
                group,
                slot_tuning.clone(),
            )),
        );
        debug!(%group, "queue group wired");
    }

    // Outbound chat sender.
    let sender: Arc<dyn ChatSender> = Arc::new(TelegramSender::new(
        config.telegram.bot_token.as_deref().unwrap_or_default(),
    )?);

    let engine = Engine::new(EngineParts {
        kv: kv.clone(),
        sessions,
        drivers,
        routes,
        sender,
        export,
        sync,
        journal: EventJournal::new(kv.clone()),
        timers: Arc::new(TimerTokens::new(
            kv.clone(),
            Duration::from_secs(config.queue.slot_ttl_secs),
        )),
        slots,
        sync_password: config.sync.password.clone().unwrap_or_default(),
        sync_flag_ttl: Duration::from_secs(config.sync.flag_ttl_secs),
    });

    // Install signal handler and spawn the per-group sweepers.
    let cancel = install_signal_handler();
    let sweeper_handles = spawn_sweepers(
        engine.clone(),
        Duration::from_secs(config.queue.sweep_interval_secs),
        cancel.clone(),
    );

    // Webhook server runs until shutdown.
    let state = WebhookState::new(Arc::new(engine));
    start_webhook(
        &config.telegram.webhook_host,
        config.telegram.webhook_port,
        state,
        cancel.clone(),
    )
    .await?;

    for handle in sweeper_handles {
        let _ = handle.await;
    }

    info!("despacho serve shutdown complete");
    Ok(())
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] cancelled when either signal arrives.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("despacho={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
