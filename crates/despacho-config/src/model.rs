// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the despacho dispatcher.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

use despacho_core::DespachoError;

/// Top-level despacho configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values;
/// secrets are validated separately at serve time.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DespachoConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub kv: KvConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

impl DespachoConfig {
    /// Boot-time validation for `despacho serve`.
    ///
    /// Missing required secrets are fatal: the process refuses to start
    /// rather than limp along with a half-wired stack.
    pub fn validate_for_serve(&self) -> Result<(), DespachoError> {
        if self.telegram.bot_token.as_deref().unwrap_or("").is_empty() {
            return Err(DespachoError::Config(
                "telegram.bot_token is required (or TELEGRAM_BOT_TOKEN)".into(),
            ));
        }
        if self.database.url.as_deref().unwrap_or("").is_empty() {
            return Err(DespachoError::Config(
                "database.url is required (or DATABASE_URL)".into(),
            ));
        }
        if self.sync.password.as_deref().unwrap_or("").is_empty() {
            return Err(DespachoError::Config(
                "sync.password is required (or SYNC_PASSWORD)".into(),
            ));
        }
        Ok(())
    }
}

/// Process identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "despacho".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telegram bot integration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token. Required at serve time.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Webhook listener bind address.
    #[serde(default = "default_webhook_host")]
    pub webhook_host: String,

    #[serde(default = "default_webhook_port")]
    pub webhook_port: u16,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            webhook_host: default_webhook_host(),
            webhook_port: default_webhook_port(),
        }
    }
}

fn default_webhook_host() -> String {
    "0.0.0.0".to_string()
}

fn default_webhook_port() -> u16 {
    8080
}

/// Shared KV store (Redis).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KvConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Driver/route repository (Postgres).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL. Required at serve time.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

/// Queue, slot, and timer windows. All durations in seconds unless noted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Session idle expiry.
    #[serde(default = "default_state_ttl")]
    pub state_ttl_secs: u64,

    /// Active-slot service window (also the response-timer window).
    #[serde(default = "default_slot_ttl")]
    pub slot_ttl_secs: u64,

    /// Slot metadata TTL; outlives the slot so the sweeper can observe a
    /// crashed holder unambiguously.
    #[serde(default = "default_meta_ttl")]
    pub meta_ttl_secs: u64,

    /// Deferral before a queue of only blocklisted drivers is served.
    #[serde(default = "default_blocklist_wait")]
    pub blocklist_wait_secs: u64,

    /// Per-group sweeper period.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Advisory lock TTL; must exceed the longest critical section.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,

    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    #[serde(default = "default_lock_retry_delay")]
    pub lock_retry_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: default_state_ttl(),
            slot_ttl_secs: default_slot_ttl(),
            meta_ttl_secs: default_meta_ttl(),
            blocklist_wait_secs: default_blocklist_wait(),
            sweep_interval_secs: default_sweep_interval(),
            lock_ttl_secs: default_lock_ttl(),
            lock_retries: default_lock_retries(),
            lock_retry_delay_ms: default_lock_retry_delay(),
        }
    }
}

fn default_state_ttl() -> u64 {
    10_800
}

fn default_slot_ttl() -> u64 {
    30
}

fn default_meta_ttl() -> u64 {
    60
}

fn default_blocklist_wait() -> u64 {
    120
}

fn default_sweep_interval() -> u64 {
    5
}

fn default_lock_ttl() -> u64 {
    5
}

fn default_lock_retries() -> u32 {
    8
}

fn default_lock_retry_delay() -> u64 {
    120
}

/// Admin sync handshake and external ETL/export endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Shared secret for the admin sync handshake. Required at serve time.
    #[serde(default)]
    pub password: Option<String>,

    /// External ETL trigger endpoint. `None` disables admin syncs.
    #[serde(default)]
    pub etl_url: Option<String>,

    /// Assignment-overview export endpoint. `None` disables the writeback.
    #[serde(default)]
    pub export_url: Option<String>,

    /// How long the global sync gate may stay closed.
    #[serde(default = "default_sync_flag_ttl")]
    pub flag_ttl_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            password: None,
            etl_url: None,
            export_url: None,
            flag_ttl_secs: default_sync_flag_ttl(),
        }
    }
}

fn default_sync_flag_ttl() -> u64 {
    1_800
}
