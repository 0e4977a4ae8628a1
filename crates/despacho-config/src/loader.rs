// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./despacho.toml` > `~/.config/despacho/despacho.toml`
//! > `/etc/despacho/despacho.toml` with environment variable overrides via the
//! `DESPACHO_` prefix, plus the bare operational names operators already use
//! (`REDIS_URL`, `DATABASE_URL`, `SYNC_PASSWORD`, ...).

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::DespachoConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/despacho/despacho.toml` (system-wide)
/// 3. `~/.config/despacho/despacho.toml` (user XDG config)
/// 4. `./despacho.toml` (local directory)
/// 5. Bare operational env vars (`REDIS_URL`, `DATABASE_URL`, ...)
/// 6. `DESPACHO_*` environment variables
pub fn load_config() -> Result<DespachoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DespachoConfig::default()))
        .merge(Toml::file("/etc/despacho/despacho.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("despacho/despacho.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("despacho.toml"))
        .merge(bare_env_provider())
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config file specification.
pub fn load_config_from_str(toml_content: &str) -> Result<DespachoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DespachoConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DespachoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DespachoConfig::default()))
        .merge(Toml::file(path))
        .merge(bare_env_provider())
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `DESPACHO_TELEGRAM_BOT_TOKEN` must map to
/// `telegram.bot_token`, not `telegram.bot.token`.
fn env_provider() -> Env {
    Env::prefixed("DESPACHO_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("telegram_", "telegram.", 1)
            .replacen("kv_", "kv.", 1)
            .replacen("database_", "database.", 1)
            .replacen("queue_", "queue.", 1)
            .replacen("sync_", "sync.", 1);
        mapped.into()
    })
}

/// Bare operational names, mapped onto their dotted keys.
///
/// These predate the sectioned config and still drive deployments, so they
/// stay recognized alongside the `DESPACHO_` forms.
fn bare_env_provider() -> Env {
    Env::raw()
        .only(&[
            "STATE_TTL",
            "QUEUE_TTL",
            "BLOCKLIST_WAIT_SECONDS",
            "SYNC_PASSWORD",
            "REDIS_URL",
            "DATABASE_URL",
            "TELEGRAM_BOT_TOKEN",
        ])
        .map(|key| {
            // Raw keys keep their original case; normalize before mapping.
            match key.as_str().to_ascii_lowercase().as_str() {
                "state_ttl" => "queue.state_ttl_secs",
                "queue_ttl" => "queue.slot_ttl_secs",
                "blocklist_wait_seconds" => "queue.blocklist_wait_secs",
                "sync_password" => "sync.password",
                "redis_url" => "kv.redis_url",
                "database_url" => "database.url",
                "telegram_bot_token" => "telegram.bot_token",
                other => other,
            }
            .to_string()
            .into()
        })
}
