// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rank resolution for the queue engine.
//!
//! Priority score and vehicle class come from the data the session cached
//! at identification time; the blocklist flag goes through a short-lived KV
//! cache in front of the registry so re-ranking a long queue does not
//! hammer the database.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use despacho_core::{DespachoError, DriverRepository, KvStore};
use despacho_dispatch::{RankInputs, RankSource};
use despacho_kv::keys;

use crate::store::SessionStore;

/// How long a cached blocklist verdict stays fresh.
const BLOCKLIST_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct SessionRanks {
    kv: Arc<dyn KvStore>,
    sessions: SessionStore,
    drivers: Arc<dyn DriverRepository>,
}

impl SessionRanks {
    pub fn new(
        kv: Arc<dyn KvStore>,
        sessions: SessionStore,
        drivers: Arc<dyn DriverRepository>,
    ) -> Self {
        Self {
            kv,
            sessions,
            drivers,
        }
    }

    async fn blocklisted(&self, driver_id: &str) -> Result<bool, DespachoError> {
        let cache_key = keys::blocklist_cache(driver_id);
        if let Some(cached) = self.kv.get(&cache_key).await? {
            return Ok(cached == "true");
        }

        let blocked = self.drivers.blocklist_status(driver_id).await?.is_blocked();
        self.kv
            .set_ttl(
                &cache_key,
                if blocked { "true" } else { "false" },
                BLOCKLIST_CACHE_TTL,
            )
            .await?;
        debug!(driver_id, blocked, "blocklist verdict cached");
        Ok(blocked)
    }
}

#[async_trait]
impl RankSource for SessionRanks {
    async fn rank_inputs(&self, chat_id: &str) -> Result<RankInputs, DespachoError> {
        let Some(session) = self.sessions.load(chat_id).await? else {
            return Ok(RankInputs::default());
        };

        let blocklisted = match session.driver_id.as_deref() {
            Some(driver_id) => self.blocklisted(driver_id).await?,
            None => false,
        };

        Ok(RankInputs {
            priority_score: session.priority_score.unwrap_or(0),
            is_fiorino: session
                .vehicle_type
                .as_ref()
                .is_some_and(|v| v.is_fiorino()),
            blocklisted,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use despacho_core::{Driver, DriverSession, VehicleType};
    use despacho_test_utils::{FakeDrivers, MemoryKv};

    use super::*;

    async fn identified_session(
        sessions: &SessionStore,
        chat: &str,
        driver: &Driver,
    ) {
        let mut session = DriverSession::new(chat, Utc::now().to_rfc3339());
        session.identify(driver);
        sessions.save(&mut session).await.unwrap();
    }

    fn fixture() -> (Arc<dyn KvStore>, SessionStore, Arc<FakeDrivers>, SessionRanks) {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let sessions = SessionStore::new(kv.clone(), Duration::from_secs(3600));
        let drivers = Arc::new(FakeDrivers::new().with_driver("123", "Ana", "Fiorino", 80));
        let ranks = SessionRanks::new(kv.clone(), sessions.clone(), drivers.clone());
        (kv, sessions, drivers, ranks)
    }

    #[tokio::test]
    async fn resolves_cached_session_fields() {
        let (_kv, sessions, drivers, ranks) = fixture();
        let driver = drivers.find_by_id("123").await.unwrap().unwrap();
        identified_session(&sessions, "1001", &driver).await;

        let inputs = ranks.rank_inputs("1001").await.unwrap();
        assert_eq!(inputs.priority_score, 80);
        assert!(inputs.is_fiorino);
        assert!(!inputs.blocklisted);
    }

    #[tokio::test]
    async fn unknown_chat_gets_defaults() {
        let (_kv, _sessions, _drivers, ranks) = fixture();
        let inputs = ranks.rank_inputs("ghost").await.unwrap();
        assert_eq!(inputs, RankInputs::default());
    }

    #[tokio::test]
    async fn blocklist_verdict_is_cached() {
        let (kv, sessions, drivers, ranks) = fixture();
        let driver = drivers.find_by_id("123").await.unwrap().unwrap();
        identified_session(&sessions, "1001", &driver).await;
        drivers.block("123");

        assert!(ranks.rank_inputs("1001").await.unwrap().blocklisted);

        // The verdict is now served from the KV cache: unblocking the driver
        // has no effect until the cache entry expires or is invalidated.
        drivers.unblock("123");
        assert!(ranks.rank_inputs("1001").await.unwrap().blocklisted);
        assert_eq!(
            kv.get(&keys::blocklist_cache("123")).await.unwrap().as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn unidentified_session_is_not_blocklisted() {
        let (_kv, sessions, _drivers, ranks) = fixture();
        let mut session = DriverSession::new("2001", Utc::now().to_rfc3339());
        session.vehicle_type = Some(VehicleType::new("Moto"));
        sessions.save(&mut session).await.unwrap();

        let inputs = ranks.rank_inputs("2001").await.unwrap();
        assert!(!inputs.blocklisted);
        assert!(!inputs.is_fiorino);
    }
}
