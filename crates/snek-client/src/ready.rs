//! Cache readiness gate.
//!
//! After the handshake the gateway announces the guilds the bot is in,
//! then streams one guild-create per guild. The gate waits until every
//! announced guild is cached, or until no guild arrives for a bounded
//! interval, whichever comes first. It never blocks indefinitely.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use snek_core::Snowflake;

use crate::cache::GlobalCache;

/// How much of the expected cache was filled when the gate opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFill {
    Full,
    /// The gate timed out waiting for a guild.
    Partial,
}

pub struct ReadinessGate {
    cache: Arc<GlobalCache>,
    timeout: Duration,
    expected: RwLock<HashSet<Snowflake>>,
    ready: AtomicBool,
}

impl ReadinessGate {
    pub fn new(cache: Arc<GlobalCache>, timeout: Duration) -> Self {
        Self {
            cache,
            timeout,
            expected: RwLock::new(HashSet::new()),
            ready: AtomicBool::new(false),
        }
    }

    /// Waits for every guild in `expected` to be cached.
    ///
    /// Each wait for the next guild insert is bounded by the gate timeout;
    /// a timeout opens the gate with a partial cache.
    pub async fn wait_for_guilds(&self, expected: HashSet<Snowflake>) -> CacheFill {
        let mut inserts = self.cache.subscribe_guild_inserts();
        *self.expected.write().await = expected.clone();

        loop {
            let cached = self.cache.guild_ids().await;
            if expected.is_subset(&cached) {
                debug!(guilds = expected.len(), "All expected guilds cached");
                return CacheFill::Full;
            }

            match tokio::time::timeout(self.timeout, inserts.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return CacheFill::Partial,
                Err(_) => {
                    warn!(
                        missing = expected.difference(&cached).count(),
                        "Timeout waiting for guilds cache: Not all guilds will be in cache"
                    );
                    return CacheFill::Partial;
                }
            }
        }
    }

    /// Guild ids announced by the last handshake.
    pub async fn expected_guilds(&self) -> Vec<Snowflake> {
        let mut ids: Vec<Snowflake> = self.expected.read().await.iter().copied().collect();
        ids.sort();
        ids
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snek_core::{Application, User};
    use snek_protocol::GuildPayload;
    use snek_transport::MemoryHttp;

    fn cache() -> Arc<GlobalCache> {
        let http = MemoryHttp::new(
            User::new(1u64, "bot").as_bot(),
            Application {
                id: Snowflake::new(1),
                name: "bot".to_string(),
                owner: None,
            },
        );
        Arc::new(GlobalCache::new(Arc::new(http)))
    }

    #[tokio::test]
    async fn test_no_expected_guilds_is_immediately_full() {
        let gate = ReadinessGate::new(cache(), Duration::from_secs(3));
        assert_eq!(gate.wait_for_guilds(HashSet::new()).await, CacheFill::Full);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_when_guilds_arrive() {
        let cache = cache();
        let gate = Arc::new(ReadinessGate::new(Arc::clone(&cache), Duration::from_secs(3)));
        let expected = HashSet::from([Snowflake::new(10), Snowflake::new(11)]);

        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.wait_for_guilds(expected).await }
        });
        tokio::task::yield_now().await;
        cache.place_guild_data(&GuildPayload::new(10u64, "a")).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        cache.place_guild_data(&GuildPayload::new(11u64, "b")).await;

        assert_eq!(waiter.await.unwrap(), CacheFill::Full);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_after_timeout() {
        let cache = cache();
        let gate = ReadinessGate::new(Arc::clone(&cache), Duration::from_secs(3));
        cache.place_guild_data(&GuildPayload::new(10u64, "a")).await;

        let fill = gate
            .wait_for_guilds(HashSet::from([Snowflake::new(10), Snowflake::new(11)]))
            .await;
        assert_eq!(fill, CacheFill::Partial);
        assert!(!gate.is_ready());
    }
}
