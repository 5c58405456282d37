//! Entity cache with read-through REST lookups.
//!
//! The cache keeps the handful of entities routing needs: guilds, channels,
//! users, members (keyed by guild and user) and roles. Every guild insert
//! bumps a `watch` counter the readiness gate waits on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::debug;

use snek_core::{Channel, Guild, Member, Role, Snowflake, User};
use snek_protocol::GuildPayload;
use snek_transport::{HttpResult, HttpTransport};

/// Shared entity cache.
pub struct GlobalCache {
    http: Arc<dyn HttpTransport>,
    guilds: RwLock<HashMap<Snowflake, Guild>>,
    channels: RwLock<HashMap<Snowflake, Channel>>,
    users: RwLock<HashMap<Snowflake, User>>,
    members: RwLock<HashMap<(Snowflake, Snowflake), Member>>,
    roles: RwLock<HashMap<Snowflake, Role>>,
    guild_inserts: watch::Sender<u64>,
}

impl GlobalCache {
    pub fn new(http: Arc<dyn HttpTransport>) -> Self {
        let (guild_inserts, _) = watch::channel(0);
        Self {
            http,
            guilds: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            members: RwLock::new(HashMap::new()),
            roles: RwLock::new(HashMap::new()),
            guild_inserts,
        }
    }

    /// Receiver that changes whenever a guild is inserted.
    pub fn subscribe_guild_inserts(&self) -> watch::Receiver<u64> {
        self.guild_inserts.subscribe()
    }

    // ========================================================================
    // Inserts
    // ========================================================================

    pub async fn place_user_data(&self, user: User) -> User {
        self.users.write().await.insert(user.id, user.clone());
        user
    }

    /// Caches a member and its user.
    pub async fn place_member_data(&self, guild_id: Snowflake, mut member: Member) -> Member {
        member.guild_id = guild_id;
        self.place_user_data(member.user.clone()).await;
        self.members
            .write()
            .await
            .insert((guild_id, member.user.id), member.clone());
        member
    }

    pub async fn place_channel_data(&self, channel: Channel) -> Channel {
        self.channels.write().await.insert(channel.id, channel.clone());
        channel
    }

    /// Caches a guild with its channels, roles and members, then signals
    /// the insert counter.
    pub async fn place_guild_data(&self, payload: &GuildPayload) -> Guild {
        let guild = payload.guild();

        for channel in &payload.channels {
            let mut channel = channel.clone();
            channel.guild_id = Some(payload.id);
            self.place_channel_data(channel).await;
        }
        {
            let mut roles = self.roles.write().await;
            for role in &payload.roles {
                let mut role = role.clone();
                role.guild_id = Some(payload.id);
                roles.insert(role.id, role);
            }
        }
        for member in &payload.members {
            self.place_member_data(payload.id, member.clone()).await;
        }

        self.guilds.write().await.insert(guild.id, guild.clone());
        self.guild_inserts.send_modify(|count| *count = count.wrapping_add(1));
        debug!(guild_id = %guild.id, channels = payload.channels.len(), "Cached guild");
        guild
    }

    // ========================================================================
    // Cache-only Lookups
    // ========================================================================

    pub async fn cached_guild(&self, id: Snowflake) -> Option<Guild> {
        self.guilds.read().await.get(&id).cloned()
    }

    pub async fn cached_channel(&self, id: Snowflake) -> Option<Channel> {
        self.channels.read().await.get(&id).cloned()
    }

    pub async fn cached_user(&self, id: Snowflake) -> Option<User> {
        self.users.read().await.get(&id).cloned()
    }

    pub async fn cached_member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Member> {
        self.members.read().await.get(&(guild_id, user_id)).cloned()
    }

    pub async fn cached_role(&self, id: Snowflake) -> Option<Role> {
        self.roles.read().await.get(&id).cloned()
    }

    /// Ids of every cached guild.
    pub async fn guild_ids(&self) -> HashSet<Snowflake> {
        self.guilds.read().await.keys().copied().collect()
    }

    // ========================================================================
    // Read-through Lookups
    // ========================================================================

    pub async fn get_guild(&self, id: Snowflake) -> HttpResult<Guild> {
        if let Some(guild) = self.cached_guild(id).await {
            return Ok(guild);
        }
        let payload = self.http.get_guild(id).await?;
        Ok(self.place_guild_data(&payload).await)
    }

    pub async fn get_channel(&self, id: Snowflake) -> HttpResult<Channel> {
        if let Some(channel) = self.cached_channel(id).await {
            return Ok(channel);
        }
        let channel = self.http.get_channel(id).await?;
        Ok(self.place_channel_data(channel).await)
    }

    pub async fn get_user(&self, id: Snowflake) -> HttpResult<User> {
        if let Some(user) = self.cached_user(id).await {
            return Ok(user);
        }
        let user = self.http.get_user(id).await?;
        Ok(self.place_user_data(user).await)
    }

    pub async fn get_member(&self, guild_id: Snowflake, user_id: Snowflake) -> HttpResult<Member> {
        if let Some(member) = self.cached_member(guild_id, user_id).await {
            return Ok(member);
        }
        let member = self.http.get_member(guild_id, user_id).await?;
        Ok(self.place_member_data(guild_id, member).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snek_core::Application;
    use snek_transport::{HttpCall, MemoryHttp};

    fn http() -> MemoryHttp {
        MemoryHttp::new(
            User::new(1u64, "bot").as_bot(),
            Application {
                id: Snowflake::new(1),
                name: "bot".to_string(),
                owner: None,
            },
        )
    }

    #[tokio::test]
    async fn test_read_through_populates_cache() {
        let http = http().with_user(User::new(5u64, "alice"));
        let cache = GlobalCache::new(Arc::new(http.clone()));

        assert!(cache.cached_user(Snowflake::new(5)).await.is_none());
        let user = cache.get_user(Snowflake::new(5)).await.unwrap();
        assert_eq!(user.username, "alice");

        cache.get_user(Snowflake::new(5)).await.unwrap();
        let fetches = http
            .calls()
            .into_iter()
            .filter(|c| matches!(c, HttpCall::GetUser { .. }))
            .count();
        assert_eq!(fetches, 1);
    }

    #[tokio::test]
    async fn test_guild_insert_caches_children_and_signals() {
        let cache = GlobalCache::new(Arc::new(http()));
        let mut inserts = cache.subscribe_guild_inserts();

        let mut payload = GuildPayload::new(10u64, "guild");
        payload.channels.push(Channel::new(11u64, "general"));
        payload.roles.push(Role::new(12u64, "mods"));
        payload
            .members
            .push(Member::new(Snowflake::default(), User::new(13u64, "dave")));
        cache.place_guild_data(&payload).await;

        assert!(inserts.has_changed().unwrap());
        assert_eq!(
            cache.cached_channel(Snowflake::new(11)).await.and_then(|c| c.guild_id),
            Some(Snowflake::new(10))
        );
        assert!(cache.cached_role(Snowflake::new(12)).await.is_some());
        assert!(cache
            .cached_member(Snowflake::new(10), Snowflake::new(13))
            .await
            .is_some());
        assert!(cache.cached_user(Snowflake::new(13)).await.is_some());
        assert_eq!(cache.guild_ids().await, HashSet::from([Snowflake::new(10)]));
        inserts.borrow_and_update();
    }
}
