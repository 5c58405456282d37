//! REST control plane seam.

use async_trait::async_trait;

use snek_core::{Application, Channel, Member, Scope, Snowflake, User};
use snek_protocol::{ApplicationCommandPayload, GuildCommandPermissions, GuildPayload};

use crate::error::HttpError;

/// Result type for REST calls.
pub type HttpResult<T> = Result<T, HttpError>;

/// The REST operations the client consumes.
///
/// Implementations own rate limiting and retries; every method surfaces
/// [`HttpError::Forbidden`] distinctly from [`HttpError::NotFound`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Validates the token and returns the bot user.
    async fn login(&self, token: &str) -> HttpResult<User>;

    async fn get_current_application(&self) -> HttpResult<Application>;

    /// Lists the commands registered in `scope`.
    async fn get_commands(
        &self,
        app_id: Snowflake,
        scope: Scope,
    ) -> HttpResult<Vec<ApplicationCommandPayload>>;

    /// Bulk-overwrites the commands in `scope`, returning the registered set.
    async fn post_commands(
        &self,
        app_id: Snowflake,
        commands: &[ApplicationCommandPayload],
        scope: Scope,
    ) -> HttpResult<Vec<ApplicationCommandPayload>>;

    async fn delete_command(&self, app_id: Snowflake, scope: Scope, id: Snowflake) -> HttpResult<()>;

    /// Bulk-overwrites command permissions in one guild.
    async fn set_permissions(
        &self,
        app_id: Snowflake,
        guild_id: Snowflake,
        data: &[GuildCommandPermissions],
    ) -> HttpResult<()>;

    async fn get_guild(&self, guild_id: Snowflake) -> HttpResult<GuildPayload>;

    async fn get_channel(&self, channel_id: Snowflake) -> HttpResult<Channel>;

    async fn get_user(&self, user_id: Snowflake) -> HttpResult<User>;

    async fn get_member(&self, guild_id: Snowflake, user_id: Snowflake) -> HttpResult<Member>;
}
