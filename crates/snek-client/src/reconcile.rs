//! Command reconciliation against the remote registry.
//!
//! For every scope the bot can register commands in, the local payloads are
//! compared with the remote list. A scope with any new or changed command
//! is pushed with one bulk overwrite; a scope that is already up to date
//! issues no write at all, which keeps repeated passes idempotent.
//!
//! Orphans (remote commands with no local counterpart) are only removed
//! when the delete policy is on. With the policy off they are carried in
//! the bulk overwrite so pushing a dirty scope never drops them.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use snek_core::{Scope, Snowflake};
use snek_protocol::{sync_needed, ApplicationCommandPayload, GuildCommandPermissions};
use snek_transport::{HttpError, HttpTransport};

use crate::command::CommandRegistry;

// ============================================================================
// Errors and Report
// ============================================================================

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The bot lacks the `applications.commands` grant for this scope.
    #[error("Unable to sync commands for {scope}: missing access (is the bot authorised with `applications.commands`?)")]
    MissingAccess { scope: Scope },

    #[error("command sync failed for {scope}: {source}")]
    Http {
        scope: Scope,
        #[source]
        source: HttpError,
    },

    #[error("client is not logged in")]
    NotLoggedIn,
}

impl ReconcileError {
    fn from_http(scope: Scope, err: HttpError) -> Self {
        if err.is_forbidden() {
            Self::MissingAccess { scope }
        } else {
            Self::Http { scope, source: err }
        }
    }
}

/// Outcome of a reconciliation or caching pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Scopes that received a bulk overwrite.
    pub pushed: Vec<Scope>,
    /// Scopes that were already up to date.
    pub up_to_date: Vec<Scope>,
    /// Individually deleted orphans.
    pub deleted: Vec<(Scope, String)>,
    /// Guilds whose permissions were pushed.
    pub permission_guilds: Vec<Snowflake>,
    /// Scopes that failed; other scopes were still processed.
    pub failures: Vec<ReconcileError>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ============================================================================
// Reconciler
// ============================================================================

pub struct Reconciler {
    http: Arc<dyn HttpTransport>,
    registry: Arc<RwLock<CommandRegistry>>,
    delete_unused: bool,
    /// Last successful permission push per guild.
    pushed_permissions: Mutex<HashMap<Snowflake, Vec<GuildCommandPermissions>>>,
}

impl Reconciler {
    pub fn new(
        http: Arc<dyn HttpTransport>,
        registry: Arc<RwLock<CommandRegistry>>,
        delete_unused: bool,
    ) -> Self {
        Self {
            http,
            registry,
            delete_unused,
            pushed_permissions: Mutex::new(HashMap::new()),
        }
    }

    /// Scopes to visit: every local scope, every guild the bot is in, and global.
    async fn scopes(&self, bot_guilds: &[Snowflake]) -> BTreeSet<Scope> {
        let mut scopes: BTreeSet<Scope> = self.registry.read().await.scopes().into_iter().collect();
        scopes.extend(bot_guilds.iter().copied().map(Scope::Guild));
        scopes.insert(Scope::Global);
        scopes
    }

    /// Pushes local commands and permissions to the remote registry.
    pub async fn synchronise(&self, app_id: Snowflake, bot_guilds: &[Snowflake]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for scope in self.scopes(bot_guilds).await {
            if let Err(err) = self.synchronise_scope(app_id, scope, &mut report).await {
                error!(%scope, error = %err, "Command sync failed for scope");
                report.failures.push(err);
            }
        }

        self.push_permissions(app_id, &mut report).await;
        report
    }

    async fn synchronise_scope(
        &self,
        app_id: Snowflake,
        scope: Scope,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        let local = self.registry.read().await.payloads(scope);

        let remote = match self.http.get_commands(app_id, scope).await {
            Ok(remote) => remote,
            Err(err) if local.is_empty() && err.is_forbidden() => {
                debug!(%scope, "Bot was not invited to guild with `applications.commands` scope");
                return Ok(());
            }
            Err(err) => return Err(ReconcileError::from_http(scope, err)),
        };

        let local_names: HashSet<&str> = local.iter().map(|c| c.name.as_str()).collect();
        let orphans: Vec<&ApplicationCommandPayload> = remote
            .iter()
            .filter(|r| !local_names.contains(r.name.as_str()))
            .collect();
        let changed = local
            .iter()
            .any(|l| sync_needed(l, remote.iter().find(|r| r.name == l.name)));
        // With the delete policy on, orphans in an otherwise unchanged scope
        // are deleted one by one below instead of forcing an overwrite.
        let dirty = changed || (!orphans.is_empty() && !self.delete_unused);

        if dirty {
            for orphan in &orphans {
                debug!(%scope, "Removing \"/{}\" from {scope}: no local implementation", orphan.name);
            }
            info!(%scope, "Updating {} commands in {scope}", local.len());

            let registered = self
                .http
                .post_commands(app_id, &local, scope)
                .await
                .map_err(|err| ReconcileError::from_http(scope, err))?;

            let mut registry = self.registry.write().await;
            for command in &registered {
                registry.record_remote(scope, command);
            }
            report.pushed.push(scope);
            return Ok(());
        }

        debug!(%scope, "{scope} is already up-to-date with {} commands.", remote.len());
        {
            let mut registry = self.registry.write().await;
            for command in &remote {
                registry.record_remote(scope, command);
            }
        }
        report.up_to_date.push(scope);

        if self.delete_unused {
            for orphan in orphans {
                let Some(id) = orphan.id else {
                    continue;
                };
                warn!(%scope, "Deleting unimplemented slash command \"/{}\" from scope {scope}", orphan.name);
                self.http
                    .delete_command(app_id, scope, id)
                    .await
                    .map_err(|err| ReconcileError::from_http(scope, err))?;
                report.deleted.push((scope, orphan.name.clone()));
            }
        }
        Ok(())
    }

    /// Pushes permission overwrites, one bulk call per target guild, for
    /// guilds whose overwrites changed since the last successful push.
    async fn push_permissions(&self, app_id: Snowflake, report: &mut ReconcileReport) {
        let plan = {
            let registry = self.registry.read().await;
            let mut plan: Vec<(Snowflake, Vec<GuildCommandPermissions>)> = Vec::new();
            for (guild_id, commands) in registry.permission_plan() {
                let mut data = Vec::new();
                for ((scope, name), permissions) in commands {
                    match registry.command_id(scope, &name) {
                        Some(id) => data.push(GuildCommandPermissions { id, permissions }),
                        None => warn!(%scope, command = %name, "No remote id for command, skipping its permissions"),
                    }
                }
                if !data.is_empty() {
                    plan.push((guild_id, data));
                }
            }
            plan
        };

        let mut pushed = self.pushed_permissions.lock().await;
        for (guild_id, data) in plan {
            if pushed.get(&guild_id) == Some(&data) {
                continue;
            }
            debug!(guild_id = %guild_id, "Updating {} command permissions in {guild_id}", data.len());
            match self.http.set_permissions(app_id, guild_id, &data).await {
                Ok(()) => {
                    pushed.insert(guild_id, data);
                    report.permission_guilds.push(guild_id);
                }
                Err(err) => report
                    .failures
                    .push(ReconcileError::from_http(Scope::Guild(guild_id), err)),
            }
        }
    }

    /// Records remote ids and scopes without writing anything.
    ///
    /// With `warn_missing`, logs local commands that are yet to be synced
    /// and remote commands with no local implementation.
    pub async fn cache_interactions(
        &self,
        app_id: Snowflake,
        bot_guilds: &[Snowflake],
        warn_missing: bool,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let local_scopes: BTreeSet<Scope> = self.registry.read().await.scopes().into_iter().collect();

        for scope in self.scopes(bot_guilds).await {
            let is_local = local_scopes.contains(&scope);
            let remote = match self.http.get_commands(app_id, scope).await {
                Ok(remote) => remote,
                Err(err) if !is_local && err.is_forbidden() => {
                    debug!(%scope, "Bot was not invited to guild with `applications.commands` scope");
                    continue;
                }
                Err(err) => {
                    report.failures.push(ReconcileError::from_http(scope, err));
                    continue;
                }
            };

            let local = self.registry.read().await.payloads(scope);
            let mut registry = self.registry.write().await;
            for command in &remote {
                if local.iter().any(|l| l.name == command.name) {
                    registry.record_remote(scope, command);
                } else {
                    if let Some(id) = command.id {
                        registry.record_scope(id, scope);
                    }
                    if warn_missing {
                        error!(%scope, "Detected unimplemented slash command \"/{}\" for scope {scope}", command.name);
                    }
                }
            }
            if warn_missing {
                for missing in local.iter().filter(|l| !remote.iter().any(|r| r.name == l.name)) {
                    error!(%scope, "Detected yet to sync slash command \"/{}\" for scope {scope}", missing.name);
                }
            }
            report.up_to_date.push(scope);
        }
        report
    }
}
