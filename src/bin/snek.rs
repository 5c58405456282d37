//! snek - operator CLI for gateway bot command manifests
//!
//! Validates a TOML command manifest and previews the writes a command
//! sync would issue against a recorded remote registry, without touching
//! the network.
//!
//! # Usage
//!
//! ```text
//! snek check commands.toml                      # report conflicting declarations
//! snek plan commands.toml                       # plan against an empty remote
//! snek plan commands.toml --remote remote.json  # plan against recorded remote commands
//! snek plan commands.toml --guild 1234 --guild 5678
//! ```
//!
//! The remote file is a JSON object mapping `"global"` or a guild id to the
//! application commands registered there.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use snek_client::{ClientConfig, CommandManifest, Reconciler};
use snek_core::{Application, Scope, Snowflake, User};
use snek_protocol::ApplicationCommandPayload;
use snek_transport::{HttpCall, MemoryHttp};

/// Application id used for dry runs.
const PLAN_APP_ID: Snowflake = Snowflake::new(1);

// ============================================================================
// CLI Arguments
// ============================================================================

/// snek - gateway bot command tooling
#[derive(Parser, Debug)]
#[command(name = "snek")]
#[command(about = "Validate command manifests and preview command syncs")]
#[command(version)]
struct Args {
    /// Client config file (defaults to $SNEK_CONFIG, then the user config dir)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report every conflicting declaration in a manifest
    Check {
        /// Command manifest (TOML)
        manifest: PathBuf,
    },
    /// Print the writes a command sync would issue
    Plan {
        /// Command manifest (TOML)
        manifest: PathBuf,

        /// Recorded remote commands (JSON, keyed by "global" or guild id)
        #[arg(long, short = 'r')]
        remote: Option<PathBuf>,

        /// Guild the bot is in (repeatable)
        #[arg(long = "guild", short = 'g')]
        guilds: Vec<Snowflake>,
    },
}

// ============================================================================
// Configuration
// ============================================================================

/// `--config`, then `SNEK_CONFIG`, then `<config dir>/snek/config.toml`.
fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .or_else(|| std::env::var_os("SNEK_CONFIG").map(PathBuf::from))
        .or_else(|| dirs::config_dir().map(|dir| dir.join("snek").join("config.toml")))
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading client config");
            ClientConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))
        }
        None => Ok(ClientConfig::default()),
    }
}

fn load_manifest(path: &Path) -> Result<CommandManifest> {
    CommandManifest::load(path).with_context(|| format!("failed to load manifest {}", path.display()))
}

/// Reads a recorded remote registry.
fn load_remote(path: &Path) -> Result<BTreeMap<Scope, Vec<ApplicationCommandPayload>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw: BTreeMap<String, Vec<ApplicationCommandPayload>> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    raw.into_iter()
        .map(|(key, commands)| {
            let scope = key
                .parse::<Scope>()
                .with_context(|| format!("invalid scope key {key:?} in {}", path.display()))?;
            Ok((scope, commands))
        })
        .collect()
}

// ============================================================================
// Commands
// ============================================================================

fn check(manifest: &CommandManifest, config: &ClientConfig) -> Vec<String> {
    manifest
        .check(config.debug_scope)
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Runs a full sync against an in-memory remote and returns the writes.
async fn plan(
    manifest: &CommandManifest,
    config: &ClientConfig,
    remote: BTreeMap<Scope, Vec<ApplicationCommandPayload>>,
    guilds: &[Snowflake],
) -> Result<Vec<HttpCall>> {
    let registry = manifest.to_registry(config.debug_scope)?;

    let mut http = MemoryHttp::new(
        User::new(PLAN_APP_ID, "snek").as_bot(),
        Application {
            id: PLAN_APP_ID,
            name: "snek".to_string(),
            owner: None,
        },
    );
    for (scope, commands) in remote {
        http = http.with_commands(scope, commands);
    }

    let reconciler = Reconciler::new(
        Arc::new(http.clone()),
        Arc::new(RwLock::new(registry)),
        config.delete_unused_application_cmds,
    );
    let report = reconciler.synchronise(PLAN_APP_ID, guilds).await;
    for failure in &report.failures {
        warn!(error = %failure, "Scope could not be planned");
    }

    Ok(http.write_calls())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("snek=info".parse()?)
                .add_directive("snek_client=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = load_config(config_path(args.config).as_deref())?;

    match args.command {
        Command::Check { manifest: path } => {
            let manifest = load_manifest(&path)?;
            let problems = check(&manifest, &config);
            if !problems.is_empty() {
                for problem in &problems {
                    eprintln!("error: {problem}");
                }
                bail!("{} problem(s) in {}", problems.len(), path.display());
            }
            println!("{}: {} declarations, no conflicts", path.display(), manifest.len());
        }
        Command::Plan {
            manifest: path,
            remote,
            guilds,
        } => {
            let manifest = load_manifest(&path)?;
            let remote = match remote {
                Some(remote) => load_remote(&remote)?,
                None => BTreeMap::new(),
            };
            info!(scopes = remote.len(), guilds = guilds.len(), "Planning command sync");

            let writes = plan(&manifest, &config, remote, &guilds).await?;
            if writes.is_empty() {
                println!("Remote commands are up to date.");
            } else {
                println!("{} write(s):", writes.len());
                for call in &writes {
                    println!("  {call}");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MANIFEST: &str = r#"
        [[command]]
        name = "ping"
        description = "Pong"

        [[command]]
        name = "tag"
        description = "Tags"
        scopes = ["global", "10"]
        sub_command = "create"
    "#;

    fn write_temp(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let explicit = PathBuf::from("/tmp/explicit.toml");
        assert_eq!(config_path(Some(explicit.clone())), Some(explicit));
    }

    #[test]
    fn test_check_reports_conflicts() {
        let file = write_temp("[[message_command]]\nname = \"a\"\n[[message_command]]\nname = \"a\"\n");
        let manifest = load_manifest(file.path()).unwrap();

        let problems = check(&manifest, &ClientConfig::default());
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("`a`"));

        let clean = load_manifest(write_temp(MANIFEST).path()).unwrap();
        assert!(check(&clean, &ClientConfig::default()).is_empty());
    }

    #[tokio::test]
    async fn test_plan_against_empty_remote_pushes_every_scope() {
        let manifest = CommandManifest::from_toml_str(MANIFEST).unwrap();

        let writes = plan(&manifest, &ClientConfig::default(), BTreeMap::new(), &[])
            .await
            .unwrap();

        let scopes: Vec<Scope> = writes
            .iter()
            .filter_map(|call| match call {
                HttpCall::PostCommands { scope, .. } => Some(*scope),
                _ => None,
            })
            .collect();
        assert_eq!(scopes, vec![Scope::Global, Scope::Guild(Snowflake::new(10))]);
    }

    #[tokio::test]
    async fn test_plan_against_synced_remote_is_empty() {
        let manifest = CommandManifest::from_toml_str(MANIFEST).unwrap();
        let registry = manifest.to_registry(None).unwrap();
        let remote = serde_json::json!({
            "global": registry.payloads(Scope::Global),
            "10": registry.payloads(Scope::Guild(Snowflake::new(10))),
        });
        let file = write_temp(&remote.to_string());

        let remote = load_remote(file.path()).unwrap();
        assert_eq!(remote.len(), 2);

        let writes = plan(&manifest, &ClientConfig::default(), remote, &[Snowflake::new(10)])
            .await
            .unwrap();
        assert!(writes.is_empty(), "unexpected writes: {writes:?}");
    }

    #[test]
    fn test_remote_with_bad_scope_key_fails() {
        let file = write_temp(r#"{"not-a-guild": []}"#);
        assert!(load_remote(file.path()).is_err());
    }
}
