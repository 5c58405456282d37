//! Integration tests for command reconciliation against the in-memory
//! REST control plane.

use std::sync::Arc;

use snek_client::command::CommandRegistry;
use snek_client::{HandlerResult, InteractionCommand, InteractionContext, PermissionOverwrite, Reconciler};
use snek_core::{Application, OptionType, Scope, Snowflake, User};
use snek_protocol::{CommandOptionPayload, PermissionTarget};
use snek_transport::{HttpCall, MemoryHttp};
use tokio::sync::RwLock;

const APP: Snowflake = Snowflake::new(1);
const GUILD: Snowflake = Snowflake::new(10);

// ============================================================================
// Test Helpers
// ============================================================================

async fn noop(_: InteractionContext) -> HandlerResult {
    Ok(())
}

fn http() -> MemoryHttp {
    MemoryHttp::new(
        User::new(1u64, "bot").as_bot(),
        Application {
            id: APP,
            name: "bot".to_string(),
            owner: None,
        },
    )
}

/// `a` is a plain command; `b` has two sub-commands, one inside a group.
fn commands(scopes: &[Scope]) -> Vec<InteractionCommand> {
    vec![
        InteractionCommand::new("a", "First", noop)
            .with_scopes(scopes.iter().copied())
            .with_option(CommandOptionPayload::new("text", "Text", OptionType::String).required()),
        InteractionCommand::new("b", "Second", noop)
            .with_scopes(scopes.iter().copied())
            .sub_command("add", "Add"),
        InteractionCommand::new("b", "Second", noop)
            .with_scopes(scopes.iter().copied())
            .group("admin", "Admin")
            .sub_command("reset", "Reset"),
    ]
}

fn registry(commands: Vec<InteractionCommand>) -> Arc<RwLock<CommandRegistry>> {
    let mut registry = CommandRegistry::default();
    for command in commands {
        registry.add_interaction(command).expect("no duplicates");
    }
    Arc::new(RwLock::new(registry))
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_second_pass_issues_no_writes() {
    let http = http();
    let guild_scope = Scope::Guild(GUILD);
    let mut declared = commands(&[Scope::Global, guild_scope]);
    declared.push(
        InteractionCommand::new("mod", "Moderation", noop)
            .with_scopes([guild_scope])
            .with_permission(PermissionOverwrite {
                guild_id: GUILD,
                target_id: Snowflake::new(77),
                kind: PermissionTarget::Role,
                permission: true,
            }),
    );
    let reconciler = Reconciler::new(Arc::new(http.clone()), registry(declared), false);

    let first = reconciler.synchronise(APP, &[GUILD]).await;
    assert!(first.is_clean());
    assert_eq!(first.pushed, vec![Scope::Global, guild_scope]);
    assert_eq!(first.permission_guilds, vec![GUILD]);
    assert!(!http.write_calls().is_empty());

    http.clear_calls();
    let second = reconciler.synchronise(APP, &[GUILD]).await;

    assert!(second.is_clean());
    assert!(second.pushed.is_empty());
    assert!(
        http.write_calls().is_empty(),
        "unexpected writes: {:?}",
        http.write_calls()
    );
    assert_eq!(second.up_to_date, vec![Scope::Global, guild_scope]);
}

#[tokio::test]
async fn test_fresh_reconciler_over_synced_remote_is_quiet() {
    let http = http();
    let first = Reconciler::new(Arc::new(http.clone()), registry(commands(&[Scope::Global])), false);
    first.synchronise(APP, &[]).await;
    http.clear_calls();

    let local = registry(commands(&[Scope::Global]));
    let second = Reconciler::new(Arc::new(http.clone()), Arc::clone(&local), false);
    let report = second.synchronise(APP, &[]).await;

    assert!(report.pushed.is_empty());
    assert!(http.write_calls().is_empty());
    assert!(local.read().await.command_id(Scope::Global, "b admin reset").is_some());
}

// ============================================================================
// Correctness
// ============================================================================

#[tokio::test]
async fn test_missing_command_triggers_one_overwrite() {
    let all = registry(commands(&[Scope::Global]));
    let mut remote_a = all
        .read()
        .await
        .payloads(Scope::Global)
        .into_iter()
        .find(|p| p.name == "a")
        .expect("a is declared");
    remote_a.id = Some(Snowflake::new(500));
    let http = http().with_commands(Scope::Global, vec![remote_a]);

    let reconciler = Reconciler::new(Arc::new(http.clone()), Arc::clone(&all), false);
    let report = reconciler.synchronise(APP, &[]).await;

    assert_eq!(report.pushed, vec![Scope::Global]);
    let writes = http.write_calls();
    assert_eq!(writes.len(), 1);
    assert!(matches!(
        &writes[0],
        HttpCall::PostCommands { scope: Scope::Global, names } if names.len() == 2
    ));

    let registry = all.read().await;
    let a = registry.command_id(Scope::Global, "a").expect("a has an id");
    assert_eq!(a, Snowflake::new(500));
    for name in ["b", "b add", "b admin reset"] {
        let id = registry
            .command_id(Scope::Global, name)
            .unwrap_or_else(|| panic!("{name} has no id"));
        assert_eq!(registry.scope_for(id), Some(Scope::Global));
    }
}

#[tokio::test]
async fn test_forbidden_guild_without_local_commands_is_skipped() {
    let stranger = Snowflake::new(66);
    let http = http().forbid(Scope::Guild(stranger));
    let reconciler = Reconciler::new(Arc::new(http.clone()), registry(commands(&[Scope::Global])), false);

    let report = reconciler.synchronise(APP, &[stranger]).await;

    assert!(report.is_clean());
    assert_eq!(report.pushed, vec![Scope::Global]);
}
