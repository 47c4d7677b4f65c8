// ABOUTME: Tests for the gateway worker supervision loop against a scripted client.
// ABOUTME: Covers restarts, fatal errors, outbound servicing and owner maintenance commands.

use async_trait::async_trait;
use parley::commands::{CommandFailure, CommandScope};
use parley::gateway::restart::RestartPolicy;
use parley::gateway::worker::{supervise, WorkerConfig};
use parley::gateway::{ClientEvent, CommandKind, GatewayClient, GatewayError};
use parley::message::{CommandParam, CommandSpec, PlatformCommand, PlatformEvent};
use parley::relay::{relay, Relay};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Recorded {
    registered: Vec<(CommandKind, String)>,
    sent: Vec<PlatformCommand>,
    deleted: Vec<u64>,
    synced: Vec<CommandScope>,
    connects: usize,
}

/// Client driven by a script. Once the poll script runs out it reports a
/// fatal error so `supervise` returns.
#[derive(Default)]
struct ScriptedClient {
    connects: VecDeque<Result<(), GatewayError>>,
    polls: VecDeque<Result<Option<ClientEvent>, GatewayError>>,
    owner: bool,
    commands: Vec<String>,
    history: Vec<u64>,
    forbidden: Vec<u64>,
    recorded: Arc<Mutex<Recorded>>,
}

impl ScriptedClient {
    fn new() -> Self {
        Self::default()
    }

    fn event(mut self, event: PlatformEvent) -> Self {
        self.polls.push_back(Ok(Some(ClientEvent::Event(event))));
        self
    }

    fn failure(mut self, invocation: PlatformEvent, failure: CommandFailure) -> Self {
        self.polls
            .push_back(Ok(Some(ClientEvent::CommandFailed { invocation, failure })));
        self
    }

    fn idle(mut self, polls: usize) -> Self {
        for _ in 0..polls {
            self.polls.push_back(Ok(None));
        }
        self
    }

    fn poll_error(mut self, err: GatewayError) -> Self {
        self.polls.push_back(Err(err));
        self
    }

    fn connect_error(mut self, err: GatewayError) -> Self {
        self.connects.push_back(Err(err));
        self
    }

    fn recorded(&self) -> Arc<Mutex<Recorded>> {
        Arc::clone(&self.recorded)
    }
}

#[async_trait]
impl GatewayClient for ScriptedClient {
    async fn connect(&mut self, _token: &str) -> Result<(), GatewayError> {
        self.recorded.lock().unwrap().connects += 1;
        self.connects.pop_front().unwrap_or(Ok(()))
    }

    async fn poll_event(&mut self, _timeout: Duration) -> Result<Option<ClientEvent>, GatewayError> {
        self.polls
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::InvalidData("script exhausted".into())))
    }

    async fn register_command(&mut self, kind: CommandKind, spec: &CommandSpec) -> Result<(), GatewayError> {
        self.recorded.lock().unwrap().registered.push((kind, spec.name.clone()));
        Ok(())
    }

    async fn send(&mut self, message: &PlatformCommand) -> Result<(), GatewayError> {
        self.recorded.lock().unwrap().sent.push(message.clone());
        Ok(())
    }

    async fn is_owner(&mut self, _id_user: u64) -> Result<bool, GatewayError> {
        Ok(self.owner)
    }

    async fn commands(&mut self, _scope: CommandScope, _id_guild: Option<u64>) -> Result<Vec<String>, GatewayError> {
        Ok(self.commands.clone())
    }

    async fn sync_commands(&mut self, scope: CommandScope, _id_guild: Option<u64>) -> Result<(), GatewayError> {
        self.recorded.lock().unwrap().synced.push(scope);
        Ok(())
    }

    async fn history(&mut self, _id_channel: u64, limit: usize) -> Result<Vec<u64>, GatewayError> {
        Ok(self.history.iter().copied().take(limit).collect())
    }

    async fn delete_message(&mut self, _id_channel: u64, id_msg: u64) -> Result<(), GatewayError> {
        if self.forbidden.contains(&id_msg) {
            return Err(GatewayError::Forbidden("missing permission".into()));
        }
        self.recorded.lock().unwrap().deleted.push(id_msg);
        Ok(())
    }
}

fn config() -> WorkerConfig {
    WorkerConfig {
        token: "token".to_string(),
        idle_wait: Duration::ZERO,
        restart: RestartPolicy::default(),
        delete_pacing: Duration::ZERO,
        logger: "test.bot".to_string(),
    }
}

/// Run the worker to completion with `outbound` already queued, then return
/// everything it sent toward the control side.
async fn run(
    client: &mut ScriptedClient,
    outbound: Vec<PlatformCommand>,
    capacity: usize,
    config: WorkerConfig,
) -> Vec<PlatformEvent> {
    let (mut bot, mut side): (Relay<PlatformCommand, PlatformEvent>, _) = relay("bot", capacity);
    assert!(bot.step(outbound).is_empty());
    supervise(&config, client, &mut side).await;
    bot.step(vec![])
}

fn logs(events: &[PlatformEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            PlatformEvent::LogEvent(log) => Some(log.content.clone()),
            _ => None,
        })
        .collect()
}

fn readies(events: &[PlatformEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e {
            PlatformEvent::Ready { attempt } => Some(*attempt),
            _ => None,
        })
        .collect()
}

fn msgcmd(name: &str, args: &[&str]) -> PlatformEvent {
    PlatformEvent::Msgcmd {
        id_guild: 100,
        name_guild: "guild".into(),
        name_channel: "general".into(),
        nick_author: None,
        name_command: name.into(),
        args: args.iter().map(|s| s.to_string()).collect(),
        id_channel: 55,
        id_author: 7,
        name_author: "ada".into(),
    }
}

fn dm(content: &str) -> PlatformEvent {
    PlatformEvent::MsgDm {
        id_msg: 1,
        id_author: 7,
        name_author: "ada".into(),
        content: content.into(),
    }
}

#[tokio::test]
async fn test_ready_then_events_are_forwarded() {
    let mut client = ScriptedClient::new().event(dm("hello"));
    let events = run(&mut client, vec![], 16, config()).await;

    assert_eq!(events[0], PlatformEvent::Ready { attempt: 1 });
    assert!(events.contains(&dm("hello")));
    let logs = logs(&events);
    assert!(logs.contains(&"Discord bot is ready.".to_string()));
    assert!(logs.contains(&"Fatal error: Invalid data: script exhausted".to_string()));
}

#[tokio::test]
async fn test_non_fatal_error_restarts_connection() {
    let mut client = ScriptedClient::new()
        .poll_error(GatewayError::Disconnected("reset by peer".into()))
        .event(dm("after restart"));
    let recorded = client.recorded();
    let events = run(&mut client, vec![], 16, config()).await;

    assert_eq!(readies(&events), vec![1, 2]);
    assert_eq!(recorded.lock().unwrap().connects, 2);
    let logs = logs(&events);
    assert!(logs.contains(&"Non-fatal error: Connection lost: reset by peer".to_string()));
    assert!(logs.contains(&"Restarting. (1).".to_string()));
    assert!(events.contains(&dm("after restart")));
}

#[tokio::test]
async fn test_restart_numbers_continue_across_reconnects() {
    let mut client = ScriptedClient::new()
        .poll_error(GatewayError::Disconnected("first".into()))
        .poll_error(GatewayError::Http("second".into()));
    let events = run(&mut client, vec![], 32, config()).await;

    assert_eq!(readies(&events), vec![1, 2, 3]);
    let logs = logs(&events);
    assert!(logs.contains(&"Restarting. (1).".to_string()));
    assert!(logs.contains(&"Restarting. (2).".to_string()));
}

#[tokio::test]
async fn test_fatal_connect_error_stops_without_ready() {
    let mut client = ScriptedClient::new().connect_error(GatewayError::LoginFailure("bad token".into()));
    let recorded = client.recorded();
    let events = run(&mut client, vec![], 16, config()).await;

    assert!(readies(&events).is_empty());
    assert_eq!(recorded.lock().unwrap().connects, 1);
    assert_eq!(logs(&events), vec!["Fatal error: Login failure: bad token".to_string()]);
}

#[tokio::test]
async fn test_restart_limit_gives_up() {
    let mut cfg = config();
    cfg.restart = RestartPolicy {
        max_restarts: 1,
        ..RestartPolicy::default()
    };
    let mut client = ScriptedClient::new()
        .connect_error(GatewayError::Http("502".into()))
        .connect_error(GatewayError::Http("502".into()));
    let recorded = client.recorded();
    let events = run(&mut client, vec![], 16, cfg).await;

    assert_eq!(recorded.lock().unwrap().connects, 2);
    assert!(logs(&events).contains(&"Giving up after 2 consecutive failures.".to_string()));
}

#[tokio::test]
async fn test_outbound_items_are_serviced() {
    let valid = CommandSpec {
        name: "ask".into(),
        description: "Start a deliberation.".into(),
        param: vec![CommandParam::new("topic", "str")],
    };
    let invalid = CommandSpec {
        name: "bad name".into(),
        description: "Has a space.".into(),
        param: vec![],
    };
    let outbound = vec![
        PlatformCommand::CfgAppcmd(valid),
        PlatformCommand::CfgMsgcmd(invalid),
        PlatformCommand::dm(7, "hi"),
    ];

    let mut client = ScriptedClient::new().idle(3);
    let recorded = client.recorded();
    let events = run(&mut client, outbound, 16, config()).await;

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.registered, vec![(CommandKind::Application, "ask".to_string())]);
    assert_eq!(recorded.sent, vec![PlatformCommand::dm(7, "hi")]);
    assert!(logs(&events)
        .iter()
        .any(|l| l.starts_with("Invalid command configuration")));
}

#[tokio::test]
async fn test_show_commands_replies_in_channel_and_is_not_forwarded() {
    let mut client = ScriptedClient::new().event(msgcmd("bot_show_commands", &["guild"]));
    client.owner = true;
    client.commands = vec!["ask".into(), "dbg_prompt_show".into()];
    let recorded = client.recorded();
    let events = run(&mut client, vec![], 16, config()).await;

    assert!(!events.contains(&msgcmd("bot_show_commands", &["guild"])));
    assert_eq!(
        recorded.lock().unwrap().sent,
        vec![
            PlatformCommand::guild(55, "There are 2 commands in the guild scope."),
            PlatformCommand::guild(55, "01: \"ask\""),
            PlatformCommand::guild(55, "02: \"dbg_prompt_show\""),
        ]
    );
}

#[tokio::test]
async fn test_sync_commands_defaults_to_global() {
    let mut client = ScriptedClient::new().event(msgcmd("bot_sync_commands", &[]));
    client.owner = true;
    client.commands = vec!["ask".into()];
    let recorded = client.recorded();
    run(&mut client, vec![], 16, config()).await;

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.synced, vec![CommandScope::Global]);
    assert_eq!(recorded.sent[0], PlatformCommand::guild(55, "Sync 1 commands to the global scope."));
}

#[tokio::test]
async fn test_owner_commands_reject_non_owner() {
    let mut client = ScriptedClient::new().event(msgcmd("bot_delete_all_messages", &[]));
    client.history = vec![1, 2];
    let recorded = client.recorded();
    run(&mut client, vec![], 16, config()).await;

    let recorded = recorded.lock().unwrap();
    assert!(recorded.deleted.is_empty());
    assert_eq!(
        recorded.sent,
        vec![PlatformCommand::guild(
            55,
            "Error: Only the bot owner is permitted to use the bot_delete_all_messages command."
        )]
    );
}

#[tokio::test]
async fn test_delete_all_messages_skips_forbidden() {
    let mut client = ScriptedClient::new().event(msgcmd("bot_delete_all_messages", &["2"]));
    client.owner = true;
    client.history = vec![10, 11, 12];
    client.forbidden = vec![10];
    let recorded = client.recorded();
    let events = run(&mut client, vec![], 16, config()).await;

    assert_eq!(recorded.lock().unwrap().deleted, vec![11]);
    assert!(logs(&events).contains(&"Deleted 1 messages.".to_string()));
}

#[tokio::test]
async fn test_command_failures_reply_generically_unless_allowed() {
    let invocation = PlatformEvent::MsgcmdDm {
        name_command: "nope".into(),
        args: vec![],
        id_channel: 3,
        id_author: 7,
        name_author: "ada".into(),
    };
    let mut client = ScriptedClient::new()
        .failure(
            invocation.clone(),
            CommandFailure::NotFound("Command \"nope\" is not found".into()),
        )
        .failure(invocation, CommandFailure::Other("boom".into()));
    let recorded = client.recorded();
    let events = run(&mut client, vec![], 16, config()).await;

    assert_eq!(
        recorded.lock().unwrap().sent,
        vec![
            PlatformCommand::dm(7, "Command \"nope\" is not found"),
            PlatformCommand::dm(7, "An error has been logged."),
        ]
    );
    assert!(logs(&events).contains(&"on_command_error: \"boom\"".to_string()));
}

#[tokio::test]
async fn test_full_queue_drops_inbound_event() {
    let mut client = ScriptedClient::new().event(dm("dropped"));
    let events = run(&mut client, vec![], 1, config()).await;

    assert_eq!(events, vec![PlatformEvent::Ready { attempt: 1 }]);
}
