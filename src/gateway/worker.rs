// ABOUTME: Gateway worker: supervised connection loop that services the bot relay.
// ABOUTME: Runs on its own thread; owner maintenance commands are answered here, never forwarded.

use super::restart::{RestartPolicy, RestartState, Verdict};
use super::{reply_to, ClientEvent, CommandKind, GatewayClient, GatewayError};
use anyhow::{Context, Result};
use parley_core::commands::{validate_command, CommandScope, OwnerCommand, OWNER_COMMANDS};
use parley_core::config::Config;
use parley_core::event_log::logger_id;
use parley_core::message::{CommandSpec, PlatformCommand, PlatformEvent};
use parley_core::relay::{relay, spawn_worker, Relay, WorkerSide};
use parley_core::EventLog;
use std::time::Duration;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

pub type BotRelay = Relay<PlatformCommand, PlatformEvent>;
pub type BotSide = WorkerSide<PlatformCommand, PlatformEvent>;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub token: String,
    /// Wait for inbound events when there was no outbound work.
    pub idle_wait: Duration,
    pub restart: RestartPolicy,
    /// Pause between deletions in `bot_delete_all_messages`.
    pub delete_pacing: Duration,
    pub logger: String,
}

impl WorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            token: config.bot.str_token.clone(),
            idle_wait: Duration::try_from_secs_f64(config.bot.secs_sleep).unwrap_or_default(),
            restart: RestartPolicy::from(&config.bot.restart),
            delete_pacing: Duration::from_secs(1),
            logger: logger_id(
                config.system.id_system.as_deref(),
                config.system.id_node.as_deref(),
                "discord",
                "bot",
            ),
        }
    }
}

/// Start the gateway worker thread and return the control side of its relay.
pub fn spawn(
    config: WorkerConfig,
    capacity: usize,
    client: Box<dyn GatewayClient>,
) -> Result<(BotRelay, std::thread::JoinHandle<()>)> {
    let (bot, side) = relay("bot", capacity);
    let handle = spawn_worker("gateway", move || run_worker(config, client, side))
        .context("Failed to spawn gateway worker")?;
    Ok((bot, handle))
}

fn run_worker(config: WorkerConfig, mut client: Box<dyn GatewayClient>, mut side: BotSide) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create tokio runtime for gateway worker");
            return;
        }
    };
    rt.block_on(supervise(&config, client.as_mut(), &mut side));
}

/// Why a connection loop ended without an error.
enum Stop {
    ControlGone,
}

/// Run connection loops until a fatal error, the restart limit, or the
/// control side going away.
pub async fn supervise(config: &WorkerConfig, client: &mut dyn GatewayClient, side: &mut BotSide) {
    let mut log = EventLog::new(config.logger.clone());
    let mut restart = RestartState::new(config.restart.clone());

    loop {
        let err = match serve(config, client, side, &mut log, &mut restart).await {
            Ok(Stop::ControlGone) => {
                tracing::info!("Control loop gone, gateway worker exiting");
                return;
            }
            Err(err) => err,
        };

        match restart.on_error(&err) {
            Verdict::Stop => {
                log.error(format!("Fatal error: {}", err));
                flush_log(side, &mut log);
                return;
            }
            Verdict::GiveUp { failures } => {
                log.error(format!("Non-fatal error: {}", err));
                log.error(format!("Giving up after {} consecutive failures.", failures));
                flush_log(side, &mut log);
                return;
            }
            Verdict::Restart { restart: n, delay } => {
                log.error(format!("Non-fatal error: {}", err));
                log.warning(format!("Restarting. ({}).", n));
                metrics::counter!("parley_gateway_restarts_total").increment(1);
                if !flush_log(side, &mut log) {
                    return;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// One connection: connect, announce readiness, then service both queues.
async fn serve(
    config: &WorkerConfig,
    client: &mut dyn GatewayClient,
    side: &mut BotSide,
    log: &mut EventLog,
    restart: &mut RestartState,
) -> Result<Stop, GatewayError> {
    client.connect(&config.token).await?;
    restart.connected();
    log.info("Discord bot is ready.");
    let attempt = restart.attempt();
    if !forward(side, log, PlatformEvent::Ready { attempt }) {
        return Ok(Stop::ControlGone);
    }

    loop {
        if !flush_log(side, log) {
            return Ok(Stop::ControlGone);
        }

        let handled = match side.inbox.try_recv() {
            Ok(item) => {
                handle_outbound(client, log, item).await?;
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => return Ok(Stop::ControlGone),
        };

        let wait = if handled { Duration::ZERO } else { config.idle_wait };
        match client.poll_event(wait).await? {
            Some(ClientEvent::Event(event)) => {
                if is_owner_command(&event) {
                    let result = handle_owner_command(config, client, log, &event).await;
                    absorb(log, result, "Owner command failed")?;
                } else if !forward(side, log, event) {
                    return Ok(Stop::ControlGone);
                }
            }
            Some(ClientEvent::CommandFailed { invocation, failure }) => {
                log.error(format!("on_command_error: \"{}\"", failure));
                if let Some(reply) = reply_to(&invocation, failure.user_reply()) {
                    absorb(log, client.send(&reply).await, "Failed to send message")?;
                }
            }
            None => {}
        }
    }
}

/// Log a non-fatal error; pass through errors that end the connection.
fn absorb(log: &mut EventLog, result: Result<(), GatewayError>, context: &str) -> Result<(), GatewayError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_connection_lost() => Err(err),
        Err(err) => {
            log.error(format!("{}: {}", context, err));
            Ok(())
        }
    }
}

async fn handle_outbound(
    client: &mut dyn GatewayClient,
    log: &mut EventLog,
    item: PlatformCommand,
) -> Result<(), GatewayError> {
    match &item {
        PlatformCommand::CfgMsgcmd(spec) => configure(client, log, CommandKind::Message, spec).await,
        PlatformCommand::CfgAppcmd(spec) => configure(client, log, CommandKind::Application, spec).await,
        PlatformCommand::MsgDm { .. } | PlatformCommand::MsgGuild { .. } => {
            absorb(log, client.send(&item).await, "Failed to send message")
        }
    }
}

async fn configure(
    client: &mut dyn GatewayClient,
    log: &mut EventLog,
    kind: CommandKind,
    spec: &CommandSpec,
) -> Result<(), GatewayError> {
    if let Err(err) = validate_command(spec) {
        log.error(format!("Invalid command configuration: {}", err));
        return Ok(());
    }
    match client.register_command(kind, spec).await {
        Ok(()) => {
            log.info(format!("Registered command: {}", spec.name));
            Ok(())
        }
        Err(err) => absorb(
            log,
            Err(err),
            &format!("Failed to register command {}", spec.name),
        ),
    }
}

fn is_owner_command(event: &PlatformEvent) -> bool {
    match event {
        PlatformEvent::MsgcmdDm { name_command, .. } | PlatformEvent::Msgcmd { name_command, .. } => {
            OWNER_COMMANDS.contains(&name_command.as_str())
        }
        _ => false,
    }
}

fn scope_name(scope: CommandScope) -> &'static str {
    match scope {
        CommandScope::Global => "global",
        CommandScope::Guild => "guild",
    }
}

async fn handle_owner_command(
    config: &WorkerConfig,
    client: &mut dyn GatewayClient,
    log: &mut EventLog,
    invocation: &PlatformEvent,
) -> Result<(), GatewayError> {
    let (name, args, id_author, id_channel, id_guild) = match invocation {
        PlatformEvent::MsgcmdDm {
            name_command,
            args,
            id_author,
            id_channel,
            ..
        } => (name_command, args, *id_author, *id_channel, None),
        PlatformEvent::Msgcmd {
            name_command,
            args,
            id_author,
            id_channel,
            id_guild,
            ..
        } => (name_command, args, *id_author, *id_channel, Some(*id_guild)),
        _ => return Ok(()),
    };

    let mut replies = Vec::new();

    if !client.is_owner(id_author).await? {
        let text = format!(
            "Error: Only the bot owner is permitted to use the {} command.",
            name
        );
        log.error(text.clone());
        replies.push(text);
    } else {
        match OwnerCommand::parse(name, args) {
            None => {}
            Some(Err(reason)) => {
                let text = format!("Unsupported {} operation: {}", name, reason);
                log.warning(text.clone());
                replies.push(text);
            }
            Some(Ok(OwnerCommand::SyncCommands(scope))) => {
                if scope == CommandScope::Guild && id_guild.is_none() {
                    replies.push("Guild scope is only available inside a guild.".to_string());
                } else {
                    let names = client.commands(CommandScope::Global, None).await?;
                    replies.push(format!(
                        "Sync {} commands to the {} scope.",
                        names.len(),
                        scope_name(scope)
                    ));
                    replies.extend(numbered(&names));
                    absorb(
                        log,
                        client.sync_commands(scope, id_guild).await,
                        "Failed to sync commands",
                    )?;
                }
            }
            Some(Ok(OwnerCommand::ShowCommands(scope))) => {
                let names = client.commands(scope, id_guild).await?;
                replies.push(format!(
                    "There are {} commands in the {} scope.",
                    names.len(),
                    scope_name(scope)
                ));
                replies.extend(numbered(&names));
            }
            Some(Ok(OwnerCommand::DeleteAllMessages { limit })) => {
                let count = delete_messages(config, client, log, id_channel, limit).await?;
                log.info(format!("Deleted {} messages.", count));
            }
        }
    }

    for text in replies {
        log.info(text.clone());
        if let Some(reply) = reply_to(invocation, text) {
            absorb(log, client.send(&reply).await, "Failed to send message")?;
        }
    }
    Ok(())
}

fn numbered(names: &[String]) -> Vec<String> {
    names
        .iter()
        .enumerate()
        .map(|(idx, name)| format!("{:02}: \"{}\"", idx + 1, name))
        .collect()
}

async fn delete_messages(
    config: &WorkerConfig,
    client: &mut dyn GatewayClient,
    log: &mut EventLog,
    id_channel: u64,
    limit: usize,
) -> Result<usize, GatewayError> {
    let mut count = 0;
    for id_msg in client.history(id_channel, limit).await? {
        match client.delete_message(id_channel, id_msg).await {
            Ok(()) => count += 1,
            Err(GatewayError::Forbidden(_)) => {}
            Err(err) if err.is_connection_lost() => return Err(err),
            Err(err) => log.error(format!("Unable to delete message: {}", err)),
        }
        if !config.delete_pacing.is_zero() {
            tokio::time::sleep(config.delete_pacing).await;
        }
    }
    Ok(count)
}

/// Non-blocking put toward the control loop. Returns false once the control
/// side has gone away.
fn forward(side: &mut BotSide, log: &mut EventLog, event: PlatformEvent) -> bool {
    match side.outbox.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            log.error(format!("Message dropped. queue_from_bot is full. ({})", dropped.kind()));
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Move buffered log records to the control side. Returns false once the
/// control side has gone away.
fn flush_log(side: &mut BotSide, log: &mut EventLog) -> bool {
    for event in log.drain() {
        match side.outbox.try_send(PlatformEvent::LogEvent(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("One or more log_event messages dropped. queue_from_bot is full.");
                break;
            }
            Err(TrySendError::Closed(_)) => return false,
        }
    }
    true
}
