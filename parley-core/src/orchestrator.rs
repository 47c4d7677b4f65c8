// ABOUTME: Session reducer turning platform events and AI results into outbound messages.
// ABOUTME: Drives the ask → join → submit → summary interaction; performs no I/O.

use crate::message::{ApiResult, Button, CommandParam, CommandSpec, Kwargs, PlatformCommand, PlatformEvent};
use crate::session::{Session, SessionState};
use crate::utils::format_template;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const PREFIX_JOIN: &str = "join_";
pub const PREFIX_SUBMIT: &str = "submit_";
pub const PREFIX_SUMMARY: &str = "summary_";
pub const ID_PROMPT_SUMMARY: &str = "summary";

/// Source of fresh session identifiers.
pub type SessionIdSource = Box<dyn FnMut() -> String + Send>;

/// First six hex characters of a random v4 UUID.
pub fn random_session_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(6);
    id
}

/// Input accepted by the reducer.
#[derive(Debug, Clone, Copy)]
pub enum Inbound<'a> {
    Platform(&'a PlatformEvent),
    Result(&'a ApiResult),
}

/// Output of one reducer step, split by lane.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Update {
    pub platform: Vec<PlatformCommand>,
    pub ai: Vec<Kwargs>,
}

impl Update {
    pub fn is_empty(&self) -> bool {
        self.platform.is_empty() && self.ai.is_empty()
    }

    pub fn extend(&mut self, other: Update) {
        self.platform.extend(other.platform);
        self.ai.extend(other.ai);
    }
}

/// Where a command came from, and therefore where its reply goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Dm(u64),
    Channel(u64),
}

impl Origin {
    fn reply(self, content: impl Into<String>) -> PlatformCommand {
        match self {
            Origin::Dm(id_user) => PlatformCommand::dm(id_user, content),
            Origin::Channel(id_channel) => PlatformCommand::guild(id_channel, content),
        }
    }
}

pub struct SessionOrchestrator {
    state: SessionState,
    summary_model: String,
    next_id: SessionIdSource,
}

impl SessionOrchestrator {
    pub fn new(prompts: BTreeMap<String, String>, summary_model: impl Into<String>) -> Self {
        Self {
            state: SessionState::with_prompts(prompts),
            summary_model: summary_model.into(),
            next_id: Box::new(random_session_id),
        }
    }

    /// Replace the session id generator (deterministic ids in tests).
    pub fn with_id_source(mut self, next_id: SessionIdSource) -> Self {
        self.next_id = next_id;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Application commands this reducer answers to.
    pub fn command_registrations() -> Vec<PlatformCommand> {
        let appcmd = |name: &str, description: &str, param: Vec<CommandParam>| {
            PlatformCommand::CfgAppcmd(CommandSpec {
                name: name.to_string(),
                description: description.to_string(),
                param,
            })
        };
        vec![
            appcmd(
                "ask",
                "Start a deliberation on a topic.",
                vec![CommandParam::new("topic", "str")],
            ),
            appcmd("dbg_transcript_show", "Show every transcript.", vec![]),
            appcmd("dbg_prompt_show", "Show every stored prompt.", vec![]),
            appcmd(
                "dbg_prompt_set",
                "Overwrite a stored prompt.",
                vec![CommandParam::new("id_prompt", "str"), CommandParam::new("text", "str")],
            ),
        ]
    }

    /// Apply one inbound message. Every matching rule fires.
    pub fn update(&mut self, msg: Inbound<'_>) -> Update {
        match msg {
            Inbound::Platform(event) => self.on_event(event),
            Inbound::Result(result) => self.on_result(result),
        }
    }

    fn on_event(&mut self, event: &PlatformEvent) -> Update {
        let mut out = Update::default();
        match event {
            PlatformEvent::AppcmdDm {
                name_command,
                args,
                id_user,
                ..
            } => out.platform = self.on_appcmd(name_command, args, *id_user, Origin::Dm(*id_user)),
            PlatformEvent::AppcmdGuild {
                name_command,
                args,
                id_user,
                id_channel,
                ..
            } => {
                out.platform =
                    self.on_appcmd(name_command, args, *id_user, Origin::Channel(*id_channel))
            }
            PlatformEvent::Btn {
                id_btn,
                id_user,
                name_user,
                ..
            } => {
                if let Some(id_session) = id_btn.strip_prefix(PREFIX_JOIN) {
                    out.platform.extend(self.on_join(*id_user, name_user, id_session));
                }
                if let Some(id_session) = id_btn.strip_prefix(PREFIX_SUBMIT) {
                    out.platform.extend(self.on_submit(*id_user, name_user, id_session));
                }
                if let Some(id_session) = id_btn.strip_prefix(PREFIX_SUMMARY) {
                    out.extend(self.on_summary(*id_user, id_session));
                }
            }
            PlatformEvent::MsgDm {
                id_author, content, ..
            }
            | PlatformEvent::EditDm {
                id_author, content, ..
            } => {
                if let Some(record) = self.state.user.get_mut(id_author) {
                    record.transcript.push(content.clone());
                }
            }
            _ => {}
        }
        out
    }

    fn on_appcmd(
        &mut self,
        name: &str,
        args: &[String],
        id_user: u64,
        origin: Origin,
    ) -> Vec<PlatformCommand> {
        match name {
            "ask" => self.on_ask(id_user, args.join(" "), origin),
            "dbg_transcript_show" => self
                .state
                .user
                .iter()
                .map(|(id, record)| {
                    let transcript = serde_json::to_string(&record.transcript).unwrap_or_default();
                    origin.reply(format!("{}: \"{}\"", id, transcript))
                })
                .collect(),
            "dbg_prompt_show" => self
                .state
                .prompt
                .iter()
                .flat_map(|(id, text)| [origin.reply(id.to_uppercase()), origin.reply(text.clone())])
                .collect(),
            "dbg_prompt_set" => match args.split_first() {
                Some((id_prompt, rest)) if !rest.is_empty() => {
                    self.state.prompt.insert(id_prompt.clone(), rest.join(" "));
                    tracing::info!(id_prompt = %id_prompt, "Prompt updated");
                    Vec::new()
                }
                _ => vec![origin.reply("Usage: dbg_prompt_set <id_prompt> <text>")],
            },
            _ => Vec::new(),
        }
    }

    fn on_ask(&mut self, id_user: u64, topic: String, origin: Origin) -> Vec<PlatformCommand> {
        let id_session = (self.next_id)();
        tracing::info!(session = %id_session, admin = id_user, "Session opened");
        self.state
            .session
            .insert(id_session.clone(), Session::new(id_user, topic));

        vec![origin
            .reply(format!("Join deliberation #{}", id_session))
            .with_button(Button::new("Join", format!("{}{}", PREFIX_JOIN, id_session)))]
    }

    fn on_join(&mut self, id_user: u64, name_user: &str, id_session: &str) -> Vec<PlatformCommand> {
        let Some(count) = self.state.join(id_user, name_user, id_session) else {
            tracing::warn!(session = %id_session, user = id_user, "Join for unknown session");
            return vec![PlatformCommand::dm(
                id_user,
                format!("Session {} does not exist.", id_session),
            )];
        };
        let Some(session) = self.state.session.get(id_session) else {
            return Vec::new();
        };

        vec![
            PlatformCommand::dm(
                session.admin,
                format!(
                    "{} joined session {} as participant #{}.",
                    name_user, id_session, count
                ),
            ),
            PlatformCommand::dm(id_user, session.topic.clone()).with_button(Button::new(
                "Submit",
                format!("{}{}", PREFIX_SUBMIT, id_session),
            )),
        ]
    }

    fn on_submit(&mut self, id_user: u64, name_user: &str, id_session: &str) -> Vec<PlatformCommand> {
        let Some(session) = self.state.session.get_mut(id_session) else {
            tracing::warn!(session = %id_session, user = id_user, "Submit for unknown session");
            return vec![PlatformCommand::dm(
                id_user,
                format!("Session {} does not exist.", id_session),
            )];
        };
        session.contributor.insert(id_user);

        vec![PlatformCommand::dm(
            session.admin,
            format!(
                "User {} submitted a contribution for {}. ({} pending)",
                name_user,
                id_session,
                session.pending()
            ),
        )
        .with_button(Button::new(
            "Summary",
            format!("{}{}", PREFIX_SUMMARY, id_session),
        ))]
    }

    fn on_summary(&mut self, id_user: u64, id_session: &str) -> Update {
        let mut out = Update::default();
        let Some(session) = self.state.session.get(id_session) else {
            tracing::warn!(session = %id_session, user = id_user, "Summary for unknown session");
            out.platform.push(PlatformCommand::dm(
                id_user,
                format!("Session {} does not exist.", id_session),
            ));
            return out;
        };
        let Some(template) = self.state.prompt.get(ID_PROMPT_SUMMARY) else {
            tracing::error!(session = %id_session, "No summary prompt stored");
            out.platform.push(PlatformCommand::dm(
                id_user,
                "No summary prompt is configured.",
            ));
            return out;
        };

        let mut args = Kwargs::new();
        args.insert("str_topic".to_string(), Value::String(session.topic.clone()));
        args.insert(
            "str_transcript".to_string(),
            Value::String(self.state.transcript(id_session)),
        );
        let prompt = match format_template(template, &args) {
            Ok(prompt) => prompt,
            Err(err) => {
                tracing::error!(session = %id_session, error = %err, "Summary prompt is malformed");
                out.platform.push(PlatformCommand::dm(
                    id_user,
                    format!("The summary prompt is malformed: {}", err),
                ));
                return out;
            }
        };

        let request = json!({
            "id_endpoint": "chat_completions",
            "model": self.summary_model,
            "messages": [{"role": "system", "content": prompt}],
            "state": {"id_prompt": ID_PROMPT_SUMMARY, "id_session": id_session},
        });
        if let Value::Object(request) = request {
            out.ai.push(request);
        }
        out
    }

    fn on_result(&mut self, result: &ApiResult) -> Update {
        let mut out = Update::default();
        if result.state.get("id_prompt").and_then(Value::as_str) != Some(ID_PROMPT_SUMMARY) {
            return out;
        }
        let Some(id_session) = result.state.get("id_session").and_then(Value::as_str) else {
            tracing::warn!("Summary result without a session id");
            return out;
        };

        let text = result
            .response
            .as_ref()
            .and_then(|r| r.pointer("/choices/0/message/content"))
            .and_then(Value::as_str);

        match text {
            Some(summary) => {
                out.platform = self
                    .state
                    .members(id_session)
                    .into_iter()
                    .map(|id_user| PlatformCommand::dm(id_user, summary))
                    .collect();
            }
            None => {
                let reason = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "response carried no summary text".to_string());
                tracing::error!(session = %id_session, error = %reason, "Summary request failed");
                if let Some(session) = self.state.session.get(id_session) {
                    out.platform.push(PlatformCommand::dm(
                        session.admin,
                        format!("Summary for session {} failed: {}", id_session, reason),
                    ));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchestrator() -> SessionOrchestrator {
        let mut prompts = BTreeMap::new();
        prompts.insert(
            "summary".to_string(),
            "Summarise {str_topic}:{str_transcript}".to_string(),
        );
        SessionOrchestrator::new(prompts, "gpt-3.5-turbo")
            .with_id_source(Box::new(|| "abc123".to_string()))
    }

    fn ask_dm(id_user: u64, topic: &str) -> PlatformEvent {
        PlatformEvent::AppcmdDm {
            name_command: "ask".to_string(),
            args: vec![topic.to_string()],
            id_channel: 50,
            id_user,
            name_user: "admin".to_string(),
        }
    }

    fn btn(id_btn: &str, id_user: u64, name_user: &str) -> PlatformEvent {
        PlatformEvent::Btn {
            id_btn: id_btn.to_string(),
            id_user,
            name_user: name_user.to_string(),
            id_channel: 50,
        }
    }

    #[test]
    fn test_ask_in_guild_replies_to_channel() {
        let mut orch = orchestrator();
        let event = PlatformEvent::AppcmdGuild {
            id_guild: 1,
            name_guild: "g".to_string(),
            name_channel: "general".to_string(),
            nick_user: None,
            name_command: "ask".to_string(),
            args: vec!["Where".to_string(), "to?".to_string()],
            id_channel: 77,
            id_user: 10,
            name_user: "admin".to_string(),
        };

        let out = orch.update(Inbound::Platform(&event));
        assert_eq!(
            out.platform,
            vec![PlatformCommand::guild(77, "Join deliberation #abc123")
                .with_button(Button::new("Join", "join_abc123"))]
        );
        assert_eq!(orch.state().session["abc123"].topic, "Where to?");
    }

    #[test]
    fn test_dm_without_record_is_ignored() {
        let mut orch = orchestrator();
        let event = PlatformEvent::MsgDm {
            id_msg: 1,
            id_author: 99,
            name_author: "stranger".to_string(),
            content: "hi".to_string(),
        };
        assert!(orch.update(Inbound::Platform(&event)).is_empty());
    }

    #[test]
    fn test_edit_dm_appends_to_transcript() {
        let mut orch = orchestrator();
        orch.update(Inbound::Platform(&ask_dm(10, "T")));
        orch.update(Inbound::Platform(&btn("join_abc123", 20, "bo")));
        let edit = PlatformEvent::EditDm {
            id_prev: 1,
            id_msg: 2,
            id_author: 20,
            name_author: "bo".to_string(),
            content: "revised".to_string(),
        };
        orch.update(Inbound::Platform(&edit));
        assert_eq!(orch.state().user[&20].transcript, vec!["revised"]);
    }

    #[test]
    fn test_unknown_session_join_is_reported() {
        let mut orch = orchestrator();
        let out = orch.update(Inbound::Platform(&btn("join_ffffff", 20, "bo")));
        assert_eq!(
            out.platform,
            vec![PlatformCommand::dm(20, "Session ffffff does not exist.")]
        );
        assert!(orch.state().user.is_empty());
    }

    #[test]
    fn test_summary_without_prompt_is_reported() {
        let mut orch = SessionOrchestrator::new(BTreeMap::new(), "gpt-3.5-turbo")
            .with_id_source(Box::new(|| "abc123".to_string()));
        orch.update(Inbound::Platform(&ask_dm(10, "T")));
        let out = orch.update(Inbound::Platform(&btn("summary_abc123", 10, "admin")));
        assert!(out.ai.is_empty());
        assert_eq!(
            out.platform,
            vec![PlatformCommand::dm(10, "No summary prompt is configured.")]
        );
    }

    #[test]
    fn test_failed_summary_notifies_admin() {
        let mut orch = orchestrator();
        orch.update(Inbound::Platform(&ask_dm(10, "T")));
        let result = ApiResult {
            request: Kwargs::new(),
            response: None,
            error: Some("rate limited".to_string()),
            state: json!({"id_prompt": "summary", "id_session": "abc123"}),
        };
        let out = orch.update(Inbound::Result(&result));
        assert_eq!(
            out.platform,
            vec![PlatformCommand::dm(
                10,
                "Summary for session abc123 failed: rate limited"
            )]
        );
    }

    #[test]
    fn test_non_summary_result_ignored() {
        let mut orch = orchestrator();
        let result = ApiResult {
            request: Kwargs::new(),
            response: Some(json!({})),
            error: None,
            state: json!({"id_prompt": "other"}),
        };
        assert!(orch.update(Inbound::Result(&result)).is_empty());
    }

    #[test]
    fn test_prompt_set_then_show() {
        let mut orch = orchestrator();
        let set = PlatformEvent::AppcmdDm {
            name_command: "dbg_prompt_set".to_string(),
            args: vec!["greeting".to_string(), "Hello {name}".to_string()],
            id_channel: 1,
            id_user: 10,
            name_user: "admin".to_string(),
        };
        assert!(orch.update(Inbound::Platform(&set)).is_empty());

        let show = PlatformEvent::AppcmdDm {
            name_command: "dbg_prompt_show".to_string(),
            args: vec![],
            id_channel: 1,
            id_user: 10,
            name_user: "admin".to_string(),
        };
        let out = orch.update(Inbound::Platform(&show));
        assert_eq!(
            out.platform,
            vec![
                PlatformCommand::dm(10, "GREETING"),
                PlatformCommand::dm(10, "Hello {name}"),
                PlatformCommand::dm(10, "SUMMARY"),
                PlatformCommand::dm(10, "Summarise {str_topic}:{str_transcript}"),
            ]
        );
    }

    #[test]
    fn test_transcript_show_renders_each_user() {
        let mut orch = orchestrator();
        orch.update(Inbound::Platform(&ask_dm(10, "T")));
        orch.update(Inbound::Platform(&btn("join_abc123", 20, "bo")));
        let dm = PlatformEvent::MsgDm {
            id_msg: 1,
            id_author: 20,
            name_author: "bo".to_string(),
            content: "tacos".to_string(),
        };
        orch.update(Inbound::Platform(&dm));

        let show = PlatformEvent::AppcmdDm {
            name_command: "dbg_transcript_show".to_string(),
            args: vec![],
            id_channel: 1,
            id_user: 10,
            name_user: "admin".to_string(),
        };
        let out = orch.update(Inbound::Platform(&show));
        assert_eq!(out.platform, vec![PlatformCommand::dm(10, "20: \"[\"tacos\"]\"")]);
    }

    #[test]
    fn test_registrations_cover_all_commands() {
        let names: Vec<String> = SessionOrchestrator::command_registrations()
            .into_iter()
            .filter_map(|cmd| match cmd {
                PlatformCommand::CfgAppcmd(spec) => Some(spec.name),
                _ => None,
            })
            .collect();
        assert_eq!(
            names,
            vec!["ask", "dbg_transcript_show", "dbg_prompt_show", "dbg_prompt_set"]
        );
    }

    #[test]
    fn test_random_session_id_is_six_hex_chars() {
        let id = random_session_id();
        assert_eq!(id.len(), 6);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
