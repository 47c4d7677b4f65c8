// ABOUTME: In-memory deliberation sessions and per-user transcripts.
// ABOUTME: State lives for the process lifetime; nothing is persisted or expired.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A deliberation opened by the `ask` command.
///
/// `contributor` is not forced to be a subset of `participant`: a user who
/// re-joined elsewhere can still press an old Submit button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub admin: u64,
    pub topic: String,
    pub participant: BTreeSet<u64>,
    pub contributor: BTreeSet<u64>,
}

impl Session {
    pub fn new(admin: u64, topic: impl Into<String>) -> Self {
        Self {
            admin,
            topic: topic.into(),
            participant: BTreeSet::new(),
            contributor: BTreeSet::new(),
        }
    }

    /// Participants who have not submitted yet.
    pub fn pending(&self) -> usize {
        self.participant.difference(&self.contributor).count()
    }
}

/// One live record per user; a later join replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub session: String,
    pub transcript: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub session: HashMap<String, Session>,
    pub user: BTreeMap<u64, UserRecord>,
    pub prompt: BTreeMap<String, String>,
}

impl SessionState {
    pub fn with_prompts(prompt: BTreeMap<String, String>) -> Self {
        Self {
            prompt,
            ..Self::default()
        }
    }

    /// Move `id_user` into `id_session`, replacing their transcript.
    ///
    /// Returns the new participant count, or `None` if the session is unknown
    /// (in which case nothing changes).
    pub fn join(&mut self, id_user: u64, name_user: &str, id_session: &str) -> Option<usize> {
        if !self.session.contains_key(id_session) {
            return None;
        }

        if let Some(prev) = self.user.get(&id_user) {
            if let Some(prev_session) = self.session.get_mut(&prev.session) {
                prev_session.participant.remove(&id_user);
                prev_session.contributor.remove(&id_user);
            }
        }

        let session = self.session.get_mut(id_session)?;
        session.participant.insert(id_user);
        let count = session.participant.len();

        self.user.insert(
            id_user,
            UserRecord {
                name: name_user.to_string(),
                session: id_session.to_string(),
                transcript: Vec::new(),
            },
        );
        Some(count)
    }

    /// Text block of every transcript belonging to `id_session`, ordered by user id.
    pub fn transcript(&self, id_session: &str) -> String {
        let mut text = String::new();
        for record in self.user.values().filter(|r| r.session == id_session) {
            text.push_str(&format!("\n\n{}:\n", record.name));
            for item in &record.transcript {
                text.push_str(&format!(" - {}\n", item));
            }
        }
        text
    }

    /// Users whose current record points at `id_session`.
    pub fn members(&self, id_session: &str) -> Vec<u64> {
        self.user
            .iter()
            .filter(|(_, r)| r.session == id_session)
            .map(|(id, _)| *id)
            .collect()
    }
}
