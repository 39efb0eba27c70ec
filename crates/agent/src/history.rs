//! Per-session conversation history.
//!
//! Only used when `agent.history_scope = "session"`. Each session keeps its
//! most recent question/answer turns; older turns fall off the front. At
//! most `max_sessions` sessions are held, and committing to a new session
//! past that cap evicts the one written to least recently.

use harbor_core::message::ConversationMessage;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct Turn {
    question: String,
    answer: String,
}

#[derive(Debug, Default)]
struct Session {
    turns: VecDeque<Turn>,
    /// Value of the commit counter at the last write.
    last_commit: u64,
}

#[derive(Debug, Default)]
struct Sessions {
    by_id: HashMap<String, Session>,
    commits: u64,
}

pub struct SessionHistory {
    sessions: RwLock<Sessions>,
    max_turns: usize,
    max_sessions: usize,
}

impl SessionHistory {
    pub fn new(max_turns: usize, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            max_turns: max_turns.max(1),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Prior turns of `session_id` as user/assistant messages, oldest first.
    pub async fn messages(&self, session_id: &str) -> Vec<ConversationMessage> {
        let sessions = self.sessions.read().await;
        sessions
            .by_id
            .get(session_id)
            .map(|session| {
                session
                    .turns
                    .iter()
                    .flat_map(|t| {
                        [
                            ConversationMessage::user(t.question.clone()),
                            ConversationMessage::assistant(t.answer.clone()),
                        ]
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record a finished turn.
    pub async fn commit(&self, session_id: &str, question: &str, answer: &str) {
        let mut guard = self.sessions.write().await;
        let sessions = &mut *guard;

        if !sessions.by_id.contains_key(session_id) && sessions.by_id.len() >= self.max_sessions {
            let stalest = sessions
                .by_id
                .iter()
                .min_by_key(|(_, s)| s.last_commit)
                .map(|(id, _)| id.clone());
            if let Some(id) = stalest {
                sessions.by_id.remove(&id);
                debug!(session = %id, "Evicted least recently used session");
            }
        }

        sessions.commits += 1;
        let session = sessions.by_id.entry(session_id.to_string()).or_default();
        session.last_commit = sessions.commits;
        session.turns.push_back(Turn {
            question: question.to_string(),
            answer: answer.to_string(),
        });
        while session.turns.len() > self.max_turns {
            session.turns.pop_front();
        }
    }

    pub async fn turn_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .await
            .by_id
            .get(session_id)
            .map_or(0, |s| s.turns.len())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.by_id.len()
    }
}
