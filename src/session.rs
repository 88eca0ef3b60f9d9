use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Speaker of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One conversation turn. Immutable once appended to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Process-wide, in-memory map from session id to an ordered turn history.
///
/// Not a durable store: contents are lost on restart and exist only to bound
/// outbound request size. Sessions are created on first append and never
/// expire on their own; each session's turn list is append-only with a
/// configurable cap that drops the oldest turns.
///
/// The map itself is safe under concurrent insertion of different keys; a
/// single session is expected to be driven by one request at a time.
pub struct SessionStore {
    sessions: Mutex<FxHashMap<String, Vec<Turn>>>,
    max_turns: usize,
}

impl SessionStore {
    #[must_use]
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: Mutex::new(FxHashMap::default()),
            max_turns: max_turns.max(1),
        }
    }

    /// Clone the current turn history for a session. Unknown ids yield an
    /// empty history.
    #[must_use]
    pub fn snapshot(&self, session_id: &str) -> Vec<Turn> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Append one turn, creating the session on first use. When the cap is
    /// exceeded the oldest turns are dropped.
    pub fn append(&self, session_id: &str, turn: Turn) {
        let mut sessions = self.sessions.lock();
        let turns = sessions.entry(session_id.to_string()).or_default();
        turns.push(turn);
        if turns.len() > self.max_turns {
            let excess = turns.len() - self.max_turns;
            turns.drain(..excess);
        }
    }

    /// Discard a session's entire history. Returns whether it existed.
    pub fn clear(&self, session_id: &str) -> bool {
        self.sessions.lock().remove(session_id).is_some()
    }

    #[must_use]
    pub fn turn_count(&self, session_id: &str) -> usize {
        self.sessions
            .lock()
            .get(session_id)
            .map_or(0, Vec::len)
    }
}
