//! Per-session conversation memory.
//!
//! A rolling window of recent turns, kept separately per chat session.
//! The window evicts oldest-first; the optional system prompt lives
//! outside the window so it can never be evicted.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::debug;

use skillet_core::{ConversationTurn, MemoryConfig, Role};

/// Rolling conversation window for one session.
pub struct Memory {
    turns: VecDeque<ConversationTurn>,
    system_prompt: Option<String>,
    config: MemoryConfig,
}

impl Memory {
    /// Create an empty memory.
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            turns: VecDeque::with_capacity(config.max_turns),
            system_prompt: None,
            config,
        }
    }

    /// Set the session's system prompt. Not part of the window.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    /// The session's system prompt, if set.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Append one turn, evicting the oldest beyond the window size.
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.config.max_turns {
            self.turns.pop_front();
        }
    }

    /// Append a user turn.
    pub fn add_user(&mut self, content: impl Into<String>) {
        self.push(ConversationTurn::user(content));
    }

    /// Append an assistant turn.
    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.push(ConversationTurn::assistant(content));
    }

    /// The retained turns, oldest first.
    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// Number of retained turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turns are retained.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop all turns. The system prompt survives.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Compact rendering of the last `n` turns for prompt context.
    ///
    /// One line per turn, each truncated to the configured character
    /// limit. Empty when the session has no history.
    pub fn context_summary(&self, n: usize) -> String {
        let skip = self.turns.len().saturating_sub(n);
        self.turns
            .iter()
            .skip(skip)
            .map(|turn| {
                let label = match turn.role {
                    Role::User => "用户",
                    Role::Assistant => "助手",
                    Role::System => "系统",
                };
                format!("{label}: {}", truncate(&turn.content, self.config.summary_chars))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Cut at a character (not byte) boundary, CJK content included.
fn truncate(content: &str, limit: usize) -> String {
    if content.chars().count() <= limit {
        content.to_string()
    } else {
        let mut cut: String = content.chars().take(limit).collect();
        cut.push_str("...");
        cut
    }
}

/// Session-keyed memory, created on first use.
pub struct MemoryStore {
    config: MemoryConfig,
    sessions: Mutex<HashMap<String, Memory>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Run a closure against one session's memory, creating it if absent.
    ///
    /// The closure runs under the store lock and must not block.
    pub fn with_session<R>(&self, session_id: &str, f: impl FnOnce(&mut Memory) -> R) -> R {
        let mut sessions = self.sessions.lock();
        let memory = sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session_id = %session_id, "Opening session memory");
            Memory::new(self.config.clone())
        });
        f(memory)
    }

    /// Drop one session's memory entirely.
    pub fn clear_session(&self, session_id: &str) {
        self.sessions.lock().remove(session_id);
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}
