//! Conversation history and prompt assembly.
//!
//! [`ConversationManager`] keeps the most recent exchanges of one session
//! and renders them into a prompt. [`ConversationStore`] holds one manager
//! per session in a bounded moka cache; idle sessions are evicted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use crate::Result;
use crate::generator::TextGenerator;

/// Exchanges kept per session.
pub const MAX_EXCHANGES: usize = 5;

/// One user input and the reply it received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub agent: String,
}

/// Sliding window of the most recent exchanges of one session.
#[derive(Debug, Default, Clone)]
pub struct ConversationManager {
    history: VecDeque<Exchange>,
    messages: u64,
}

impl ConversationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the history followed by `input` as a prompt.
    pub fn build_prompt(&self, input: &str) -> String {
        let mut prompt = String::new();
        for exchange in &self.history {
            prompt.push_str(&format!("User: {}\nAgent: {}\n", exchange.user, exchange.agent));
        }
        prompt.push_str(&format!("User: {input}\nAgent:"));
        prompt
    }

    /// Append an exchange, dropping the oldest beyond [`MAX_EXCHANGES`].
    pub fn record(&mut self, user: impl Into<String>, agent: impl Into<String>) {
        self.history.push_back(Exchange {
            user: user.into(),
            agent: agent.into(),
        });
        while self.history.len() > MAX_EXCHANGES {
            self.history.pop_front();
        }
        self.messages += 2;
    }

    /// Exchanges currently kept, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Exchange> {
        self.history.iter()
    }

    /// Total messages (user and agent) exchanged, including trimmed ones.
    pub fn message_count(&self) -> u64 {
        self.messages
    }
}

/// Configuration for [`ConversationStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of sessions kept. Default: 10,000.
    pub max_sessions: u64,
    /// Sessions idle this long are evicted. Default: 30 minutes.
    pub idle_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

type SharedManager = Arc<Mutex<ConversationManager>>;

/// Per-session conversation histories.
pub struct ConversationStore {
    sessions: Cache<String, SharedManager>,
}

impl ConversationStore {
    pub fn new(config: &StoreConfig) -> Self {
        let sessions = Cache::builder()
            .max_capacity(config.max_sessions)
            .time_to_idle(config.idle_timeout)
            .build();
        Self { sessions }
    }

    async fn manager(&self, session_id: &str) -> SharedManager {
        self.sessions
            .get_with(session_id.to_owned(), async { SharedManager::default() })
            .await
    }

    /// Prompt the generator with `input` in the context of `session_id`
    /// and record the exchange.
    ///
    /// The history lock is not held across the generator call; concurrent
    /// inputs on one session each see the history as it was when they
    /// started.
    pub async fn process_input(
        &self,
        session_id: &str,
        input: &str,
        generator: &dyn TextGenerator,
    ) -> Result<String> {
        let manager = self.manager(session_id).await;
        let prompt = manager
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .build_prompt(input);

        let reply = generator.generate(&prompt).await?;

        manager
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(input, reply.clone());
        debug!(session_id, prompt_len = prompt.len(), "exchange recorded");
        Ok(reply)
    }

    /// Total messages exchanged in `session_id` (0 if unknown).
    pub async fn message_count(&self, session_id: &str) -> u64 {
        self.sessions
            .get(session_id)
            .await
            .map_or(0, |manager| count_messages(&manager))
    }

    /// Forget `session_id`, returning its message count.
    pub async fn end(&self, session_id: &str) -> u64 {
        self.sessions
            .remove(session_id)
            .await
            .map_or(0, |manager| count_messages(&manager))
    }
}

fn count_messages(manager: &SharedManager) -> u64 {
    manager
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .message_count()
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}
