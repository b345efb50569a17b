//! Tests for per-session conversation history.

use std::sync::Mutex;

use async_trait::async_trait;

use companion::conversation::{ConversationStore, StoreConfig};
use companion::generator::TextGenerator;
use companion::{CompanionError, Result};

// ============================================================================
// Mock generator
// ============================================================================

/// Echoes a numbered reply and records every prompt it receives.
#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingGenerator {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    fn model(&self) -> &str {
        "recording-model"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());
        if self.fail {
            return Err(CompanionError::EmptyResponse);
        }
        Ok(format!("reply {}", prompts.len()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn second_prompt_carries_the_first_exchange() {
    let store = ConversationStore::default();
    let generator = RecordingGenerator::default();

    let first = store.process_input("s1", "hello", &generator).await.unwrap();
    let second = store
        .process_input("s1", "I feel anxious", &generator)
        .await
        .unwrap();

    assert_eq!(first, "reply 1");
    assert_eq!(second, "reply 2");
    assert_eq!(
        generator.prompts(),
        [
            "User: hello\nAgent:".to_string(),
            "User: hello\nAgent: reply 1\nUser: I feel anxious\nAgent:".to_string(),
        ]
    );
    assert_eq!(store.message_count("s1").await, 4);
}

#[tokio::test]
async fn sessions_do_not_share_history() {
    let store = ConversationStore::default();
    let generator = RecordingGenerator::default();

    store.process_input("a", "first", &generator).await.unwrap();
    store.process_input("b", "second", &generator).await.unwrap();

    assert_eq!(generator.prompts()[1], "User: second\nAgent:");
    assert_eq!(store.message_count("a").await, 2);
    assert_eq!(store.message_count("b").await, 2);
}

#[tokio::test]
async fn ending_returns_the_count_and_forgets_the_session() {
    let store = ConversationStore::new(&StoreConfig::default());
    let generator = RecordingGenerator::default();

    store.process_input("s1", "one", &generator).await.unwrap();
    store.process_input("s1", "two", &generator).await.unwrap();

    assert_eq!(store.end("s1").await, 4);
    assert_eq!(store.end("s1").await, 0);
    assert_eq!(store.message_count("s1").await, 0);

    // A new conversation on the same id starts from scratch
    store.process_input("s1", "again", &generator).await.unwrap();
    assert_eq!(generator.prompts().last().unwrap(), "User: again\nAgent:");
}

#[tokio::test]
async fn unknown_session_has_no_messages() {
    let store = ConversationStore::default();
    assert_eq!(store.message_count("nobody").await, 0);
    assert_eq!(store.end("nobody").await, 0);
}

#[tokio::test]
async fn generator_failure_records_no_exchange() {
    let store = ConversationStore::default();
    let generator = RecordingGenerator::failing();

    let err = store
        .process_input("s1", "hello", &generator)
        .await
        .unwrap_err();
    assert!(matches!(err, CompanionError::EmptyResponse));
    assert_eq!(store.message_count("s1").await, 0);
}
