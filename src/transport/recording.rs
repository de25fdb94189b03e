//! Transport that records everything it is asked to send.

use super::traits::{AnswerOptions, SendOptions, Transport};
use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: String,
    pub text: String,
    pub options: SendOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnsweredCallback {
    pub callback_id: String,
    pub options: AnswerOptions,
}

/// In-memory [`Transport`] for tests and dry runs.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    answered: Mutex<Vec<AnsweredCallback>>,
    fail_sends: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `send_message` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.text.clone()).collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.sent.lock().last().map(|m| m.text.clone())
    }

    pub fn answered(&self) -> Vec<AnsweredCallback> {
        self.answered.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(&self, chat_id: &str, text: &str, options: &SendOptions) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("send to {chat_id} refused");
        }
        self.sent.lock().push(SentMessage {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, options: &AnswerOptions) -> Result<()> {
        self.answered.lock().push(AnsweredCallback {
            callback_id: callback_id.to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_messages_and_answers() {
        let transport = RecordingTransport::new();
        transport
            .send_message("c1", "hello", &SendOptions::default())
            .await
            .unwrap();
        transport
            .answer_callback("cb", &AnswerOptions::default())
            .await
            .unwrap();

        assert_eq!(transport.texts(), vec!["hello"]);
        assert_eq!(transport.answered()[0].callback_id, "cb");
        assert_eq!(transport.sent()[0].chat_id, "c1");
    }

    #[tokio::test]
    async fn injected_send_failure() {
        let transport = RecordingTransport::new();
        transport.fail_sends(true);
        assert!(transport
            .send_message("c1", "hello", &SendOptions::default())
            .await
            .is_err());
    }
}
