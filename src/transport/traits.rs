//! Messaging transport abstraction: inbound updates and outbound replies.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Who sent an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub user_id: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateKind {
    Message { text: String },
    Callback { callback_id: String, payload: String },
}

/// One incoming user action, independent of the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundUpdate {
    pub sender: Sender,
    pub chat_id: String,
    pub kind: UpdateKind,
}

impl InboundUpdate {
    pub fn message(user_id: &str, chat_id: &str, text: &str) -> Self {
        Self {
            sender: Sender {
                user_id: user_id.to_string(),
                username: None,
            },
            chat_id: chat_id.to_string(),
            kind: UpdateKind::Message {
                text: text.to_string(),
            },
        }
    }

    pub fn callback(user_id: &str, chat_id: &str, callback_id: &str, payload: &str) -> Self {
        Self {
            sender: Sender {
                user_id: user_id.to_string(),
                username: None,
            },
            chat_id: chat_id.to_string(),
            kind: UpdateKind::Callback {
                callback_id: callback_id.to_string(),
                payload: payload.to_string(),
            },
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: &str) -> Self {
        self.sender.username = Some(username.to_string());
        self
    }
}

/// A keyboard button. Buttons with a payload send it back as a callback;
/// buttons without one send their label as a plain message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub payload: Option<String>,
}

impl Button {
    pub fn callback(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: Some(payload.into()),
        }
    }

    pub fn text(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        if !buttons.is_empty() {
            self.rows.push(buttons);
        }
        self
    }

    /// True when any button carries a callback payload.
    pub fn is_inline(&self) -> bool {
        self.rows.iter().flatten().any(|b| b.payload.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStyle {
    #[default]
    Plain,
    Bold,
    Italic,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub keyboard: Option<Keyboard>,
    pub style: TextStyle,
}

impl SendOptions {
    pub fn keyboard(keyboard: Keyboard) -> Self {
        Self {
            keyboard: Some(keyboard),
            style: TextStyle::Plain,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerOptions {
    /// Short notice shown by the client, if any.
    pub text: Option<String>,
    pub show_alert: bool,
}

/// Outbound side of a messaging platform.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str, options: &SendOptions) -> Result<()>;

    /// Acknowledge a button press.
    async fn answer_callback(&self, callback_id: &str, options: &AnswerOptions) -> Result<()>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_is_inline_only_with_payloads() {
        let reply = Keyboard::new().row(vec![Button::text("stats"), Button::text("help")]);
        assert!(!reply.is_inline());

        let inline = reply.row(vec![Button::callback("Done", "done")]);
        assert!(inline.is_inline());
        assert_eq!(inline.buttons().count(), 3);
    }

    #[test]
    fn empty_rows_are_skipped() {
        assert!(Keyboard::new().row(vec![]).is_empty());
    }

    #[test]
    fn update_serialization_is_tagged() {
        let update = InboundUpdate::callback("1", "c", "cb-9", "score:7").with_username("alice");
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["kind"]["type"], "callback");
        assert_eq!(json["kind"]["payload"], "score:7");
        assert_eq!(json["sender"]["username"], "alice");
    }
}
