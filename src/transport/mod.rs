//! Messaging transports.

pub mod console;
pub mod recording;
pub mod telegram;
pub mod traits;

pub use console::ConsoleTransport;
pub use recording::{AnsweredCallback, RecordingTransport, SentMessage};
pub use telegram::TelegramTransport;
pub use traits::{
    AnswerOptions, Button, InboundUpdate, Keyboard, SendOptions, Sender, TextStyle, Transport,
    UpdateKind,
};

use crate::config::Config;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Telegram transport from `[telegram]`. Fails when no bot token is configured.
pub fn create_telegram_transport(config: &Config) -> Result<Arc<dyn Transport>> {
    let token = config
        .telegram
        .bot_token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .context("telegram.bot_token is not set (or export WEEKBOT_TELEGRAM_TOKEN)")?;
    Ok(Arc::new(TelegramTransport::new(
        config.telegram.api_base_url.as_deref(),
        token,
    )))
}
