//! Terminal transport used by `weekbot chat`.

use super::traits::{AnswerOptions, Keyboard, SendOptions, TextStyle, Transport};
use anyhow::Result;
use async_trait::async_trait;
use console::style;
use tokio::io::{self, AsyncWriteExt};

pub struct ConsoleTransport;

fn render_keyboard(keyboard: &Keyboard) -> String {
    keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| match &button.payload {
                    Some(payload) => format!("[{} → {}]", button.label, payload),
                    None => format!("[{}]", button.label),
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send_message(&self, _chat_id: &str, text: &str, options: &SendOptions) -> Result<()> {
        let body = match options.style {
            TextStyle::Plain => text.to_string(),
            TextStyle::Bold => style(text).bold().to_string(),
            TextStyle::Italic => style(text).italic().to_string(),
        };
        let mut out = format!("{} {body}\n", style("bot>").cyan().bold());
        if let Some(keyboard) = options.keyboard.as_ref().filter(|k| !k.is_empty()) {
            out.push_str(&style(render_keyboard(keyboard)).dim().to_string());
            out.push('\n');
        }

        let mut stdout = io::stdout();
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str, options: &AnswerOptions) -> Result<()> {
        if let Some(text) = &options.text {
            let mut stdout = io::stdout();
            stdout
                .write_all(format!("{}\n", style(text).dim()).as_bytes())
                .await?;
            stdout.flush().await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}
