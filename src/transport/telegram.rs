//! Telegram Bot API transport and `Update` parsing.

use super::traits::{AnswerOptions, InboundUpdate, Keyboard, Sender, SendOptions, TextStyle, Transport, UpdateKind};
use crate::util::{sanitize_api_error, scrub_secret_patterns};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram caps a message at 4096 UTF-16 code units; leave room for markup.
pub const MAX_MESSAGE_UNITS: usize = 4000;

pub struct TelegramTransport {
    api_base: String,
    bot_token: String,
    http: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(api_base: Option<&str>, bot_token: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            api_base: api_base
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            bot_token: bot_token.to_string(),
            http,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!(scrub_secret_patterns(&e.to_string())))
            .with_context(|| format!("Telegram {method} request failed"))?;

        let payload: Value = response
            .json()
            .await
            .with_context(|| format!("Telegram {method} returned a non-JSON body"))?;
        check_response(method, &payload)?;
        Ok(payload)
    }
}

/// Fail on `{ "ok": false, "description": ... }`.
pub fn check_response(method: &str, response: &Value) -> Result<()> {
    if response.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(());
    }
    let code = response
        .get("error_code")
        .and_then(Value::as_i64)
        .unwrap_or(-1);
    let description = response
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    bail!(
        "Telegram {method} failed (code {code}): {}",
        sanitize_api_error(description)
    )
}

/// `reply_markup` for a keyboard: inline when any button has a payload.
pub fn reply_markup(keyboard: &Keyboard) -> Value {
    if keyboard.is_inline() {
        let rows: Vec<Vec<Value>> = keyboard
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| {
                        let data = button.payload.as_deref().unwrap_or(&button.label);
                        json!({ "text": button.label, "callback_data": data })
                    })
                    .collect()
            })
            .collect();
        json!({ "inline_keyboard": rows })
    } else {
        let rows: Vec<Vec<Value>> = keyboard
            .rows
            .iter()
            .map(|row| row.iter().map(|b| json!({ "text": b.label })).collect())
            .collect();
        json!({ "keyboard": rows, "resize_keyboard": true, "one_time_keyboard": true })
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Build the `sendMessage` body.
pub fn message_body(chat_id: &str, text: &str, options: &SendOptions) -> Value {
    let mut body = match options.style {
        TextStyle::Plain => json!({ "chat_id": chat_id, "text": text }),
        TextStyle::Bold => json!({
            "chat_id": chat_id,
            "text": format!("<b>{}</b>", escape_html(text)),
            "parse_mode": "HTML",
        }),
        TextStyle::Italic => json!({
            "chat_id": chat_id,
            "text": format!("<i>{}</i>", escape_html(text)),
            "parse_mode": "HTML",
        }),
    };
    match options.keyboard.as_ref() {
        Some(keyboard) if !keyboard.is_empty() => body["reply_markup"] = reply_markup(keyboard),
        Some(_) => body["reply_markup"] = json!({ "remove_keyboard": true }),
        None => {}
    }
    body
}

fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Split `text` into pieces of at most `max_units` UTF-16 code units,
/// breaking at the last newline, else the last space, else mid-word.
pub fn split_message(text: &str, max_units: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while utf16_len(remaining) > max_units {
        let mut units = 0;
        let mut boundary = 0;
        for (idx, c) in remaining.char_indices() {
            units += c.len_utf16();
            if units > max_units {
                break;
            }
            boundary = idx + c.len_utf8();
        }
        if boundary == 0 {
            boundary = remaining.chars().next().map_or(remaining.len(), char::len_utf8);
        }

        let head = &remaining[..boundary];
        let split_at = if remaining[boundary..].starts_with(char::is_whitespace) {
            boundary
        } else {
            head.rfind('\n')
                .or_else(|| head.rfind(' '))
                .filter(|&at| at > 0)
                .unwrap_or(boundary)
        };

        let chunk = remaining[..split_at].trim_end();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn sender(from: Option<&Value>) -> Option<Sender> {
    let from = from?;
    Some(Sender {
        user_id: id_string(from.get("id"))?,
        username: from
            .get("username")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Convert a Telegram `Update` into an [`InboundUpdate`].
///
/// Returns `None` for update types the bot ignores (edits, stickers, joins).
pub fn parse_update(update: &Value) -> Option<InboundUpdate> {
    if let Some(query) = update.get("callback_query") {
        let sender = sender(query.get("from"))?;
        let chat_id = id_string(query.pointer("/message/chat/id"))
            .unwrap_or_else(|| sender.user_id.clone());
        return Some(InboundUpdate {
            sender,
            chat_id,
            kind: UpdateKind::Callback {
                callback_id: id_string(query.get("id"))?,
                payload: query
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
        });
    }

    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;
    Some(InboundUpdate {
        sender: sender(message.get("from"))?,
        chat_id: id_string(message.pointer("/chat/id"))?,
        kind: UpdateKind::Message {
            text: text.to_string(),
        },
    })
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(&self, chat_id: &str, text: &str, options: &SendOptions) -> Result<()> {
        let chunks = split_message(text, MAX_MESSAGE_UNITS);
        tracing::debug!(
            chat_id,
            chars = text.chars().count(),
            chunks = chunks.len(),
            "sending Telegram message"
        );

        // The keyboard rides on the last chunk so it sits under the whole text.
        let plain = SendOptions {
            keyboard: None,
            style: options.style,
        };
        let last = chunks.len() - 1;
        for (index, chunk) in chunks.iter().enumerate() {
            let chunk_options = if index == last { options } else { &plain };
            self.call("sendMessage", &message_body(chat_id, chunk, chunk_options))
                .await?;
        }
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, options: &AnswerOptions) -> Result<()> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = &options.text {
            body["text"] = json!(text);
            body["show_alert"] = json!(options.show_alert);
        }
        self.call("answerCallbackQuery", &body).await.map(|_| ())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Button;

    #[test]
    fn api_url_includes_token() {
        let transport = TelegramTransport::new(Some("http://localhost:9/"), "123:abc");
        assert_eq!(
            transport.api_url("sendMessage"),
            "http://localhost:9/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn error_response_is_reported() {
        let err = check_response(
            "sendMessage",
            &json!({ "ok": false, "error_code": 400, "description": "chat not found" }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("chat not found"));
        assert!(check_response("sendMessage", &json!({ "ok": true, "result": {} })).is_ok());
    }

    #[test]
    fn parses_text_message() {
        let update = json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "from": { "id": 42, "username": "alice" },
                "chat": { "id": -100 },
                "text": "/start"
            }
        });
        let parsed = parse_update(&update).unwrap();
        assert_eq!(parsed.sender.user_id, "42");
        assert_eq!(parsed.sender.username.as_deref(), Some("alice"));
        assert_eq!(parsed.chat_id, "-100");
        assert_eq!(parsed.kind, UpdateKind::Message { text: "/start".into() });
    }

    #[test]
    fn parses_callback_query() {
        let update = json!({
            "update_id": 11,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 42 },
                "message": { "chat": { "id": 42 } },
                "data": "score:7"
            }
        });
        let parsed = parse_update(&update).unwrap();
        assert_eq!(
            parsed.kind,
            UpdateKind::Callback {
                callback_id: "cb-1".into(),
                payload: "score:7".into()
            }
        );
    }

    #[test]
    fn ignores_non_text_updates() {
        let sticker = json!({ "message": { "from": { "id": 1 }, "chat": { "id": 1 }, "sticker": {} } });
        assert!(parse_update(&sticker).is_none());
        assert!(parse_update(&json!({ "edited_message": {} })).is_none());
    }

    #[test]
    fn keyboard_markup_kinds() {
        let inline = Keyboard::new().row(vec![Button::callback("7", "score:7")]);
        assert_eq!(reply_markup(&inline)["inline_keyboard"][0][0]["callback_data"], "score:7");

        let reply = Keyboard::new().row(vec![Button::text("stats")]);
        let markup = reply_markup(&reply);
        assert_eq!(markup["keyboard"][0][0]["text"], "stats");
        assert_eq!(markup["resize_keyboard"], true);
    }

    #[test]
    fn split_prefers_line_breaks_then_spaces() {
        assert_eq!(split_message("hi", 10), vec!["hi"]);
        assert_eq!(split_message("", 10), vec![""]);
        assert_eq!(split_message("aaaa\nbbbb", 6), vec!["aaaa", "bbbb"]);
        assert_eq!(split_message("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(split_message("abcdefgh", 3), vec!["abc", "def", "gh"]);
    }

    #[test]
    fn split_counts_utf16_units() {
        assert_eq!(split_message("😀😀😀", 4), vec!["😀😀", "😀"]);
        assert_eq!(split_message("жжж", 2), vec!["жж", "ж"]);
    }

    #[test]
    fn largest_allowed_report_fits_in_message_chunks() {
        use crate::config::DialogueConfig;
        use crate::reports::{format::render_draft, DraftReport, Score};
        use chrono::NaiveDate;

        let limits = DialogueConfig::default();
        let task = |prefix: &str, i: usize| {
            format!("{prefix}{i:02} {}", "ж".repeat(limits.max_task_chars - 5))
        };
        let previous: Vec<String> = (0..limits.max_tasks).map(|i| task("p", i)).collect();
        let mut draft = DraftReport::new(
            "1",
            None,
            9,
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            previous,
        );
        draft.score = Some(Score::new(5).unwrap());
        for i in 0..limits.max_tasks {
            draft.completed.push(task("c", i));
            draft.planned.push(task("n", i));
        }
        draft.comment = Some("💬".repeat(limits.max_comment_chars));

        let text = format!("Here is your report:\n\n{}", render_draft(&draft));
        assert!(utf16_len(&text) > MAX_MESSAGE_UNITS);

        let chunks = split_message(&text, MAX_MESSAGE_UNITS);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| utf16_len(c) <= MAX_MESSAGE_UNITS));
        for i in 0..limits.max_tasks {
            let plan = task("n", i);
            assert_eq!(chunks.iter().filter(|c| c.contains(&plan)).count(), 1);
        }
        assert!(chunks.last().unwrap().ends_with('💬'));
    }

    #[tokio::test]
    async fn long_text_is_sent_in_chunks_with_keyboard_last() {
        use axum::{extract::State, routing::post, Json, Router};
        use parking_lot::Mutex;
        use std::sync::Arc;

        type Bodies = Arc<Mutex<Vec<Value>>>;
        let bodies: Bodies = Arc::default();
        let app = Router::new()
            .route(
                "/botTEST/sendMessage",
                post(|State(bodies): State<Bodies>, Json(body): Json<Value>| async move {
                    bodies.lock().push(body);
                    Json(json!({ "ok": true, "result": {} }))
                }),
            )
            .with_state(Arc::clone(&bodies));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let transport = TelegramTransport::new(Some(&format!("http://{addr}")), "TEST");
        let text = (0..300)
            .map(|i| format!("line {i} {}", "x".repeat(40)))
            .collect::<Vec<_>>()
            .join("\n");
        let options =
            SendOptions::keyboard(Keyboard::new().row(vec![Button::callback("Submit", "submit")]));
        transport.send_message("42", &text, &options).await.unwrap();

        let bodies = bodies.lock().clone();
        assert!(bodies.len() > 1);
        let (last, rest) = bodies.split_last().unwrap();
        assert!(rest.iter().all(|b| b.get("reply_markup").is_none()));
        assert_eq!(
            last["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "submit"
        );
        assert!(bodies
            .iter()
            .all(|b| utf16_len(b["text"].as_str().unwrap()) <= MAX_MESSAGE_UNITS));
        assert!(bodies[0]["text"].as_str().unwrap().starts_with("line 0 "));
    }

    #[test]
    fn bold_text_is_escaped_html() {
        let options = SendOptions {
            keyboard: None,
            style: TextStyle::Bold,
        };
        let body = message_body("1", "a < b", &options);
        assert_eq!(body["text"], "<b>a &lt; b</b>");
        assert_eq!(body["parse_mode"], "HTML");
    }
}
