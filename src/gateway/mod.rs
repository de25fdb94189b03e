//! Axum gateway: Telegram webhook and health endpoint.
//!
//! `POST /webhook` accepts a Telegram `Update`, checks the shared secret and
//! hands the parsed update to the dialogue engine on its own task, so the
//! webhook returns before the dialogue finishes. Those tasks are tracked and
//! drained when the server shuts down. `GET /health` reports cache and
//! session counters.

use crate::bot::Bot;
use crate::transport::telegram::parse_update;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Dialogue tasks spawned by the webhook.
#[derive(Clone, Default)]
pub struct UpdateTasks(Arc<Mutex<JoinSet<()>>>);

impl UpdateTasks {
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.0.lock();
        while let Some(finished) = set.try_join_next() {
            log_join(finished);
        }
        set.spawn(task);
    }

    pub fn in_flight(&self) -> usize {
        self.0.lock().len()
    }

    /// Wait for every spawned task to finish.
    pub async fn drain(&self) {
        let mut set = std::mem::take(&mut *self.0.lock());
        while let Some(finished) = set.join_next().await {
            log_join(finished);
        }
    }
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(error) = result {
        tracing::error!(%error, "update task did not complete");
    }
}

#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<Bot>,
    pub webhook_secret: Option<String>,
    pub tasks: UpdateTasks,
}

impl AppState {
    pub fn new(bot: Arc<Bot>, webhook_secret: Option<String>) -> Self {
        Self {
            bot,
            webhook_secret,
            tasks: UpdateTasks::default(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Bind `host:port` and serve until Ctrl-C.
pub async fn run_gateway(host: &str, port: u16, state: AppState) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind gateway on {addr}"))?;

    if state.webhook_secret.is_none() {
        tracing::warn!("gateway.webhook_secret is not set; webhook requests are not authenticated");
    }
    serve_until(listener, state, ctrl_c()).await
}

/// Serve on `listener` until `shutdown` resolves, then finish in-flight updates.
pub async fn serve_until<S>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    tracing::info!(addr = %listener.local_addr()?, "gateway listening");
    let tasks = state.tasks.clone();

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Gateway server stopped")?;

    tracing::info!(in_flight = tasks.in_flight(), "gateway stopped, finishing updates");
    tasks.drain().await;
    Ok(())
}

async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "cannot listen for Ctrl-C, serving until killed");
        std::future::pending::<()>().await;
    }
}

fn secret_matches(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// POST /webhook
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(expected) = state.webhook_secret.as_deref() {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !secret_matches(expected, provided) {
            tracing::warn!("webhook rejected: bad or missing secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(%error, "webhook body is not JSON");
            return StatusCode::BAD_REQUEST;
        }
    };

    // Updates we cannot use are acknowledged so Telegram stops redelivering them.
    let Some(inbound) = parse_update(&update) else {
        tracing::debug!(
            update_id = update.get("update_id").and_then(serde_json::Value::as_i64),
            "ignoring unsupported update"
        );
        return StatusCode::OK;
    };

    let engine = Arc::clone(&state.bot.engine);
    state.tasks.spawn(async move {
        engine.handle_update(inbound).await;
    });
    StatusCode::OK
}

/// GET /health
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bot.health())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::transport::{RecordingTransport, Transport};
    use serde_json::json;
    use std::time::Duration;

    async fn spawn_gateway(secret: Option<&str>) -> (String, Arc<RecordingTransport>) {
        let mut config = Config::default();
        config.store.backend = "memory".into();
        let transport = Arc::new(RecordingTransport::new());
        let bot = Bot::build(&config, Arc::clone(&transport) as Arc<dyn Transport>).unwrap();
        let state = AppState::new(Arc::new(bot), secret.map(str::to_string));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        (format!("http://{addr}"), transport)
    }

    fn start_update() -> serde_json::Value {
        json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": {"id": 42, "username": "alice"},
                "chat": {"id": 42},
                "text": "/help"
            }
        })
    }

    #[test]
    fn secret_comparison() {
        assert!(secret_matches("abc", "abc"));
        assert!(!secret_matches("abc", "abd"));
        assert!(!secret_matches("abc", "ab"));
    }

    #[tokio::test]
    async fn webhook_requires_secret_when_configured() {
        let (base, transport) = spawn_gateway(Some("s3cret")).await;
        let client = reqwest::Client::new();

        let denied = client
            .post(format!("{base}/webhook"))
            .json(&start_update())
            .send()
            .await
            .unwrap();
        assert_eq!(denied.status(), reqwest::StatusCode::UNAUTHORIZED);

        let accepted = client
            .post(format!("{base}/webhook"))
            .header(SECRET_HEADER, "s3cret")
            .json(&start_update())
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status(), reqwest::StatusCode::OK);

        for _ in 0..50 {
            if !transport.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, "42");
    }

    #[tokio::test]
    async fn malformed_and_unsupported_bodies() {
        let (base, transport) = spawn_gateway(None).await;
        let client = reqwest::Client::new();

        let bad = client
            .post(format!("{base}/webhook"))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), reqwest::StatusCode::BAD_REQUEST);

        let ignored = client
            .post(format!("{base}/webhook"))
            .json(&json!({"update_id": 2, "edited_message": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(ignored.status(), reqwest::StatusCode::OK);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn drain_waits_for_spawned_updates() {
        let tasks = UpdateTasks::default();
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        tasks.spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });
        assert_eq!(tasks.in_flight(), 1);

        tasks.drain().await;
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(tasks.in_flight(), 0);
    }

    #[tokio::test]
    async fn shutdown_finishes_accepted_updates() {
        let mut config = Config::default();
        config.store.backend = "memory".into();
        let transport = Arc::new(RecordingTransport::new());
        let bot = Bot::build(&config, Arc::clone(&transport) as Arc<dyn Transport>).unwrap();
        let state = AppState::new(Arc::new(bot), None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve_until(listener, state, async move {
            let _ = stopped.await;
        }));

        let accepted = reqwest::Client::new()
            .post(format!("{base}/webhook"))
            .json(&start_update())
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status(), reqwest::StatusCode::OK);

        stop.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn health_reports_counters() {
        let (base, _) = spawn_gateway(None).await;
        let body: serde_json::Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store_backend"], "memory");
        assert_eq!(body["active_sessions"], 0);
        assert!(body["cache"]["entries"].is_number());
    }
}
