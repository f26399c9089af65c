//! Gateway HTTP server (single port) and inbound processor wiring.

use crate::channels::{ChannelRegistry, InboundEvent, TelegramChannel, TelegramUpdate};
use crate::config::{self, Config};
use crate::console::{self, ConsoleEnd};
use crate::conversation::ConversationLog;
use crate::engine::{InboundMessage, ReplyEngine, ReplyError};
use crate::gateway::inbound::process_inbound_event;
use crate::gateway::protocol::{ErrorPayload, InboundReply, SetStatusParams, StatusPayload};
use crate::llm::CompletionService;
use crate::status::StatusStore;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::{JoinHandle, JoinSet};

/// Bound on queued channel events; senders wait when the processor falls behind.
pub const INBOUND_QUEUE_CAPACITY: usize = 64;

/// Shared state for the gateway (config, status, engine, channels).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// When Some, /status and /inbound require `Authorization: Bearer <token>`.
    pub required_token: Option<String>,
    pub status: Arc<StatusStore>,
    pub engine: ReplyEngine,
    /// Per-conversation history window fed to the engine.
    pub conversations: Arc<ConversationLog>,
    pub channel_registry: Arc<ChannelRegistry>,
    /// In-process channel connector tasks; awaited during graceful shutdown.
    pub channel_tasks: Arc<RwLock<Vec<JoinHandle<()>>>>,
    /// Sender for inbound channel events (long-poll loops and webhook POSTs).
    pub inbound_tx: mpsc::Sender<InboundEvent>,
    /// Telegram connector when configured (needed by the webhook route).
    pub telegram: Option<Arc<TelegramChannel>>,
    pub reply_deadline: Option<Duration>,
}

/// When auth mode is token and a token is configured, returns it for request validation.
fn require_token(config: &Config) -> Option<String> {
    if config.gateway.auth.mode == config::GatewayAuthMode::Token {
        config::resolve_gateway_token(config)
    } else {
        None
    }
}

/// Build gateway state around a completion service. Returns the receiving end of the inbound queue;
/// hand it to [`spawn_inbound_processor`] (done by [`run_gateway`]).
pub fn build_state(
    config: Config,
    config_path: &std::path::Path,
    completion: Arc<dyn CompletionService>,
) -> (GatewayState, mpsc::Receiver<InboundEvent>) {
    let status = Arc::new(StatusStore::new(config::resolve_initial_status(&config)));
    let engine = ReplyEngine::from_config(&config, config_path, status.clone(), completion);
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundEvent>(INBOUND_QUEUE_CAPACITY);
    let state = GatewayState {
        required_token: require_token(&config),
        status,
        engine,
        conversations: Arc::new(ConversationLog::new(config.channels.history_window)),
        channel_registry: Arc::new(ChannelRegistry::new()),
        channel_tasks: Arc::new(RwLock::new(Vec::new())),
        inbound_tx,
        telegram: None,
        reply_deadline: config.agents.reply_deadline_secs.map(Duration::from_secs),
        config: Arc::new(config),
    };
    (state, inbound_rx)
}

/// Drain the inbound queue, handling every event in its own task so slow completions do not block others.
/// On `stop` the queue is closed, events already queued are still handled, and every started task is
/// awaited before the returned handle completes.
fn spawn_inbound_processor(
    state: GatewayState,
    mut inbound_rx: mpsc::Receiver<InboundEvent>,
    mut stop: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                ev = inbound_rx.recv() => match ev {
                    Some(ev) => {
                        tasks.spawn(process_inbound_event(state.clone(), ev));
                    }
                    None => break,
                },
                Some(res) = tasks.join_next(), if !tasks.is_empty() => log_task_result(res),
                _ = &mut stop => break,
            }
        }
        inbound_rx.close();
        while let Ok(ev) = inbound_rx.try_recv() {
            tasks.spawn(process_inbound_event(state.clone(), ev));
        }
        if !tasks.is_empty() {
            log::info!("inbound: waiting for {} in-flight events", tasks.len());
        }
        while let Some(res) = tasks.join_next().await {
            log_task_result(res);
        }
        log::debug!("inbound: processor stopped");
    })
}

fn log_task_result(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        log::warn!("inbound: event task failed: {}", e);
    }
}

/// HTTP routes for the given state.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/status", get(get_status).post(set_status))
        .route("/inbound", post(inbound_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// When bind is not loopback, a gateway token must be configured or startup fails.
/// With `with_console`, stdin accepts status commands and `exit` stops the server.
/// Blocks until shutdown (Ctrl+C, SIGTERM or console exit).
pub async fn run_gateway(config: Config, config_path: PathBuf, with_console: bool) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        let token = config::resolve_gateway_token(&config);
        if token.is_none() || config.gateway.auth.mode != config::GatewayAuthMode::Token {
            anyhow::bail!(
                "refusing to bind gateway to {} without auth (set gateway.auth.mode to \"token\" and gateway.auth.token or DEPUTY_GATEWAY_TOKEN)",
                bind
            );
        }
    }

    let completion = crate::engine::completion_service_from_config(&config);
    let (mut state, inbound_rx) = build_state(config.clone(), &config_path, completion);
    log::info!(
        "gateway: backend {} model {} status {:?}",
        config.agents.default_backend.name(),
        state.engine.settings().model,
        state.status.get().await
    );

    let telegram_webhook_for_shutdown: Option<Arc<TelegramChannel>> =
        if let Some(token) = config::resolve_telegram_token(&config) {
            let telegram = Arc::new(TelegramChannel::new(
                Some(token),
                config.channels.telegram.owner_user_id,
            ));
            state.telegram = Some(telegram.clone());
            state.channel_registry.register(telegram.clone()).await;
            if let Some(ref url) = config.channels.telegram.webhook_url {
                let secret = config.channels.telegram.webhook_secret.as_deref();
                if let Err(e) = telegram.set_webhook(url, secret).await {
                    log::warn!("telegram set_webhook failed: {}", e);
                } else {
                    log::info!("telegram channel registered (webhook mode): {}", url);
                }
                Some(telegram)
            } else {
                let handle = telegram.start_inbound(state.inbound_tx.clone());
                state.channel_tasks.write().await.push(handle);
                log::info!("telegram channel registered and getUpdates loop started");
                None
            }
        } else {
            None
        };

    let (processor_stop_tx, processor_stop_rx) = oneshot::channel::<()>();
    let processor = spawn_inbound_processor(state.clone(), inbound_rx, processor_stop_rx);

    let (console_exit_tx, console_exit_rx) = oneshot::channel::<()>();
    if with_console {
        let status = state.status.clone();
        println!("deputy gateway started; {}", crate::commands::CONSOLE_HELP);
        tokio::spawn(async move {
            match console::run_stdio_console(&status).await {
                Ok(ConsoleEnd::Exit) => {
                    let _ = console_exit_tx.send(());
                }
                Ok(ConsoleEnd::Eof) => log::debug!("console: stdin closed"),
                Err(e) => log::warn!("console: {}", e),
            }
        });
    }

    let channel_registry = state.channel_registry.clone();
    let channel_tasks = state.channel_tasks.clone();
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            console_exit_rx,
            channel_registry,
            channel_tasks,
            telegram_webhook_for_shutdown,
        ))
        .await
        .context("gateway server exited")?;

    let _ = processor_stop_tx.send(());
    if let Err(e) = processor.await {
        log::warn!("inbound: processor task failed: {}", e);
    }
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT, SIGTERM or console `exit`).
/// Stops channel connectors, removes the Telegram webhook if used, then awaits in-process channel tasks.
async fn shutdown_signal(
    console_exit: oneshot::Receiver<()>,
    channel_registry: Arc<ChannelRegistry>,
    channel_tasks: Arc<RwLock<Vec<JoinHandle<()>>>>,
    telegram_webhook: Option<Arc<TelegramChannel>>,
) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    // A dropped sender means the console ended without `exit`; keep serving.
    let console = async {
        if console_exit.await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = console => {},
    }
    log::info!("shutdown signal received, stopping channels");

    channel_registry.stop_all().await;

    if let Some(t) = telegram_webhook {
        if let Err(e) = t.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }

    let handles = {
        let mut g = channel_tasks.write().await;
        std::mem::take(&mut *g)
    };
    for h in handles {
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}

/// Check `Authorization: Bearer <token>` when a token is required.
fn authorized(state: &GatewayState, headers: &HeaderMap) -> bool {
    let Some(ref required) = state.required_token else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|t| t.trim() == required)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorPayload::new("unauthorized: gateway token missing or mismatched")),
    )
        .into_response()
}

/// GET / returns a simple health JSON (for probes). Unauthenticated, so it never carries the owner status.
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "backend": state.config.agents.default_backend.name(),
    }))
}

/// GET /status: current owner status.
async fn get_status(State(state): State<GatewayState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    Json(StatusPayload {
        status: state.status.get().await,
        previous: None,
    })
    .into_response()
}

/// POST /status: replace the owner status with any token.
async fn set_status(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(params): Json<SetStatusParams>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let previous = state.status.set(params.status.clone()).await;
    Json(StatusPayload {
        status: params.status,
        previous: Some(previous),
    })
    .into_response()
}

/// POST /inbound: run the engine on a transport-supplied message (history included in the body).
async fn inbound_http(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(msg): Json<InboundMessage>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let result = match state.reply_deadline {
        Some(deadline) => state.engine.process_message_with_deadline(&msg, deadline).await,
        None => state.engine.process_message(&msg).await,
    };
    match result {
        Ok(decision) => Json(InboundReply {
            reply: decision.into_reply(),
        })
        .into_response(),
        Err(e) => {
            let code = match &e {
                ReplyError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            };
            (code, Json(ErrorPayload::new(e.to_string()))).into_response()
        }
    }
}

/// POST /telegram/webhook: receives Telegram update JSON; verifies optional secret, queues the event.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(ref telegram) = state.telegram else {
        return StatusCode::NOT_FOUND;
    };
    if let Some(ref expected) = state.config.channels.telegram.webhook_secret {
        let provided = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let Some(event) = telegram.accept_update(update).await else {
        return StatusCode::OK;
    };
    if state.inbound_tx.send(event).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}
