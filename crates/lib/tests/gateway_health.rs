//! Integration tests: serve the gateway router on a free port and drive it over HTTP, plus the
//! channel-side inbound processor with a recording channel. A scripted completion service stands in
//! for the LLM, so neither Anthropic, Ollama nor Telegram is needed.

use async_trait::async_trait;
use deputy::channels::{ChannelError, ChannelHandle, InboundEvent, TelegramChannel, TelegramUpdate};
use deputy::config::{Config, GatewayAuthMode};
use deputy::conversation::ChannelConvKey;
use deputy::gateway::{self, GatewayState};
use deputy::history::HistoryEntry;
use deputy::llm::{CompletionRequest, CompletionResponse, CompletionService, LlmError};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers every request with a fixed reply (or an error) and remembers what it was asked.
struct ScriptedCompletion {
    reply: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.reply {
            Some(ref text) => Ok(CompletionResponse::text(text.clone())),
            None => Err(LlmError::Api {
                status: 500,
                body: "upstream exploded".to_string(),
            }),
        }
    }
}

/// Channel that records sent messages instead of delivering them.
struct RecordingChannel {
    id: String,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    fn named(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            sent: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChannelHandle for RecordingChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {}

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), text.to_string()));
        Ok(())
    }
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn temp_config_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("deputy-gateway-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(dir.join("workspace")).expect("create workspace dir");
    dir.join("config.json")
}

fn test_config(initial_status: &str) -> Config {
    let mut config = Config::default();
    config.gateway.bind = "127.0.0.1".to_string();
    config.owner.initial_status = Some(initial_status.to_string());
    config
}

fn state_with(config: Config, completion: Arc<dyn CompletionService>) -> GatewayState {
    let (state, _rx) = gateway::build_state(config, &temp_config_path(), completion);
    state
}

/// Serve the router on a free port; the server task is left running when the test ends.
async fn serve(state: GatewayState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local_addr");
    let app = gateway::router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

fn event(conversation: &str, sender: &str, text: &str) -> InboundEvent {
    InboundEvent {
        channel_id: "recorder".to_string(),
        conversation_id: conversation.to_string(),
        sender_label: sender.to_string(),
        text: text.to_string(),
        from_self: false,
        is_group: false,
    }
}

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let port = free_port();
    let config_path = temp_config_path();

    let mut config = test_config("available");
    config.gateway.port = port;

    let gateway_handle = tokio::spawn(async move {
        let _ = gateway::run_gateway(config, config_path, false).await;
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
                gateway_handle.abort();
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    gateway_handle.abort();
    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        url, last_err
    );
}

#[tokio::test]
async fn status_endpoint_reads_and_replaces_status() {
    let state = state_with(test_config("available"), ScriptedCompletion::replying("hi"));
    let store = state.status.clone();
    let base = serve(state).await;
    let client = reqwest::Client::new();

    let json: serde_json::Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json, serde_json::json!({ "status": "available" }));

    let json: serde_json::Value = client
        .post(format!("{}/status", base))
        .json(&serde_json::json!({ "status": "sleeping" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "status": "sleeping", "previous": "available" })
    );
    assert_eq!(store.get().await, "sleeping");
}

#[tokio::test]
async fn status_endpoint_requires_bearer_token_when_configured() {
    let mut config = test_config("busy");
    config.gateway.auth.mode = GatewayAuthMode::Token;
    config.gateway.auth.token = Some("s3cret".to_string());
    let mut state = state_with(config, ScriptedCompletion::replying("hi"));
    // Pin the token so a DEPUTY_GATEWAY_TOKEN in the environment does not change the test.
    state.required_token = Some("s3cret".to_string());
    let base = serve(state).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/status", base)).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

    let resp = client
        .get(format!("{}/status", base))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

    let resp = client
        .get(format!("{}/status", base))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    // Health stays open for probes.
    let resp = client.get(format!("{}/", base)).send().await.unwrap();
    assert!(resp.status().is_success());
}

#[tokio::test]
async fn health_does_not_reveal_status() {
    let mut config = test_config("at the hospital");
    config.gateway.auth.mode = GatewayAuthMode::Token;
    config.gateway.auth.token = Some("s3cret".to_string());
    let mut state = state_with(config, ScriptedCompletion::replying("hi"));
    state.required_token = Some("s3cret".to_string());
    state.status.set("at the hospital").await;
    let base = serve(state).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/", base))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body = resp.text().await.unwrap();
    assert!(body.contains("running"));
    assert!(!body.contains("at the hospital"));
}

#[tokio::test]
async fn inbound_endpoint_suppresses_when_available() {
    let completion = ScriptedCompletion::replying("should not be sent");
    let state = state_with(test_config("available"), completion.clone());
    let base = serve(state).await;

    let json: serde_json::Value = reqwest::Client::new()
        .post(format!("{}/inbound", base))
        .json(&serde_json::json!({
            "channel": "WhatsApp",
            "senderLabel": "Alex",
            "text": "hey, are you free tonight?"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json, serde_json::json!({ "reply": null }));
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn inbound_endpoint_generates_reply_when_busy() {
    let completion = ScriptedCompletion::replying("In a meeting, will call you after.");
    let state = state_with(test_config("busy"), completion.clone());
    let base = serve(state).await;

    let json: serde_json::Value = reqwest::Client::new()
        .post(format!("{}/inbound", base))
        .json(&serde_json::json!({
            "channel": "WhatsApp",
            "senderLabel": "Alex",
            "text": "can you call me?",
            "history": [
                { "isSelf": false, "text": "hi" },
                { "isSelf": true, "text": "hey" }
            ]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "reply": "In a meeting, will call you after." })
    );

    let requests = completion.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].user_content,
        "New message from Alex: \"can you call me?\""
    );
    assert!(requests[0].system_instruction.contains("Them: hi\nMe: hey"));
    assert!(requests[0].system_instruction.contains("busy"));
}

#[tokio::test]
async fn inbound_endpoint_reports_completion_failure() {
    let completion = ScriptedCompletion::failing();
    let state = state_with(test_config("busy"), completion.clone());
    let base = serve(state).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/inbound", base))
        .json(&serde_json::json!({
            "channel": "telegram",
            "senderLabel": "Sam",
            "text": "ping"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert!(json
        .get("error")
        .and_then(|v| v.as_str())
        .is_some_and(|e| e.contains("upstream exploded")));
    assert_eq!(completion.calls(), 1);
}

#[tokio::test]
async fn inbound_events_reply_and_keep_history() {
    let completion = ScriptedCompletion::replying("Busy right now, back later.");
    let state = state_with(test_config("busy"), completion.clone());
    let recorder = RecordingChannel::named("recorder");
    state.channel_registry.register(recorder.clone()).await;

    gateway::process_inbound_event(state.clone(), event("42", "Alex", "hello?")).await;
    gateway::process_inbound_event(state.clone(), event("42", "Alex", "still there?")).await;

    assert_eq!(
        *recorder.sent.lock().unwrap(),
        vec![
            ("42".to_string(), "Busy right now, back later.".to_string()),
            ("42".to_string(), "Busy right now, back later.".to_string()),
        ]
    );
    let requests = completion.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[1]
        .system_instruction
        .contains("Them: hello?\nMe: Busy right now, back later."));
    assert!(!requests[1].system_instruction.contains("still there?"));

    let window = state
        .conversations
        .window(&ChannelConvKey::new("recorder", "42"))
        .await;
    assert_eq!(
        window,
        vec![
            HistoryEntry::them("hello?"),
            HistoryEntry::me("Busy right now, back later."),
            HistoryEntry::them("still there?"),
            HistoryEntry::me("Busy right now, back later."),
        ]
    );
}

#[tokio::test]
async fn owner_commands_change_status_and_confirm() {
    let completion = ScriptedCompletion::replying("unused");
    let state = state_with(test_config("available"), completion.clone());
    let recorder = RecordingChannel::named("recorder");
    state.channel_registry.register(recorder.clone()).await;

    let mut cmd = event("7", "me", "/status busy");
    cmd.from_self = true;
    gateway::process_inbound_event(state.clone(), cmd).await;
    assert_eq!(state.status.get().await, "busy");

    let mut unknown = event("7", "me", "/dance");
    unknown.from_self = true;
    gateway::process_inbound_event(state.clone(), unknown).await;

    assert_eq!(
        *recorder.sent.lock().unwrap(),
        vec![("7".to_string(), "status set to: BUSY".to_string())]
    );
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn group_messages_are_skipped_by_default() {
    let completion = ScriptedCompletion::replying("unused");
    let state = state_with(test_config("busy"), completion.clone());
    let recorder = RecordingChannel::named("recorder");
    state.channel_registry.register(recorder.clone()).await;

    let mut group = event("-100", "Alex", "anyone around?");
    group.is_group = true;
    gateway::process_inbound_event(state.clone(), group).await;

    assert!(recorder.sent.lock().unwrap().is_empty());
    assert_eq!(completion.calls(), 0);
    assert!(state.conversations.is_empty().await);
}

#[tokio::test]
async fn failed_completion_sends_nothing() {
    let completion = ScriptedCompletion::failing();
    let state = state_with(test_config("busy"), completion.clone());
    let recorder = RecordingChannel::named("recorder");
    state.channel_registry.register(recorder.clone()).await;

    gateway::process_inbound_event(state.clone(), event("9", "Sam", "ping")).await;

    assert!(recorder.sent.lock().unwrap().is_empty());
    assert_eq!(
        state
            .conversations
            .window(&ChannelConvKey::new("recorder", "9"))
            .await,
        vec![HistoryEntry::them("ping")]
    );
}

#[tokio::test]
async fn business_reply_echo_is_not_recorded_twice() {
    let completion = ScriptedCompletion::replying("whats it about");
    let state = state_with(test_config("busy"), completion.clone());
    let recorder = RecordingChannel::named("telegram");
    state.channel_registry.register(recorder.clone()).await;
    let telegram = TelegramChannel::new(None, None);

    let contact: TelegramUpdate = serde_json::from_value(serde_json::json!({
        "update_id": 1,
        "business_message": {
            "business_connection_id": "bc1",
            "chat": { "id": 99, "type": "private" },
            "from": { "id": 99, "first_name": "Dana" },
            "text": "call me"
        }
    }))
    .unwrap();
    let ev = telegram.accept_update(contact).await.unwrap();
    gateway::process_inbound_event(state.clone(), ev).await;

    let echo: TelegramUpdate = serde_json::from_value(serde_json::json!({
        "update_id": 2,
        "business_message": {
            "business_connection_id": "bc1",
            "chat": { "id": 99, "type": "private" },
            "from": { "id": 1, "first_name": "Owner" },
            "sender_business_bot": { "id": 500, "first_name": "Deputy" },
            "text": "whats it about"
        }
    }))
    .unwrap();
    if let Some(ev) = telegram.accept_update(echo).await {
        gateway::process_inbound_event(state.clone(), ev).await;
    }

    assert_eq!(
        state
            .conversations
            .window(&ChannelConvKey::new("telegram", "99"))
            .await,
        vec![
            HistoryEntry::them("call me"),
            HistoryEntry::me("whats it about"),
        ]
    );
    assert_eq!(recorder.sent.lock().unwrap().len(), 1);
}
