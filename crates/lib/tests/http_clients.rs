//! Integration tests for the outbound HTTP clients against local stub servers
//! (Anthropic Messages API and the Telegram Bot API).

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use deputy::channels::TelegramChannel;
use deputy::llm::{AnthropicClient, CompletionRequest, CompletionService, ContentSegment, LlmError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

type Seen = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// Stub /v1/messages that records requests and answers with a fixed status and body.
async fn anthropic_stub(code: StatusCode, reply: Value) -> (String, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/v1/messages",
            post(
                move |State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| {
                    let reply = reply.clone();
                    async move {
                        seen.lock().unwrap().push((headers, body));
                        (code, Json(reply))
                    }
                },
            ),
        )
        .with_state(seen.clone());
    (serve(app).await, seen)
}

fn request() -> CompletionRequest {
    CompletionRequest {
        model: "claude-haiku-4-5-20251001".to_string(),
        max_output_tokens: 100,
        system_instruction: "I am occupied right now (status: busy).".to_string(),
        user_content: "New message from Alex: \"can you call me?\"".to_string(),
    }
}

#[tokio::test]
async fn anthropic_sends_messages_request_and_reads_segments() {
    let (base, seen) = anthropic_stub(
        StatusCode::OK,
        json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "In a meeting, will call after." }
            ],
            "stop_reason": "end_turn"
        }),
    )
    .await;
    let client = AnthropicClient::new(Some(base), Some("sk-test".to_string()));

    let res = client.complete(&request()).await.unwrap();
    assert_eq!(
        res.content,
        vec![
            ContentSegment::Other("thinking".to_string()),
            ContentSegment::Text("In a meeting, will call after.".to_string()),
        ]
    );
    assert_eq!(res.first_text(), Some("In a meeting, will call after."));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (headers, body) = &seen[0];
    assert_eq!(headers.get("x-api-key").unwrap(), "sk-test");
    assert_eq!(headers.get("anthropic-version").unwrap(), "2023-06-01");
    assert_eq!(
        *body,
        json!({
            "model": "claude-haiku-4-5-20251001",
            "max_tokens": 100,
            "system": "I am occupied right now (status: busy).",
            "messages": [
                { "role": "user", "content": "New message from Alex: \"can you call me?\"" }
            ]
        })
    );
}

#[tokio::test]
async fn anthropic_maps_error_statuses() {
    let (base, _) = anthropic_stub(StatusCode::UNAUTHORIZED, json!({ "type": "error" })).await;
    let client = AnthropicClient::new(Some(base), Some("bad".to_string()));
    assert!(matches!(client.complete(&request()).await, Err(LlmError::Auth)));

    let (base, _) = anthropic_stub(StatusCode::TOO_MANY_REQUESTS, json!({ "type": "error" })).await;
    let client = AnthropicClient::new(Some(base), Some("k".to_string()));
    assert!(matches!(
        client.complete(&request()).await,
        Err(LlmError::RateLimited)
    ));

    let (base, _) = anthropic_stub(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "type": "error", "error": { "message": "overloaded" } }),
    )
    .await;
    let client = AnthropicClient::new(Some(base), Some("k".to_string()));
    match client.complete(&request()).await {
        Err(LlmError::Api { status, body }) => {
            assert_eq!(status, 500);
            assert!(body.contains("overloaded"));
        }
        other => panic!("expected api error, got {:?}", other),
    }
}

#[tokio::test]
async fn telegram_send_uses_business_connection_for_business_chats() {
    let seen: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/:bot/:method",
            post(
                |State(seen): State<Arc<Mutex<Vec<(String, Value)>>>>,
                 Path((_bot, method)): Path<(String, String)>,
                 Json(body): Json<Value>| async move {
                    seen.lock().unwrap().push((method, body));
                    Json(json!({ "ok": true, "result": {} }))
                },
            ),
        )
        .with_state(seen.clone());
    let base = serve(app).await;
    let channel = TelegramChannel::new(Some("123:abc".to_string()), None).with_api_base(base);

    let update = serde_json::from_value(json!({
        "update_id": 10,
        "business_message": {
            "business_connection_id": "bc-7",
            "chat": { "id": 555, "type": "private" },
            "from": { "id": 555, "first_name": "Dana" },
            "text": "are you around?"
        }
    }))
    .unwrap();
    let event = channel.accept_update(update).await.unwrap();
    assert!(!event.from_self);

    channel.send_message("555", "Driving, back soon.").await.unwrap();
    channel.send_message("777", "plain bot chat").await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            (
                "sendMessage".to_string(),
                json!({
                    "chat_id": "555",
                    "text": "Driving, back soon.",
                    "business_connection_id": "bc-7"
                })
            ),
            (
                "sendMessage".to_string(),
                json!({ "chat_id": "777", "text": "plain bot chat" })
            ),
        ]
    );
}

#[tokio::test]
async fn telegram_api_failure_is_reported() {
    let app = Router::new().route(
        "/:bot/:method",
        post(|| async {
            Json(json!({ "ok": false, "description": "Forbidden: bot was blocked by the user" }))
        }),
    );
    let base = serve(app).await;
    let channel = TelegramChannel::new(Some("123:abc".to_string()), None).with_api_base(base);
    let err = channel.send_message("1", "hi").await.unwrap_err();
    assert!(err.to_string().contains("blocked"));
}
