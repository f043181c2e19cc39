//! Remote provider behavior against a local HTTP double.

use futures::StreamExt;
use serde_json::json;
use snowcell_core::{
    AcceptAny, Account, ChatMessage, Dispatcher, FailurePolicy, GenerationParams, ProviderKind,
    RemoteSettings, Settings, SncError,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

fn remote_settings(server: &MockServer, dir: &TempDir, policy: FailurePolicy) -> Settings {
    Settings {
        provider: ProviderKind::Remote,
        failure_policy: policy,
        remote: RemoteSettings {
            base_url: Some(Url::parse(&server.uri()).expect("server url")),
            timeout: Duration::from_secs(5),
            native_streaming: false,
        },
        ..Settings::default()
    }
    .with_state_dir(dir.path())
}

fn ready_dispatcher(settings: &Settings) -> Dispatcher {
    let dispatcher = Dispatcher::from_settings(settings).expect("dispatcher");
    Account::new(Arc::new(AcceptAny), dispatcher.selections().clone())
        .login("developer", "dev-token")
        .expect("login");
    dispatcher.selections().select("qwen").expect("select");
    dispatcher
}

fn hello() -> Vec<ChatMessage> {
    vec![ChatMessage::user("hello there")]
}

#[tokio::test]
async fn upstream_success_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_partial_json(json!({
            "model": "Qwen/Qwen1.5-0.5B-Chat",
            "temperature": 0.7,
            "max_tokens": 1000,
            "stream": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-upstream-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "Qwen/Qwen1.5-0.5B-Chat",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hi! How can I help?"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 2, "completion_tokens": 5}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let dispatcher = ready_dispatcher(&remote_settings(&server, &dir, FailurePolicy::Fallback));
    let result = dispatcher
        .dispatch("qwen", hello(), GenerationParams::default(), false)
        .await
        .expect("dispatch")
        .into_result()
        .expect("complete result");

    assert_eq!(result.id, "chatcmpl-upstream-1");
    assert_eq!(result.created, 1_700_000_000);
    assert_eq!(result.content(), "Hi! How can I help?");
    assert_eq!(result.usage.total_tokens, 7);
}

#[tokio::test]
async fn server_error_falls_back_to_valid_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let dispatcher = ready_dispatcher(&remote_settings(&server, &dir, FailurePolicy::Fallback));
    let result = dispatcher
        .dispatch("qwen", hello(), GenerationParams::default(), false)
        .await
        .expect("fallback result")
        .into_result()
        .expect("complete result");

    assert_eq!(result.finish_reason(), Some("stop"));
    assert!(result.content().contains("status 500"));
    assert!(result.usage.completion_tokens > 0);
    assert!(result.usage.total_tokens > 0);
}

#[tokio::test]
async fn server_error_is_returned_in_strict_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let dispatcher = ready_dispatcher(&remote_settings(&server, &dir, FailurePolicy::Strict));
    let err = dispatcher
        .dispatch("qwen", hello(), GenerationParams::default(), false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SncError::TransportFailure {
            status: Some(503),
            ..
        }
    ));
}

#[tokio::test]
async fn fallback_streams_when_stream_requested() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let dispatcher = ready_dispatcher(&remote_settings(&server, &dir, FailurePolicy::Fallback));
    let chunks: Vec<_> = dispatcher
        .dispatch("qwen", hello(), GenerationParams::default(), true)
        .await
        .expect("dispatch")
        .into_stream()
        .expect("stream")
        .map(|chunk| chunk.expect("chunk"))
        .collect()
        .await;

    let last = chunks.last().expect("terminal chunk");
    assert_eq!(last.finish_reason.as_deref(), Some("stop"));
    let text: String = chunks.iter().map(|chunk| chunk.delta.as_str()).collect();
    assert!(text.starts_with("Hello! This is a fallback response"));
}

#[tokio::test]
async fn native_stream_fills_missing_fields() {
    let body = concat!(
        "data: {\"id\":\"chatcmpl-up\",\"created\":1700000001,\"model\":\"Qwen/Qwen1.5-0.5B-Chat\",",
        "\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let mut settings = remote_settings(&server, &dir, FailurePolicy::Strict);
    settings.remote.native_streaming = true;
    let dispatcher = ready_dispatcher(&settings);

    let chunks: Vec<_> = dispatcher
        .dispatch("qwen", hello(), GenerationParams::default(), true)
        .await
        .expect("dispatch")
        .into_stream()
        .expect("stream")
        .map(|chunk| chunk.expect("chunk"))
        .collect()
        .await;

    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        assert_eq!(chunk.id, "chatcmpl-up");
        assert_eq!(chunk.created, 1_700_000_001);
        assert_eq!(chunk.model, "Qwen/Qwen1.5-0.5B-Chat");
    }
    assert_eq!(chunks[0].delta, "Hel");
    assert_eq!(chunks[1].delta, "lo");
    assert_eq!(chunks[2].finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let dir = TempDir::new().expect("temp dir");
    let mut settings = Settings::default().with_state_dir(dir.path());
    settings.failure_policy = FailurePolicy::Strict;
    settings.remote.base_url = Some(Url::parse(&format!("http://{addr}")).expect("url"));

    let dispatcher = ready_dispatcher(&settings);
    let err = dispatcher
        .dispatch("qwen", hello(), GenerationParams::default(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, SncError::TransportFailure { status: None, .. }));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn probe_uses_short_greeting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_partial_json(json!({"max_tokens": 100, "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let settings = remote_settings(&server, &dir, FailurePolicy::Strict);
    let dispatcher = Dispatcher::from_settings(&settings).expect("dispatcher");
    let result = dispatcher.probe(Some("mistral")).await.expect("probe");

    assert_eq!(result.content(), "Hello!");
    assert_eq!(result.model, "mistralai/Mistral-7B-Instruct");
}

async fn serve_once(body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn huge_usage_figures_do_not_overflow() {
    let server = serve_once(json!({
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "counted"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 4_294_967_295_u64, "completion_tokens": 5}
    }))
    .await;

    let dir = TempDir::new().expect("temp dir");
    let dispatcher = ready_dispatcher(&remote_settings(&server, &dir, FailurePolicy::Strict));
    let result = dispatcher
        .dispatch("qwen", hello(), GenerationParams::default(), false)
        .await
        .expect("dispatch")
        .into_result()
        .expect("complete result");

    assert_eq!(result.content(), "counted");
    assert_eq!(result.usage.total_tokens, 4_294_967_300);
}

#[tokio::test]
async fn unfamiliar_reply_role_keeps_the_answer() {
    let server = serve_once(json!({
        "choices": [{
            "index": 0,
            "message": {"role": "model", "content": "real answer"},
            "finish_reason": "stop"
        }]
    }))
    .await;

    let dir = TempDir::new().expect("temp dir");
    let dispatcher = ready_dispatcher(&remote_settings(&server, &dir, FailurePolicy::Strict));
    let result = dispatcher
        .dispatch("qwen", hello(), GenerationParams::default(), false)
        .await
        .expect("dispatch")
        .into_result()
        .expect("complete result");

    assert_eq!(result.content(), "real answer");
    assert_eq!(result.choices[0].message.role, "model");
}

#[tokio::test]
async fn slow_upstream_hits_the_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": []}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let mut settings = remote_settings(&server, &dir, FailurePolicy::Strict);
    settings.remote.timeout = Duration::from_secs(1);
    let dispatcher = ready_dispatcher(&settings);

    let started = std::time::Instant::now();
    let err = dispatcher
        .dispatch("qwen", hello(), GenerationParams::default(), false)
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(matches!(err, SncError::TransportFailure { status: None, .. }));
}
