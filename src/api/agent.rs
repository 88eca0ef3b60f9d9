use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::error::into_axum_response;
use crate::relay::{run_pump, OUTGOING_CHANNEL_CAPACITY};
use crate::session::{Role, Turn};
use crate::state::AppState;
use crate::upstream;

#[derive(Debug, Deserialize)]
struct StreamRequest {
    #[serde(default)]
    query: Option<String>,
    #[serde(default, rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClearHistoryRequest {
    #[serde(default, rename = "sessionId")]
    session_id: Option<String>,
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

/// `POST /api/agent/stream` — the relay endpoint.
///
/// Every failure before the stream opens (bad body, missing session id,
/// oversized history, upstream refusal) is a plain JSON error response; once
/// the SSE stream is committed, failures degrade to events on it instead.
pub async fn stream_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: StreamRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return bad_request("无效的请求体"),
    };
    let Some(session_id) = request.session_id.filter(|id| !id.is_empty()) else {
        return bad_request("缺少sessionId");
    };
    let Some(query) = request.query.filter(|query| !query.is_empty()) else {
        return bad_request("缺少query");
    };

    let request_id = state.next_request_id();
    tracing::info!(%request_id, %session_id, "relay request accepted");

    state
        .sessions
        .append(&session_id, Turn::new(Role::User, query.clone()));

    // Size budget is checked against the full history rendered as an
    // outbound payload; tripping it discards the history outright.
    let history = state.sessions.snapshot(&session_id);
    let accounted = upstream::accounted_payload_size(&state.config.upstream, &history);
    if accounted > state.config.upstream.request_budget_bytes {
        state.sessions.clear(&session_id);
        tracing::warn!(%request_id, %session_id, accounted, "history over budget, cleared");
        return bad_request("请求体超出大小限制，历史已清除");
    }

    let outbound = upstream::build_request(&state.config.upstream, &query);
    let response = match upstream::open_stream(&state.transport, &state.config.upstream, &outbound)
        .await
    {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(%request_id, %session_id, error = %err, "upstream refused before streaming");
            return into_axum_response(&err);
        }
    };

    let idle_timeout = Duration::from_secs(state.config.upstream.idle_read_timeout_secs);
    let (tx, rx) = mpsc::channel::<Bytes>(OUTGOING_CHANNEL_CAPACITY);

    // The HTTP response is committed now; the pump keeps writing after this
    // handler returns, until the upstream ends or the client goes away.
    let pump_state = Arc::clone(&state);
    tokio::spawn(async move {
        let byte_stream = response.bytes_stream();
        let answer = run_pump(byte_stream, &pump_state, &session_id, tx, idle_timeout).await;
        tracing::debug!(%request_id, %session_id, answer_len = answer.len(), "pump finished");
    });

    sse_response(rx)
}

/// `POST /api/agent/clear-history` — drop a session's in-memory turns.
pub async fn clear_history_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: ClearHistoryRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return bad_request("无效的请求体"),
    };
    if let Some(session_id) = request.session_id {
        state.sessions.clear(&session_id);
    }
    (StatusCode::OK, Json(json!({ "message": "历史已清除" }))).into_response()
}

fn sse_response(rx: mpsc::Receiver<Bytes>) -> Response {
    let body_stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|bytes| (Ok::<_, Infallible>(bytes), rx))
    });

    let mut response = Response::new(Body::from_stream(body_stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn test_state() -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.upstream.api_key = "sk-test".to_string();
        Arc::new(AppState::new(config))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_session_id_is_rejected() {
        let response = stream_handler(
            State(test_state()),
            Bytes::from_static(r#"{"query":"你好"}"#.as_bytes()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "缺少sessionId");
    }

    #[tokio::test]
    async fn test_missing_query_is_rejected() {
        let response = stream_handler(
            State(test_state()),
            Bytes::from_static(br#"{"sessionId":"s1"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "缺少query");
    }

    #[tokio::test]
    async fn test_invalid_body_is_rejected() {
        let response =
            stream_handler(State(test_state()), Bytes::from_static(b"not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_over_budget_clears_history_and_rejects() {
        let state = test_state();
        let big = "长".repeat(40 * 1024);
        let body = serde_json::to_vec(&json!({ "query": big, "sessionId": "s-big" })).unwrap();
        let response = stream_handler(State(Arc::clone(&state)), Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "请求体超出大小限制，历史已清除");
        assert_eq!(state.sessions.turn_count("s-big"), 0);
    }

    #[tokio::test]
    async fn test_clear_history_drops_turns() {
        let state = test_state();
        state
            .sessions
            .append("s1", Turn::new(Role::User, "hello"));
        let response = clear_history_handler(
            State(Arc::clone(&state)),
            Bytes::from_static(br#"{"sessionId":"s1"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "历史已清除");
        assert_eq!(state.sessions.turn_count("s1"), 0);
    }

    #[tokio::test]
    async fn test_clear_history_without_session_id_is_a_noop() {
        let response =
            clear_history_handler(State(test_state()), Bytes::from_static(b"{}")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
