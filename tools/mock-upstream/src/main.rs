use std::convert::Infallible;
use std::env;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_001;

#[derive(Copy, Clone)]
enum MockScenario {
    Text,
    Tool,
    MultiTool,
    Error,
}

struct MockState {
    scenario: MockScenario,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let scenario = parse_scenario();
    let state = Arc::new(MockState { scenario });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));

    let conn_builder = AutoBuilder::new(TokioExecutor::new());

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("tool") => MockScenario::Tool,
        Ok("multi-tool") => MockScenario::MultiTool,
        Ok("error") => MockScenario::Error,
        Ok("text") | Err(_) => MockScenario::Text,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to text");
            MockScenario::Text
        }
    }
}

async fn handle_request(
    request: Request<Incoming>,
    state: &Arc<MockState>,
) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    drain_request_body(body).await;

    if parts.method != Method::POST || parts.uri.path() != "/v1/chat/completions" {
        return simple_response(
            StatusCode::NOT_FOUND,
            "application/json",
            br#"{"error":"not_found"}"#,
        );
    }

    if matches!(state.scenario, MockScenario::Error) {
        return simple_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "application/json",
            br#"{"error":"mock_injected_error"}"#,
        );
    }

    let body: &'static [u8] = match state.scenario {
        MockScenario::Text => STREAM_TEXT,
        MockScenario::Tool => STREAM_TOOL,
        MockScenario::MultiTool => STREAM_MULTI_TOOL,
        MockScenario::Error => unreachable!(),
    };
    let mut response = simple_response(StatusCode::OK, "text/event-stream", body);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

fn simple_response(
    status: StatusCode,
    content_type: &'static str,
    body: &'static [u8],
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

const STREAM_TEXT: &[u8] = b"data: {\"id\":\"mock-1\",\"object\":\"chat.completion.chunk\",\"model\":\"deepseek-chat\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\\u4f60\\u597d\"},\"finish_reason\":null}]}\n\ndata: {\"id\":\"mock-1\",\"object\":\"chat.completion.chunk\",\"model\":\"deepseek-chat\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"\\uff01\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n";

// calculator("2+2") fragmented across four chunks, then the answer text
const STREAM_TOOL: &[u8] = b"data: {\"id\":\"mock-2\",\"object\":\"chat.completion.chunk\",\"model\":\"deepseek-chat\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"calculator\",\"arguments\":\"\"}}]},\"finish_reason\":null}]}\n\ndata: {\"id\":\"mock-2\",\"object\":\"chat.completion.chunk\",\"model\":\"deepseek-chat\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"co\"}}]},\"finish_reason\":null}]}\n\ndata: {\"id\":\"mock-2\",\"object\":\"chat.completion.chunk\",\"model\":\"deepseek-chat\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"de\\\":\\\"2+2\\\"}\"}}]},\"finish_reason\":null}]}\n\ndata: {\"id\":\"mock-2\",\"object\":\"chat.completion.chunk\",\"model\":\"deepseek-chat\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\ndata: {\"id\":\"mock-2\",\"object\":\"chat.completion.chunk\",\"model\":\"deepseek-chat\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"\\u7ed3\\u679c\\u662f4\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n";

// two concurrent calls multiplexed by index
const STREAM_MULTI_TOOL: &[u8] = b"data: {\"id\":\"mock-3\",\"object\":\"chat.completion.chunk\",\"model\":\"deepseek-chat\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"calculator\",\"arguments\":\"{\\\"code\\\":\\\"6*7\\\"}\"}},{\"index\":1,\"id\":\"call_2\",\"type\":\"function\",\"function\":{\"name\":\"weather_query\",\"arguments\":\"\"}}]},\"finish_reason\":null}]}\n\ndata: {\"id\":\"mock-3\",\"object\":\"chat.completion.chunk\",\"model\":\"deepseek-chat\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":1,\"function\":{\"arguments\":\"{\\\"city\\\":\\\"\\u5317\\u4eac\\\"}\"}}]},\"finish_reason\":null}]}\n\ndata: {\"id\":\"mock-3\",\"object\":\"chat.completion.chunk\",\"model\":\"deepseek-chat\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\ndata: [DONE]\n\n";
