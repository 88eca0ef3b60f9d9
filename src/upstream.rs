use serde::Serialize;

use crate::config::UpstreamConfig;
use crate::error::RelayError;
use crate::session::{Role, Turn};
use crate::tools::ToolRegistry;
use crate::transport::HttpTransport;

/// One wire message in the chat-completions request body.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// The chat-completions request body. Always streamed and always carrying
/// the built-in tool schemas.
#[derive(Debug, Serialize)]
pub struct OutboundRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<OutboundMessage<'a>>,
    pub stream: bool,
    pub tools: serde_json::Value,
}

#[must_use]
pub fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Build the body actually sent upstream: the fixed system prompt plus the
/// single most-recent user turn. Prior turns never travel upstream; they are
/// retained in the session store for size accounting only.
#[must_use]
pub fn build_request<'a>(config: &'a UpstreamConfig, query: &'a str) -> OutboundRequest<'a> {
    OutboundRequest {
        model: &config.model,
        messages: vec![
            OutboundMessage {
                role: "system",
                content: &config.system_prompt,
            },
            OutboundMessage {
                role: "user",
                content: query,
            },
        ],
        stream: true,
        tools: ToolRegistry::specs(),
    }
}

/// Serialized size of the session's full history rendered as an outbound
/// payload. This is the number the request-size budget is checked against;
/// tripping the budget discards the whole history, never truncates it.
#[must_use]
pub fn accounted_payload_size(config: &UpstreamConfig, history: &[Turn]) -> usize {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(OutboundMessage {
        role: "system",
        content: &config.system_prompt,
    });
    for turn in history {
        messages.push(OutboundMessage {
            role: role_str(turn.role),
            content: &turn.content,
        });
    }
    let request = OutboundRequest {
        model: &config.model,
        messages,
        stream: true,
        tools: ToolRegistry::specs(),
    };
    serde_json::to_vec(&request).map_or(0, |body| body.len())
}

#[must_use]
pub fn completions_url(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

/// Open the chunked upstream stream.
///
/// # Errors
///
/// Returns [`RelayError::Transport`] when the connection fails and
/// [`RelayError::Upstream`] for a non-2xx status; both happen before the
/// client-facing stream is opened and surface as plain JSON error responses.
pub async fn open_stream(
    transport: &HttpTransport,
    config: &UpstreamConfig,
    request: &OutboundRequest<'_>,
) -> Result<reqwest::Response, RelayError> {
    let body = serde_json::to_vec(request)
        .map_err(|err| RelayError::Internal(format!("Failed to serialize request: {err}")))?;
    let response = transport
        .post_stream(
            &completions_url(&config.base_url),
            &config.api_key,
            bytes::Bytes::from(body),
        )
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::Upstream {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("Unknown").to_string(),
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_join() {
        assert_eq!(
            completions_url("https://api.deepseek.com"),
            "https://api.deepseek.com/v1/chat/completions"
        );
        assert_eq!(
            completions_url("https://api.deepseek.com/"),
            "https://api.deepseek.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_build_request_carries_system_and_current_turn_only() {
        let config = UpstreamConfig {
            api_key: "sk-test".to_string(),
            ..UpstreamConfig::default()
        };
        let request = build_request(&config, "2+2是多少");
        assert_eq!(request.model, "deepseek-chat");
        assert!(request.stream);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].role, "user");
        assert_eq!(request.messages[1].content, "2+2是多少");
        assert_eq!(request.tools.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_accounted_size_grows_with_history() {
        let config = UpstreamConfig::default();
        let short = vec![Turn::new(Role::User, "hi")];
        let long = vec![
            Turn::new(Role::User, "hi"),
            Turn::new(Role::Assistant, "hello there"),
            Turn::new(Role::Tool, "{\"result\":4}"),
        ];
        let short_size = accounted_payload_size(&config, &short);
        let long_size = accounted_payload_size(&config, &long);
        assert!(short_size > 0);
        assert!(long_size > short_size);
    }

    #[test]
    fn test_accounted_size_reflects_all_roles() {
        let config = UpstreamConfig::default();
        let history = vec![Turn::new(Role::Tool, "x".repeat(1024))];
        let size = accounted_payload_size(&config, &history);
        assert!(size > 1024);
    }
}
