pub mod calculator;
pub mod search;
pub mod weather;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::config::WeatherConfig;
use crate::transport::HttpTransport;

/// Outcome of one tool invocation.
///
/// `Ok` carries the tool's JSON output value — which may itself describe a
/// tool-level condition such as `{"error": ...}` — and becomes a
/// `tool_call_result` event. `Err` carries an executor-level failure message
/// (unknown tool, invalid arguments) and becomes a `tool_call_error` event.
/// Neither terminates the stream.
pub type ToolOutcome = Result<serde_json::Value, String>;

pub const UNKNOWN_TOOL_ERROR: &str = "未知工具";

#[derive(Debug, Deserialize)]
struct CalculatorArgs {
    code: String,
}

#[derive(Debug, Deserialize)]
struct WeatherArgs {
    city: String,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

/// Fixed mapping from tool name to a typed, executable implementation.
///
/// Each tool declares its argument struct and parses the incoming JSON
/// object through serde; dispatch is a name lookup plus a typed call, with
/// no positional argument guessing.
pub struct ToolRegistry {
    transport: Arc<HttpTransport>,
    weather: WeatherConfig,
}

impl ToolRegistry {
    #[must_use]
    pub fn new(transport: Arc<HttpTransport>, weather: WeatherConfig) -> Self {
        Self { transport, weather }
    }

    /// Tool schemas advertised to the upstream provider.
    #[must_use]
    pub fn specs() -> serde_json::Value {
        json!([
            {
                "type": "function",
                "function": {
                    "name": "calculator",
                    "description": "一个可以计算四则运算表达式的计算器",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "code": { "type": "string", "description": "要计算的数学表达式" }
                        },
                        "required": ["code"]
                    }
                }
            },
            {
                "type": "function",
                "function": {
                    "name": "weather_query",
                    "description": "查询指定城市的实时天气信息",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "city": { "type": "string", "description": "城市名称" }
                        },
                        "required": ["city"]
                    }
                }
            },
            {
                "type": "function",
                "function": {
                    "name": "web_search",
                    "description": "查询实时信息、新闻、股票等",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "query": { "type": "string", "description": "搜索关键词" }
                        },
                        "required": ["query"]
                    }
                }
            }
        ])
    }

    /// Execute one invocation against the registry.
    ///
    /// # Errors
    ///
    /// Returns an executor-level message for unknown tool names or arguments
    /// that do not match the tool's declared shape. Tool-internal failures
    /// (bad expression, provider outage, missing credential) are reported
    /// inside the `Ok` value instead.
    pub async fn execute(&self, name: &str, arguments: &serde_json::Value) -> ToolOutcome {
        match name {
            "calculator" => {
                let args: CalculatorArgs = parse_args(arguments)?;
                Ok(calculator::run(&args.code))
            }
            "weather_query" => {
                let args: WeatherArgs = parse_args(arguments)?;
                Ok(weather::query(&self.transport, &self.weather, &args.city).await)
            }
            "web_search" => {
                let args: SearchArgs = parse_args(arguments)?;
                Ok(search::lookup(&args.query))
            }
            _ => Err(UNKNOWN_TOOL_ERROR.to_string()),
        }
    }
}

fn parse_args<T: DeserializeOwned>(arguments: &serde_json::Value) -> Result<T, String> {
    serde_json::from_value(arguments.clone()).map_err(|err| format!("工具参数无效: {err}"))
}
