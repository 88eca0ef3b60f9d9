use std::time::Duration;

use serde_json::json;

use crate::config::WeatherConfig;
use crate::transport::HttpTransport;

/// Query the third-party weather provider and normalize its response.
///
/// Every failure mode — missing credential, transport error, provider
/// outage, unrecognized body — is reported inside the returned value as
/// `{city, error}`; this function never fails the invocation itself.
pub async fn query(
    transport: &HttpTransport,
    config: &WeatherConfig,
    city: &str,
) -> serde_json::Value {
    if config.app_code.trim().is_empty() {
        return json!({ "city": city, "error": "天气服务未配置" });
    }

    let Ok(mut url) = url::Url::parse(&config.endpoint) else {
        return json!({ "city": city, "error": "天气服务地址无效" });
    };
    url.query_pairs_mut().append_pair("area", city);

    let body = match transport
        .get_json_with_appcode(
            url.as_str(),
            &config.app_code,
            Duration::from_secs(config.timeout_secs),
        )
        .await
    {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(city, error = %err, "weather provider call failed");
            return json!({ "city": city, "error": err.to_string() });
        }
    };

    normalize(city, &body)
}

/// Map the provider's body onto the fixed
/// `{city, temperature, description, humidity, wind, updateTime}` shape.
fn normalize(city: &str, body: &serde_json::Value) -> serde_json::Value {
    let now = body.pointer("/showapi_res_body/now").unwrap_or(body);

    let temperature = str_field(now, &["temperature", "temp"]);
    let description = str_field(now, &["weather", "weather_desc", "desc"]);
    let humidity = str_field(now, &["sd", "humidity"]);
    let wind = str_field(now, &["wind"]).or_else(|| {
        match (
            str_field(now, &["wind_direction", "winddirection"]),
            str_field(now, &["wind_power", "windpower"]),
        ) {
            (Some(direction), Some(power)) => Some(format!("{direction}{power}")),
            (Some(direction), None) => Some(direction),
            (None, Some(power)) => Some(power),
            (None, None) => None,
        }
    });
    let update_time = str_field(now, &["time", "updatetime", "reporttime"]).or_else(|| {
        body.pointer("/showapi_res_body/time")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    });

    if temperature.is_none() && description.is_none() {
        return json!({ "city": city, "error": "天气数据格式异常" });
    }

    json!({
        "city": city,
        "temperature": temperature.unwrap_or_else(|| "未知".to_string()),
        "description": description.unwrap_or_else(|| "未知".to_string()),
        "humidity": humidity.unwrap_or_else(|| "未知".to_string()),
        "wind": wind.unwrap_or_else(|| "未知".to_string()),
        "updateTime": update_time.unwrap_or_else(|| "未知".to_string()),
    })
}

fn str_field(value: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match value.get(key) {
            Some(serde_json::Value::String(text)) if !text.is_empty() => {
                return Some(text.clone());
            }
            Some(serde_json::Value::Number(number)) => return Some(number.to_string()),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_provider_shape() {
        let body = json!({
            "showapi_res_body": {
                "time": "20250807120000",
                "now": {
                    "temperature": "25",
                    "weather": "晴",
                    "sd": "40%",
                    "wind_direction": "东南风",
                    "wind_power": "3级"
                }
            }
        });
        let value = normalize("上海", &body);
        assert_eq!(value["city"], "上海");
        assert_eq!(value["temperature"], "25");
        assert_eq!(value["description"], "晴");
        assert_eq!(value["humidity"], "40%");
        assert_eq!(value["wind"], "东南风3级");
        assert_eq!(value["updateTime"], "20250807120000");
    }

    #[test]
    fn test_normalize_flat_shape() {
        let body = json!({
            "temperature": 25,
            "weather": "多云",
            "humidity": "55%",
            "wind": "北风2级",
            "updatetime": "2025-08-07 12:00"
        });
        let value = normalize("北京", &body);
        assert_eq!(value["temperature"], "25");
        assert_eq!(value["description"], "多云");
        assert_eq!(value["wind"], "北风2级");
        assert_eq!(value["updateTime"], "2025-08-07 12:00");
    }

    #[test]
    fn test_normalize_unrecognized_body() {
        let value = normalize("广州", &json!({ "unexpected": true }));
        assert_eq!(value["city"], "广州");
        assert_eq!(value["error"], "天气数据格式异常");
    }

    #[tokio::test]
    async fn test_missing_credential_yields_error_value() {
        let transport = HttpTransport::new(&crate::config::ServerConfig::default());
        let config = WeatherConfig::default();
        let value = query(&transport, &config, "深圳").await;
        assert_eq!(value["city"], "深圳");
        assert_eq!(value["error"], "天气服务未配置");
    }
}
