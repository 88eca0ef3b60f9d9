use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::RelayError;

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
) -> Result<reqwest::Client, RelayError> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .timeout(timeout)
        .build()
        .map_err(|err| RelayError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// HTTP transport client for the upstream provider and tool side calls.
///
/// The underlying `reqwest::Client` is built lazily and shared; the overall
/// request timeout bounds non-streamed calls, while streamed reads rely on
/// the relay's own idle-read timeout.
pub struct HttpTransport {
    client: OnceLock<Arc<reqwest::Client>>,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };
        Self {
            client: OnceLock::new(),
            pool_max_idle_per_host: config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            timeout: Duration::from_secs(config.timeout),
        }
    }

    fn client(&self) -> Arc<reqwest::Client> {
        if let Some(existing) = self.client.get() {
            return existing.clone();
        }

        let built = match build_reqwest_client(
            self.pool_max_idle_per_host,
            self.pool_idle_timeout,
            self.timeout,
        ) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                Arc::new(reqwest::Client::new())
            }
        };
        let _ = self.client.set(built.clone());
        self.client.get().cloned().unwrap_or(built)
    }

    /// POST a JSON body and return the raw streaming response.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when the connection cannot be
    /// established. Non-2xx statuses are returned to the caller unchanged.
    pub async fn post_stream(
        &self,
        url: &str,
        bearer_token: &str,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, RelayError> {
        self.client()
            .post(url)
            .header(http::header::AUTHORIZATION, format!("Bearer {bearer_token}"))
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::ACCEPT, "text/event-stream")
            .body(body)
            .send()
            .await
            .map_err(|err| RelayError::Transport(format!("Upstream request failed: {err}")))
    }

    /// GET a JSON document with an Alibaba-market AppCode credential.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] on connection failure and on a
    /// non-2xx status.
    pub async fn get_json_with_appcode(
        &self,
        url: &str,
        app_code: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, RelayError> {
        let response = self
            .client()
            .get(url)
            .header(http::header::AUTHORIZATION, format!("APPCODE {app_code}"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| RelayError::Transport(format!("Weather request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Transport(format!(
                "Weather provider returned status {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| RelayError::Transport(format!("Failed to read weather body: {err}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| RelayError::Transport(format!("Weather body is not JSON: {err}")))
    }
}
