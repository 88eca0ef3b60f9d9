use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::session::SessionStore;
use crate::tools::ToolRegistry;
use crate::transport::HttpTransport;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: Arc<HttpTransport>,
    pub sessions: SessionStore,
    pub tools: ToolRegistry,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(&config.server));
        let tools = ToolRegistry::new(Arc::clone(&transport), config.weather.clone());
        let sessions = SessionStore::new(config.session.max_turns);
        Self {
            config,
            transport,
            sessions,
            tools,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Correlation id for one inbound request, used only in logs.
    #[must_use]
    pub fn next_request_id(&self) -> uuid::Uuid {
        self.request_ids.next_uuid()
    }
}

struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    fn next_uuid(&self) -> uuid::Uuid {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        uuid::Uuid::from_u128(self.seed ^ u128::from(seq))
    }
}
