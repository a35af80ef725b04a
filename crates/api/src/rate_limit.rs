//! Rate Limiting Middleware using GCRA Algorithm
//!
//! Limits the event webhook per peer IP with tower_governor. Requires the
//! server to run with `into_make_service_with_connect_info::<SocketAddr>()`.

use governor::middleware::StateInformationMiddleware;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::governor::{GovernorConfig, GovernorConfigBuilder};
use tower_governor::key_extractor::PeerIpKeyExtractor;

/// Governor config keyed by peer IP, with X-RateLimit-* headers
pub type WebhookGovernorConfig = GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Seconds to replenish one request
    pub per_second: u64,
    /// Requests that can be made immediately
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_second: 1,
            burst_size: 50,
        }
    }
}

/// Build the governor config; `None` when disabled or when a quota is zero
pub fn create_governor_config(config: &RateLimitConfig) -> Option<Arc<WebhookGovernorConfig>> {
    if !config.enabled {
        return None;
    }
    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
}
