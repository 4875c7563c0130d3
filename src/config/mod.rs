//! # Configuration
//!
//! Agent configuration loaded from environment variables.
//!
//! - `controller`: reconciliation, requeue and logging settings
//! - `ServerConfig`: metrics/probe server settings
//!
//! Both are read once at startup and handed out behind `Arc<RwLock<_>>`.
//! Components copy the values they need when they are built, so later
//! writes to the shared config do not reach running workers.

mod controller;

pub use controller::ControllerConfig;

use crate::constants::DEFAULT_METRICS_PORT;
use std::sync::Arc;
use tokio::sync::RwLock;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            metrics_port: controller::env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
        }
    }
}

pub type SharedControllerConfig = Arc<RwLock<ControllerConfig>>;
pub type SharedServerConfig = Arc<RwLock<ServerConfig>>;

/// Load both configurations from the environment and wrap them for sharing
pub fn create_shared_config() -> (SharedControllerConfig, SharedServerConfig) {
    (
        Arc::new(RwLock::new(ControllerConfig::from_env())),
        Arc::new(RwLock::new(ServerConfig::from_env())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ratelimiter::BackoffRateLimiter;
    use std::time::Duration;

    #[tokio::test]
    async fn test_components_keep_their_startup_values() {
        let (shared, _) = create_shared_config();
        let limiter = BackoffRateLimiter::from_config(&*shared.read().await);

        {
            let mut config = shared.write().await;
            config.max_fast_attempts = 0;
            config.fast_delay_secs = 60;
        }

        assert_eq!(shared.read().await.fast_delay(), Duration::from_secs(60));
        assert_eq!(limiter.delay_for_attempt(1), Duration::from_secs(5));
    }
}
