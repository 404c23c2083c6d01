//! Network reachability probe.

use std::time::Duration;

use async_trait::async_trait;

/// How long the health check may take before the device counts as offline.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Reports current network reachability.
///
/// The probe answers the question "is it worth attempting a call right now";
/// it makes no promise the next request will succeed.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_connected(&self) -> bool;
}

/// Probe that hits the platform API health endpoint.
pub struct HttpProbe {
    client: reqwest::Client,
    health_url: String,
}

impl HttpProbe {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            health_url: format!("{api_url}/health"),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_connected(&self) -> bool {
        self.client
            .get(&self.health_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }
}

/// Scripted probes for tests and development.
pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Probe whose answer is set by the test.
    #[derive(Debug, Default)]
    pub struct StaticProbe {
        connected: AtomicBool,
    }

    impl StaticProbe {
        pub fn online() -> Self {
            Self {
                connected: AtomicBool::new(true),
            }
        }

        pub fn offline() -> Self {
            Self {
                connected: AtomicBool::new(false),
            }
        }

        pub fn set_connected(&self, connected: bool) {
            self.connected.store(connected, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ConnectivityProbe for StaticProbe {
        async fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }
}
