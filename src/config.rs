//! Client-side configuration (`spec.md §5`, SPEC_FULL.md ambient-stack
//! section). Scoped to what the library itself needs — no CLI, no env/file
//! layering; that belongs to the embedding application, per the teacher's
//! own split between `config.rs` (server config) and library-level crates.

use std::time::Duration;

/// Tunables for a single client instance. All fields have defaults matching
/// `spec.md §5`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-call deadline for `send_request` (`spec.md §4.1`). Default 60s.
    pub request_timeout: Duration,
    /// Hard wall-clock timeout for `Transaction::wait` (`spec.md §4.6`). Default 120s.
    pub wait_timeout: Duration,
    /// Poll interval for `wait_for_transaction`/receipt polling (`spec.md §4.7`). Default 3s.
    pub poll_interval: Duration,
    /// Gas overhead multiplier applied to `eth_estimateGas` results when no
    /// explicit `gas` is set (`spec.md §4.6`, §9 Open Question #1:
    /// `gas * multiplier`, no added constant).
    pub gas_overhead_multiplier: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            wait_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(3),
            gas_overhead_multiplier: 2.0,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    inner: Option<ClientConfig>,
}

impl ClientConfigBuilder {
    fn base(&mut self) -> &mut ClientConfig {
        self.inner.get_or_insert_with(ClientConfig::default)
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.base().request_timeout = timeout;
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.base().wait_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.base().poll_interval = interval;
        self
    }

    pub fn gas_overhead_multiplier(mut self, multiplier: f64) -> Self {
        self.base().gas_overhead_multiplier = multiplier;
        self
    }

    pub fn build(mut self) -> ClientConfig {
        self.inner.take().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.request_timeout, Duration::from_secs(60));
        assert_eq!(cfg.wait_timeout, Duration::from_secs(120));
        assert_eq!(cfg.poll_interval, Duration::from_secs(3));
        assert_eq!(cfg.gas_overhead_multiplier, 2.0);
    }

    #[test]
    fn builder_overrides_selectively() {
        let cfg = ClientConfig::builder()
            .request_timeout(Duration::from_secs(5))
            .build();
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.wait_timeout, Duration::from_secs(120));
    }
}
