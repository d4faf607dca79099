use crate::config::ServerConfig;
use echo::PipelineResources;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Stores, clustering engine, provider, publisher and stage runner
    pub resources: Arc<PipelineResources>,

    /// Renders `/metrics`; `None` when metrics are disabled
    pub prometheus: Option<PrometheusHandle>,

    pub started_at: Instant,
}

impl ServerState {
    /// Initialize pipeline resources from the configured YAML file.
    pub fn new(config: ServerConfig, prometheus: Option<PrometheusHandle>) -> anyhow::Result<Self> {
        let resources = PipelineResources::init(config.pipeline()?)?;
        Ok(Self::from_resources(config, resources, prometheus))
    }

    pub fn from_resources(
        config: ServerConfig,
        resources: PipelineResources,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            resources: Arc::new(resources),
            prometheus,
            started_at: Instant::now(),
        }
    }

    /// HTTP timeout for `/analyze` and the rest of the router.
    ///
    /// Never shorter than the runner's worst case, so a slow document ends in
    /// the stage's own typed 503 instead of a bare 408 from the timeout layer.
    pub fn request_timeout(&self) -> Duration {
        let configured = self.config.timeout();
        let stage = self.resources.runner().worst_case_latency() + Duration::from_secs(1);
        if stage > configured {
            tracing::debug!(
                configured_secs = configured.as_secs(),
                stage_ms = stage.as_millis() as u64,
                "raising request timeout to cover the stage step timeouts"
            );
        }
        configured.max(stage)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo::EchoConfig;

    fn state_with(server: ServerConfig, pipeline: EchoConfig) -> ServerState {
        let resources = PipelineResources::init(pipeline).expect("pipeline resources");
        ServerState::from_resources(server, resources, None)
    }

    #[test]
    fn request_timeout_covers_default_stage_budget() {
        let state = state_with(ServerConfig::default(), EchoConfig::default());
        let worst = state.resources.runner().worst_case_latency();

        // fetch 3s + embed 5s + 3 attempts x 2 store calls x 3s + persist 3s + forward 3s
        assert_eq!(worst, Duration::from_secs(32));
        assert!(state.request_timeout() > worst);
        assert!(state.request_timeout() > state.config.timeout());
    }

    #[test]
    fn longer_configured_timeout_wins() {
        let server = ServerConfig {
            timeout_secs: 120,
            ..ServerConfig::default()
        };
        let state = state_with(server, EchoConfig::default());
        assert_eq!(state.request_timeout(), Duration::from_secs(120));
    }
}
