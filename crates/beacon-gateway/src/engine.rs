//! Wiring the engine together from configuration.

use std::sync::Arc;
use std::time::Duration;

use beacon_config::BeaconConfig;
use beacon_engine::{
    AssistantApi, AssistantsConfig, CommandRegistry, EngineError, InMemoryRepository,
    OpenAiAssistantsClient, SessionStore, TimeSeriesStore, TurnOrchestrator,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Registry with every built-in command over the demo data set.
pub fn build_registry(config: &BeaconConfig) -> CommandRegistry {
    CommandRegistry::with_defaults(
        Arc::new(InMemoryRepository::seeded()),
        Arc::new(TimeSeriesStore::from_settings(&config.data)),
    )
}

pub fn build_orchestrator(config: &BeaconConfig) -> Result<Arc<TurnOrchestrator>, EngineError> {
    let client = OpenAiAssistantsClient::new(AssistantsConfig::from_settings(&config.remote)?);
    let api: Arc<dyn AssistantApi> = Arc::new(client);
    let sessions = Arc::new(SessionStore::from_settings(api.clone(), &config.session));
    let registry = Arc::new(build_registry(config));
    tracing::info!(
        commands = registry.len(),
        ttl_secs = config.session.ttl_secs,
        capacity = config.session.capacity,
        "engine ready"
    );
    Ok(Arc::new(TurnOrchestrator::from_settings(
        api, sessions, registry, config,
    )))
}

/// Periodically drop expired sessions until `shutdown` fires.
pub fn spawn_reaper(
    orchestrator: Arc<TurnOrchestrator>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            let reaped = orchestrator.reap_expired().await;
            let live = orchestrator.sessions().len().await;
            tracing::debug!(reaped, sessions = live, "Reaper tick");
        }
    })
}
