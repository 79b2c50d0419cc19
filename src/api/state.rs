use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::events::EventBus;
use crate::extractor::{ExtractionClient, ToolRunner};
use crate::jobs::Orchestrator;
use crate::observability::Metrics;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to prepare storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid URL pattern: {0}")]
    UrlPattern(#[from] regex::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub extractor: Arc<ExtractionClient>,
    pub events: EventBus,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire the downloader, event bus and orchestrator around `runner`
    pub fn new(config: Config, runner: Arc<dyn ToolRunner>) -> Result<Self, StartupError> {
        let metrics = Arc::new(Metrics::new());
        let events = EventBus::with_capacity(config.events.replay_capacity);

        let extractor = Arc::new(ExtractionClient::new(
            &config.extractor,
            &config.storage,
            runner,
            metrics.clone(),
        )?);

        let orchestrator = Orchestrator::new(
            &config.jobs,
            extractor.clone(),
            events.clone(),
            metrics.clone(),
        )?;

        Ok(Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            extractor,
            events,
            metrics,
        })
    }
}
