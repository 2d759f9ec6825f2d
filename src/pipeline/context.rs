use std::sync::Arc;

use crate::agent::CapabilityRegistry;
use crate::cache::CacheStore;
use crate::config::Config;

/// Per-process dependencies, built once and passed to every chain and agent.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<Config>,
    pub cache: Arc<CacheStore>,
    pub capabilities: Arc<CapabilityRegistry>,
}

impl PipelineContext {
    pub fn new(config: Config, cache: Arc<CacheStore>, capabilities: CapabilityRegistry) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            capabilities: Arc::new(capabilities),
        }
    }
}
