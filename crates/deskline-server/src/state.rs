//! Shared application state.

use std::sync::Arc;

use deskline_core::DeskConfig;
use deskline_llm::{LLMConfig, LlmBackend, TextGenerator};
use deskline_runtime::Orchestrator;
use deskline_store::StoreClient;
use parking_lot::RwLock;
use tracing::warn;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: DeskConfig,
    pub store: Arc<StoreClient>,
    pub llm_config: Arc<RwLock<LLMConfig>>,
    pub orchestrator: Orchestrator,
}

impl AppState {
    /// Wire the store client and the configured backend from `config`.
    ///
    /// A store that cannot be opened now is not fatal: the client stays
    /// disconnected and retries on the next lookup.
    pub fn new(config: DeskConfig) -> Self {
        let store = Arc::new(StoreClient::new(&config.data_paths.db));
        if let Err(e) = store.connect() {
            warn!("Directory store unavailable at startup: {}", e);
        }

        let llm_config = Arc::new(RwLock::new(LLMConfig::load(
            &config.data_paths.llm_config_file,
        )));
        let backend = Arc::new(LlmBackend::new(llm_config.clone()));

        Self::from_parts(config, store, backend, llm_config)
    }

    /// Assemble state from explicit collaborators.
    pub fn from_parts(
        config: DeskConfig,
        store: Arc<StoreClient>,
        generator: Arc<dyn TextGenerator>,
        llm_config: Arc<RwLock<LLMConfig>>,
    ) -> Self {
        let orchestrator = Orchestrator::new(store.clone(), generator, config.budget.clone());
        Self {
            config,
            store,
            llm_config,
            orchestrator,
        }
    }
}
