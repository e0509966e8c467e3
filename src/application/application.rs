// The core application handle: configuration plus the four injected
// backends. Everything is behind an Arc so the handle clones cheaply into
// every request handler.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::db::postgres::Postgres;
use crate::db::store::Store;
use crate::github::{CodeHost, GithubClient};
use crate::llm::gemini::GeminiClient;
use crate::llm::LlmClient;
use crate::queue::{HttpTaskQueue, TaskQueue};

use super::config::configuration::Configuration;
use super::logging::tracing::tracing_subscribe;

static LOGGER_INSTALLED: OnceCell<bool> = OnceCell::new();

#[derive(Clone)]
pub struct Application {
    pub config: Arc<Configuration>,
    pub store: Arc<dyn Store>,
    pub queue: Arc<dyn TaskQueue>,
    pub codehost: Arc<dyn CodeHost>,
    pub llm: Arc<dyn LlmClient>,
}

impl Application {
    /// Wire up the production backends: Postgres, the HTTP delivery queue,
    /// the GitHub client and Gemini.
    pub async fn initialize(config: Configuration) -> anyhow::Result<Self> {
        debug!(?config, "configuration after loading");
        let config = Arc::new(config);
        let store = Arc::new(Postgres::connect(&config.database_url).await?);
        let queue = Arc::new(HttpTaskQueue::new());
        let codehost = Arc::new(GithubClient::new(config.github_token.clone()));
        let llm = Arc::new(GeminiClient::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
        ));
        Ok(Self::new(config, store, queue, codehost, llm))
    }

    /// Assemble from explicit backends; tests inject in-memory ones here.
    pub fn new(
        config: Arc<Configuration>,
        store: Arc<dyn Store>,
        queue: Arc<dyn TaskQueue>,
        codehost: Arc<dyn CodeHost>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            codehost,
            llm,
        }
    }

    pub fn install_logging(config: &Configuration) {
        if let Some(true) = LOGGER_INSTALLED.get() {
            return;
        }

        if !tracing_subscribe(config) {
            warn!("Failed to install tracing_subscriber. There's probably one already...");
        };

        if color_eyre::install().is_err() {
            warn!("Failed to install color-eyre. Oh well...");
        };

        LOGGER_INSTALLED.set(true).unwrap();
    }
}
