//! Shared application context.
//!
//! Every collaborator the pipelines need is constructed once, here, and
//! passed down explicitly. The HTTP server clones an [`AppContext`] into
//! each handler; the CLI builds one per command.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use docqa_core::embedding::Embedder;
use docqa_core::index::SemanticIndex;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::llm::{create_language_model, DisabledModel, LanguageModel};
use crate::papers::PaperSearch;
use crate::registry::Registry;
use crate::sqlite_index::SqliteIndex;
use crate::{db, migrate};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub registry: Registry,
    pub index: SemanticIndex,
    pub llm: Arc<dyn LanguageModel>,
    pub papers: Arc<PaperSearch>,
}

impl AppContext {
    /// Assemble a context from already-built parts. The schema must exist.
    pub fn new(
        config: Config,
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        papers: PaperSearch,
    ) -> Self {
        let store = Arc::new(SqliteIndex::new(pool.clone()));
        Self {
            config: Arc::new(config),
            registry: Registry::new(pool),
            index: SemanticIndex::new(store, embedder),
            llm,
            papers: Arc::new(papers),
        }
    }

    /// Connect, migrate, and build the configured providers.
    ///
    /// Fails if the language model's API key is missing.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let llm = create_language_model(&config.llm)?;
        Self::connect(config, llm).await
    }

    /// Like [`AppContext::from_config`] but without a language model, for
    /// commands that only ingest or list. Questions asked through this
    /// context always degrade.
    pub async fn without_llm(config: &Config) -> Result<Self> {
        Self::connect(config, Arc::new(DisabledModel)).await
    }

    async fn connect(config: &Config, llm: Arc<dyn LanguageModel>) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let papers = PaperSearch::from_config(&config.papers)?;

        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;

        tracing::info!(
            db = %config.db.path.display(),
            embedder = embedder.model_name(),
            llm = llm.model_name(),
            "application context ready"
        );

        Ok(Self::new(config.clone(), pool, embedder, llm, papers))
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.config.llm.timeout_secs)
    }

    pub fn top_k(&self) -> usize {
        self.config.retrieval.top_k
    }
}
