mod handlers;
mod router;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::Settings;
use crate::core::inbox::FeedbackInbox;
use crate::core::llm::LlmGateway;
use crate::core::llm::ollama::OllamaGateway;
use crate::core::progress::ProgressHub;
use crate::core::retrieval::{RagGateway, RetrievalGateway};
use crate::core::review::ReviewContext;
use crate::core::store::JobStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<JobStore>,
    pub(crate) llm: Arc<dyn LlmGateway>,
    pub(crate) retrieval: Arc<dyn RetrievalGateway>,
    pub(crate) progress: ProgressHub,
    pub(crate) inbox: FeedbackInbox,
}

impl AppState {
    pub(crate) fn review_context(&self) -> ReviewContext {
        ReviewContext {
            store: self.store.clone(),
            llm: self.llm.clone(),
            retrieval: self.retrieval.clone(),
            progress: self.progress.clone(),
            inbox: self.inbox.clone(),
        }
    }
}

/// Build the application state from the environment and serve the API.
pub async fn run() -> Result<()> {
    let settings = Settings::from_env();

    let store = Arc::new(JobStore::open(settings.db_path())?);
    let llm: Arc<dyn LlmGateway> = Arc::new(OllamaGateway::new(&settings)?);
    let retrieval: Arc<dyn RetrievalGateway> = Arc::new(RagGateway::new(&settings)?);

    let state = AppState {
        store,
        llm,
        retrieval,
        progress: ProgressHub::new(),
        inbox: FeedbackInbox::new(),
    };

    let app = router::build_router(state);
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("gavel listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
