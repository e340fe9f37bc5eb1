pub mod ollama;

use anyhow::Result;
use async_trait::async_trait;

/// Per-call flags for tool-assisted reasoning. Providers that do not
/// support a flag ignore it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompleteOptions {
    pub enable_sequential_thinking: bool,
    pub use_tool_search: bool,
}

/// Single request/response text completion. UTF-8 in, UTF-8 out; no
/// streaming. Implementations carry their own per-call timeout.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(&self, prompt: &str, opts: CompleteOptions) -> Result<String>;
}
