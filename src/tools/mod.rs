pub mod scrape;
pub mod search;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::ToolsConfig;

pub use scrape::WebScraperTool;
pub use search::WebSearchTool;

/// A capability an agent can use during a run. Invocation never fails:
/// internal errors are folded into the returned text so a broken tool
/// degrades the output instead of aborting the pipeline.
#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn invoke(&self, input: &str) -> String;
}

/// Fixed mapping from tool identifier to capability
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with the standard built-in tools
    pub fn standard(config: &ToolsConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WebSearchTool::new(
            config.search_max_results,
            config.request_timeout_secs,
        )));
        registry.register(Arc::new(WebScraperTool::new(
            config.scrape_max_chars,
            config.request_timeout_secs,
        )));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.id().to_string(), tool);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    /// Resolve tool identifiers to capabilities. Unknown identifiers are
    /// skipped, the agent simply gets fewer tools.
    pub fn resolve(&self, ids: &[String]) -> Vec<Arc<dyn Tool>> {
        let mut resolved = Vec::new();
        for id in ids {
            match self.get(id) {
                Some(tool) => resolved.push(tool),
                None => debug!("Skipping unknown tool identifier: {}", id),
            }
        }
        resolved
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
