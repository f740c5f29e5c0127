use serde::Serialize;

/// Display metadata for a selectable model
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub badge: &'static str,
}

/// Display metadata for a tool an agent can be given
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const AVAILABLE_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gemini-2.5-flash-preview-05-20",
        name: "Gemini 2.5 Flash",
        description: "Fast and smart",
        badge: "Recommended",
    },
    ModelInfo {
        id: "gemini-2.0-flash",
        name: "Gemini 2.0 Flash",
        description: "Second generation workhorse",
        badge: "",
    },
    ModelInfo {
        id: "gemini-2.5-pro-preview-06-05",
        name: "Gemini 2.5 Pro",
        description: "Most capable",
        badge: "Pro",
    },
    ModelInfo {
        id: "gemini-2.5-flash-lite-preview-06-17",
        name: "Gemini 2.5 Flash Lite",
        description: "Best balance",
        badge: "",
    },
];

pub const AVAILABLE_TOOLS: &[ToolInfo] = &[
    ToolInfo {
        id: "internet_search",
        name: "Internet Search",
        description: "DuckDuckGo web search for current topics",
    },
    ToolInfo {
        id: "web_scraper",
        name: "Web Scraper",
        description: "Fetches and extracts text content from web pages",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ids_are_unique() {
        let mut model_ids: Vec<_> = AVAILABLE_MODELS.iter().map(|m| m.id).collect();
        model_ids.sort();
        model_ids.dedup();
        assert_eq!(model_ids.len(), AVAILABLE_MODELS.len());

        let mut tool_ids: Vec<_> = AVAILABLE_TOOLS.iter().map(|t| t.id).collect();
        tool_ids.sort();
        tool_ids.dedup();
        assert_eq!(tool_ids.len(), AVAILABLE_TOOLS.len());
    }
}
