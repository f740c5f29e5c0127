use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

use crate::tools::Tool;

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// DuckDuckGo web search. Returns a bounded number of title/snippet pairs
/// as plain text; failures come back as readable text, never as errors.
pub struct WebSearchTool {
    client: Client,
    endpoint: String,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(max_results: usize, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoint: SEARCH_ENDPOINT.to_string(),
            max_results,
        }
    }

    async fn search(&self, query: &str) -> Result<String, String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP error: {}", response.status()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read response body: {}", e))?;

        Ok(Self::extract_results(&body, self.max_results))
    }

    /// Pull title/snippet pairs out of the DuckDuckGo html result page
    fn extract_results(html: &str, max_results: usize) -> String {
        let document = Html::parse_document(html);
        let result_selector = Selector::parse(".result").expect("static selector");
        let title_selector = Selector::parse(".result__title").expect("static selector");
        let snippet_selector = Selector::parse(".result__snippet").expect("static selector");

        let mut lines = Vec::new();
        for result in document.select(&result_selector).take(max_results) {
            let title = result
                .select(&title_selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            let snippet = result
                .select(&snippet_selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();

            if title.is_empty() && snippet.is_empty() {
                continue;
            }
            lines.push(format!("{}. {}\n   {}", lines.len() + 1, title, snippet));
        }

        if lines.is_empty() {
            "No search results found.".to_string()
        } else {
            lines.join("\n")
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn id(&self) -> &str {
        "internet_search"
    }

    fn name(&self) -> &str {
        "Internet Search"
    }

    fn description(&self) -> &str {
        "Searches the web for current information on a query"
    }

    async fn invoke(&self, input: &str) -> String {
        debug!("Running web search for query: {}", input);
        match self.search(input).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Web search failed: {}", e);
                format!("Search error: {}", e)
            }
        }
    }
}
