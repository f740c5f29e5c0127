use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

use crate::events::truncate;
use crate::tools::Tool;

/// Fetches a web page and extracts its readable text, skipping script and
/// style content and truncating to a bounded length. Like every tool,
/// failures are returned as text so the run keeps going.
pub struct WebScraperTool {
    client: Client,
    max_chars: usize,
}

impl WebScraperTool {
    pub fn new(max_chars: usize, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .unwrap_or_default();

        Self { client, max_chars }
    }

    async fn scrape(&self, url: &str) -> Result<String, String> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(format!("invalid URL: {}", url));
        }

        let response = self
            .client
            .get(url)
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

        Ok(Self::extract_text(&body, self.max_chars))
    }

    /// Extract visible text from a page, script/style stripped
    fn extract_text(html: &str, max_chars: usize) -> String {
        let document = Html::parse_document(html);
        let body_selector = Selector::parse("body").expect("static selector");

        let mut chunks = Vec::new();
        if let Some(body) = document.select(&body_selector).next() {
            Self::collect_text(body, &mut chunks);
        } else {
            Self::collect_text(document.root_element(), &mut chunks);
        }

        truncate(&chunks.join("\n"), max_chars)
    }

    fn collect_text(element: ElementRef, chunks: &mut Vec<String>) {
        for child in element.children() {
            if let Some(el) = ElementRef::wrap(child) {
                let name = el.value().name();
                if name == "script" || name == "style" {
                    continue;
                }
                Self::collect_text(el, chunks);
            } else if let Some(text) = child.value().as_text() {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            }
        }
    }
}

#[async_trait]
impl Tool for WebScraperTool {
    fn id(&self) -> &str {
        "web_scraper"
    }

    fn name(&self) -> &str {
        "Web Scraper"
    }

    fn description(&self) -> &str {
        "Fetches a web page and extracts its text content"
    }

    async fn invoke(&self, input: &str) -> String {
        debug!("Scraping page: {}", input);
        match self.scrape(input.trim()).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Scrape failed for {}: {}", input, e);
                format!("Scraping error: {}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_strips_script_and_style() {
        let html = r#"
            <html><head><style>body { color: red; }</style></head>
            <body>
                <h1>Title</h1>
                <script>console.log("hidden");</script>
                <p>Visible paragraph.</p>
            </body></html>
        "#;

        let text = WebScraperTool::extract_text(html, 3000);
        assert!(text.contains("Title"));
        assert!(text.contains("Visible paragraph."));
        assert!(!text.contains("console.log"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_extract_text_truncates() {
        let body: String = "word ".repeat(2000);
        let html = format!("<html><body><p>{}</p></body></html>", body);

        let text = WebScraperTool::extract_text(&html, 100);
        assert!(text.chars().count() <= 100);
    }

    #[tokio::test]
    async fn test_invoke_rejects_bad_url_as_text() {
        let tool = WebScraperTool::new(3000, 1);
        let output = tool.invoke("not-a-url").await;
        assert!(output.starts_with("Scraping error:"), "got: {}", output);
    }

    #[tokio::test]
    async fn test_invoke_folds_network_failure_into_text() {
        let tool = WebScraperTool::new(3000, 1);
        let output = tool.invoke("http://127.0.0.1:1/page").await;
        assert!(output.starts_with("Scraping error:"), "got: {}", output);
    }
}
