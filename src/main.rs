use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crew_studio::config::{ConfigManager, FileConfigManager};
use crew_studio::llm::GeminiClient;
use crew_studio::CrewService;

#[tokio::main]
async fn main() -> crew_studio::error::Result<()> {
    tracing_subscriber::fmt::init();

    let config_manager = FileConfigManager::new(PathBuf::from("config.toml"));
    let mut config = config_manager.load_config()?;

    // environment key takes precedence over the config file
    if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
        config.llm.api_key = Some(key);
    }

    tracing::info!("Starting Crew Studio backend");

    // creating artifact dir right away
    if let Err(e) = std::fs::create_dir_all(&config.output.directory) {
        tracing::error!("Failed to create artifact directory: {}", e);
    } else {
        tracing::info!(
            "Artifact directory ready: {}",
            config.output.directory.display()
        );
    }

    let llm = Arc::new(GeminiClient::new(
        config.llm.api_key.clone(),
        Duration::from_secs(config.llm.request_timeout_secs),
    )?);

    let service = Arc::new(CrewService::new(config, llm));
    crew_studio::api::serve(service).await?;

    tracing::info!("Crew Studio backend stopped.");
    Ok(())
}
