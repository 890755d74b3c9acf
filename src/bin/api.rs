use crypto_agent_orchestrator::{
    api::{start_server, ApiState},
    config::Settings,
};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;

    info!("Crypto Agent Orchestrator - API Server");
    info!(
        port = settings.port,
        provider = ?settings.llm_provider,
        sell_policy = ?settings.sell_signal_policy,
        "Settings loaded"
    );
    if settings.news_api_base_url.is_none() {
        warn!("NEWS_API_BASE_URL not set; news_agent and live trade decisions will fail");
    }

    let state = ApiState::from_settings(&settings);

    // Expired sessions are also dropped lazily on access.
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match sessions.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "Expired chat sessions removed"),
                Err(e) => warn!(error = %e, "Session purge failed"),
            }
        }
    });

    info!("Orchestrator initialized, starting API server");

    start_server(state, &settings).await?;

    Ok(())
}
