use clap::Parser;
use crypto_agent_orchestrator::{api::ApiState, config::Settings, models::PlanRequest};
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run one planning loop from the command line and print its events as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "orchestrator", version, about)]
struct Cli {
    /// What the planner should work towards
    goal: String,

    /// Preferred token symbol, e.g. BTC
    #[arg(long)]
    token: Option<String>,

    /// User id for behavioral profiling
    #[arg(long)]
    user_id: Option<String>,

    /// Maximum planner steps (defaults to PLANNER_MAX_STEPS)
    #[arg(long)]
    max_steps: Option<usize>,

    /// Minimum candidate score to keep calling tools (defaults to PLANNER_STOP_SCORE)
    #[arg(long)]
    stop_score: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so stdout stays JSON lines
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let state = ApiState::from_settings(&settings);

    let mut request = PlanRequest::new(cli.goal)
        .with_max_steps(cli.max_steps.unwrap_or(settings.max_steps))
        .with_stop_score(cli.stop_score.unwrap_or(settings.stop_score));
    if let Some(token) = cli.token {
        request = request.with_token(token);
    }
    if let Some(user_id) = cli.user_id {
        request = request.with_user(user_id);
    }

    info!(goal = %request.goal, "Running orchestrator");

    let mut events = Box::pin(state.orchestrator.stream(request)?);
    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }

    Ok(())
}
