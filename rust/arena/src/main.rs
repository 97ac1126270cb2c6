use ai::{AiConfig, Heuristic};
use anyhow::Context;
use arena::{Arena, SimulationRequest};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn default_request() -> SimulationRequest {
    SimulationRequest {
        num_games: 10,
        bot_black: AiConfig::alphabeta(Heuristic::Hybrid, 3),
        bot_white: AiConfig::Montecarlo {
            heuristic: Heuristic::RandomRollout,
            parameters: Default::default(),
        },
    }
}

fn load_request(path: Option<String>) -> anyhow::Result<SimulationRequest> {
    let Some(path) = path else {
        return Ok(default_request());
    };
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing simulation request {path}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let arena = Arena::from_env();
    let request = load_request(std::env::args().nth(1))?;
    let max = arena.config().max_sim_games;
    anyhow::ensure!(
        (1..=max).contains(&request.num_games),
        "num_games must be within 1..={max}, got {}",
        request.num_games
    );
    info!(
        num_games = request.num_games,
        black = %request.bot_black,
        white = %request.bot_white,
        "running simulation batch"
    );

    let runner = arena.runner();
    let record = tokio::task::spawn_blocking(move || {
        runner.run(request.num_games, &request.bot_black, &request.bot_white)
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
