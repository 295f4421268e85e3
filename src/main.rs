use tracing_subscriber::EnvFilter;

use button_game_backend::api::{self, AppState};
use button_game_backend::config::Config;
use button_game_backend::metrics;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load();
    metrics::register_metrics();

    let state = AppState::from_config(&config);
    tracing::info!(
        scores = %state.scores.location(),
        policy = ?config.corrupt_policy,
        "using score document"
    );

    let app = api::router(state).layer(config.cors_layer());

    let listener = tokio::net::TcpListener::bind((config.bind_addr.as_str(), config.port))
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}:{}: {e}", config.bind_addr, config.port));

    tracing::info!(
        "Button game backend listening on {}:{}",
        config.bind_addr,
        config.port
    );
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
