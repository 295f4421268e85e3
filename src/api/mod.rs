// HTTP API routes (score submission, leaderboard, stats, game sessions).

pub mod error;
pub mod validation;

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Json, Path, Query, Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::Config;
use crate::metrics;
use crate::session::{
    Difficulty, SessionState, SessionStore, DEFAULT_GAME_MODE, SUPPORTED_GAME_MODES,
};
use crate::store::{rank_records, ScoreRecord, ScoreStore, Statistics};

pub use error::ApiError;

// ── Request types ─────────────────────────────────────────────────────

/// Fields are optional so a missing one is reported as a validation error
/// rather than a generic decode failure.
#[derive(Debug, Deserialize)]
pub struct SubmitScoreRequest {
    pub time: Option<i64>,
    pub clicks: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct GameFilterParams {
    pub game_mode: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartGameRequest {
    pub player_id: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub game_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EndGameRequest {
    pub session_id: Option<Uuid>,
    pub time: Option<i64>,
    pub clicks: Option<i64>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub scores: Arc<ScoreStore>,
    pub sessions: Arc<SessionStore>,
    pub leaderboard_limit: usize,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scores: Arc::new(ScoreStore::open(&config.scores_file, config.corrupt_policy)),
            sessions: Arc::new(SessionStore::open(
                &config.sessions_file,
                config.corrupt_policy,
            )),
            leaderboard_limit: config.leaderboard_limit,
        }
    }
}

/// Run store work off the async executor. Store calls block on file I/O.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/score", post(submit_score))
        .route("/leaderboard", get(leaderboard))
        .route("/stats", get(stats))
        // Game sessions
        .route("/game/config", get(game_config))
        .route("/game/start", post(start_game))
        .route("/game/end", post(end_game))
        .route("/game/sessions/{id}", get(get_session))
        .route("/game/leaderboard", get(game_leaderboard))
        .route("/game/stats", get(game_stats))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(track_metrics))
        .with_state(state)
}

/// Record request count and latency per normalized endpoint.
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = metrics::normalize_path(req.uri().path());
    let start = Instant::now();

    let response = next.run(req).await;

    metrics::API_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint.as_str()])
        .observe(start.elapsed().as_secs_f64());
    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), response.status().as_str()])
        .inc();
    response
}

// ── Score handlers ────────────────────────────────────────────────────

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "message": "Server is running normally!",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn submit_score(
    State(state): State<AppState>,
    payload: Result<Json<SubmitScoreRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let (time, clicks) = validation::validate_result(req.time, req.clicks)?;

    let scores = state.scores.clone();
    let saved = blocking(move || Ok(scores.append(ScoreRecord::new(time, clicks))?)).await?;

    metrics::SCORES_SUBMITTED_TOTAL.inc();
    tracing::info!(time, clicks, "score saved");
    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Score saved!",
            "score": saved,
        })),
    ))
}

async fn leaderboard(
    State(state): State<AppState>,
    params: Result<Query<LeaderboardParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;
    let limit = params.limit.unwrap_or(state.leaderboard_limit);

    let scores = state.scores.clone();
    let board = blocking(move || Ok(scores.leaderboard(limit)?)).await?;
    Ok((StatusCode::OK, Json(board)))
}

async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let scores = state.scores.clone();
    let stats = blocking(move || Ok(scores.stats()?)).await?;
    Ok((StatusCode::OK, Json(stats)))
}

// ── Game session handlers ─────────────────────────────────────────────

fn check_game_mode(mode: &str) -> Result<(), ApiError> {
    if SUPPORTED_GAME_MODES.contains(&mode) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "game_mode must be one of {}",
            SUPPORTED_GAME_MODES.join(", ")
        )))
    }
}

async fn game_config() -> Json<serde_json::Value> {
    Json(json!({
        "config": {
            "min_time": 0,
            "max_time": validation::MAX_TIME_SECONDS,
            "min_clicks": 0,
            "max_clicks": validation::MAX_CLICKS,
        },
        "supported_difficulties": Difficulty::ALL,
        "supported_game_modes": SUPPORTED_GAME_MODES,
        "default_game_mode": DEFAULT_GAME_MODE,
    }))
}

async fn start_game(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // The body is optional; an empty one starts a default session.
    let req: StartGameRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartGameRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Validation(format!("invalid request body: {e}")))?
    };

    let difficulty = req.difficulty.unwrap_or_default();
    let game_mode = req
        .game_mode
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_GAME_MODE.to_string());
    check_game_mode(&game_mode)?;

    let sessions = state.sessions.clone();
    let session =
        blocking(move || Ok(sessions.start(req.player_id, difficulty, game_mode)?)).await?;

    metrics::SESSIONS_TOTAL.with_label_values(&["started"]).inc();
    tracing::info!(session_id = %session.session_id, "game session started");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Game session started!",
            "session": session,
        })),
    ))
}

async fn end_game(
    State(state): State<AppState>,
    payload: Result<Json<EndGameRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let session_id = req
        .session_id
        .ok_or_else(|| ApiError::Validation("session_id is required".into()))?;
    let (time, clicks) = validation::validate_result(req.time, req.clicks)?;

    let sessions = state.sessions.clone();
    let scores = state.scores.clone();
    let record = ScoreRecord::new(time, clicks);
    let (session, standing) =
        blocking(move || Ok(sessions.end(session_id, record, &scores)?)).await?;
    let rank = standing.rank;

    metrics::SCORES_SUBMITTED_TOTAL.inc();
    metrics::SESSIONS_TOTAL.with_label_values(&["completed"]).inc();
    tracing::info!(%session_id, time, clicks, rank, "game session completed");

    let result = match &session.state {
        SessionState::Completed { result, .. } => json!(result),
        SessionState::Active => serde_json::Value::Null,
    };
    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Game session completed!",
            "result": result,
            "rank": rank,
            "stats": standing.stats,
            "session": session,
        })),
    ))
}

async fn get_session(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::Validation(e.body_text()))?;
    let sessions = state.sessions.clone();
    let session = blocking(move || Ok(sessions.get(id)?)).await?;
    Ok((StatusCode::OK, Json(session)))
}

/// Completed session results narrowed by the optional `game_mode` and
/// `difficulty` query parameters.
async fn filtered_results(
    state: &AppState,
    params: &GameFilterParams,
) -> Result<Vec<ScoreRecord>, ApiError> {
    if let Some(mode) = &params.game_mode {
        check_game_mode(mode)?;
    }
    let sessions = state.sessions.clone();
    let game_mode = params.game_mode.clone();
    let difficulty = params.difficulty;
    blocking(move || Ok(sessions.completed_results(game_mode.as_deref(), difficulty)?)).await
}

async fn game_leaderboard(
    State(state): State<AppState>,
    params: Result<Query<GameFilterParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;
    let limit = params.limit.unwrap_or(state.leaderboard_limit);
    let results = filtered_results(&state, &params).await?;
    Ok((StatusCode::OK, Json(rank_records(results, limit))))
}

async fn game_stats(
    State(state): State<AppState>,
    params: Result<Query<GameFilterParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;
    let results = filtered_results(&state, &params).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "game_mode": params.game_mode,
            "difficulty": params.difficulty,
            "stats": Statistics::from_records(&results),
        })),
    ))
}

// ── Metrics ───────────────────────────────────────────────────────────

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}
