use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::queries;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", get(session_detail))
        .route("/sessions/{id}/subagents", get(list_subagents))
        .route("/subagents/{agent_id}", get(subagent_content))
}

#[derive(Serialize)]
struct SessionListResponse {
    sessions: Vec<jacques_types::Session>,
    focused: Option<String>,
}

async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.pipeline.registry().list(),
        focused: state.pipeline.registry().focused(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionDetailResponse {
    session: jacques_types::Session,
    entries: Vec<jacques_types::TranscriptEntry>,
    stats: jacques_reader::TranscriptStats,
    turns: Vec<jacques_reader::TurnSummary>,
    parse_errors: usize,
}

async fn session_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetailResponse>, AppError> {
    let session = state
        .pipeline
        .registry()
        .get(&id)
        .ok_or_else(|| AppError::not_found(format!("session {id}")))?;

    let (entries, stats, turns, parse_errors) = match session.transcript_path.clone() {
        Some(path) => {
            // Transcript parsing is file I/O plus tokenization; keep it off
            // the handler threads.
            let outcome = tokio::task::spawn_blocking(move || jacques_reader::parse(&path))
                .await
                .map_err(|e| AppError::internal(e.to_string()))??;
            let stats = jacques_reader::statistics(&outcome.entries);
            let turns = jacques_reader::turns(&outcome.entries);
            (outcome.entries, stats, turns, outcome.parse_errors)
        }
        None => (
            Vec::new(),
            jacques_reader::TranscriptStats::default(),
            Vec::new(),
            0,
        ),
    };

    Ok(Json(SessionDetailResponse {
        session,
        entries,
        stats,
        turns,
        parse_errors,
    }))
}

async fn list_subagents(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<jacques_types::SubagentIndexEntry>>, AppError> {
    let session = state
        .pipeline
        .registry()
        .get(&id)
        .ok_or_else(|| AppError::not_found(format!("session {id}")))?;

    let index = queries::load_project_index(&session.project_path)?;
    let subagents = index
        .subagents
        .into_iter()
        .filter(|s| s.session_id == id)
        .collect();
    Ok(Json(subagents))
}

#[derive(Deserialize)]
struct ProjectParam {
    project: String,
}

async fn subagent_content(
    Path(agent_id): Path<String>,
    Query(params): Query<ProjectParam>,
) -> Result<String, AppError> {
    Ok(queries::subagent_content(
        std::path::Path::new(&params.project),
        &agent_id,
    )?)
}
