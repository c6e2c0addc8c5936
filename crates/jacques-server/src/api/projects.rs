use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::queries;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects/catalog", get(project_catalog))
        .route("/plans/{catalog_id}", get(plan_by_id))
        .route("/sessions/{id}/plans/{message_index}", get(plan_by_session))
}

#[derive(Deserialize)]
struct ProjectParam {
    project: String,
}

async fn project_catalog(
    Query(params): Query<ProjectParam>,
) -> Result<Json<jacques_types::ProjectIndex>, AppError> {
    Ok(Json(queries::load_project_index(std::path::Path::new(
        &params.project,
    ))?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanResponse {
    plan: jacques_types::Plan,
    content: String,
}

async fn plan_by_id(
    Path(catalog_id): Path<String>,
    Query(params): Query<ProjectParam>,
) -> Result<Json<PlanResponse>, AppError> {
    let (plan, content) =
        queries::plan_content_by_id(std::path::Path::new(&params.project), &catalog_id)?;
    Ok(Json(PlanResponse { plan, content }))
}

#[derive(Deserialize)]
struct MaybeProjectParam {
    #[serde(default)]
    project: Option<String>,
}

async fn plan_by_session(
    State(state): State<AppState>,
    Path((id, message_index)): Path<(String, usize)>,
    Query(params): Query<MaybeProjectParam>,
) -> Result<Json<PlanResponse>, AppError> {
    // Project can come from the query or from the live session.
    let project = match params.project {
        Some(project) => std::path::PathBuf::from(project),
        None => state
            .pipeline
            .registry()
            .get(&id)
            .map(|s| s.project_path)
            .ok_or_else(|| AppError::bad_request("project parameter required"))?,
    };
    let (plan, content) = queries::plan_content_by_session(&project, &id, message_index)?;
    Ok(Json(PlanResponse { plan, content }))
}
