use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::Stream;
use jacques_index::{filter_hits, SearchFilters, SearchIndex};
use jacques_runtime::{ArchiveSummary, Progress};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::atomic::AtomicBool;
use tokio::sync::mpsc;

use crate::errors::AppError;
use crate::queries;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/archive/search", get(search))
        .route("/archive/manifests", get(list_manifests))
        .route("/archive/manifests/{id}", get(get_manifest))
        .route("/archive/initialize", get(initialize_sse))
        .route("/archive/rebuild", get(rebuild_sse))
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    tech: Option<String>,
    #[serde(default)]
    from: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    to: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    manifest_id: String,
    score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    project_path: String,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchResult>>, AppError> {
    let index = SearchIndex::load(&state.paths.search_index_file())?;
    let hits = index.search(&params.q);

    let filters = SearchFilters {
        project_id: params.project,
        ended_after: params.from,
        ended_before: params.to,
        technologies: params
            .tech
            .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default(),
        offset: params.offset.unwrap_or(0),
        limit: params.limit,
    };

    let paths = state.paths.clone();
    let page = filter_hits(hits, &filters, move |id| {
        queries::load_archived_manifest(&paths, id).ok()
    });

    let results = page
        .into_iter()
        .map(|hit| {
            let manifest = queries::load_archived_manifest(&state.paths, &hit.manifest_id).ok();
            SearchResult {
                title: manifest.as_ref().and_then(|m| m.title.clone()),
                project_path: manifest
                    .map(|m| m.project_path)
                    .unwrap_or_default(),
                manifest_id: hit.manifest_id,
                score: hit.score,
            }
        })
        .collect();
    Ok(Json(results))
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    project: Option<String>,
}

async fn list_manifests(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<jacques_types::SessionManifest>>, AppError> {
    Ok(Json(queries::list_archived_manifests(
        &state.paths,
        params.project.as_deref(),
    )?))
}

async fn get_manifest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<jacques_types::SessionManifest>, AppError> {
    Ok(Json(queries::load_archived_manifest(&state.paths, &id)?))
}

enum OpEvent {
    Progress(Progress),
    Complete(ArchiveSummary),
    Failed(String),
}

async fn initialize_sse(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    run_archive_op(state, |paths, report, cancel| {
        jacques_runtime::initialize_archive(paths, report, cancel)
    })
    .await
}

async fn rebuild_sse(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    run_archive_op(state, |paths, report, _cancel| {
        jacques_runtime::rebuild_index(paths, report)
    })
    .await
}

async fn run_archive_op<F>(
    state: AppState,
    op: F,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError>
where
    F: FnOnce(
            &jacques_types::JacquesPaths,
            &mut dyn FnMut(Progress),
            &AtomicBool,
        ) -> jacques_runtime::Result<ArchiveSummary>
        + Send
        + 'static,
{
    let guard = state
        .archive_op
        .clone()
        .try_lock_owned()
        .map_err(|_| AppError::conflict("an archive operation is already running"))?;

    let (tx, rx) = mpsc::channel::<OpEvent>(64);
    let paths = state.paths.clone();

    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        let cancel = AtomicBool::new(false);
        let progress_tx = tx.clone();
        let mut report = move |p: Progress| {
            let _ = progress_tx.blocking_send(OpEvent::Progress(p));
        };
        match op(&paths, &mut report, &cancel) {
            Ok(summary) => {
                let _ = tx.blocking_send(OpEvent::Complete(summary));
            }
            Err(e) => {
                let _ = tx.blocking_send(OpEvent::Failed(e.to_string()));
            }
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let sse = match &event {
            OpEvent::Progress(p) => Event::default().event("progress").json_data(p),
            OpEvent::Complete(s) => Event::default().event("complete").json_data(s),
            OpEvent::Failed(msg) => Event::default().event("error").json_data(msg),
        }
        .unwrap_or_default();
        Some((Ok(sse), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
