use axum::extract::State;
use axum::routing::{get, put};
use axum::{Json, Router};
use jacques_types::NotificationSettings;

use crate::errors::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/config/notifications", get(get_notifications))
        .route("/config/notifications", put(put_notifications))
}

async fn get_notifications(State(state): State<AppState>) -> Json<NotificationSettings> {
    Json(state.pipeline.notification_settings())
}

async fn put_notifications(
    State(state): State<AppState>,
    Json(settings): Json<NotificationSettings>,
) -> Result<Json<NotificationSettings>, AppError> {
    state.pipeline.update_notification_settings(settings)?;
    Ok(Json(state.pipeline.notification_settings()))
}
