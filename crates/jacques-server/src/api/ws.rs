//! WebSocket bridge: each connection is one fan-out subscriber.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use jacques_runtime::SubscriberRequest;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (subscriber_id, mut rx) = state
        .pipeline
        .hub()
        .subscribe(state.pipeline.initial_state());
    let (mut sink, mut source) = futures::StreamExt::split(socket);

    let send_task = tokio::spawn(async move {
        use futures::SinkExt;
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound client requests until the socket closes.
    {
        use futures::StreamExt;
        let pipeline = state.pipeline.clone();
        while let Some(Ok(message)) = source.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            match serde_json::from_str::<SubscriberRequest>(&text) {
                Ok(request) => pipeline.handle_request(subscriber_id, request),
                Err(e) => {
                    tracing::debug!(error = %e, "ignoring malformed subscriber request");
                }
            }
        }
    }

    state.pipeline.hub().unsubscribe(subscriber_id);
    send_task.abort();
}
