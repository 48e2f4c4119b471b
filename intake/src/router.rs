use std::future::ready;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::ingest;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::store::EventStore;

#[derive(Clone)]
pub struct State {
    pub store: Arc<EventStore>,
    pub dev_mode: bool,
}

async fn index() -> &'static str {
    "intake"
}

pub fn router(store: Arc<EventStore>, dev_mode: bool, metrics: bool) -> Router {
    let state = State { store, dev_mode };

    let router = Router::new()
        // TODO: use NormalizePathLayer::trim_trailing_slash
        .route("/", get(index))
        .route("/api/event/:event_id", get(ingest::get_event))
        .route("/api/eventlist", get(ingest::list_events))
        .route("/api/eventlist/", get(ingest::list_events))
        .route("/api/flush", post(ingest::flush))
        .route("/api/flush/", post(ingest::flush))
        .route("/api/:project_id/store", post(ingest::store_event))
        .route("/api/:project_id/store/", post(ingest::store_event))
        .route("/api/:project_id/envelope", post(ingest::store_envelope))
        .route("/api/:project_id/envelope/", post(ingest::store_envelope))
        .route("/api/:project_id/security", post(ingest::store_security))
        .route("/api/:project_id/security/", post(ingest::store_security))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to.
    // Installing a global recorder when intake is used as a library (during
    // tests etc) does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();
        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
