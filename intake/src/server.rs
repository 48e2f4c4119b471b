use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::router;
use crate::store::EventStore;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    // Every server process starts with an empty store.
    let store = Arc::new(EventStore::new());

    let app = router::router(store, config.dev_mode, config.export_prometheus);

    let address = listener.local_addr().expect("failed to read bound address");
    tracing::info!("listening on {:?}", address);
    tracing::info!("DSN for SDK clients: http://public@{}/1", address);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap()
}
