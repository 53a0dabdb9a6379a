//! Serving an axum `Router` until the application shuts down.

use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, trace};

/// Serves `app` on `listener` until `shutdown_rx` changes or its sender drops.
///
/// In-flight requests are allowed to finish before the returned future
/// completes.
pub fn serve_until_shutdown(
    name: &'static str,
    listener: TcpListener,
    app: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> impl Future<Output = ()> {
    async move {
        let shutdown = async move {
            // An error means the sender is gone, which is a shutdown too.
            let _ = shutdown_rx.changed().await;
            trace!(server = name, "Server received shutdown signal.");
        };

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(server = name, "Server error: {}", e);
        }
        info!(server = name, "Server task finished.");
    }
}

/// The HTTP server for the alert endpoint.
pub struct ApiServer {
    listener: TcpListener,
    router: Router,
    shutdown_rx: watch::Receiver<bool>,
}

impl ApiServer {
    /// Creates a new `ApiServer` on an already-bound listener but does not spawn it.
    pub fn new(listener: TcpListener, router: Router, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            listener,
            router,
            shutdown_rx,
        }
    }

    /// Returns a future that runs the server until a shutdown signal is received.
    pub fn run(self) -> impl Future<Output = ()> {
        serve_until_shutdown("api", self.listener, self.router, self.shutdown_rx)
    }
}
