//! HTTP listener and process lifecycle

use crate::config::ProxyConfig;
use crate::handler::RequestHandler;
use crate::signer::SignerDirectory;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use eyre::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A configured proxy that has not started listening yet
pub struct SignerProxy {
    listen_addr: String,
    handler: Arc<RequestHandler>,
}

impl SignerProxy {
    pub fn new(config: &ProxyConfig, directory: SignerDirectory) -> Result<Self> {
        config.validate()?;
        if config.chain_id.is_none() {
            tracing::warn!("No chain id configured: transactions are signed without replay protection");
        }

        let handler = RequestHandler::new(config, Arc::new(directory))?;
        Ok(Self {
            listen_addr: config.listen_addr(),
            handler: Arc::new(handler),
        })
    }

    /// Bind the listener and start serving in the background
    pub async fn start(self) -> Result<RunningProxy> {
        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.listen_addr))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read listener address")?;

        let app = Router::new()
            .route("/", post(rpc))
            .route("/upcheck", get(upcheck))
            .with_state(self.handler);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        tracing::info!("Signing proxy listening on {}", local_addr);
        Ok(RunningProxy {
            local_addr,
            shutdown_tx,
            server,
        })
    }
}

async fn rpc(
    State(handler): State<Arc<RequestHandler>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handler.handle(headers, body).await.into_response()
}

async fn upcheck() -> &'static str {
    "I'm up!"
}

/// Handle to a listening proxy
pub struct RunningProxy {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    server: JoinHandle<std::io::Result<()>>,
}

impl RunningProxy {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait at most `grace` for in-flight requests
    pub async fn shutdown(self, grace: Duration) -> Result<()> {
        tracing::info!("Shutting down signing proxy");
        let _ = self.shutdown_tx.send(());

        let mut server = self.server;
        match tokio::time::timeout(grace, &mut server).await {
            Ok(joined) => joined
                .context("Server task failed")?
                .context("Server error"),
            Err(_) => {
                tracing::warn!("In-flight requests still running after {:?}; aborting", grace);
                server.abort();
                Ok(())
            }
        }
    }
}
