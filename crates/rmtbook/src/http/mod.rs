//! JSON HTTP API.
//!
//! Routes are grouped by who may call them:
//!
//! - [`public`]: sign-up, sign-in, the booking catalog, availability, and
//!   the contact form.
//! - [`patient`]: everything under `/api/patient`.
//! - [`rmt`]: everything under `/api/rmt`.
//!
//! The session middleware enforces the role of each group, so handlers
//! only need the [`Session`](crate::auth::Session) extractor to learn who
//! is calling.

mod patient;
mod public;
mod rmt;

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{session_middleware, SessionKeys};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::jobs::{JobContext, JobManager};
use crate::model::Email;
use crate::notify::{dispatch, LogMailer, Mailer};
use crate::storage::Storage;

/// Shared state of every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Practice database.
    pub storage: Arc<Mutex<Storage>>,
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Session token keys.
    pub sessions: SessionKeys,
    /// Outgoing mail.
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Bundle the pieces a server needs.
    #[must_use]
    pub fn new(
        storage: Storage,
        config: Config,
        sessions: SessionKeys,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            config: Arc::new(config),
            sessions,
            mailer,
        }
    }

    /// The dependencies background jobs share with the handlers.
    #[must_use]
    pub fn job_context(&self) -> JobContext {
        JobContext {
            storage: Arc::clone(&self.storage),
            config: Arc::clone(&self.config),
            mailer: Arc::clone(&self.mailer),
        }
    }

    /// Send emails produced by an operation. Call after releasing the storage lock.
    async fn send(&self, emails: &[Email]) {
        dispatch(self.mailer.as_ref(), emails).await;
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(public::routes())
        .nest("/api/patient", patient::routes())
        .nest("/api/rmt", rmt::routes())
        .layer(from_fn_with_state(
            state.sessions.clone(),
            session_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run slow CPU-bound work, such as password hashing, on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::internal(format!("blocking task failed: {e}")))?
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Serve the API and run the background jobs until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the configuration is not servable, the database
/// cannot be opened, or the listener cannot bind.
pub async fn serve(config: Config) -> Result<()> {
    config.validate()?;
    let sessions = SessionKeys::from_config(&config)?;
    let storage = Storage::open(config.database_path())?;
    info!(path = %storage.path().display(), "Opened database");

    let state = AppState::new(storage, config, sessions, Arc::new(LogMailer));
    let jobs = JobManager::start_all(&state.job_context(), state.config.job_interval());

    let addr = state.config.socket_addr();
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Server listening");

    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Stopping background jobs");
    jobs.shutdown().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        } else {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
