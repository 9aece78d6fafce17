// ── HTTP API ──
//
// Routes under `/api/itops-alert-analysis/v1`: webhook intake, lookups by
// id, operator commands on problems, the analyzer callback and a debug
// view. Writes to problems go through the problem engine's command
// channel; reads go straight to the repositories.

mod debug;
mod error;
mod handlers;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::{info, warn};

use itops_alert_core::{Broker, ProblemHandle, Repositories};

pub use debug::{ProblemTree, TraceStep, TreeStatistics, build_tree};
pub use error::ApiError;

pub const API_PREFIX: &str = "/api/itops-alert-analysis/v1";

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<dyn Broker>,
    pub repos: Repositories,
    pub problems: ProblemHandle,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("problems", &self.problems)
            .finish_non_exhaustive()
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    let v1 = Router::new()
        .route("/events", post(handlers::ingest_event))
        .route("/events/info/{event_ids}", get(handlers::events_info))
        .route("/fault-points/info/{fault_ids}", get(handlers::fault_points_info))
        .route("/problems/info/{problem_ids}", get(handlers::problems_info))
        .route("/problems/{problem_id}/close", post(handlers::close_problem))
        .route("/problems/{problem_id}/root-cause", post(handlers::set_root_cause))
        .route("/problems/{problem_id}/rca-callback", post(handlers::rca_callback))
        .route("/debug/problem/{problem_id}/tree", get(debug::problem_tree));

    Router::new()
        .nest(API_PREFIX, v1)
        .route("/healthz", get(handlers::healthz))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            TraceLayer::new_for_http()
                .on_failure(DefaultOnFailure::new().level(tracing::Level::INFO)),
        )
        .with_state(state)
}

/// Serve until `cancel` fires, then let in-flight requests finish for at
/// most `grace`.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
    grace: Duration,
) -> std::io::Result<()> {
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        result = &mut server => result,
        () = cancel.cancelled() => {
            if let Ok(result) = tokio::time::timeout(grace, &mut server).await {
                info!("HTTP API stopped");
                result
            } else {
                warn!(grace_secs = grace.as_secs(), "HTTP API did not drain in time");
                Ok(())
            }
        }
    }
}
