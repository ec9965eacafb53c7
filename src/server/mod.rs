/// HTTP API for document anchoring.
///
/// Handlers validate input, check subject ownership and call the anchoring
/// service. Ledger work never happens on the request path; it is picked up
/// by the background worker.
pub mod auth;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::access::SubjectAccess;
use crate::certificate::CertificateIssuer;
use crate::service::AnchorService;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: AnchorService,
    pub issuer: CertificateIssuer,
    /// Ownership collaborator consulted whenever a subject is involved.
    pub access: Arc<dyn SubjectAccess>,
    /// JWT verification secret.
    pub jwt_secret: String,
}

/// Build the Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::anchor_routes())
        .merge(routes::batch_routes())
        .merge(routes::verify_routes())
        .with_state(Arc::new(state))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> crate::error::Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(crate::error::AnchorError::Io)?;

    tracing::info!("Anchoring API listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(crate::error::AnchorError::Io)?;

    Ok(())
}
