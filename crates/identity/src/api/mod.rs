//! HTTP surface of the identity service.
//!
//! - `identity` - sign-in, sign-up and sign-out (/api/identity/*)
//! - `account` - username, password, email and phone number maintenance
//! - `authorization` - roles and claims
//! - `health` - health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod account;
pub mod auth;
pub mod authorization;
pub mod error;
pub mod health;
pub mod identity;
pub mod openapi;

pub use account::ACCOUNT_TAG;
pub use authorization::AUTHORIZATION_TAG;
pub use health::MISC_TAG;
pub use identity::IDENTITY_TAG;

use crate::AppResources;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Build the application router with the API documentation mounted at `/api-docs`.
pub fn router(app_resources: AppResources) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest(
            "/api/identity",
            identity::router()
                .merge(account::router())
                .merge(authorization::router()),
        )
        .routes(routes!(health::health))
        .layer(axum::Extension(app_resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Serve the API until ctrl-c. Shutdown cancels in-flight provider calls.
#[tracing::instrument(skip(app_resources))]
pub async fn start_webserver(app_resources: AppResources) -> color_eyre::Result<()> {
    let addr = app_resources.config.listen_addr.clone();
    let shutdown = app_resources.shutdown.clone();
    let router = router(app_resources);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutting down");
        shutdown.cancel();
    })
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
