//! Route configuration.

use crate::error::ApiError;
use crate::handlers;
use crate::proxy;
use crate::state::AppState;
use axum::routing::{any, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/api/datasets",
            get(handlers::list_datasets).post(handlers::create_dataset),
        )
        .route(
            "/api/datasets/{id}",
            get(handlers::get_dataset)
                .put(handlers::update_dataset)
                .delete(handlers::delete_dataset),
        )
        .route("/api/datasets/{id}/publish", post(handlers::publish_dataset))
        .route(
            "/api/datasets/{id}/change_cumulative_state",
            post(handlers::change_cumulative_state),
        )
        .route(
            "/api/datasets/{id}/refresh_directory_content",
            post(handlers::refresh_directory_content),
        )
        .route("/api/lookup/dataset", get(handlers::lookup_dataset))
        .route(
            "/api/session",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        // health is intentionally unauthenticated for load balancers
        .route("/healthz", get(handlers::health_check));

    // the authorization proxy owns the upstream's browse prefixes wholesale
    let proxy_routes = Router::new()
        .route("/files/", any(proxy::handle))
        .route("/files/{*rest}", any(proxy::handle))
        .route("/directories/", any(proxy::handle))
        .route("/directories/{*rest}", any(proxy::handle));

    Router::new()
        .merge(api_routes)
        .merge(proxy_routes)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
