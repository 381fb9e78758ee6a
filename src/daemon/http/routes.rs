//! Control API routes, mounted under `/api/v1`

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::auth::{auth_middleware, AuthState};
use super::handlers::{self, AppState};

pub fn create_router(app_state: AppState, auth_state: AuthState) -> Router {
    let protected = Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .route(
            "/campaigns",
            get(handlers::list_campaigns).post(handlers::create_campaign),
        )
        .route("/campaigns/:id", get(handlers::get_campaign))
        .route("/campaigns/:id/iterations", get(handlers::list_iterations))
        .route("/campaigns/:id/recoveries", get(handlers::list_recoveries))
        .route("/campaigns/:id/cancel", post(handlers::cancel_campaign))
        .route("/campaigns/:id/recovery/reset", post(handlers::reset_recovery))
        .route("/campaigns/:id/dataset", get(handlers::get_dataset))
        .layer(middleware::from_fn_with_state(auth_state, auth_middleware));

    // Health stays reachable without a key
    let api_v1 = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            handlers::count_requests,
        ))
        .with_state(app_state);

    Router::new().nest("/api/v1", api_v1)
}
