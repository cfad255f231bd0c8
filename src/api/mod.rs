mod crm;
mod email;
pub mod error;
pub mod metrics;
mod push;
mod session;

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post, MethodRouter},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;
use error::ApiError;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Browser pre-flight is answered by the CORS layer; handlers never see OPTIONS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let api_routes = Router::new()
        // CRM and mail
        .route("/send-to-crm", only(post(crm::send_to_crm)))
        .route("/send-email", only(post(email::send_email)))
        // Web push
        .route("/push-notify", only(post(push::push_notify)))
        .route(
            "/save-subscription",
            only(post(push::save_subscription).delete(push::remove_subscription)),
        )
        // Page sessions
        .route("/session", only(post(session::resolve_session)))
        .route("/sign-out", only(post(session::sign_out)));

    Router::new()
        .route("/health", only(get(health_check)))
        .route("/metrics", only(get(metrics::metrics_endpoint)))
        .nest("/api", api_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Answer unlisted methods with the JSON 405 body.
fn only(route: MethodRouter<Arc<AppState>>) -> MethodRouter<Arc<AppState>> {
    route.fallback(method_not_allowed)
}

async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

async fn health_check() -> &'static str {
    "OK"
}
