use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod cars;
pub mod error;
pub mod hotel;
pub mod payments;
pub mod state;
pub mod webhooks;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    Router::new()
        .route("/healthz", get(healthz))
        .merge(hotel::routes())
        .merge(cars::routes())
        .merge(payments::routes())
        .route("/v1/webhooks/payments", post(webhooks::handle_gateway_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "OK"
}
