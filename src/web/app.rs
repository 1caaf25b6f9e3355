use super::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::get,
};
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

pub fn create_app(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;

    Router::new()
        // Capture page and photo upload share the root path
        .route("/", get(handlers::capture_page).post(handlers::upload_image))
        // Oversized uploads are rejected while buffering, before any parsing
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        // CorsLayer only lists methods and headers on preflights; repeat them on every response
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("content-type"),
        ))
        // Answers OPTIONS preflights and tags every response for the phone's browser
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
        // Add tracing for HTTP requests and responses
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        .with_state(state)
}
