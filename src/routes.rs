// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{admin, auth, gate, leaderboard, runner},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Assembles the main application router.
///
/// * Participant routes (gate, runner, leaderboard) are public.
/// * Admin routes sit behind `auth_middleware` then `admin_middleware`.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let auth_routes = Router::new().route("/login", post(auth::login));

    let participant_routes = Router::new()
        .route("/{key}", get(gate::resolve_quiz))
        .route("/{key}/start", post(gate::start_attempt))
        .route("/{key}/run", post(runner::open_run))
        .route("/{key}/leaderboard", get(leaderboard::get_leaderboard));

    let run_routes = Router::new()
        .route("/{attempt_id}", get(runner::get_run))
        .route("/{attempt_id}/answer", post(runner::submit_answer))
        .route("/{attempt_id}/finish", post(runner::finish_run));

    let admin_routes = Router::new()
        .route("/quizzes", get(admin::dashboard).post(admin::create_quiz))
        .route(
            "/quizzes/{id}",
            get(admin::get_quiz)
                .put(admin::update_quiz)
                .delete(admin::delete_quiz),
        )
        .route("/quizzes/{id}/toggle", post(admin::toggle_quiz))
        .route("/quizzes/{id}/questions", post(admin::add_question))
        .route("/quizzes/{id}/analytics", get(admin::quiz_analytics))
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        // Auth runs first, then the role check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/q", participant_routes)
        .nest("/api/runs", run_routes)
        .nest("/api/admin", admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
