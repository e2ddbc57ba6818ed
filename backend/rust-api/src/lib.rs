use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'; connect-src 'self'"),
    );
    response
}

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to specific origins in production

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/users", user_routes(app_state.clone()))
        .nest("/api/v1/admin", admin_auth_routes(app_state.clone()))
        .nest("/api/v1/events", event_routes(app_state.clone()))
        .nest("/api/v1/exams", exam_routes(app_state.clone()))
        .nest("/api/v1/results", result_routes(app_state.clone()))
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn user_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    let public_routes = Router::new()
        .route("/signup", post(handlers::auth::signup))
        .route("/login", post(handlers::auth::login))
        .route("/refresh-token", post(handlers::auth::refresh_token));

    let protected_routes = Router::new()
        .route("/logout", post(handlers::auth::logout))
        .route(
            "/profile",
            get(handlers::auth::get_profile).put(handlers::auth::update_profile),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/", get(handlers::auth::list_users))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes).merge(admin_routes)
}

fn admin_auth_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    let public_routes = Router::new()
        .route("/signup", post(handlers::auth::admin_signup))
        .route("/login", post(handlers::auth::admin_login));

    let protected_routes = Router::new()
        .route("/logout", post(handlers::auth::logout))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}

fn event_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    let public_routes = Router::new()
        .route("/", get(handlers::events::list_events))
        .route("/{event_id}", get(handlers::events::get_event));

    let protected_routes = Router::new()
        .route("/{event_id}/register", post(handlers::events::register))
        .route(
            "/{event_id}/feedback",
            post(handlers::events::submit_feedback),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/", post(handlers::events::create_event))
        .route(
            "/{event_id}",
            axum::routing::put(handlers::events::update_event)
                .delete(handlers::events::delete_event),
        )
        .route(
            "/{event_id}/attendance",
            post(handlers::events::mark_attendance),
        )
        .route(
            "/{event_id}/questions",
            get(handlers::events::list_questions).post(handlers::events::add_question),
        )
        .route(
            "/{event_id}/questions/{question_id}",
            delete(handlers::events::delete_question),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes).merge(admin_routes)
}

fn exam_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    let taker_routes = Router::new()
        .route("/{exam_id}", get(handlers::exams::get_exam))
        .route("/{exam_id}/submit", post(handlers::exams::submit_exam))
        .route("/{exam_id}/results", get(handlers::exams::exam_results))
        .route(
            "/{exam_id}/results/{result_id}/certificate",
            post(handlers::exams::issue_certificate),
        );

    let admin_routes = Router::new()
        .route(
            "/{exam_id}/results/{result_id}/answers/{answer_id}/evaluate",
            axum::routing::put(handlers::exams::evaluate_answer),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ));

    taker_routes
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn result_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    let user_routes = Router::new()
        .route("/leaderboard/{exam_id}", get(handlers::results::leaderboard))
        .route(
            "/performance/{user_id}",
            get(handlers::results::user_performance),
        )
        .route("/{result_id}", get(handlers::results::get_result));

    let admin_routes = Router::new()
        .route("/statistics", get(handlers::results::all_statistics))
        .route(
            "/statistics/{exam_id}",
            get(handlers::results::exam_statistics),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ));

    // Read-only aggregation endpoints get a hard timeout; the submission
    // path under /exams is deliberately not covered by it.
    user_routes
        .merge(admin_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}
