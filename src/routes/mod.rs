use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod applications;
pub mod auth;
pub mod health;
pub mod jobs;
pub mod messages;
pub mod milestones;
pub mod reviews;
pub mod users;

const MAX_BODY_BYTES: usize = 1024 * 1024;

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        tracing::warn!(origin = %value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let auth_routes = Router::new().route("/me", get(auth::me));

    let users_routes = Router::new()
        .route("/", post(users::register_user))
        .route(
            "/me",
            get(users::current_user).put(users::update_current_user),
        )
        .route("/:id", get(users::get_user_profile))
        .route("/:id/reviews", get(reviews::list_user_reviews));

    // Reads are public; writes authenticate through the handler's extractor.
    let jobs_routes = Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::create_job))
        .route(
            "/:id",
            get(jobs::get_job)
                .put(jobs::update_job)
                .delete(jobs::delete_job),
        )
        .route("/:id/milestones", get(milestones::list_job_milestones))
        .route("/:id/apply", post(applications::apply_to_job))
        .route(
            "/:id/applications",
            get(applications::list_job_applications),
        );

    let applications_routes = Router::new()
        .route("/mine", get(applications::list_my_applications))
        .route(
            "/:id/status",
            put(applications::update_application_status),
        );

    let milestones_routes =
        Router::new().route("/:id/status", put(milestones::update_milestone_status));

    let reviews_routes = Router::new().route("/", post(reviews::create_review));

    let messages_routes = Router::new()
        .route(
            "/",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/unread-count", get(messages::unread_count))
        .route("/:id", get(messages::get_thread))
        .route("/:id/read", put(messages::mark_message_read));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/applications", applications_routes)
        .nest("/api/milestones", milestones_routes)
        .nest("/api/reviews", reviews_routes)
        .nest("/api/messages", messages_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .nest("/api/users", users_routes)
        .nest("/api/jobs", jobs_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
