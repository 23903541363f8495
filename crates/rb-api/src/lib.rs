//! # rb-api
//!
//! The JSON routing layer for Rusty-Blog.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod session;

use actix_web::web;
use rb_core::AppError;

pub use error::ApiError;
pub use handlers::AppState;
pub use session::CookieSettings;

/// Configures the routes for the blog API.
///
/// # Developer Note
/// Everything lives under a single `/api` scope so the binary can mount
/// static assets or a frontend next to it. Static paths such as
/// `/posts/featured` are registered before `/posts/{id}`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        ApiError(AppError::validation(format!("invalid request body: {err}"))).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _| {
        ApiError(AppError::validation(format!("invalid path: {err}"))).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        ApiError(AppError::validation(format!("invalid query: {err}"))).into()
    }))
    .service(
        web::scope("/api")
            .route("/register", web::post().to(handlers::register))
            .route("/login", web::post().to(handlers::login))
            .route("/logout", web::post().to(handlers::logout))
            .route("/me", web::get().to(handlers::me))
            .route("/users/{username}", web::get().to(handlers::user_profile))
            .route("/posts", web::get().to(handlers::list_posts))
            .route("/posts", web::post().to(handlers::create_post))
            .route("/posts/featured", web::get().to(handlers::featured_posts))
            .route("/posts/slug/{slug}", web::get().to(handlers::get_post_by_slug))
            .route("/posts/{id}", web::delete().to(handlers::delete_post))
            .route("/posts/{id}/vote", web::post().to(handlers::vote_post))
            .route("/posts/{id}/replies", web::post().to(handlers::create_reply))
            .route("/replies/{id}/vote", web::post().to(handlers::vote_reply)),
    );
}
