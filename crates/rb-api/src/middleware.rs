//! rusty-blog/crates/rb-api/src/middleware.rs Middleware
//!
//! Request logging, CORS and response hardening headers.

use actix_cors::Cors;
use actix_web::middleware::{DefaultHeaders, Logger};

/// Access log: remote-ip "request-line" status-code response-size "referrer" "user-agent" time.
pub fn standard_middleware() -> Logger {
    Logger::default()
}

// The session cookie is SameSite=Lax, so cross-origin writes carry no session.
pub fn cors_policy() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "DELETE"])
        .allow_any_header()
        .max_age(3600)
}

pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
        .add(("X-Frame-Options", "DENY"))
}
