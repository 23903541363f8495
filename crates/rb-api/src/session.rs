//! Session cookie plumbing.

use std::future::{ready, Ready};

use actix_web::cookie::time::Duration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use rb_core::Session;

use crate::handlers::AppState;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone)]
pub struct CookieSettings {
    /// Sets the `Secure` flag (production).
    pub secure: bool,
    pub max_age_days: i64,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self { secure: false, max_age_days: 7 }
    }
}

pub fn session_cookie(token: String, settings: &CookieSettings) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure)
        .max_age(Duration::days(settings.max_age_days))
        .finish()
}

/// Expired, empty cookie that makes the browser drop the session.
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();
    cookie.make_removal();
    cookie
}

/// Extractor for the optional logged-in session. Never fails: a missing,
/// forged or expired cookie simply yields `None`.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Option<Session>);

impl CurrentSession {
    pub fn as_ref(&self) -> Option<&Session> {
        self.0.as_ref()
    }
}

impl FromRequest for CurrentSession {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let session = req.app_data::<web::Data<AppState>>().and_then(|state| {
            req.cookie(SESSION_COOKIE)
                .and_then(|cookie| state.service.read_session(cookie.value()))
        });
        ready(Ok(CurrentSession(session)))
    }
}
