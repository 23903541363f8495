//! # rb-api Handlers
//!
//! Thin adapters between HTTP and [`BlogService`]: pull the session from the
//! cookie, decode the body, call the service, wrap the result in the
//! `{ "success": ..., "data" | "error": ... }` envelope.

use actix_web::{web, HttpResponse};
use rb_core::service::DEFAULT_FEATURED;
use rb_core::BlogService;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::session::{removal_cookie, session_cookie, CookieSettings, CurrentSession};

/// State shared across all Actix-web workers.
pub struct AppState {
    pub service: BlogService,
    pub cookies: CookieSettings,
}

type ApiResult = Result<HttpResponse, ApiError>;

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope { success: true, data })
}

fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(Envelope { success: true, data })
}

// Missing fields fall through to the service's own validation messages.

#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct NewPostForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct NewReplyForm {
    #[serde(default)]
    pub text: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct VoteForm {
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct FeaturedQuery {
    pub limit: Option<i64>,
}

// ── Accounts ────────────────────────────────────────────────────────────────

pub async fn register(data: web::Data<AppState>, form: web::Json<CredentialsForm>) -> ApiResult {
    let user = data.service.register(&form.username, &form.password).await?;
    Ok(created(user))
}

pub async fn login(data: web::Data<AppState>, form: web::Json<CredentialsForm>) -> ApiResult {
    let (session, token) = data.service.login(&form.username, &form.password).await?;
    Ok(HttpResponse::Ok()
        .cookie(session_cookie(token, &data.cookies))
        .json(Envelope { success: true, data: session }))
}

pub async fn logout(data: web::Data<AppState>, session: CurrentSession) -> HttpResponse {
    data.service.logout(session.as_ref());
    HttpResponse::Ok()
        .cookie(removal_cookie())
        .json(serde_json::json!({ "success": true }))
}

/// The logged-in user, or `null` for guests.
pub async fn me(data: web::Data<AppState>, session: CurrentSession) -> ApiResult {
    Ok(ok(data.service.current_user(session.as_ref()).await?))
}

pub async fn user_profile(
    data: web::Data<AppState>,
    session: CurrentSession,
    path: web::Path<String>,
) -> ApiResult {
    Ok(ok(data.service.get_user_profile(&path, session.as_ref()).await?))
}

// ── Posts ───────────────────────────────────────────────────────────────────

pub async fn list_posts(data: web::Data<AppState>, session: CurrentSession) -> ApiResult {
    Ok(ok(data.service.list_posts(session.as_ref()).await?))
}

pub async fn featured_posts(
    data: web::Data<AppState>,
    session: CurrentSession,
    query: web::Query<FeaturedQuery>,
) -> ApiResult {
    let limit = query.limit.unwrap_or(DEFAULT_FEATURED);
    Ok(ok(data.service.featured_posts(limit, session.as_ref()).await?))
}

pub async fn create_post(
    data: web::Data<AppState>,
    session: CurrentSession,
    form: web::Json<NewPostForm>,
) -> ApiResult {
    let post = data
        .service
        .create_post(session.as_ref(), &form.title, &form.content)
        .await?;
    Ok(created(post))
}

pub async fn get_post_by_slug(
    data: web::Data<AppState>,
    session: CurrentSession,
    path: web::Path<String>,
) -> ApiResult {
    Ok(ok(data.service.get_post_by_slug(&path, session.as_ref()).await?))
}

pub async fn delete_post(
    data: web::Data<AppState>,
    session: CurrentSession,
    path: web::Path<Uuid>,
) -> ApiResult {
    data.service.delete_post(session.as_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

pub async fn vote_post(
    data: web::Data<AppState>,
    session: CurrentSession,
    path: web::Path<Uuid>,
    form: web::Json<VoteForm>,
) -> ApiResult {
    let summary = data
        .service
        .vote_post(session.as_ref(), path.into_inner(), &form.kind)
        .await?;
    Ok(ok(summary))
}

// ── Replies ─────────────────────────────────────────────────────────────────

pub async fn create_reply(
    data: web::Data<AppState>,
    session: CurrentSession,
    path: web::Path<Uuid>,
    form: web::Json<NewReplyForm>,
) -> ApiResult {
    let reply = data
        .service
        .create_reply(session.as_ref(), path.into_inner(), &form.text, form.parent_id)
        .await?;
    Ok(created(reply))
}

pub async fn vote_reply(
    data: web::Data<AppState>,
    session: CurrentSession,
    path: web::Path<Uuid>,
    form: web::Json<VoteForm>,
) -> ApiResult {
    let summary = data
        .service
        .vote_reply(session.as_ref(), path.into_inner(), &form.kind)
        .await?;
    Ok(ok(summary))
}
