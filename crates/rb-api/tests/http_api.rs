//! HTTP-level tests: the real router over an in-memory SQLite database.

use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::cookie::Cookie;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use actix_http::Request;
use rb_api::middleware::security_headers;
use rb_api::{configure_routes, AppState, CookieSettings};
use rb_auth_simple::SimpleAuthProvider;
use rb_core::BlogService;
use rb_db_sqlite::SqliteBlogRepo;
use serde_json::{json, Value};

async fn state() -> web::Data<AppState> {
    let repo = SqliteBlogRepo::new("sqlite::memory:").await.unwrap();
    let auth = SimpleAuthProvider::new(b"http-test-secret", chrono::Duration::days(7)).unwrap();
    let service = BlogService::new(Arc::new(repo), Arc::new(auth));
    service.ensure_admin("root", "rootpass").await.unwrap();
    web::Data::new(AppState { service, cookies: CookieSettings::default() })
}

/// Registers (if needed) and logs in, returning the session cookie.
async fn sign_in<S, B>(app: &S, username: &str) -> Cookie<'static>
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(json!({ "username": username, "password": "password1" }))
        .to_request();
    test::call_service(app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "username": username, "password": "password1" }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    resp.response()
        .cookies()
        .find(|c| c.name() == "session")
        .map(|c| c.into_owned())
        .unwrap()
}

#[actix_web::test]
async fn test_account_flow() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(json!({ "username": "alice", "password": "password1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["username"], "alice");
    assert_eq!(body["data"]["role"], "member");
    assert!(body["data"].get("password_hash").is_none());

    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(json!({ "username": "alice", "password": "password1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let cookie = sign_in(&app, "alice").await;
    assert_eq!(cookie.http_only(), Some(true));

    let req = test::TestRequest::get().uri("/api/me").cookie(cookie.clone()).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["username"], "alice");

    let req = test::TestRequest::post().uri("/api/logout").cookie(cookie).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let removal = resp.response().cookies().find(|c| c.name() == "session").unwrap();
    assert_eq!(removal.value(), "");

    let req = test::TestRequest::get().uri("/api/me").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert!(body["data"].is_null());
}

#[actix_web::test]
async fn test_login_failures_share_one_message() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure_routes)).await;
    sign_in(&app, "alice").await;

    let mut messages = Vec::new();
    for (user, pass) in [("alice", "wrong-pass"), ("nobody", "password1")] {
        let req = test::TestRequest::post()
            .uri("/api/login")
            .set_json(json!({ "username": user, "password": pass }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.response().cookies().next().is_none());
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        messages.push(body["error"].clone());
    }
    assert_eq!(messages[0], messages[1]);
}

#[actix_web::test]
async fn test_guest_writes_are_rejected() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .set_json(json!({ "title": "Hi", "content": "there" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);

    // A forged cookie is the same as none.
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(Cookie::new("session", "eyJ1c2VySWQiOiJ4In0.AAAA"))
        .set_json(json!({ "title": "Hi", "content": "there" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_post_thread_and_votes() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure_routes)).await;
    let alice = sign_in(&app, "alice").await;
    let bob = sign_in(&app, "bob").await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(alice.clone())
        .set_json(json!({ "title": "  Rust Tips  ", "content": "Use clippy" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["title"], "Rust Tips");
    let post_id = body["data"]["id"].as_str().unwrap().to_string();

    // Same vote twice retracts it.
    for expected in [1, 0] {
        let req = test::TestRequest::post()
            .uri(&format!("/api/posts/{post_id}/vote"))
            .cookie(bob.clone())
            .set_json(json!({ "type": "up" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["score"], expected);
    }

    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{post_id}/replies"))
        .cookie(bob.clone())
        .set_json(json!({ "text": "Nice" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let root_id = body["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{post_id}/replies"))
        .cookie(alice.clone())
        .set_json(json!({ "text": "Thanks", "parent_id": root_id }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let child_id = body["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/replies/{child_id}/vote"))
        .cookie(bob.clone())
        .set_json(json!({ "type": "down" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["score"], -1);
    assert_eq!(body["data"]["user_vote"], "down");

    let req = test::TestRequest::get()
        .uri("/api/posts/slug/rust-tips")
        .cookie(bob.clone())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let view = &body["data"];
    assert_eq!(view["slug"], "rust-tips");
    assert_eq!(view["reply_count"], 2);
    assert_eq!(view["can_delete"], false);
    assert_eq!(view["replies"][0]["text"], "Nice");
    assert_eq!(view["replies"][0]["children"][0]["text"], "Thanks");
    assert_eq!(view["replies"][0]["children"][0]["votes"]["user_vote"], "down");

    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::get().uri("/api/users/alice").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["user"]["username"], "alice");
    assert_eq!(body["data"]["replies"][0]["post_slug"], "rust-tips");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/posts/{post_id}"))
        .cookie(bob)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/posts/{post_id}"))
        .cookie(alice)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/api/posts/slug/rust-tips").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_admin_can_delete_any_post() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure_routes)).await;
    let alice = sign_in(&app, "alice").await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(alice)
        .set_json(json!({ "title": "Spam", "content": "buy now" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let post_id = body["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "username": "root", "password": "rootpass" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let admin = resp.response().cookies().find(|c| c.name() == "session").unwrap().into_owned();
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["role"], "admin");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/posts/{post_id}"))
        .cookie(admin)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_malformed_input_is_a_bad_request() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure_routes)).await;
    let alice = sign_in(&app, "alice").await;

    let req = test::TestRequest::post()
        .uri("/api/posts/not-a-uuid/vote")
        .cookie(alice.clone())
        .set_json(json!({ "type": "up" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(alice.clone())
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(alice.clone())
        .set_json(json!({ "title": "Votes", "content": "x" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let post_id = body["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{post_id}/vote"))
        .cookie(alice)
        .set_json(json!({ "type": "sideways" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_featured_limit() {
    let app = test::init_service(App::new().app_data(state().await).configure(configure_routes)).await;
    let alice = sign_in(&app, "alice").await;
    for i in 0..5 {
        let req = test::TestRequest::post()
            .uri("/api/posts")
            .cookie(alice.clone())
            .set_json(json!({ "title": format!("Post {i}"), "content": "x" }))
            .to_request();
        test::call_service(&app, req).await;
    }

    let req = test::TestRequest::get().uri("/api/posts/featured").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let req = test::TestRequest::get().uri("/api/posts/featured?limit=2").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[actix_web::test]
async fn test_security_headers() {
    let app = test::init_service(
        App::new()
            .app_data(state().await)
            .wrap(security_headers())
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let resp = test::call_service(&app, req).await;
    let headers = resp.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
}
