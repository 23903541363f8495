//! # Rusty-Blog Binary
//!
//! The entry point that assembles the application based on compile-time features.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use rb_api::middleware::{cors_policy, security_headers, standard_middleware};
use rb_api::{configure_routes, AppState, CookieSettings};
use rb_config::Settings;
use rb_core::BlogService;
use tracing_subscriber::EnvFilter;

#[cfg(not(all(feature = "db-sqlite", feature = "auth-simple")))]
compile_error!("rusty-blog needs a storage plugin and an auth plugin: enable `db-sqlite` and `auth-simple`");

// Feature-gated imports: This is the "Compiled-to-Order" magic
#[cfg(feature = "db-sqlite")]
use rb_db_sqlite::SqliteBlogRepo;

#[cfg(feature = "auth-simple")]
use rb_auth_simple::SimpleAuthProvider;

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = rb_config::load().context("failed to load configuration")?;
    init_tracing(&settings);

    // 1. Initialize Database Implementation
    #[cfg(feature = "db-sqlite")]
    let repo = SqliteBlogRepo::connect(&settings.database.url, settings.database.max_connections)
        .await
        .with_context(|| format!("failed to open database {}", settings.database.url))?;

    // 2. Initialize Auth Implementation
    let ttl = chrono::Duration::days(settings.session.ttl_days);
    #[cfg(feature = "auth-simple")]
    let auth = match settings.session.secret_bytes() {
        Some(secret) => SimpleAuthProvider::new(secret, ttl)?,
        None => {
            tracing::warn!("session.secret is not set; sessions will not survive a restart");
            SimpleAuthProvider::with_random_secret(ttl)?
        }
    };

    let service = BlogService::new(Arc::new(repo), Arc::new(auth));

    if let Some((username, password)) = settings.admin.credentials() {
        service
            .ensure_admin(username, password)
            .await
            .context("failed to provision admin account")?;
    }

    let state = web::Data::new(AppState {
        service,
        cookies: CookieSettings {
            secure: settings.session.secure_cookie,
            max_age_days: settings.session.ttl_days,
        },
    });

    let (host, port) = settings.bind_address();
    tracing::info!(%host, port, "rusty-blog starting");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(security_headers())
            .wrap(cors_policy())
            .wrap(standard_middleware())
            .configure(configure_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    Ok(())
}
