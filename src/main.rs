use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::Data;
use actix_web::{App, HttpResponse, HttpServer, Responder, get};
use std::time::Duration;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod excel;
mod ingest;
mod model;
mod models;
mod routes;
mod utils;

use config::Config;
use db::init_db;
use routes::RateLimiters;
use utils::role_cache::{RoleCache, warmup_role_cache};

use crate::docs::ApiDoc;
use serde_json::json;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // also installs the `log` bridge, so actix Logger output lands here too
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!(addr = %config.server_addr, "Server starting...");

    let pool = init_db(&config).await?;
    let role_cache = RoleCache::new(Duration::from_secs(config.role_cache_ttl_secs));
    let limiters = RateLimiters::from_config(&config)?;

    let pool_for_cache_warmup = pool.clone();
    let cache_for_warmup = role_cache.clone();
    actix_web::rt::spawn(async move {
        // accounts seen in the last 30 days, in batches of 250
        if let Err(e) = warmup_role_cache(&cache_for_warmup, &pool_for_cache_warmup, 30, 250).await {
            warn!(error = %e, "Failed to warm up role cache");
        }
    });

    let server_addr = config.server_addr.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(Data::new(role_cache.clone()))
            .configure(routes::extractor_configs)
            .service(health)
            // auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, &config, &limiters))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
