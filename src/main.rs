//! Voxroute server
//!
//! Accepts call requests, routes each one to the premium voice-agent platform
//! or the budget worker queue, and tracks every call through its lifecycle.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voxroute_api::configure_routes;
use voxroute_auth::{JwtService, WorkerToken};
use voxroute_core::traits::{CallEventRepository, CallRepository, UserRepository};
use voxroute_core::AppConfig;
use voxroute_db::{
    create_pool, run_migrations, PgCallEventRepository, PgCallRepository, PgUserRepository,
};
use voxroute_services::{CallController, ElevenLabsDispatcher};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "voxroute={lvl},voxroute_api={lvl},voxroute_services={lvl},voxroute_db={lvl},voxroute_auth={lvl},actix_web=info,sqlx=warn",
            lvl = log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match env::var("VOXROUTE_CONFIG_FILE") {
        Ok(path) => AppConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        Err(_) => AppConfig::load().context("Failed to load configuration")?,
    };
    Ok(config)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting Voxroute v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .context("Failed to create database pool")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    info!(
        max_connections = config.database.max_connections,
        "Database ready"
    );

    let users: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
    let calls: Arc<dyn CallRepository> = Arc::new(PgCallRepository::new(pool.clone()));
    let events: Arc<dyn CallEventRepository> = Arc::new(PgCallEventRepository::new(pool));

    let mut controller = CallController::new(
        users.clone(),
        calls,
        events,
        config.routing.clone(),
    );
    if config.premium.is_configured() {
        let dispatcher = ElevenLabsDispatcher::new(&config.premium)
            .context("Failed to build premium dispatcher")?;
        controller = controller.with_dispatcher(Arc::new(dispatcher));
        info!(base_url = %config.premium.base_url, "Premium route enabled");
    } else {
        warn!("Premium credentials not configured; every call takes the budget route");
    }

    let controller = web::Data::new(controller);
    let users = web::Data::from(users);
    let jwt_service = web::Data::new(JwtService::new(
        &config.auth.jwt_secret,
        config.auth.jwt_expiration_secs,
    ));
    let worker_token = web::Data::new(WorkerToken::new(config.auth.worker_token.clone()));

    if !worker_token.is_configured() {
        warn!("Worker token not configured; worker endpoints are open");
    }

    let cors_origins = env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let bind_addr = config.server_addr();
    let workers = config.server.workers;
    info!("Starting HTTP server on {} with {} workers", bind_addr, workers);

    HttpServer::new(move || {
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                origin.to_str().map_or(false, |origin_str| {
                    cors_origins_inner
                        .split(',')
                        .any(|o| o.trim() == origin_str)
                })
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .max_age(3600);

        App::new()
            .app_data(controller.clone())
            .app_data(users.clone())
            .app_data(jwt_service.clone())
            .app_data(worker_token.clone())
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_routes)
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await?;

    Ok(())
}
