use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use std::sync::Arc;

mod api;
mod attendance;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod gate;
mod model;
mod models;
mod policy;
mod routes;
mod utils;

use attendance::{AttendanceStore, repository::MySqlAttendanceRepository};
use config::Config;
use db::init_db;
use gate::{location::LocationGate, network::build_pipeline};

use crate::docs::ApiDoc;
use crate::utils::{email_cache, email_filter};
use tracing::{error, info};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(Config::log_level_from_env())
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let config = Config::from_env().inspect_err(|e| error!(error = %e, "Invalid configuration"))?;

    let pool = init_db(&config.database_url).await?;

    let policies = config.policies.clone();
    let network_pipeline = Data::new(build_pipeline(&policies.network));
    let location_gate = Data::new(LocationGate::from_policies(&policies));
    let store = Data::new(AttendanceStore::new(
        Arc::new(MySqlAttendanceRepository::new(pool.clone())),
        policies.school.clone(),
    ));
    let policies = Data::new(policies);

    info!(
        network_gates = ?network_pipeline.gate_names(),
        utc_offset = %store.policy().utc_offset,
        radius_km = store.policy().radius_km,
        "Gates configured"
    );

    let pool_for_filter_warmup = pool.clone();
    let pool_for_cache_warmup = pool.clone();

    actix_web::rt::spawn(async move {
        if let Err(e) = email_filter::warmup_email_filter(&pool_for_filter_warmup, 500).await {
            error!(error = ?e, "Failed to warm up email filter");
        }
    });

    actix_web::rt::spawn(async move {
        // accounts touched in the last 30 days, 250 per batch
        if let Err(e) = email_cache::warmup_email_cache(&pool_for_cache_warmup, 30, 250).await {
            error!(error = ?e, "Failed to warm up email cache");
        }
    });

    let server_addr = config.server_addr.clone();
    info!(%server_addr, "Listening");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard so JS/CSS assets resolve
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(policies.clone())
            .app_data(network_pipeline.clone())
            .app_data(location_gate.clone())
            .app_data(store.clone())
            .configure(|cfg| routes::configure(cfg, config.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
