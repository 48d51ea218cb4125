#[macro_use]
extern crate rocket;

mod aggregate;
mod api;
mod cors;
mod db;
mod env;
mod error;
mod models;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use std::sync::Arc;

use aggregate::AverageService;
use api::{
    api_class_average, api_create_progress, api_get_class_average, api_get_classroom_progress,
    api_get_student_progress, api_preflight, api_update_score, health,
};
use cors::Cors;
use db::{AnalyticsDb, PrimaryDb, SqliteAverageStore, SqliteScoreStore};
use env::AppConfig;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use telemetry::{TelemetryFairing, init_tracing};
use tracing::{error, info};

#[launch]
async fn rocket() -> _ {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    // Both connection strings are required up front; a missing
    // analytics URL is fatal before any store is touched.
    let config = AppConfig::from_env().expect("Incomplete service configuration");

    let primary = SqlitePool::connect(&config.database_url)
        .await
        .expect("Failed to connect to primary record store");

    let analytics = SqlitePool::connect(&config.analytics_database_url)
        .await
        .expect("Failed to connect to analytics store");

    info!("Running store migrations...");
    match sqlx::migrate!("./migrations").run(&primary).await {
        Ok(_) => info!("Primary store migrations completed"),
        Err(e) => {
            error!("Failed to run primary store migrations: {}", e);
            panic!("Primary store migration failed: {}", e);
        }
    }
    match sqlx::migrate!("./migrations_analytics").run(&analytics).await {
        Ok(_) => info!("Analytics store migrations completed"),
        Err(e) => {
            error!("Failed to run analytics store migrations: {}", e);
            panic!("Analytics store migration failed: {}", e);
        }
    }

    build_rocket(primary, analytics).await
}

pub async fn build_rocket(primary: SqlitePool, analytics: SqlitePool) -> Rocket<Build> {
    info!("Starting classroom analytics service");

    let service = AverageService::new(
        Arc::new(SqliteScoreStore::new(primary.clone())),
        Arc::new(SqliteAverageStore::new(analytics.clone())),
    );

    rocket::build()
        .manage(PrimaryDb(primary))
        .manage(AnalyticsDb(analytics))
        .manage(service)
        .mount(
            "/api",
            routes![
                api_class_average,
                api_preflight,
                api_get_classroom_progress,
                api_get_class_average,
                api_get_student_progress,
                api_create_progress,
                api_update_score,
                health,
            ],
        )
        .attach(TelemetryFairing)
        .attach(Cors)
}
