mod config;
mod entities;
mod error;
mod middleware;
mod models;
mod pagination;
mod routes;
mod services;
mod utils;

use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use tracing_subscriber::EnvFilter;

use routes::create_routes;
use services::billing::{BillingClient, StripeClient};
use services::cleanup::CleanupService;
use services::storage::StorageService;
use services::tts::SpeechSynthesizer;
use services::worker::Worker;
use services::AppState;

#[tokio::main]
async fn main() {
    // 1. Environment and logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("voxpdf=info,tower_http=info")),
        )
        .init();
    let config = config::get_config();

    // 2. Database
    let db = sea_orm::Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");
    Migrator::up(&db, None).await.expect("Failed to run migrations");

    // 3. Services
    let storage = StorageService::from_config();
    storage
        .ensure_dirs()
        .await
        .expect("Failed to create storage directories");
    let synthesizer = Arc::new(SpeechSynthesizer::from_config());
    let billing: Option<Arc<dyn BillingClient>> = config
        .stripe_secret_key
        .clone()
        .map(|key| Arc::new(StripeClient::new(key)) as Arc<dyn BillingClient>);
    if billing.is_none() {
        tracing::warn!("STRIPE_SECRET_KEY not set, checkout and cancellation are disabled");
    }

    let state = AppState {
        db: db.clone(),
        storage: storage.clone(),
        billing,
    };

    // 4. Background tasks: the conversion worker and the job-row sweeper
    let worker = Worker::new(db.clone(), storage, synthesizer);
    tokio::spawn(async move { worker.run().await });
    let cleanup = CleanupService::new(db);
    tokio::spawn(cleanup.run_scheduler());

    // 5. HTTP server
    let app = create_routes(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("Failed to bind port");
    println!("Listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}
