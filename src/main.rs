use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use veggie_scan::{
    app_state::AppState,
    config::AppConfig,
    db, routes,
    services::{
        broker::TaskBroker,
        dataset::{DatasetSink, MemoryDataset, PgDataset},
        inference::InferenceClient,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing veggie-scan server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    metrics::describe_counter!(
        "analysis_requests_total",
        "Analysis attempts by fallback stage and outcome"
    );
    metrics::describe_histogram!(
        "analysis_duration_seconds",
        "End-to-end time to produce a verdict"
    );
    metrics::describe_counter!("broker_tasks_submitted_total", "Tasks submitted to the broker");
    metrics::describe_counter!("broker_tasks_completed_total", "Tasks answered by a worker");
    metrics::describe_counter!("broker_tasks_failed_total", "Tasks a worker reported as failed");
    metrics::describe_counter!(
        "broker_tasks_requeued_total",
        "Tasks returned to the queue after their worker left"
    );
    metrics::describe_gauge!("broker_pending_tasks", "Tasks waiting for a worker");
    metrics::describe_gauge!("broker_connected_workers", "Open worker connections");

    // Dataset store: PostgreSQL when configured, in-memory otherwise
    let dataset: Arc<dyn DatasetSink> = match config.database_url.as_deref() {
        Some(database_url) => {
            tracing::info!("Connecting to PostgreSQL database");
            let pool = db::init_pool(database_url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running database migrations");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");

            Arc::new(PgDataset::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping the dataset in memory");
            Arc::new(MemoryDataset::new())
        }
    };

    tracing::info!(
        base_url = %config.inference_base_url,
        model = %config.inference_model,
        "Initializing inference client"
    );
    let inference = InferenceClient::new(
        &config.inference_base_url,
        &config.inference_chat_path,
        &config.inference_model,
        config.inference_timeout(),
    )
    .expect("Failed to initialize inference client");

    let broker = Arc::new(TaskBroker::new(config.broker_settings()));
    if broker.is_enabled() {
        tracing::info!("Worker mode enabled");
    } else {
        tracing::info!("Worker mode disabled, analysis goes straight to the inference endpoint");
    }
    tokio::spawn(broker.clone().run());

    let state = AppState::new(
        broker,
        inference,
        dataset,
        prometheus_handle,
        config.worker_task_timeout(),
        config.worker_ping_interval(),
    );

    let app = routes::router(state);

    tracing::info!("Starting veggie-scan on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
