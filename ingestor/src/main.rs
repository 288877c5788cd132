use axum::{routing::get, Router};
use moisture_ingestor::config::Config;
use moisture_ingestor::db::{self, PgConnector};
use moisture_ingestor::metrics;
use moisture_ingestor::mqtt::Subscriber;
use moisture_ingestor::rest;
use moisture_ingestor::supervisor::ConnectionSupervisor;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting soil moisture ingestor");
    info!("MQTT broker: {}:{}", config.mqtt.broker, config.mqtt.port);
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", config.redacted_database_url());
    info!(
        "Thresholds: dry < {}, wet > {}",
        config.thresholds.dry_limit, config.thresholds.wet_limit
    );

    if let Err(e) = metrics::init_metrics() {
        error!("Failed to register metrics: {}", e);
    }

    // The subscriber loop must not start without a live store connection
    let connector = PgConnector::new(config.database_url.clone(), config.connect_timeout);
    let mut supervisor = match ConnectionSupervisor::start(connector, config.connect_timeout).await {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("FATAL: Could not connect to database on startup: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match db::make_pool(&config.database_url, config.connect_timeout).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to create read pool: {}", e);
            supervisor.close().await;
            std::process::exit(1);
        }
    };

    let mut subscriber = match Subscriber::connect(&config.mqtt).await {
        Ok(subscriber) => subscriber,
        Err(e) => {
            error!(
                "Could not connect to MQTT broker at {}:{}: {}",
                config.mqtt.broker, config.mqtt.port, e
            );
            supervisor.close().await;
            std::process::exit(1);
        }
    };

    // Build HTTP app with REST API and metrics endpoint
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(pool));

    let listener = match tokio::net::TcpListener::bind(&config.http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.http_addr, e);
            supervisor.close().await;
            subscriber.disconnect().await;
            std::process::exit(1);
        }
    };

    info!("HTTP server listening on {}", config.http_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    subscriber
        .run(&mut supervisor, &config.thresholds, shutdown)
        .await;

    supervisor.close().await;
    subscriber.disconnect().await;
    info!("Disconnected from broker and database");
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
