mod telemetry;

use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use telemetry::SoilReading;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Publishes synthetic soil moisture readings
#[derive(Debug, Parser)]
#[command(name = "moisture-simulator", version)]
struct Args {
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    broker: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    port: u16,

    #[arg(long, env = "MQTT_TOPIC", default_value = "soil-moisture-topic")]
    topic: String,

    #[arg(long, env = "DEVICE_ID", default_value = "SIMULATOR_01")]
    device_id: String,

    /// Seconds between readings
    #[arg(long, env = "INTERVAL_SECS", default_value_t = 5)]
    interval_secs: u64,

    #[arg(long, default_value_t = 300)]
    min: i32,

    #[arg(long, default_value_t = 900)]
    max: i32,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.min > args.max {
        error!("--min ({}) must not exceed --max ({})", args.min, args.max);
        std::process::exit(1);
    }

    info!("Starting simulator");
    info!(
        "Broker: {}:{}, topic: {}, device: {}, interval: {}s",
        args.broker, args.port, args.topic, args.device_id, args.interval_secs
    );

    let client_id = format!("sim-{}", uuid::Uuid::new_v4());
    let mut mqtt_options = MqttOptions::new(&client_id, &args.broker, args.port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    if let Err(e) = wait_for_connack(&mut eventloop).await {
        error!(
            "Could not connect to broker at {}:{}: {}",
            args.broker, args.port, e
        );
        std::process::exit(1);
    }
    info!("Connected to broker at {}", args.broker);

    // Spawn eventloop handler
    let eventloop_handle = tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT eventloop error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    let mut rng = rand::thread_rng();
    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Simulator stopped");
                break;
            }
        }

        let reading = SoilReading::random(
            &mut rng,
            &args.device_id,
            args.min,
            args.max,
            Utc::now().timestamp(),
        );

        let payload = match serde_json::to_string(&reading) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize reading: {}", e);
                continue;
            }
        };

        match client
            .publish(&args.topic, QoS::AtLeastOnce, false, payload.clone())
            .await
        {
            Ok(_) => info!("Message published to '{}': {}", args.topic, payload),
            Err(e) => warn!("Failed to publish: {}", e),
        }
    }

    if let Err(e) = client.disconnect().await {
        warn!("Failed to disconnect cleanly: {}", e);
    }
    if tokio::time::timeout(Duration::from_secs(2), eventloop_handle)
        .await
        .is_err()
    {
        warn!("Timed out waiting for MQTT disconnect");
    }
    info!("Disconnected from broker");
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), rumqttc::ConnectionError> {
    let attempt = async {
        loop {
            if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
                return Ok::<(), rumqttc::ConnectionError>(());
            }
        }
    };

    match tokio::time::timeout(Duration::from_secs(10), attempt).await {
        Ok(result) => result,
        Err(_) => Err(rumqttc::ConnectionError::NetworkTimeout),
    }
}
