use crate::config::MqttSettings;
use crate::db::Connector;
use crate::errors::{Error, Result};
use crate::metrics::MESSAGES_TOTAL;
use crate::pipeline::handle;
use crate::supervisor::ConnectionSupervisor;
use crate::threshold::Thresholds;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, SubAck, SubscribeReasonCode,
};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REQUEST_CHANNEL_CAPACITY: usize = 10;
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Subscriber for the single readings topic.
pub struct Subscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
}

impl Subscriber {
    /// Connects to the broker and subscribes. Waits for the broker's CONNACK,
    /// so an unreachable or refusing broker is reported here.
    pub async fn connect(settings: &MqttSettings) -> Result<Self> {
        info!(
            "Connecting to MQTT broker at {}:{}",
            settings.broker, settings.port
        );

        let mut mqtt_options =
            MqttOptions::new(&settings.client_id, &settings.broker, settings.port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        tokio::time::timeout(settings.connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| Error::Timeout(settings.connect_timeout))??;

        info!(
            "Connected successfully to broker at {}",
            settings.broker
        );

        let subscriber = Self {
            client,
            eventloop,
            topic: settings.topic.clone(),
        };
        subscriber.subscribe().await?;
        Ok(subscriber)
    }

    async fn subscribe(&self) -> Result<()> {
        self.client
            .subscribe(&self.topic, QoS::AtLeastOnce)
            .await
            .map_err(Error::Mqtt)?;
        debug!("Subscription to {} requested", self.topic);
        Ok(())
    }

    /// Receive loop. Each message runs through the whole pipeline before the
    /// next one is polled. Returns once `shutdown` resolves.
    pub async fn run<C, F>(
        &mut self,
        supervisor: &mut ConnectionSupervisor<C>,
        thresholds: &Thresholds,
        shutdown: F,
    ) where
        C: Connector,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "Starting listener for topic '{}'... (Press CTRL+C to stop)",
            self.topic
        );

        loop {
            let notification = tokio::select! {
                _ = &mut shutdown => break,
                notification = self.eventloop.poll() => notification,
            };

            match notification {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    MESSAGES_TOTAL.inc();

                    debug!(
                        "Received message on topic {}, size: {} bytes",
                        publish.topic,
                        publish.payload.len()
                    );

                    handle(&publish.payload, supervisor, thresholds).await;
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    // Clean session: subscriptions do not survive a reconnect
                    info!("Reconnected to broker, resubscribing");
                    if let Err(e) = self.subscribe().await {
                        error!("Failed to resubscribe to {}: {}", self.topic, e);
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if subscription_granted(&ack) {
                        info!("Subscribed to {} with QoS 1", self.topic);
                    } else {
                        error!(
                            "Broker rejected subscription to {}: {:?}",
                            self.topic, ack.return_codes
                        );
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT error: {}", e);
                    // rumqttc reconnects on the next poll
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }

        info!("Stopping listener...");
    }

    /// Sends DISCONNECT and drives the event loop until it is flushed.
    pub async fn disconnect(mut self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("Failed to queue MQTT disconnect: {}", e);
            return;
        }

        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Event loop ended during disconnect: {}", e);
                        break;
                    }
                }
            }
        };

        if tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await.is_err() {
            warn!("Timed out waiting for MQTT disconnect");
        } else {
            info!("Disconnected from broker");
        }
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => {
                        error!("Failed to connect, return code {:?}", code);
                        Err(Error::BrokerRefused(code))
                    }
                };
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => {
                error!("Failed to connect, return code {:?}", code);
                return Err(Error::BrokerRefused(code));
            }
            Err(e) => return Err(Error::MqttConnection(e)),
        }
    }
}

/// True when the broker granted every filter in the SUBSCRIBE.
fn subscription_granted(ack: &SubAck) -> bool {
    !ack.return_codes.is_empty()
        && ack
            .return_codes
            .iter()
            .all(|code| matches!(code, SubscribeReasonCode::Success(_)))
}
