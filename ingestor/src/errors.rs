use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),

    #[error("Broker refused connection, return code {0:?}")]
    BrokerRefused(rumqttc::ConnectReturnCode),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Reading cannot be stored: {0}")]
    Unstorable(String),

    #[error("Store connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
