//! MQTT broker client.
//!
//! MQTT has no exchanges: asserting one is a no-op, and a message for
//! `exchange` with `routing_key` is published on the topic
//! `{exchange}/{routing_key}` with QoS 1.

use async_trait::async_trait;
use opcua_bridge_core::{
    BrokerChannel, BrokerClient, BrokerConnection, BrokerError, ExchangeOptions,
};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

/// Configuration for the MQTT broker client.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// MQTT broker URL (e.g., <tcp://localhost:1883>)
    pub broker_url: String,
    /// Client ID for MQTT connection
    pub client_id: String,
    /// Keep-alive interval
    pub keep_alive: Duration,
    /// Request channel capacity
    pub capacity: usize,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker_url: "tcp://localhost:1883".to_string(),
            client_id: "opcua-bridge".to_string(),
            keep_alive: Duration::from_secs(30),
            capacity: 100,
        }
    }
}

/// [`BrokerClient`] over MQTT.
#[derive(Debug, Clone)]
pub struct MqttBrokerClient {
    settings: MqttSettings,
}

impl MqttBrokerClient {
    /// Create a client; nothing is connected until [`BrokerClient::connect`].
    #[must_use]
    pub fn new(settings: MqttSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrokerClient for MqttBrokerClient {
    type Connection = MqttConnection;

    async fn connect(&self) -> Result<MqttConnection, BrokerError> {
        let (host, port) = parse_mqtt_url(&self.settings.broker_url)?;

        let mut mqtt_options = MqttOptions::new(&self.settings.client_id, host, port);
        mqtt_options.set_keep_alive(self.settings.keep_alive);

        let (client, eventloop) = AsyncClient::new(mqtt_options, self.settings.capacity);

        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(drive_event_loop(eventloop, ready_tx));

        match ready_rx.await {
            Ok(Ok(())) => Ok(MqttConnection { client, task }),
            Ok(Err(message)) => {
                task.abort();
                Err(BrokerError::Connect(message))
            }
            Err(_) => Err(BrokerError::Connect("event loop stopped".to_string())),
        }
    }
}

/// Poll the event loop; the first ConnAck or error is reported on `ready`.
async fn drive_event_loop(
    mut eventloop: EventLoop,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let mut ready = Some(ready);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("Connected to MQTT broker");
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("Disconnected from MQTT broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Err(e.to_string()));
                    break;
                }
                tracing::error!(error = %e, "MQTT error");
                // Try to reconnect after a delay
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

/// An MQTT connection and its event loop task.
pub struct MqttConnection {
    client: AsyncClient,
    task: JoinHandle<()>,
}

#[async_trait]
impl BrokerConnection for MqttConnection {
    type Channel = MqttChannel;

    async fn open_channel(&self) -> Result<MqttChannel, BrokerError> {
        Ok(MqttChannel {
            client: self.client.clone(),
        })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| BrokerError::Close(e.to_string()))
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Publishing handle sharing the connection's client.
pub struct MqttChannel {
    client: AsyncClient,
}

#[async_trait]
impl BrokerChannel for MqttChannel {
    async fn assert_exchange(
        &self,
        name: &str,
        kind: &str,
        _options: &ExchangeOptions,
    ) -> Result<(), BrokerError> {
        tracing::debug!(exchange = name, kind, "MQTT topics need no declaration");
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), BrokerError> {
        let topic = topic(exchange, routing_key);

        self.client
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| BrokerError::Publish(format!("{topic}: {e}")))
    }
}

/// Topic for an exchange and routing key.
fn topic(exchange: &str, routing_key: &str) -> String {
    match (exchange.is_empty(), routing_key.is_empty()) {
        (_, true) => exchange.to_string(),
        (true, false) => routing_key.to_string(),
        (false, false) => format!("{exchange}/{routing_key}"),
    }
}

/// Parse MQTT URL into host and port.
///
/// Accepts `tcp://`, `mqtt://` or a bare `host[:port]`; the port defaults
/// to 1883.
///
/// # Errors
///
/// Returns [`BrokerError::Connect`] for other schemes or a malformed address.
pub fn parse_mqtt_url(input: &str) -> Result<(String, u16), BrokerError> {
    if input.contains("://") {
        let url = Url::parse(input)
            .map_err(|e| BrokerError::Connect(format!("invalid MQTT URL {input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            scheme => {
                return Err(BrokerError::Connect(format!(
                    "invalid MQTT URL {input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url.host_str().ok_or_else(|| {
            BrokerError::Connect(format!("invalid MQTT URL {input}: missing host"))
        })?;
        let port = url.port().unwrap_or(1883);

        return Ok((host.to_string(), port));
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BrokerError::Connect(format!("invalid MQTT URL {input}: missing host")))?;
    let port = match parts.next() {
        None => 1883,
        Some(port) => port.parse().map_err(|_| {
            BrokerError::Connect(format!("invalid MQTT URL {input}: invalid port '{port}'"))
        })?,
    };
    if parts.next().is_some() {
        return Err(BrokerError::Connect(format!(
            "invalid MQTT URL {input}: too many ':' separators"
        )));
    }

    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mqtt_url_tcp() {
        let (host, port) = parse_mqtt_url("tcp://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_default_port() {
        let (host, port) = parse_mqtt_url("mqtt://broker.example.com").unwrap();
        assert_eq!(host, "broker.example.com");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_no_scheme() {
        let (host, port) = parse_mqtt_url("10.0.0.5:1884").unwrap();
        assert_eq!(host, "10.0.0.5");
        assert_eq!(port, 1884);
    }

    #[test]
    fn parse_mqtt_url_rejects_amqp_scheme() {
        assert!(matches!(
            parse_mqtt_url("amqp://localhost:5672"),
            Err(BrokerError::Connect(_))
        ));
    }

    #[test]
    fn topic_joins_exchange_and_routing_key() {
        assert_eq!(topic("plant", "line-1"), "plant/line-1");
        assert_eq!(topic("plant", ""), "plant");
        assert_eq!(topic("", "line-1"), "line-1");
    }

    #[tokio::test]
    async fn connect_to_unreachable_broker_fails() {
        let client = MqttBrokerClient::new(MqttSettings {
            broker_url: "tcp://127.0.0.1:1".to_string(),
            ..MqttSettings::default()
        });

        assert!(matches!(
            client.connect().await,
            Err(BrokerError::Connect(_))
        ));
    }
}
