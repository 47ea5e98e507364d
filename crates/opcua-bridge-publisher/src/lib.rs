//! # OPC UA Bridge Publisher
//!
//! Delivers normalized events to a broker exchange.
//!
//! The [`EventPublisher`] starts connecting as soon as it is created.
//! Events published before the connection is ready wait for it instead of
//! failing, and a `close` requested during startup still closes the real
//! connection.
//!
//! Two broker clients are provided. [`AmqpBrokerClient`] declares the
//! exchange and publishes with confirms. [`MqttBrokerClient`] maps the
//! exchange and routing key onto the topic `{exchange}/{routing_key}`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod amqp;
pub mod mqtt;
pub mod publisher;

pub use amqp::{AmqpBrokerClient, AmqpSettings};
pub use mqtt::{parse_mqtt_url, MqttBrokerClient, MqttSettings};
pub use publisher::{ConnectionState, EventPublisher, PublishSettings};
