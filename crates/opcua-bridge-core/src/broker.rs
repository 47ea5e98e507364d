//! Interface to the message broker and to event consumers.

use crate::event::NormalizedEvent;
use async_trait::async_trait;

/// Options used when asserting the target exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOptions {
    /// Survive broker restarts
    pub durable: bool,
    /// Delete when the last binding goes away
    pub auto_delete: bool,
    /// Not publishable by clients directly
    pub internal: bool,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            durable: true,
            auto_delete: false,
            internal: false,
        }
    }
}

/// Entry point of a broker client library.
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Connection type produced by this client.
    type Connection: BrokerConnection;

    /// Open a connection with the client's settings.
    async fn connect(&self) -> Result<Self::Connection, BrokerError>;
}

/// An open broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    /// Channel type multiplexed on this connection.
    type Channel: BrokerChannel;

    /// Open a channel.
    async fn open_channel(&self) -> Result<Self::Channel, BrokerError>;

    /// Close the connection and all its channels.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// A channel on a broker connection.
#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    /// Declare the exchange, creating it if missing.
    async fn assert_exchange(
        &self,
        name: &str,
        kind: &str,
        options: &ExchangeOptions,
    ) -> Result<(), BrokerError>;

    /// Hand one message to the broker.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), BrokerError>;
}

/// Consumer of normalized events.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Deliver one event.
    async fn publish(&self, event: NormalizedEvent) -> Result<(), PublishError>;

    /// Release the underlying resources.
    async fn close(&self) -> Result<(), PublishError>;
}

/// Errors reported by the broker client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Connection could not be established
    #[error("connection error: {0}")]
    Connect(String),
    /// Channel could not be opened
    #[error("channel error: {0}")]
    Channel(String),
    /// Exchange assertion failed
    #[error("exchange error: {0}")]
    Exchange(String),
    /// Message was not accepted
    #[error("publish error: {0}")]
    Publish(String),
    /// Closing the connection failed
    #[error("close error: {0}")]
    Close(String),
}

/// Errors surfaced to publishers of events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// Event could not be encoded
    #[error("serialize error: {0}")]
    Serialize(String),
    /// Broker rejected the operation
    #[error(transparent)]
    Broker(#[from] BrokerError),
    /// Publisher was closed
    #[error("publisher closed")]
    Closed,
}
