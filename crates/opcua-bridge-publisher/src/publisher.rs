//! Event publisher with lazy, queued connection establishment.

use async_trait::async_trait;
use opcua_bridge_core::{
    BrokerChannel, BrokerClient, BrokerConnection, BrokerError, EventSink, ExchangeOptions,
    NormalizedEvent, PublishError, Waiter,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

/// Where events are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSettings {
    /// Target exchange
    pub exchange: String,
    /// Exchange type (`topic`, `fanout`, ...)
    pub exchange_type: String,
    /// Exchange declaration options
    pub exchange_options: ExchangeOptions,
    /// Routing key of every event
    pub routing_key: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            exchange: "opcua".to_string(),
            exchange_type: "topic".to_string(),
            exchange_options: ExchangeOptions::default(),
            routing_key: "events".to_string(),
        }
    }
}

/// Lifecycle of the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection
    Absent,
    /// Connect sequence in progress
    Establishing,
    /// Channel open and exchange asserted
    Ready,
}

struct Link<B: BrokerClient> {
    connection: B::Connection,
    channel: <B::Connection as BrokerConnection>::Channel,
}

type LinkResult<B> = Result<Arc<Link<B>>, BrokerError>;

struct Inner<B: BrokerClient> {
    settings: PublishSettings,
    link: Waiter<LinkResult<B>>,
    state: Mutex<ConnectionState>,
    closed: AtomicBool,
}

impl<B: BrokerClient> Inner<B> {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Publishes normalized events to one exchange.
pub struct EventPublisher<B: BrokerClient> {
    inner: Arc<Inner<B>>,
    connect_task: JoinHandle<()>,
}

impl<B: BrokerClient> EventPublisher<B> {
    /// Create the publisher and start connecting in the background.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(client: B, settings: PublishSettings) -> Self {
        let inner = Arc::new(Inner {
            settings,
            link: Waiter::new(),
            state: Mutex::new(ConnectionState::Establishing),
            closed: AtomicBool::new(false),
        });

        let connect_task = tokio::spawn(establish(client, Arc::clone(&inner)));

        Self {
            inner,
            connect_task,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Calls currently waiting for the connection.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.link.waiting()
    }

    /// Publish settings.
    #[must_use]
    pub fn settings(&self) -> &PublishSettings {
        &self.inner.settings
    }

    /// Serialize `event` and publish it, waiting for the connection if needed.
    ///
    /// # Errors
    ///
    /// Returns error if the publisher is closed, the connection could not be
    /// established, or the broker rejects the message.
    pub async fn publish(&self, event: &NormalizedEvent) -> Result<(), PublishError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }

        let link = self.inner.link.get().await?;
        let payload = event
            .to_json()
            .map_err(|e| PublishError::Serialize(e.to_string()))?;

        let settings = &self.inner.settings;
        tracing::debug!(
            exchange = %settings.exchange,
            routing_key = %settings.routing_key,
            event_id = %event.id,
            payload_len = payload.len(),
            "Publishing event"
        );

        link.channel
            .publish(&settings.exchange, &settings.routing_key, payload)
            .await?;

        Ok(())
    }

    /// Close the connection once it is established.
    ///
    /// Later calls, and a close after a failed connect, do nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the broker fails to close the connection.
    pub async fn close(&self) -> Result<(), PublishError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let link = match self.inner.link.get().await {
            Ok(link) => link,
            Err(err) => {
                tracing::debug!(error = %err, "Broker never connected, nothing to close");
                return Ok(());
            }
        };

        self.inner.set_state(ConnectionState::Absent);
        link.connection.close().await?;

        tracing::info!(exchange = %self.inner.settings.exchange, "Broker connection closed");
        Ok(())
    }
}

impl<B: BrokerClient> Drop for EventPublisher<B> {
    fn drop(&mut self) {
        self.connect_task.abort();
    }
}

#[async_trait]
impl<B: BrokerClient> EventSink for EventPublisher<B> {
    async fn publish(&self, event: NormalizedEvent) -> Result<(), PublishError> {
        EventPublisher::publish(self, &event).await
    }

    async fn close(&self) -> Result<(), PublishError> {
        EventPublisher::close(self).await
    }
}

/// Connect, open a channel and assert the exchange, then release waiters.
async fn establish<B: BrokerClient>(client: B, inner: Arc<Inner<B>>) {
    let settings = &inner.settings;
    let result = connect(&client, settings).await;

    match &result {
        Ok(_) => {
            tracing::info!(
                exchange = %settings.exchange,
                exchange_type = %settings.exchange_type,
                "Broker connection ready"
            );
            inner.set_state(ConnectionState::Ready);
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to connect to broker");
            inner.set_state(ConnectionState::Absent);
        }
    }

    if inner.link.set(result).is_err() {
        tracing::warn!("Broker connection assigned twice, keeping the first");
    }
}

async fn connect<B: BrokerClient>(
    client: &B,
    settings: &PublishSettings,
) -> Result<Arc<Link<B>>, BrokerError> {
    let connection = client.connect().await?;

    let channel = match connection.open_channel().await {
        Ok(channel) => channel,
        Err(err) => {
            let _ = connection.close().await;
            return Err(err);
        }
    };

    if let Err(err) = channel
        .assert_exchange(
            &settings.exchange,
            &settings.exchange_type,
            &settings.exchange_options,
        )
        .await
    {
        let _ = connection.close().await;
        return Err(err);
    }

    Ok(Arc::new(Link {
        connection,
        channel,
    }))
}
