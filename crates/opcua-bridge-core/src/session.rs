//! Interface to the automation-protocol client.
//!
//! The bridge does not implement the protocol stack itself. It drives a
//! [`RemoteClient`] to obtain a [`RemoteSession`], browses the address space
//! through it and registers monitored items whose change notifications are
//! delivered through a bounded [`NotificationReceiver`].

use crate::node::{NodeId, RemoteNode};
use crate::queue::NotificationReceiver;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Reference kinds followed when browsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceType {
    /// Any reference, used for the crawl roots
    All,
    /// `Organizes` (folder membership)
    Organizes,
    /// `HasComponent` (structural children)
    HasComponent,
}

/// One browse request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrowseDescription {
    /// Node whose references are returned
    pub node_id: NodeId,
    /// Reference kind to follow
    pub reference_type: ReferenceType,
}

impl BrowseDescription {
    /// Browse every reference of `node_id`.
    #[must_use]
    pub fn all(node_id: NodeId) -> Self {
        Self {
            node_id,
            reference_type: ReferenceType::All,
        }
    }

    /// Browse the `Organizes` references of `node_id`.
    #[must_use]
    pub fn organizes(node_id: NodeId) -> Self {
        Self {
            node_id,
            reference_type: ReferenceType::Organizes,
        }
    }

    /// Browse the `HasComponent` references of `node_id`.
    #[must_use]
    pub fn has_component(node_id: NodeId) -> Self {
        Self {
            node_id,
            reference_type: ReferenceType::HasComponent,
        }
    }
}

/// Parameters for the session's subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionParameters {
    /// Requested publishing interval
    pub publishing_interval: Duration,
    /// Requested lifetime count
    pub lifetime_count: u32,
    /// Requested max keep-alive count
    pub max_keep_alive_count: u32,
    /// Max notifications per publish response
    pub max_notifications_per_publish: u32,
    /// Whether publishing starts enabled
    pub publishing_enabled: bool,
    /// Relative priority
    pub priority: u8,
}

impl Default for SubscriptionParameters {
    fn default() -> Self {
        Self {
            publishing_interval: Duration::from_millis(1000),
            lifetime_count: 100,
            max_keep_alive_count: 10,
            max_notifications_per_publish: 100,
            publishing_enabled: true,
            priority: 10,
        }
    }
}

/// Which timestamps the server attaches to notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampsToReturn {
    /// Source timestamp only
    Source,
    /// Server timestamp only
    Server,
    /// Both timestamps
    Both,
    /// No timestamps
    Neither,
}

/// Sampling and queueing for one monitored item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingOptions {
    /// Server-side sampling interval
    pub sampling_interval: Duration,
    /// Pending notification bound
    pub queue_size: usize,
    /// Drop the oldest pending notification when full
    pub discard_oldest: bool,
    /// Timestamps to return
    pub timestamps: TimestampsToReturn,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_millis(100),
            queue_size: 10,
            discard_oldest: true,
            timestamps: TimestampsToReturn::Both,
        }
    }
}

/// Server-assigned subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u32);

/// Server-assigned monitored item identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitoredItemHandle(pub u32);

impl fmt::Display for MonitoredItemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle events of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Subscription accepted by the server
    Started,
    /// Keep-alive received with no data
    KeepAlive,
    /// Subscription ended
    Terminated,
}

/// A created subscription.
#[derive(Debug)]
pub struct Subscription {
    /// Subscription identifier
    pub handle: SubscriptionHandle,
    /// Lifecycle events
    pub status: mpsc::UnboundedReceiver<SubscriptionStatus>,
}

/// A created monitored item.
pub struct MonitoredItem {
    /// Monitored item identifier
    pub handle: MonitoredItemHandle,
    /// Change notifications for the item's Value attribute
    pub notifications: NotificationReceiver,
}

/// Client side of the protocol: connects and opens sessions.
#[async_trait]
pub trait RemoteClient: Send + Sync + 'static {
    /// Session type produced by this client.
    type Session: RemoteSession;

    /// Connect to a server endpoint.
    async fn connect(&mut self, endpoint: &str) -> Result<(), SessionError>;

    /// Open a session on the connected endpoint.
    async fn create_session(&mut self) -> Result<Self::Session, SessionError>;
}

/// An open session.
#[async_trait]
pub trait RemoteSession: Send + Sync + 'static {
    /// Create the subscription monitored items are attached to.
    async fn create_subscription(
        &self,
        parameters: &SubscriptionParameters,
    ) -> Result<Subscription, SessionError>;

    /// Return the nodes referenced from a node.
    async fn browse(&self, description: &BrowseDescription)
        -> Result<Vec<RemoteNode>, SessionError>;

    /// Monitor the Value attribute of a node.
    async fn create_monitored_item(
        &self,
        subscription: SubscriptionHandle,
        node_id: &NodeId,
        sampling: &SamplingOptions,
    ) -> Result<MonitoredItem, SessionError>;

    /// Close the session and its subscriptions.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Errors reported by the remote session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Connecting to the endpoint failed
    #[error("connect error: {0}")]
    Connect(String),
    /// Session used before `connect`
    #[error("not connected")]
    NotConnected,
    /// Session creation failed
    #[error("create session error: {0}")]
    CreateSession(String),
    /// Subscription creation failed
    #[error("create subscription error: {0}")]
    CreateSubscription(String),
    /// Browse request failed
    #[error("browse error: {0}")]
    Browse(String),
    /// Monitored item creation failed
    #[error("monitored item error: {0}")]
    MonitoredItem(String),
    /// Session already closed
    #[error("session closed")]
    Closed,
}
