//! In-memory address space.
//!
//! Implements [`RemoteClient`] and [`RemoteSession`] over a graph held in
//! memory, for offline dry runs and tests. Value changes are injected with
//! [`MemoryAddressSpace::push_value`] and reach every monitored item of the
//! node.

use crate::node::{NodeId, RemoteNode};
use crate::queue::{notification_queue, NotificationSender};
use crate::session::{
    BrowseDescription, MonitoredItem, MonitoredItemHandle, ReferenceType, RemoteClient,
    RemoteSession, SamplingOptions, SessionError, Subscription, SubscriptionHandle,
    SubscriptionParameters, SubscriptionStatus,
};
use crate::value::DataValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Default)]
struct Inner {
    references: HashMap<NodeId, Vec<(ReferenceType, RemoteNode)>>,
    browse_counts: HashMap<NodeId, usize>,
    monitored: Vec<(NodeId, MonitoredItemHandle, NotificationSender)>,
    status: Vec<mpsc::UnboundedSender<SubscriptionStatus>>,
    connect_error: Option<String>,
    subscription_error: Option<String>,
    browse_errors: HashMap<NodeId, String>,
    endpoint: Option<String>,
    next_handle: u32,
    closed: bool,
}

impl Inner {
    fn next_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Shared handle to an in-memory address space.
#[derive(Clone, Default)]
pub struct MemoryAddressSpace {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAddressSpace {
    /// Create an empty address space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a reference from `parent` to `child`.
    pub fn add_reference(
        &self,
        parent: impl Into<NodeId>,
        reference_type: ReferenceType,
        child: RemoteNode,
    ) -> &Self {
        self.lock()
            .references
            .entry(parent.into())
            .or_default()
            .push((reference_type, child));
        self
    }

    /// Make `connect` fail with `message`.
    pub fn fail_connect(&self, message: &str) {
        self.lock().connect_error = Some(message.to_string());
    }

    /// Make `create_subscription` fail with `message`.
    pub fn fail_subscription(&self, message: &str) {
        self.lock().subscription_error = Some(message.to_string());
    }

    /// Make every browse of `node_id` fail with `message`.
    pub fn fail_browse(&self, node_id: impl Into<NodeId>, message: &str) {
        self.lock()
            .browse_errors
            .insert(node_id.into(), message.to_string());
    }

    /// A client connecting to this address space.
    #[must_use]
    pub fn client(&self) -> MemoryClient {
        MemoryClient {
            space: self.clone(),
            connected: false,
        }
    }

    /// How many browse requests targeted `node_id`.
    #[must_use]
    pub fn browse_count(&self, node_id: &NodeId) -> usize {
        self.lock().browse_counts.get(node_id).copied().unwrap_or(0)
    }

    /// Nodes with a monitored item, in creation order.
    #[must_use]
    pub fn monitored_nodes(&self) -> Vec<NodeId> {
        self.lock()
            .monitored
            .iter()
            .map(|(node_id, _, _)| node_id.clone())
            .collect()
    }

    /// Endpoint of the last successful connect.
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        self.lock().endpoint.clone()
    }

    /// Whether a session was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Deliver a value change to every monitored item of `node_id`.
    ///
    /// Returns the number of items that accepted the notification.
    pub fn push_value(&self, node_id: &NodeId, value: &DataValue) -> usize {
        self.lock()
            .monitored
            .iter()
            .filter(|(monitored, _, _)| monitored == node_id)
            .filter(|(_, _, sender)| sender.push(value.clone()))
            .count()
    }

    /// Emit a keep-alive on every subscription.
    pub fn keep_alive(&self) {
        for status in &self.lock().status {
            let _ = status.send(SubscriptionStatus::KeepAlive);
        }
    }
}

/// [`RemoteClient`] over a [`MemoryAddressSpace`].
pub struct MemoryClient {
    space: MemoryAddressSpace,
    connected: bool,
}

#[async_trait]
impl RemoteClient for MemoryClient {
    type Session = MemorySession;

    async fn connect(&mut self, endpoint: &str) -> Result<(), SessionError> {
        let mut inner = self.space.lock();
        if let Some(message) = &inner.connect_error {
            return Err(SessionError::Connect(format!("{endpoint}: {message}")));
        }
        inner.endpoint = Some(endpoint.to_string());
        self.connected = true;
        Ok(())
    }

    async fn create_session(&mut self) -> Result<MemorySession, SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        Ok(MemorySession {
            space: self.space.clone(),
        })
    }
}

/// [`RemoteSession`] over a [`MemoryAddressSpace`].
pub struct MemorySession {
    space: MemoryAddressSpace,
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn create_subscription(
        &self,
        _parameters: &SubscriptionParameters,
    ) -> Result<Subscription, SessionError> {
        let mut inner = self.space.lock();
        if inner.closed {
            return Err(SessionError::Closed);
        }
        if let Some(message) = &inner.subscription_error {
            return Err(SessionError::CreateSubscription(message.clone()));
        }

        let handle = SubscriptionHandle(inner.next_handle());
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(SubscriptionStatus::Started);
        inner.status.push(tx);

        Ok(Subscription { handle, status: rx })
    }

    async fn browse(
        &self,
        description: &BrowseDescription,
    ) -> Result<Vec<RemoteNode>, SessionError> {
        let mut inner = self.space.lock();
        if inner.closed {
            return Err(SessionError::Closed);
        }

        *inner
            .browse_counts
            .entry(description.node_id.clone())
            .or_default() += 1;

        if let Some(message) = inner.browse_errors.get(&description.node_id) {
            return Err(SessionError::Browse(message.clone()));
        }

        let children = inner
            .references
            .get(&description.node_id)
            .map(|references| {
                references
                    .iter()
                    .filter(|(reference_type, _)| {
                        description.reference_type == ReferenceType::All
                            || *reference_type == description.reference_type
                    })
                    .map(|(_, child)| child.clone())
                    .collect()
            })
            .unwrap_or_default();

        Ok(children)
    }

    async fn create_monitored_item(
        &self,
        _subscription: SubscriptionHandle,
        node_id: &NodeId,
        sampling: &SamplingOptions,
    ) -> Result<MonitoredItem, SessionError> {
        let mut inner = self.space.lock();
        if inner.closed {
            return Err(SessionError::Closed);
        }

        let handle = MonitoredItemHandle(inner.next_handle());
        let (tx, rx) = notification_queue(sampling.queue_size, sampling.discard_oldest);
        inner.monitored.push((node_id.clone(), handle, tx));

        Ok(MonitoredItem {
            handle,
            notifications: rx,
        })
    }

    async fn close(&self) -> Result<(), SessionError> {
        let mut inner = self.space.lock();
        inner.closed = true;
        for (_, _, sender) in inner.monitored.drain(..) {
            sender.close();
        }
        for status in inner.status.drain(..) {
            let _ = status.send(SubscriptionStatus::Terminated);
        }
        Ok(())
    }
}
