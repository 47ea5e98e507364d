//! Subscription bindings and notification forwarding.

use opcua_bridge_core::{
    EventFactory, EventSink, MonitoredItem, MonitoredItemHandle, NodeId, NotificationReceiver,
    RemoteNode,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A live monitored item bound to the node it was created for.
///
/// The node identity is captured when the item is created and never changes,
/// no matter how long notifications keep arriving after the crawl.
pub struct SubscriptionBinding {
    node_id: NodeId,
    display_name: Option<String>,
    handle: MonitoredItemHandle,
    task: JoinHandle<()>,
}

impl SubscriptionBinding {
    /// Bind `item` to `node` and start forwarding its notifications.
    pub(crate) fn spawn(
        node: &RemoteNode,
        item: MonitoredItem,
        events: EventFactory,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let task = tokio::spawn(forward_notifications(
            node.id.clone(),
            node.display_name.clone(),
            item.notifications,
            events,
            sink,
        ));

        Self {
            node_id: node.id.clone(),
            display_name: node.display_name.clone(),
            handle: item.handle,
            task,
        }
    }

    /// Bound node.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Display name captured at subscribe time.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Monitored item handle.
    #[must_use]
    pub fn handle(&self) -> MonitoredItemHandle {
        self.handle
    }

    /// Whether the forwarding task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop forwarding notifications.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for SubscriptionBinding {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Map each notification to an event and hand it to the sink.
///
/// Notifications of one node are processed in arrival order. Publish errors
/// are logged and never stop the stream.
async fn forward_notifications(
    node_id: NodeId,
    display_name: Option<String>,
    mut notifications: NotificationReceiver,
    events: EventFactory,
    sink: Arc<dyn EventSink>,
) {
    while let Some(data_value) = notifications.recv().await {
        let event = events.build(&node_id, display_name.as_deref(), &data_value);

        tracing::trace!(node_id = %node_id, event_id = %event.id, "Forwarding value change");

        if let Err(err) = sink.publish(event).await {
            tracing::error!(node_id = %node_id, error = %err, "Failed to publish value change");
        }
    }

    let discarded = notifications.discarded();
    tracing::debug!(node_id = %node_id, discarded, "Notification stream ended");
}
