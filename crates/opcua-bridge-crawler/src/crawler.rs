//! Address-space crawler.

use crate::binding::SubscriptionBinding;
use crate::inventory::{InventoryEntry, VisitedSet};
use opcua_bridge_core::{
    BrowseDescription, EventFactory, EventSink, NodeId, RemoteClient, RemoteNode, RemoteSession,
    SamplingOptions, SessionError, SubscriptionHandle, SubscriptionParameters, SubscriptionStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Crawler configuration.
#[derive(Debug, Clone)]
pub struct CrawlerOptions {
    /// Nodes the crawl starts from
    pub roots: Vec<NodeId>,
    /// Nodes excluded from traversal and subscription
    pub blacklist: Vec<NodeId>,
    /// Discover only, install no subscriptions
    pub dry: bool,
    /// Event id/name prefixes and source tag
    pub events: EventFactory,
    /// Parameters of the session subscription
    pub subscription: SubscriptionParameters,
    /// Sampling of each monitored item
    pub sampling: SamplingOptions,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            roots: vec![NodeId::objects_folder()],
            blacklist: Vec::new(),
            dry: false,
            events: EventFactory::default(),
            subscription: SubscriptionParameters::default(),
            sampling: SamplingOptions::default(),
        }
    }
}

/// Walks the remote address space and keeps subscriptions on its variables.
pub struct Crawler<C: RemoteClient> {
    options: CrawlerOptions,
    blacklist: HashSet<NodeId>,
    sink: Arc<dyn EventSink>,
    client: Option<C>,
    session: Option<C::Session>,
    subscription: Option<SubscriptionHandle>,
    status_task: Option<JoinHandle<()>>,
    visited: VisitedSet,
    inventory: Vec<InventoryEntry>,
    bindings: HashMap<NodeId, SubscriptionBinding>,
}

impl<C: RemoteClient> Crawler<C> {
    /// Create a crawler delivering events to `sink`.
    #[must_use]
    pub fn new(options: CrawlerOptions, sink: Arc<dyn EventSink>) -> Self {
        let blacklist = options.blacklist.iter().cloned().collect();
        Self {
            options,
            blacklist,
            sink,
            client: None,
            session: None,
            subscription: None,
            status_task: None,
            visited: VisitedSet::new(),
            inventory: Vec::new(),
            bindings: HashMap::new(),
        }
    }

    /// Connect, open a session and subscription, then crawl every root.
    ///
    /// Failures are logged and leave the crawler stopped with any partially
    /// opened session closed; nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped initialization.
    pub async fn start(&mut self, client: C, endpoint: &str) -> Result<(), CrawlerError> {
        match self.initialize(client, endpoint).await {
            Ok(()) => {
                tracing::info!(
                    endpoint,
                    visited = self.visited.len(),
                    subscriptions = self.bindings.len(),
                    "Crawl complete"
                );
                Ok(())
            }
            Err(err) => {
                tracing::error!(endpoint, error = %err, "Crawler initialization failed");
                self.shutdown().await;
                Err(err)
            }
        }
    }

    async fn initialize(&mut self, mut client: C, endpoint: &str) -> Result<(), CrawlerError> {
        tracing::info!(endpoint, "Connecting to OPC UA server");

        client.connect(endpoint).await?;
        let session = client.create_session().await?;
        self.client = Some(client);
        self.session = Some(session);

        let subscription = self
            .session()?
            .create_subscription(&self.options.subscription)
            .await?;
        self.subscription = Some(subscription.handle);
        self.status_task = Some(tokio::spawn(log_subscription_status(
            subscription.handle,
            subscription.status,
        )));

        self.visited.clear();
        self.inventory.clear();

        for root in self.options.roots.clone() {
            self.crawl(&root).await?;
        }

        for entry in &self.inventory {
            tracing::info!("{entry}");
        }

        Ok(())
    }

    fn session(&self) -> Result<&C::Session, CrawlerError> {
        self.session
            .as_ref()
            .ok_or_else(|| CrawlerError::IllegalState("session is unavailable".to_string()))
    }

    /// Walk the address space below `root`.
    ///
    /// Each node is admitted at most once per run; blacklisted nodes are
    /// never expanded. A failed browse below the root only skips that
    /// branch.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlerError::IllegalState`] without an open session, or the
    /// session error if the root itself cannot be browsed.
    pub async fn crawl(&mut self, root: &NodeId) -> Result<(), CrawlerError> {
        let mut pending = vec![(BrowseDescription::all(root.clone()), 0_usize)];

        while let Some((description, depth)) = pending.pop() {
            let children = match self.session()?.browse(&description).await {
                Ok(children) => children,
                Err(err) if depth == 0 => return Err(err.into()),
                Err(err) => {
                    tracing::warn!(
                        node_id = %description.node_id,
                        reference_type = ?description.reference_type,
                        error = %err,
                        "Browse failed, skipping branch"
                    );
                    continue;
                }
            };

            for node in children {
                if self.blacklist.contains(&node.id) {
                    tracing::debug!(node_id = %node.id, "Skipping blacklisted node");
                    continue;
                }
                if !self.visited.insert(&node.id) {
                    continue;
                }

                self.inventory.push(InventoryEntry::new(&node, depth));

                // Popped in reverse: Organizes is walked before HasComponent.
                pending.push((BrowseDescription::has_component(node.id.clone()), depth + 1));
                pending.push((BrowseDescription::organizes(node.id.clone()), depth + 1));

                if self.options.dry || !node.node_class.is_subscribable() {
                    continue;
                }

                match self.install_subscription(&node).await {
                    Ok(()) => {}
                    Err(err @ CrawlerError::IllegalState(_)) => return Err(err),
                    Err(err) => {
                        tracing::warn!(node_id = %node.id, error = %err, "Failed to subscribe");
                    }
                }
            }
        }

        Ok(())
    }

    /// Monitor the Value attribute of `node` and forward its changes.
    ///
    /// A node that already has a binding is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlerError::IllegalState`] without an open session and
    /// subscription, or the session error if the item cannot be created.
    pub async fn install_subscription(&mut self, node: &RemoteNode) -> Result<(), CrawlerError> {
        let session = self.session()?;
        let subscription = self
            .subscription
            .ok_or_else(|| CrawlerError::IllegalState("subscription is unavailable".to_string()))?;

        if self.bindings.contains_key(&node.id) {
            return Ok(());
        }

        let item = session
            .create_monitored_item(subscription, &node.id, &self.options.sampling)
            .await?;

        tracing::debug!(
            node_id = %node.id,
            display_name = ?node.display_name,
            handle = %item.handle,
            "Installed subscription"
        );

        let binding = SubscriptionBinding::spawn(
            node,
            item,
            self.options.events.clone(),
            Arc::clone(&self.sink),
        );
        self.bindings.insert(node.id.clone(), binding);

        Ok(())
    }

    /// Stop forwarding, drop all bindings and close the session.
    pub async fn shutdown(&mut self) {
        for (_, binding) in self.bindings.drain() {
            binding.cancel();
        }
        self.subscription = None;

        if let Some(session) = self.session.take() {
            if let Err(err) = session.close().await {
                tracing::warn!(error = %err, "Failed to close session");
            }
        }
        self.client = None;

        if let Some(task) = self.status_task.take() {
            task.abort();
        }
    }

    /// Whether a session and subscription are open.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.is_some() && self.subscription.is_some()
    }

    /// Nodes admitted in the current run, in discovery order.
    #[must_use]
    pub fn inventory(&self) -> &[InventoryEntry] {
        &self.inventory
    }

    /// Nodes visited in the current run.
    #[must_use]
    pub fn visited(&self) -> &VisitedSet {
        &self.visited
    }

    /// Binding of `node_id`, if subscribed.
    #[must_use]
    pub fn binding(&self, node_id: &NodeId) -> Option<&SubscriptionBinding> {
        self.bindings.get(node_id)
    }

    /// Number of live bindings.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.bindings.len()
    }
}

async fn log_subscription_status(
    handle: SubscriptionHandle,
    mut status: mpsc::UnboundedReceiver<SubscriptionStatus>,
) {
    while let Some(event) = status.recv().await {
        match event {
            SubscriptionStatus::Started => {
                tracing::info!(subscription = handle.0, "Subscription started");
            }
            SubscriptionStatus::KeepAlive => {
                tracing::debug!(subscription = handle.0, "Subscription keep-alive");
            }
            SubscriptionStatus::Terminated => {
                tracing::info!(subscription = handle.0, "Subscription terminated");
                break;
            }
        }
    }
}

/// Errors raised by the crawler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrawlerError {
    /// Operation needs a session or subscription that is not open
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// The remote session reported an error
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use opcua_bridge_core::memory::MemoryClient;
    use opcua_bridge_core::{
        DataKind, DataValue, MemoryAddressSpace, NodeClass, NormalizedEvent, PublishError,
        ReferenceType, ValueKind, Variant,
    };
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<NormalizedEvent>>,
        fail: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn events(&self) -> Vec<NormalizedEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn publish(&self, event: NormalizedEvent) -> Result<(), PublishError> {
            self.events.lock().unwrap().push(event);
            if self.fail {
                return Err(PublishError::Closed);
            }
            Ok(())
        }

        async fn close(&self) -> Result<(), PublishError> {
            Ok(())
        }
    }

    const ENDPOINT: &str = "opc.tcp://memory:4840";

    fn options(roots: &[&str], blacklist: &[&str]) -> CrawlerOptions {
        CrawlerOptions {
            roots: roots.iter().map(|id| NodeId::new(*id)).collect(),
            blacklist: blacklist.iter().map(|id| NodeId::new(*id)).collect(),
            ..CrawlerOptions::default()
        }
    }

    fn variable(id: &str, name: &str) -> RemoteNode {
        RemoteNode::new(id, Some(name), NodeClass::Variable)
    }

    fn object(id: &str, name: &str) -> RemoteNode {
        RemoteNode::new(id, Some(name), NodeClass::Object)
    }

    /// root -> A (Variable n1), B (Object n2) -> C (Variable n3)
    fn plant() -> MemoryAddressSpace {
        let space = MemoryAddressSpace::new();
        space
            .add_reference("root", ReferenceType::Organizes, variable("n1", "Temp"))
            .add_reference("root", ReferenceType::Organizes, object("n2", "Folder"))
            .add_reference("n2", ReferenceType::HasComponent, variable("n3", "Pressure"));
        space
    }

    async fn started(
        space: &MemoryAddressSpace,
        options: CrawlerOptions,
        sink: Arc<RecordingSink>,
    ) -> Crawler<MemoryClient> {
        let mut crawler = Crawler::new(options, sink);
        crawler.start(space.client(), ENDPOINT).await.unwrap();
        crawler
    }

    async fn wait_for_events(sink: &RecordingSink, count: usize) -> Vec<NormalizedEvent> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let events = sink.events();
                if events.len() >= count {
                    return events;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for events")
    }

    #[tokio::test]
    async fn blacklisted_branch_is_never_visited() {
        let space = plant();
        let sink = Arc::new(RecordingSink::default());
        let crawler = started(&space, options(&["root"], &["n2"]), sink).await;

        assert_eq!(space.monitored_nodes(), vec![NodeId::new("n1")]);
        assert!(crawler.visited().contains(&"n1".into()));
        assert!(!crawler.visited().contains(&"n2".into()));
        assert!(!crawler.visited().contains(&"n3".into()));
        assert_eq!(space.browse_count(&"n2".into()), 0);
        assert_eq!(space.browse_count(&"n3".into()), 0);
    }

    #[tokio::test]
    async fn blacklisted_variables_stay_unsubscribed_on_every_path() {
        let unnamed = RemoteNode::new("ghost", None, NodeClass::Unspecified);
        let space = MemoryAddressSpace::new();
        space
            .add_reference("root", ReferenceType::HasComponent, variable("bad", "Bad"))
            .add_reference("root", ReferenceType::Organizes, object("a", "A"))
            .add_reference("root", ReferenceType::Organizes, unnamed.clone())
            .add_reference("a", ReferenceType::Organizes, variable("bad", "Bad"))
            .add_reference("a", ReferenceType::HasComponent, variable("bad", "Bad"))
            .add_reference("a", ReferenceType::HasComponent, unnamed)
            .add_reference("a", ReferenceType::HasComponent, variable("ok", "Ok"));
        let sink = Arc::new(RecordingSink::default());

        let crawler = started(&space, options(&["root"], &["bad", "ghost"]), sink).await;

        assert_eq!(space.monitored_nodes(), vec![NodeId::new("ok")]);
        for id in ["bad", "ghost"] {
            let node_id = NodeId::new(id);
            assert_eq!(space.browse_count(&node_id), 0);
            assert!(!crawler.visited().contains(&node_id));
            assert!(crawler.binding(&node_id).is_none());
            assert!(crawler
                .inventory()
                .iter()
                .all(|entry| entry.node_id != node_id));
        }
    }

    #[tokio::test]
    async fn follows_organizes_and_has_component() {
        let space = plant();
        let sink = Arc::new(RecordingSink::default());
        let crawler = started(&space, options(&["root"], &[]), sink).await;

        let mut monitored = space.monitored_nodes();
        monitored.sort();
        assert_eq!(monitored, vec![NodeId::new("n1"), NodeId::new("n3")]);
        assert_eq!(crawler.subscription_count(), 2);

        let depth_of_n3 = crawler
            .inventory()
            .iter()
            .find(|entry| entry.node_id == NodeId::new("n3"))
            .map(|entry| entry.depth);
        assert_eq!(depth_of_n3, Some(1));
    }

    #[tokio::test]
    async fn cycles_and_diamonds_expand_each_node_once() {
        let space = MemoryAddressSpace::new();
        space
            .add_reference("root", ReferenceType::Organizes, object("a", "A"))
            .add_reference("root", ReferenceType::Organizes, object("b", "B"))
            .add_reference("a", ReferenceType::HasComponent, object("b", "B"))
            .add_reference("b", ReferenceType::Organizes, object("a", "A"))
            .add_reference("a", ReferenceType::HasComponent, variable("v", "Shared"))
            .add_reference("b", ReferenceType::HasComponent, variable("v", "Shared"))
            .add_reference("v", ReferenceType::HasComponent, object("root", "Root"));
        let sink = Arc::new(RecordingSink::default());
        let crawler = started(&space, options(&["root"], &[]), sink).await;

        // One Organizes and one HasComponent browse per admitted node.
        for id in ["a", "b", "v"] {
            assert_eq!(space.browse_count(&id.into()), 2, "{id}");
        }
        assert_eq!(space.monitored_nodes(), vec![NodeId::new("v")]);
        assert_eq!(crawler.inventory().len(), 4);
    }

    #[tokio::test]
    async fn dry_run_discovers_without_subscribing() {
        let space = plant();
        let sink = Arc::new(RecordingSink::default());
        let crawler = started(
            &space,
            CrawlerOptions {
                dry: true,
                ..options(&["root"], &[])
            },
            sink,
        )
        .await;

        assert!(space.monitored_nodes().is_empty());
        assert_eq!(crawler.inventory().len(), 3);
        assert_eq!(crawler.subscription_count(), 0);
    }

    #[tokio::test]
    async fn unspecified_nodes_are_subscribed() {
        let space = MemoryAddressSpace::new();
        space
            .add_reference(
                "root",
                ReferenceType::Organizes,
                RemoteNode::new("u", None, NodeClass::Unspecified),
            )
            .add_reference(
                "root",
                ReferenceType::HasComponent,
                RemoteNode::new("m", Some("Reset"), NodeClass::Method),
            );
        let sink = Arc::new(RecordingSink::default());
        let _crawler = started(&space, options(&["root"], &[]), sink).await;

        assert_eq!(space.monitored_nodes(), vec![NodeId::new("u")]);
    }

    #[tokio::test]
    async fn change_notification_becomes_event() {
        let space = plant();
        let sink = Arc::new(RecordingSink::default());
        let crawler = started(&space, options(&["root"], &["n2"]), Arc::clone(&sink)).await;

        let timestamp = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let value =
            DataValue::new(Variant::scalar(DataKind::Double, 21.5)).with_server_timestamp(timestamp);
        assert_eq!(space.push_value(&"n1".into(), &value), 1);

        let events = wait_for_events(&sink, 1).await;
        let event = &events[0];
        assert_eq!(event.id, "opcua~n1");
        assert_eq!(event.name, "OPC UA: Temp");
        assert_eq!(event.value_types[0].kind, ValueKind::Number);
        assert_eq!(event.value_types[0].unit, "");
        assert_eq!(event.values[0].date, 1_700_000_000_000);
        assert_eq!(event.values[0].value, vec![serde_json::json!(21.5)]);

        let binding = crawler.binding(&"n1".into()).unwrap();
        assert_eq!(binding.display_name(), Some("Temp"));
    }

    #[tokio::test]
    async fn notifications_of_one_node_keep_their_order() {
        let space = plant();
        let sink = Arc::new(RecordingSink::default());
        let _crawler = started(&space, options(&["root"], &[]), Arc::clone(&sink)).await;

        for n in 0..5 {
            space.push_value(&"n3".into(), &DataValue::new(Variant::scalar(DataKind::Int32, n)));
        }

        let values: Vec<_> = wait_for_events(&sink, 5)
            .await
            .into_iter()
            .map(|event| event.values[0].value[0].clone())
            .collect();
        assert_eq!(values, (0..5).map(serde_json::Value::from).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn missing_display_name_still_publishes() {
        let space = MemoryAddressSpace::new();
        space.add_reference(
            "root",
            ReferenceType::Organizes,
            RemoteNode::new("anon", None, NodeClass::Variable),
        );
        let sink = Arc::new(RecordingSink::default());
        let _crawler = started(&space, options(&["root"], &[]), Arc::clone(&sink)).await;

        space.push_value(&"anon".into(), &DataValue::new(Variant::scalar(DataKind::String, "x")));

        let events = wait_for_events(&sink, 1).await;
        assert_eq!(events[0].name, "OPC UA: ");
    }

    #[tokio::test]
    async fn publish_errors_do_not_stop_forwarding() {
        let space = plant();
        let sink = Arc::new(RecordingSink::failing());
        let _crawler = started(&space, options(&["root"], &[]), Arc::clone(&sink)).await;

        let value = DataValue::new(Variant::scalar(DataKind::Boolean, true));
        space.push_value(&"n1".into(), &value);
        space.push_value(&"n1".into(), &value);

        assert_eq!(wait_for_events(&sink, 2).await.len(), 2);
    }

    #[tokio::test]
    async fn operations_without_session_are_illegal() {
        let sink = Arc::new(RecordingSink::default());
        let mut crawler: Crawler<MemoryClient> = Crawler::new(CrawlerOptions::default(), sink);

        assert!(matches!(
            crawler.crawl(&NodeId::objects_folder()).await,
            Err(CrawlerError::IllegalState(_))
        ));
        assert!(matches!(
            crawler.install_subscription(&variable("n1", "Temp")).await,
            Err(CrawlerError::IllegalState(_))
        ));
        assert!(!crawler.is_running());
    }

    #[tokio::test]
    async fn connect_failure_leaves_crawler_stopped() {
        let space = plant();
        space.fail_connect("connection refused");
        let sink = Arc::new(RecordingSink::default());
        let mut crawler = Crawler::new(options(&["root"], &[]), sink);

        let result = crawler.start(space.client(), ENDPOINT).await;

        assert!(matches!(
            result,
            Err(CrawlerError::Session(SessionError::Connect(_)))
        ));
        assert!(!crawler.is_running());
        assert!(crawler.inventory().is_empty());
    }

    #[tokio::test]
    async fn subscription_failure_closes_session() {
        let space = plant();
        space.fail_subscription("too many subscriptions");
        let sink = Arc::new(RecordingSink::default());
        let mut crawler = Crawler::new(options(&["root"], &[]), sink);

        let result = crawler.start(space.client(), ENDPOINT).await;

        assert!(matches!(
            result,
            Err(CrawlerError::Session(SessionError::CreateSubscription(_)))
        ));
        assert!(space.is_closed());
        assert!(!crawler.is_running());
    }

    #[tokio::test]
    async fn failed_child_browse_skips_branch() {
        let space = plant();
        space.fail_browse("n2", "bad node");
        let sink = Arc::new(RecordingSink::default());
        let crawler = started(&space, options(&["root"], &[]), sink).await;

        assert!(crawler.is_running());
        assert_eq!(space.monitored_nodes(), vec![NodeId::new("n1")]);
    }

    #[tokio::test]
    async fn failed_root_browse_is_fatal() {
        let space = plant();
        space.fail_browse("root", "bad root");
        let sink = Arc::new(RecordingSink::default());
        let mut crawler = Crawler::new(options(&["root"], &[]), sink);

        let result = crawler.start(space.client(), ENDPOINT).await;

        assert!(matches!(result, Err(CrawlerError::Session(SessionError::Browse(_)))));
        assert!(!crawler.is_running());
    }

    #[tokio::test]
    async fn roots_share_the_visited_set() {
        let space = plant();
        space.add_reference("other", ReferenceType::Organizes, variable("n1", "Temp"));
        let sink = Arc::new(RecordingSink::default());
        let crawler = started(&space, options(&["root", "other"], &[]), sink).await;

        assert_eq!(space.browse_count(&"n1".into()), 2);
        assert_eq!(crawler.subscription_count(), 2);
        assert_eq!(space.monitored_nodes().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_closes_session_and_bindings() {
        let space = plant();
        let sink = Arc::new(RecordingSink::default());
        let mut crawler = started(&space, options(&["root"], &[]), Arc::clone(&sink)).await;

        crawler.shutdown().await;

        assert!(space.is_closed());
        assert!(!crawler.is_running());
        assert_eq!(crawler.subscription_count(), 0);
        assert_eq!(
            space.push_value(&"n1".into(), &DataValue::new(Variant::scalar(DataKind::Int16, 1))),
            0
        );
    }
}
