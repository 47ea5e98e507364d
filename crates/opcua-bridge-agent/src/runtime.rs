//! Bridge runtime orchestration.

use crate::config::{BridgeConfig, BrokerProtocol};
use anyhow::{Context, Result};
use opcua_bridge_core::{EventSink, RemoteClient};
use opcua_bridge_crawler::Crawler;
use opcua_bridge_publisher::{AmqpBrokerClient, EventPublisher, MqttBrokerClient};
use std::future::Future;
use std::sync::Arc;

/// The bridge runtime.
pub struct Bridge {
    config: BridgeConfig,
}

impl Bridge {
    /// Create a new bridge.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run the bridge until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns error if the crawler fails to start.
    pub async fn run<C: RemoteClient>(self, client: C) -> Result<()> {
        self.run_until(client, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown signal received");
        })
        .await
    }

    /// Run the bridge against the configured broker until `shutdown`
    /// resolves.
    ///
    /// The broker URL scheme selects AMQP or MQTT.
    ///
    /// # Errors
    ///
    /// Returns error if the crawler fails to start.
    pub async fn run_until<C, F>(self, client: C, shutdown: F) -> Result<()>
    where
        C: RemoteClient,
        F: Future<Output = ()>,
    {
        let settings = self.config.publish_settings();
        let sink: Arc<dyn EventSink> = match self.config.broker_protocol() {
            BrokerProtocol::Amqp => Arc::new(EventPublisher::new(
                AmqpBrokerClient::new(self.config.amqp_settings()),
                settings,
            )),
            BrokerProtocol::Mqtt => Arc::new(EventPublisher::new(
                MqttBrokerClient::new(self.config.mqtt_settings()),
                settings,
            )),
        };

        self.run_with_sink(client, sink, shutdown).await
    }

    /// Run the bridge delivering events to `sink` until `shutdown` resolves.
    ///
    /// The sink is closed on every exit path.
    ///
    /// # Errors
    ///
    /// Returns error if the crawler fails to start.
    pub async fn run_with_sink<C, F>(
        &self,
        client: C,
        sink: Arc<dyn EventSink>,
        shutdown: F,
    ) -> Result<()>
    where
        C: RemoteClient,
        F: Future<Output = ()>,
    {
        tracing::info!(
            endpoint = %self.config.endpoint,
            roots = ?self.config.crawl.roots,
            dry = self.config.crawl.dry,
            "Starting bridge runtime"
        );

        let mut crawler = Crawler::new(self.config.crawler_options(), Arc::clone(&sink));

        if let Err(err) = crawler.start(client, &self.config.endpoint).await {
            close_sink(sink.as_ref()).await;
            return Err(err).context("Failed to start crawler");
        }

        tracing::info!(
            subscriptions = crawler.subscription_count(),
            "Bridge running"
        );

        shutdown.await;

        crawler.shutdown().await;
        close_sink(sink.as_ref()).await;

        tracing::info!("Bridge stopped");
        Ok(())
    }
}

async fn close_sink(sink: &dyn EventSink) {
    if let Err(err) = sink.close().await {
        tracing::warn!(error = %err, "Failed to close event sink");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use opcua_bridge_core::{
        DataKind, DataValue, MemoryAddressSpace, NodeClass, NodeId, NormalizedEvent, PublishError,
        ReferenceType, RemoteNode, Variant,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<NormalizedEvent>>,
        closes: AtomicUsize,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<NormalizedEvent> {
            self.events.lock().unwrap().clone()
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn publish(&self, event: NormalizedEvent) -> Result<(), PublishError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }

        async fn close(&self) -> Result<(), PublishError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn plant() -> MemoryAddressSpace {
        let space = MemoryAddressSpace::new();
        space
            .add_reference(
                NodeId::objects_folder(),
                ReferenceType::Organizes,
                RemoteNode::new("ns=2;s=Line1", Some("Line1"), NodeClass::Object),
            )
            .add_reference(
                "ns=2;s=Line1",
                ReferenceType::HasComponent,
                RemoteNode::new("ns=2;s=Line1.Temp", Some("Temp"), NodeClass::Variable),
            );
        space
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn forwards_values_until_shutdown() {
        let space = plant();
        let sink = Arc::new(RecordingSink::default());
        let bridge = Bridge::new(BridgeConfig::default());
        let temp = NodeId::new("ns=2;s=Line1.Temp");

        let shutdown = {
            let space = space.clone();
            let sink = Arc::clone(&sink);
            let temp = temp.clone();
            async move {
                wait_until(|| space.monitored_nodes().contains(&temp)).await;
                let value = DataValue::new(Variant::scalar(DataKind::Double, 21.5))
                    .with_server_timestamp(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
                assert_eq!(space.push_value(&temp, &value), 1);
                wait_until(|| sink.events().len() == 1).await;
            }
        };

        bridge
            .run_with_sink(space.client(), sink.clone(), shutdown)
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events[0].id, "opcua~ns=2;s=Line1.Temp");
        assert_eq!(events[0].name, "OPC UA: Temp");
        assert_eq!(events[0].values[0].date, 1_700_000_000_000);
        assert_eq!(space.endpoint().as_deref(), Some("opc.tcp://localhost:4840"));
        assert!(space.is_closed());
        assert_eq!(sink.closes(), 1);
    }

    #[tokio::test]
    async fn dry_run_subscribes_nothing() {
        let space = plant();
        let sink = Arc::new(RecordingSink::default());
        let mut config = BridgeConfig::default();
        config.crawl.dry = true;

        Bridge::new(config)
            .run_with_sink(space.client(), sink.clone(), async {})
            .await
            .unwrap();

        assert!(space.monitored_nodes().is_empty());
        assert_eq!(space.browse_count(&NodeId::new("ns=2;s=Line1")), 2);
        assert_eq!(sink.closes(), 1);
    }

    #[tokio::test]
    async fn start_failure_closes_sink() {
        let space = plant();
        space.fail_connect("connection refused");
        let sink = Arc::new(RecordingSink::default());

        let result = Bridge::new(BridgeConfig::default())
            .run_with_sink(space.client(), sink.clone(), async {})
            .await;

        assert!(result.is_err());
        assert_eq!(sink.closes(), 1);
        assert!(sink.events().is_empty());
    }
}
