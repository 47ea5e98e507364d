//! Bridge configuration.

use anyhow::{Context, Result};
use opcua_bridge_core::{EventFactory, ExchangeOptions, NodeId};
use opcua_bridge_crawler::CrawlerOptions;
use opcua_bridge_publisher::{AmqpSettings, MqttSettings, PublishSettings};
use std::time::Duration;
use uuid::Uuid;

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// OPC UA server endpoint
    pub endpoint: String,

    /// Crawl configuration
    pub crawl: CrawlConfig,

    /// Broker configuration
    pub broker: BrokerConfig,
}

/// Crawl configuration.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Starting node(s) of the crawl
    pub roots: Vec<String>,

    /// Source tag stamped on every event
    pub source: String,

    /// Prefix of event ids
    pub id_prefix: String,

    /// Prefix of event names
    pub name_prefix: String,

    /// Node ids excluded from traversal and subscription
    pub blacklist: Vec<String>,

    /// Discover only, no subscriptions
    pub dry: bool,
}

/// Wire protocol spoken to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerProtocol {
    /// AMQP 0-9-1 (`amqp://`, `amqps://`)
    Amqp,
    /// MQTT (`tcp://`, `mqtt://` or bare `host:port`)
    Mqtt,
}

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker URL; its scheme selects the protocol
    pub broker_url: String,

    /// MQTT client ID; a random one is generated when unset
    pub client_id: Option<String>,

    /// Target exchange
    pub exchange: String,

    /// Exchange type
    pub exchange_type: String,

    /// Declare the exchange durable
    pub exchange_durable: bool,

    /// Routing key of every event
    pub routing_key: String,

    /// Keep-alive interval
    pub keep_alive: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let events = EventFactory::default();
        let publish = PublishSettings::default();

        Self {
            endpoint: "opc.tcp://localhost:4840".to_string(),
            crawl: CrawlConfig {
                roots: vec![NodeId::objects_folder().to_string()],
                source: events.source,
                id_prefix: events.id_prefix,
                name_prefix: events.name_prefix,
                blacklist: Vec::new(),
                dry: false,
            },
            broker: BrokerConfig {
                broker_url: "tcp://localhost:1883".to_string(),
                client_id: None,
                exchange: publish.exchange,
                exchange_type: publish.exchange_type,
                exchange_durable: publish.exchange_options.durable,
                routing_key: publish.routing_key,
                keep_alive: Duration::from_secs(30),
            },
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPCUA_BRIDGE_ENDPOINT`: OPC UA server endpoint
    /// - `OPCUA_BRIDGE_ROOT`: Comma-separated crawl roots
    /// - `OPCUA_BRIDGE_SOURCE`: Source tag
    /// - `OPCUA_BRIDGE_ID_PREFIX` / `OPCUA_BRIDGE_NAME_PREFIX`: Event prefixes
    /// - `OPCUA_BRIDGE_BLACKLIST`: JSON array of node ids
    /// - `OPCUA_BRIDGE_DRY`: `1`/`true` for discovery only
    /// - `OPCUA_BRIDGE_BROKER_URL`: Broker URL, `amqp://` or `amqps://` for AMQP
    /// - `OPCUA_BRIDGE_CLIENT_ID`: MQTT client ID
    /// - `OPCUA_BRIDGE_EXCHANGE` / `OPCUA_BRIDGE_EXCHANGE_TYPE`: Target exchange
    /// - `OPCUA_BRIDGE_EXCHANGE_DURABLE`: `1`/`true` to declare it durable
    /// - `OPCUA_BRIDGE_ROUTING_KEY`: Routing key
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("OPCUA_BRIDGE_ENDPOINT") {
            config.endpoint = endpoint;
        }

        if let Some(roots) = lookup("OPCUA_BRIDGE_ROOT") {
            config.crawl.roots = roots
                .split(',')
                .map(str::trim)
                .filter(|root| !root.is_empty())
                .map(str::to_string)
                .collect();
            anyhow::ensure!(
                !config.crawl.roots.is_empty(),
                "OPCUA_BRIDGE_ROOT names no node"
            );
        }

        if let Some(source) = lookup("OPCUA_BRIDGE_SOURCE") {
            config.crawl.source = source;
        }

        if let Some(prefix) = lookup("OPCUA_BRIDGE_ID_PREFIX") {
            config.crawl.id_prefix = prefix;
        }

        if let Some(prefix) = lookup("OPCUA_BRIDGE_NAME_PREFIX") {
            config.crawl.name_prefix = prefix;
        }

        // Parse blacklist from JSON env var
        if let Some(blacklist_json) = lookup("OPCUA_BRIDGE_BLACKLIST") {
            config.crawl.blacklist = serde_json::from_str(&blacklist_json)
                .context("Invalid OPCUA_BRIDGE_BLACKLIST JSON")?;
        }

        if let Some(dry) = lookup("OPCUA_BRIDGE_DRY") {
            config.crawl.dry = parse_flag(&dry).context("Invalid OPCUA_BRIDGE_DRY")?;
        }

        if let Some(url) = lookup("OPCUA_BRIDGE_BROKER_URL") {
            config.broker.broker_url = url;
        }

        if let Some(client_id) = lookup("OPCUA_BRIDGE_CLIENT_ID") {
            config.broker.client_id = Some(client_id);
        }

        if let Some(exchange) = lookup("OPCUA_BRIDGE_EXCHANGE") {
            config.broker.exchange = exchange;
        }

        if let Some(exchange_type) = lookup("OPCUA_BRIDGE_EXCHANGE_TYPE") {
            config.broker.exchange_type = exchange_type;
        }

        if let Some(durable) = lookup("OPCUA_BRIDGE_EXCHANGE_DURABLE") {
            config.broker.exchange_durable =
                parse_flag(&durable).context("Invalid OPCUA_BRIDGE_EXCHANGE_DURABLE")?;
        }

        if let Some(routing_key) = lookup("OPCUA_BRIDGE_ROUTING_KEY") {
            config.broker.routing_key = routing_key;
        }

        Ok(config)
    }

    /// Options for the crawler.
    #[must_use]
    pub fn crawler_options(&self) -> CrawlerOptions {
        CrawlerOptions {
            roots: self.crawl.roots.iter().map(NodeId::new).collect(),
            blacklist: self.crawl.blacklist.iter().map(NodeId::new).collect(),
            dry: self.crawl.dry,
            events: EventFactory {
                id_prefix: self.crawl.id_prefix.clone(),
                name_prefix: self.crawl.name_prefix.clone(),
                source: self.crawl.source.clone(),
            },
            ..CrawlerOptions::default()
        }
    }

    /// Settings for the event publisher.
    #[must_use]
    pub fn publish_settings(&self) -> PublishSettings {
        PublishSettings {
            exchange: self.broker.exchange.clone(),
            exchange_type: self.broker.exchange_type.clone(),
            exchange_options: ExchangeOptions {
                durable: self.broker.exchange_durable,
                ..ExchangeOptions::default()
            },
            routing_key: self.broker.routing_key.clone(),
        }
    }

    /// Protocol selected by the broker URL scheme.
    #[must_use]
    pub fn broker_protocol(&self) -> BrokerProtocol {
        let url = self.broker.broker_url.to_ascii_lowercase();
        if url.starts_with("amqp://") || url.starts_with("amqps://") {
            BrokerProtocol::Amqp
        } else {
            BrokerProtocol::Mqtt
        }
    }

    /// Settings for the AMQP client.
    #[must_use]
    pub fn amqp_settings(&self) -> AmqpSettings {
        AmqpSettings {
            broker_url: self.broker.broker_url.clone(),
        }
    }

    /// Settings for the MQTT client.
    #[must_use]
    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            broker_url: self.broker.broker_url.clone(),
            client_id: self
                .broker
                .client_id
                .clone()
                .unwrap_or_else(|| format!("opcua-bridge-{}", Uuid::new_v4())),
            keep_alive: self.broker.keep_alive,
            ..MqttSettings::default()
        }
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{other}'"),
    }
}
