//! # OPC UA Bridge Crawler
//!
//! Discovers the address space of an OPC UA server and keeps live
//! subscriptions on its data points.
//!
//! ## Crawl
//!
//! Starting from the configured roots, every browsed node is checked against
//! the visited set and the blacklist before it is expanded, so cyclic or
//! diamond-shaped reference graphs are walked once per node. Children are
//! followed along both `Organizes` and `HasComponent` references.
//!
//! ## Subscriptions
//!
//! `Variable` and `Unspecified` nodes get a monitored item on their Value
//! attribute. Each item is owned by a [`SubscriptionBinding`] that captured
//! the node's identity at subscribe time and forwards every change, as a
//! normalized event, to an [`EventSink`](opcua_bridge_core::EventSink).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binding;
pub mod crawler;
pub mod inventory;

pub use binding::SubscriptionBinding;
pub use crawler::{Crawler, CrawlerError, CrawlerOptions};
pub use inventory::{InventoryEntry, VisitedSet};
