//! # OPC UA Bridge Core
//!
//! Shared model and interfaces for the OPC UA to broker bridge.
//!
//! This crate provides:
//! - Node model of the remote address space (`NodeId`, `RemoteNode`, `NodeClass`)
//! - Typed values as delivered by change notifications (`Variant`, `DataValue`)
//! - The normalized event schema and the value mapper that produces it
//! - A single-assignment [`Waiter`] for resources that are still being established
//! - Traits for the external collaborators: the remote session and the broker client
//! - An in-memory address space implementing the session traits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broker;
pub mod event;
pub mod mapping;
pub mod memory;
pub mod node;
pub mod queue;
pub mod session;
pub mod value;
pub mod waiter;

pub use broker::{
    BrokerChannel, BrokerClient, BrokerConnection, BrokerError, EventSink, ExchangeOptions,
    PublishError,
};
pub use event::{EventFactory, NormalizedEvent, ValueSample, ValueType};
pub use mapping::{map_value, map_value_type, ValueKind, VALUE_LABEL};
pub use memory::MemoryAddressSpace;
pub use node::{NodeClass, NodeId, RemoteNode};
pub use queue::{notification_queue, NotificationReceiver, NotificationSender};
pub use session::{
    BrowseDescription, MonitoredItem, MonitoredItemHandle, ReferenceType, RemoteClient,
    RemoteSession, SamplingOptions, SessionError, Subscription, SubscriptionHandle,
    SubscriptionParameters, SubscriptionStatus, TimestampsToReturn,
};
pub use value::{ArrayKind, DataKind, DataValue, Variant};
pub use waiter::{Waiter, WaiterError};
