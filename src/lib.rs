//! Bridge between a DDS-style pub-sub bus and service/action RPC callbacks.
//!
//! The enabler maps each RPC primitive onto the underlying topics of the
//! bus: a service is a request/reply topic pair, an action is three such
//! services plus feedback and status topics (ROS2 convention). Inbound
//! samples are classified by topic name, correlated to their requests or
//! goals, and delivered to application callbacks as JSON; outbound calls
//! compose the right topic names and envelopes and inject the serialized
//! samples into the bus.
//!
//! The bus itself is reached through narrow seams: a
//! [`DiscoveryService`](participant::DiscoveryService) for dynamic
//! endpoints, [`TypeSupport`](types::TypeSupport) for dynamic-type
//! introspection, and [`InternalReader`](participant::InternalReader)
//! queues the transport drains. The [`loopback`] module provides an
//! in-process bus for tests and demos.
//!
//! # Example
//!
//! ```no_run
//! use dds_rpc_enabler::{
//!   CallbackSet, DdsEnabler, EnablerConfiguration, loopback::LoopbackBus,
//! };
//!
//! let bus = LoopbackBus::new();
//! let mut callbacks = CallbackSet::default();
//! callbacks.service.service_request_notification =
//!   Some(Box::new(|service, json, request_id, _publish_time| {
//!     println!("request {request_id} on {service}: {json}");
//!   }));
//! let enabler = DdsEnabler::new(
//!   EnablerConfiguration::default(),
//!   callbacks,
//!   bus.clone(),
//!   None,
//! );
//! bus.join("demo", &enabler);
//! ```

pub mod callbacks;
pub mod config;
pub mod discovery;
pub mod enabler;
pub mod error;
pub mod gid;
pub mod handler;
pub mod logging;
pub mod loopback;
pub mod message;
pub mod names;
pub mod participant;
pub mod payload;
pub mod registry;
pub mod rpc;
pub mod time;
pub mod topic;
pub mod types;
pub mod writer;

pub use callbacks::CallbackSet;
pub use config::EnablerConfiguration;
pub use enabler::DdsEnabler;
pub use error::{EnablerError, EnablerResult};
pub use gid::Gid;
pub use rpc::{
  ActionSubtopic, CancelCode, GoalId, Protocol, RpcRole, ServiceSide, StatusCode,
};
pub use time::Time;
pub use topic::{ActionInfo, ServiceInfo, TopicDescription, TopicInfo};
