//! reteflow: adaptive routing for streaming Rete networks
//!
//! Facts are labeled-graph fragments flowing through a network of matching
//! nodes hosted by a stream-processing substrate. Junctions between matchers
//! run an eddy router: a fact coming back from a known eddy returns to that
//! eddy alone, anything else is broadcast to every eddy. Each fact carries a
//! timestamp sequence that is reconciled to a single value (or suppressed)
//! on the way through.
//!
//! # Core Concepts
//!
//! - **Routing policy**: decides destinations and the outgoing timestamp
//! - **Emission gateway**: emits on every destination, then settles the
//!   delivery's anchor exactly once
//! - **Sinks**: where fully matched facts end up (in process or a durable queue)
//! - **Local cluster**: an in-process substrate for running a whole network
//!
//! # Example
//!
//! ```
//! use reteflow::{ChannelId, EddyRouter, RoutingPolicy};
//!
//! let router = EddyRouter::new(vec![ChannelId::from("A"), ChannelId::from("B")]).unwrap();
//! assert_eq!(router.declare_outputs().len(), 2);
//! ```

pub mod config;
pub mod fact;
pub mod gateway;
pub mod node;
pub mod routing;
pub mod runtime;
pub mod schema;
pub mod sink;

pub use config::{ConfigError, NetworkConfig, RetryConfig, RouterConfig, SinkConfig};
pub use fact::{reconcile, Action, Anchor, AnchorId, ChannelId, Fact, GraphFragment, Statement, TimestampSeq, SUPPRESS};
pub use gateway::{AckPolicy, EmissionGateway, EmitError, OutputHandle, Settlement};
pub use node::{ConflictSetNode, FilterNode, MatchCondition, Node, NodeError, RouterNode};
pub use routing::{BroadcastRouter, EddyRouter, PolicyKind, RouteError, RoutingDecision, RoutingPolicy};
pub use runtime::{ClusterReport, LocalCluster, RunningCluster, Topology};
pub use schema::{FactFields, Field, FieldValue, FieldValues, OutputSchema};
pub use sink::{CollectorSink, DerivedFact, QueueClient, QueueServerSpec, QueueSink, Sink, SinkError, SqliteQueue};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
