//! In-process hosting for nodes
//!
//! `LocalCluster` wires nodes into a `Topology` and runs each instance as a
//! tokio task. `RecordingOutput` stands in for a substrate when driving a
//! single node directly.

mod cancel;
mod local;
mod recording;
mod topology;

pub use cancel::ShutdownToken;
pub use local::{ClusterReport, LocalCluster, RunningCluster, DEFAULT_STREAM, INGEST};
pub use recording::{OutputEvent, RecordingOutput};
pub use topology::{Subscription, Topology};
