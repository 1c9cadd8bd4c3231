//! Terminal sinks for derived facts
//!
//! `CollectorSink` keeps results in process. `QueueSink` publishes them to a
//! durable queue through a `QueueClient`; `SqliteQueue` is the bundled client.

mod collector;
mod queue;
mod sqlite_queue;
mod traits;

pub use collector::CollectorSink;
pub use queue::{QueueClient, QueueServerSpec, QueueSink};
pub use sqlite_queue::{SqliteQueue, IN_MEMORY};
pub use traits::{DerivedFact, Sink, SinkError};
