//! Routing policies
//!
//! Policies decide which downstream channels see a fact next. They are
//! selected when the topology is built and are immutable afterwards.

mod broadcast;
mod eddy;
mod policy;

pub use broadcast::BroadcastRouter;
pub use eddy::EddyRouter;
pub use policy::{PolicyKind, RouteError, RoutingDecision, RoutingPolicy};
