//! Emission and acknowledgment
//!
//! Every delivered fact is settled exactly once, and only after all of its
//! emissions have been issued.

mod emission;
mod ledger;
mod output;

pub use emission::{AckPolicy, EmissionGateway, Settlement};
pub use ledger::AckLedger;
pub use output::{EmitError, OutputHandle};
