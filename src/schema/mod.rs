//! Field schema shared by every node in the network

mod declaration;
mod field;

pub use declaration::OutputSchema;
pub use field::{FactFields, Field, FieldValue, FieldValues};
