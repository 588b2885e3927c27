//! Event types broadcast to interface subscribers.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so they can be
//! logged or forwarded as JSON without conversion.

pub mod events;
