//! OCPP 2.0.1 payloads
//!
//! - `types`: enumerations and datatypes
//! - `messages`: request/response pairs, each bound to its action through
//!   [`crate::OcppRequest`]

pub mod types;
pub mod messages;

pub use types::*;
pub use messages::*;
