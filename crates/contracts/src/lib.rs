//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the bridge.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Data Model
//! - `Envelope`: a bus message stamped with its receipt time
//! - `BridgeConfig`: the immutable configuration document, loaded once
//! - `DataSink`: the interface every delivery sink implements
//! - `TokenProvider`: delegated credential acquisition for token-based sinks

mod config;
mod credential;
mod envelope;
mod error;
mod sink;

pub use config::*;
pub use credential::*;
pub use envelope::{rfc3339_nano, Envelope};
pub use error::*;
pub use sink::*;
