//! Fleetdeck Core - Host and session abstractions for the fleet dashboard
//!
//! This crate provides the types that every other Fleetdeck crate depends on:
//!
//! - `HostConfig` / `HostAuth` - How to reach and authenticate against a host
//! - `Session` - One live remote command-execution channel
//! - `SessionTransport` - Capability that opens sessions to a host
//! - `FleetError` - Error taxonomy shared by transports and the pool

mod error;
mod host;
mod session;

pub use error::*;
pub use host::*;
pub use session::*;
