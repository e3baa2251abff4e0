//! servo-transport: half-duplex serial servo bus abstractions
//!
//! This crate defines the contract a servo bus backend must fulfil (register
//! reads and writes, bulk sync writes, fast sync reads and pings) together with
//! the id and value types shared by everything above it. Framing, checksums and
//! bus-level retries live inside the backend. The default build enables a
//! `mock` backend so that binaries and tests run on any host without hardware.

mod types;
pub use types::{PingInfo, ServoId, Value};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{Connect, ServoTransport};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBus, WriteRecord};
