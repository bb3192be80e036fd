//! Shared conformance test harness for Greentic event subscription backends.
//! Intended for use in integration tests with provider crates.

mod assertions;
mod capabilities;
mod contract;
mod env;
mod fixtures;
mod patience;
mod suite;

pub use assertions::*;
pub use capabilities::*;
pub use contract::*;
pub use env::*;
pub use fixtures::*;
pub use patience::*;
pub use suite::*;
