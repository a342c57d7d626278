//! Packet header parsing
//!
//! Just enough of each layer to build an OpenFlow 1.0 exact match.

pub mod ethernet;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;
pub mod types;
pub mod udp;

pub use types::*;
