//! Flowgate - packet-in decision core for an OpenFlow controller
//!
//! For every packet a switch punts to the controller, decides whether to
//! flood it, forward it to a learned port, rewrite it through the NAT
//! boundary or drop it, and which flow entries to program as a side effect.
//! The OpenFlow transport itself lives outside this crate and plugs in
//! through [`dataplane::FlowProgrammer`].

pub mod config;
pub mod controller;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod replay;
pub mod telemetry;

pub use error::{Error, Result};
