//! End-to-end tests
//!
//! Each test builds a controller from a TOML config, connects switches and
//! drives packet-ins through it. A recording programmer stands in for the
//! OpenFlow transport, and `Controller::barrier` makes each exchange
//! deterministic.

mod firewall;
mod harness;
mod nat;
mod replay;
mod switching;
