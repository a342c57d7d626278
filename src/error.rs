use crate::protocol::MacAddr;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("cannot classify address {addr:?}")]
    Classification { addr: String },

    #[error("NAT port pool {start}-{end} exhausted")]
    PoolExhausted { start: u16, end: u16 },

    #[error("no NAT binding for external port {port}")]
    UnmappedReturnTraffic { port: u16 },

    #[error("{mac} was learned on ingress port {port}")]
    LoopDetected { mac: MacAddr, port: u16 },

    #[error("switch {0:016x} is not connected")]
    UnknownSwitch(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
