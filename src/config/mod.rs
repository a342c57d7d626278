//! Configuration management
//!
//! Handles config.toml (user-defined) and config.lock (generated with all defaults).

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::dataplane::{Firewall, FlowEngine, NatBoundary, NatTranslator};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Parse configuration from TOML text
pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

/// Generate a lock file from config, filling in all defaults
pub fn generate_lock(config: &Config) -> ConfigLock {
    ConfigLock::from_config(config)
}

/// Build the decision engine described by `config`
pub fn build_engine(config: &Config, metrics: Arc<MetricsRegistry>) -> Result<FlowEngine> {
    let classifier = Arc::new(config.classifier()?);
    let mut engine = FlowEngine::new(config.engine_settings(), metrics);

    if config.firewall.enabled {
        engine = engine.with_firewall(Firewall::new(
            Arc::clone(&classifier),
            config.firewall.inside_zone.clone(),
            config.firewall.non_tcp_inbound,
        ));
    }

    if let Some(nat) = &config.nat {
        if nat.port_range_start > nat.port_range_end {
            return Err(Error::Config(format!(
                "nat: invalid port range {}-{}",
                nat.port_range_start, nat.port_range_end
            )));
        }
        let boundary = NatBoundary::new(
            nat.public_address,
            nat.internal_zone.clone(),
            classifier,
            NatTranslator::new(nat.port_range_start, nat.port_range_end),
        );
        engine = engine.with_nat(Arc::new(boundary), nat.switches.clone());
    }

    Ok(engine)
}
