//! Configuration validation

use super::Config;
use crate::dataplane::Cidr;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_flow(config, &mut result);
    validate_zones(config, &mut result);
    validate_firewall(config, &mut result);
    validate_nat(config, &mut result);
    validate_aging(config, &mut result);

    result
}

fn validate_flow(config: &Config, result: &mut ValidationResult) {
    let flow = &config.flow;

    if flow.hard_timeout != 0 && flow.hard_timeout < flow.idle_timeout {
        result.warn(format!(
            "flow: hard_timeout ({}) is shorter than idle_timeout ({}), idle timeout never fires",
            flow.hard_timeout, flow.idle_timeout
        ));
    }

    if flow.block_duration == 0 {
        result.warn("flow.block_duration: 0 installs permanent drop flows");
    }
}

fn validate_zones(config: &Config, result: &mut ValidationResult) {
    for (i, zone) in config.zones.iter().enumerate() {
        if zone.name.is_empty() {
            result.error(format!("zones[{}]: name must not be empty", i));
        }

        if let Err(e) = zone.cidr.parse::<Cidr>() {
            result.error(format!("zones[{}] '{}': {}", i, zone.name, e));
        }

        if config.zones[..i].iter().any(|z| z.name == zone.name) {
            result.warn(format!(
                "zones[{}]: zone '{}' defined more than once, addresses match the first range listed",
                i, zone.name
            ));
        }
    }
}

fn validate_firewall(config: &Config, result: &mut ValidationResult) {
    if !config.firewall.enabled {
        return;
    }

    if !config.has_zone(&config.firewall.inside_zone) {
        result.warn(format!(
            "firewall.inside_zone: zone '{}' not defined, all inbound TCP will be blocked",
            config.firewall.inside_zone
        ));
    }
}

fn validate_nat(config: &Config, result: &mut ValidationResult) {
    let nat = match &config.nat {
        Some(nat) => nat,
        None => return,
    };

    if nat.port_range_start > nat.port_range_end {
        result.error(format!(
            "nat: invalid port range - start ({}) > end ({})",
            nat.port_range_start, nat.port_range_end
        ));
    }

    if nat.port_range_start < 1024 {
        result.warn(format!(
            "nat.port_range_start: {} overlaps well-known ports",
            nat.port_range_start
        ));
    }

    if !config.has_zone(&nat.internal_zone) {
        result.error(format!(
            "nat.internal_zone: zone '{}' not defined",
            nat.internal_zone
        ));
    }

    if let Ok(classifier) = config.classifier() {
        if classifier.is_in(&nat.internal_zone, nat.public_address) {
            result.error(format!(
                "nat.public_address: {} lies inside the internal zone '{}'",
                nat.public_address, nat.internal_zone
            ));
        }
    }
}

fn validate_aging(config: &Config, result: &mut ValidationResult) {
    let aging = &config.aging;

    if aging.is_enabled() && aging.sweep_interval == 0 {
        result.warn("aging.sweep_interval: 0 is not a valid period, using 1 second");
    }

    if aging.connection_max_age != 0 && aging.connection_max_age < u64::from(config.flow.idle_timeout)
    {
        result.warn(format!(
            "aging.connection_max_age ({}) is shorter than flow.idle_timeout ({}), return traffic of quiet connections will be blocked",
            aging.connection_max_age, config.flow.idle_timeout
        ));
    }
}
