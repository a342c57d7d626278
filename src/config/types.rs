//! Configuration types

use crate::dataplane::{
    Cidr, Classifier, EngineSettings, NonTcpPolicy, SwitchId, Zone, DEFAULT_PORT_RANGE,
};
use crate::telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub switch: SwitchConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    #[serde(default)]
    pub firewall: FirewallConfig,
    #[serde(default)]
    pub nat: Option<NatConfig>,
    #[serde(default)]
    pub aging: AgingConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Forward LLDP and bridge-filtered frames
    pub transparent: bool,
    /// Seconds after connect during which floods are suppressed
    pub flood_hold_down: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub block_duration: u16,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            idle_timeout: 10,
            hard_timeout: 30,
            block_duration: 10,
        }
    }
}

/// Zone cidr stays a string here so that a bad range is a validation error
/// instead of a parse failure of the whole file.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    pub cidr: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    pub enabled: bool,
    pub inside_zone: String,
    pub non_tcp_inbound: NonTcpPolicy,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inside_zone: "inside".to_string(),
            non_tcp_inbound: NonTcpPolicy::Block,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatConfig {
    pub public_address: IpAddr,
    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,
    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,
    #[serde(default = "default_internal_zone")]
    pub internal_zone: String,
    /// Datapath ids acting as the boundary; empty means every switch
    #[serde(default)]
    pub switches: Vec<SwitchId>,
}

fn default_port_range_start() -> u16 {
    DEFAULT_PORT_RANGE.0
}

fn default_port_range_end() -> u16 {
    DEFAULT_PORT_RANGE.1
}

fn default_internal_zone() -> String {
    "inside".to_string()
}

/// Table sweeps, in seconds; 0 disables a sweep
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgingConfig {
    pub mac_max_age: u64,
    pub connection_max_age: u64,
    pub nat_idle_timeout: u64,
    pub sweep_interval: u64,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            mac_max_age: 0,
            connection_max_age: 0,
            nat_idle_timeout: 0,
            sweep_interval: 30,
        }
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl AgingConfig {
    pub fn mac_max_age(&self) -> Option<Duration> {
        seconds(self.mac_max_age)
    }

    pub fn connection_max_age(&self) -> Option<Duration> {
        seconds(self.connection_max_age)
    }

    pub fn nat_idle_timeout(&self) -> Option<Duration> {
        seconds(self.nat_idle_timeout)
    }

    /// Never zero, so it is always usable as a timer period
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }

    pub fn is_enabled(&self) -> bool {
        self.mac_max_age > 0 || self.connection_max_age > 0 || self.nat_idle_timeout > 0
    }
}

impl Config {
    /// Zones in configuration order. Fails on the first unparsable range.
    pub fn classifier(&self) -> crate::Result<Classifier> {
        let zones = self
            .zones
            .iter()
            .map(|zone| {
                let cidr: Cidr = zone.cidr.parse().map_err(|e| {
                    crate::Error::Config(format!("zone '{}': {}", zone.name, e))
                })?;
                Ok(Zone::new(zone.name.clone(), cidr))
            })
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(Classifier::new(zones))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            transparent: self.switch.transparent,
            flood_hold_down: Duration::from_secs(self.switch.flood_hold_down),
            idle_timeout: self.flow.idle_timeout,
            hard_timeout: self.flow.hard_timeout,
            block_duration: self.flow.block_duration,
        }
    }

    pub fn has_zone(&self, name: &str) -> bool {
        self.zones.iter().any(|zone| zone.name == name)
    }
}

// ============================================================================
// Lock file types (generated, includes all defaults)
// ============================================================================

/// Generated lock file with all defaults filled in
#[derive(Debug, Clone, Serialize)]
pub struct ConfigLock {
    pub generated_at: String,
    pub switch: SwitchLock,
    pub flow: FlowLock,
    pub zones: Vec<ZoneLock>,
    pub firewall: FirewallLock,
    pub nat: Option<NatLock>,
    pub aging: AgingLock,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchLock {
    pub transparent: bool,
    pub flood_hold_down: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowLock {
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub block_duration: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneLock {
    pub name: String,
    /// Normalized (host bits cleared) when the range parses
    pub cidr: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FirewallLock {
    pub enabled: bool,
    pub inside_zone: String,
    pub non_tcp_inbound: NonTcpPolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct NatLock {
    pub public_address: IpAddr,
    pub port_range_start: u16,
    pub port_range_end: u16,
    pub pool_size: u32,
    pub internal_zone: String,
    pub switches: Vec<SwitchId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgingLock {
    pub mac_max_age: u64,
    pub connection_max_age: u64,
    pub nat_idle_timeout: u64,
    pub sweep_interval: u64,
}

impl ConfigLock {
    pub fn from_config(config: &Config) -> Self {
        let zones = config
            .zones
            .iter()
            .map(|zone| ZoneLock {
                name: zone.name.clone(),
                cidr: zone
                    .cidr
                    .parse::<Cidr>()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|_| zone.cidr.clone()),
            })
            .collect();

        let nat = config.nat.as_ref().map(|n| NatLock {
            public_address: n.public_address,
            port_range_start: n.port_range_start,
            port_range_end: n.port_range_end,
            pool_size: (u32::from(n.port_range_end) + 1).saturating_sub(u32::from(n.port_range_start)),
            internal_zone: n.internal_zone.clone(),
            switches: n.switches.clone(),
        });

        ConfigLock {
            generated_at: chrono::Utc::now().to_rfc3339(),
            switch: SwitchLock {
                transparent: config.switch.transparent,
                flood_hold_down: config.switch.flood_hold_down,
            },
            flow: FlowLock {
                idle_timeout: config.flow.idle_timeout,
                hard_timeout: config.flow.hard_timeout,
                block_duration: config.flow.block_duration,
            },
            zones,
            firewall: FirewallLock {
                enabled: config.firewall.enabled,
                inside_zone: config.firewall.inside_zone.clone(),
                non_tcp_inbound: config.firewall.non_tcp_inbound,
            },
            nat,
            aging: AgingLock {
                mac_max_age: config.aging.mac_max_age,
                connection_max_age: config.aging.connection_max_age,
                nat_idle_timeout: config.aging.nat_idle_timeout,
                sweep_interval: config.aging.sweep_interval,
            },
            logging: config.logging.clone(),
        }
    }
}
