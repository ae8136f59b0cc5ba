use anyhow::{Context, Result};
use irrcol_lib::connection::ConnectionConfig;
use irrcol_lib::poller::DEFAULT_POLL_INTERVAL;
use irrcol_lib::registers::{RegisterDescriptor, RegisterMap};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Resolved device configuration, written by the setup wizard and consumed
/// by `read` and `daemon`. The polling core only ever sees the register map
/// and connection parameters resolved from this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Entity display-name prefix.
    pub entity_name: String,
    /// Stable id this configuration derives entity unique ids from.
    pub instance_id: String,
    pub connection: ConnectionConfig,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    pub registers: Vec<RegisterDescriptor>,
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

impl DeviceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| {
            format!(
                "Cannot open configuration file {} (run `irrcol setup` first)",
                path.display()
            )
        })?;
        let config = serde_yaml::from_reader(&file)
            .with_context(|| format!("Malformed configuration file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Cannot create configuration file {}", path.display()))?;
        serde_yaml::to_writer(&file, self)
            .with_context(|| format!("Cannot write configuration file {}", path.display()))?;
        Ok(())
    }

    /// Rebuilds the validated register map; duplicate keys in a hand-edited
    /// file surface here instead of in the polling path.
    pub fn register_map(&self) -> Result<RegisterMap> {
        RegisterMap::from_descriptors(self.registers.iter().cloned())
            .context("Invalid register configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irrcol_lib::registers::RegisterType;

    #[test]
    fn config_round_trips_through_yaml() {
        let config = DeviceConfig {
            entity_name: "Rooftop Station".into(),
            instance_id: "rooftop_station".into(),
            connection: ConnectionConfig::Tcp {
                host: "192.168.1.50".into(),
                port: 502,
            },
            poll_interval: Duration::from_secs(30),
            registers: vec![
                RegisterDescriptor::new("irradiance", "Irradiance", 0).with_unit("W/m²"),
                RegisterDescriptor::new("temp_ext", "External Temperature", 1)
                    .with_register_type(RegisterType::Holding)
                    .with_gain(0.1),
            ],
        };

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: DeviceConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.entity_name, config.entity_name);
        assert_eq!(parsed.connection, config.connection);
        assert_eq!(parsed.registers, config.registers);

        let map = parsed.register_map().unwrap();
        assert_eq!(map.get("temp_ext").unwrap().register_type, RegisterType::Holding);
    }

    #[test]
    fn poll_interval_defaults_when_omitted() {
        let yaml = r#"
entity_name: Rooftop
instance_id: rooftop
connection:
  method: serial
  device: /dev/ttyUSB0
registers:
  - key: irradiance
    display_name: Irradiance
    address: 0
"#;
        let parsed: DeviceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(*parsed.connection.unit(), 1);
    }
}
