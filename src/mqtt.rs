use anyhow::{Context, Result};
use irrcol_lib::entity::Sensor;
use irrcol_lib::registers::ReadingSet;
use paho_mqtt as mqtt;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Topic segment identifying this station; defaults to the configured
    /// instance id.
    pub entity_id: Option<String>,
    /// Quality of service code to use
    #[serde(default = "default_qos")]
    qos: u8,
}

fn default_qos() -> u8 {
    0
}

impl MqttConfig {
    pub const DEFAULT_CONFIG_FILE: &'static str = "mqtt.yml";

    pub fn qos(&self) -> i32 {
        assert!((0..=2).contains(&self.qos));
        self.qos as i32
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Cannot open MQTT configuration file {}", path.display()))?;
        let config = serde_yaml::from_reader(&file)
            .with_context(|| format!("Malformed MQTT configuration file {}", path.display()))?;
        Ok(config)
    }
}

const TOPIC_PREFIX: &str = "irrcol";
const APPENDIX_AVAILABILITY: &str = "availability";
const APPENDIX_STATE: &str = "state";

/// Connected MQTT publisher for one station.
pub struct MqttPublisher {
    client: mqtt::Client,
    qos: i32,
    root: String,
}

impl MqttPublisher {
    pub fn connect(config: &MqttConfig, fallback_entity_id: &str) -> Result<Self> {
        let mut client =
            mqtt::Client::new(config.url.clone()).with_context(|| "Error creating mqtt client")?;

        // Use 5sec timeouts for sync calls.
        client.set_timeout(Duration::from_secs(5));

        let mut conn_builder = mqtt::ConnectOptionsBuilder::new();
        let mut conn_builder = conn_builder
            .keep_alive_interval(Duration::from_secs(20))
            .clean_session(true);
        if let Some(user_name) = &config.username {
            conn_builder = conn_builder.user_name(user_name);
        }
        if let Some(password) = &config.password {
            conn_builder = conn_builder.password(password);
        }
        client
            .connect(conn_builder.finalize())
            .with_context(|| "Mqtt client unable to connect")?;

        let root = config
            .entity_id
            .clone()
            .unwrap_or_else(|| fallback_entity_id.to_string());
        Ok(Self {
            client,
            qos: config.qos(),
            root,
        })
    }

    fn topic(&self, parts: &[&str]) -> String {
        format!("{TOPIC_PREFIX}/{}/{}", self.root, parts.join("/"))
    }

    fn publish(&self, topic: String, payload: &str, retained: bool) -> Result<()> {
        let msg = if retained {
            mqtt::Message::new_retained(topic, payload, self.qos)
        } else {
            mqtt::Message::new(topic, payload, self.qos)
        };
        self.client
            .publish(msg)
            .with_context(|| "Cannot publish mqtt message")
    }

    pub fn go_online(&self) -> Result<()> {
        self.publish(self.topic(&[APPENDIX_AVAILABILITY]), "online", false)
    }

    pub fn go_offline(&self) -> Result<()> {
        self.publish(self.topic(&[APPENDIX_AVAILABILITY]), "offline", true)
    }

    /// Publishes one poll cycle: the station-wide availability topic plus
    /// per-sensor state and availability. `readings` is `None` while the
    /// coordinator is in cycle-failure state, which takes every sensor
    /// offline in bulk instead of leaving stale values standing.
    pub fn publish_cycle(&self, sensors: &[Sensor], readings: Option<&ReadingSet>) -> Result<()> {
        let station = if readings.is_some() { "online" } else { "offline" };
        self.publish(self.topic(&[APPENDIX_AVAILABILITY]), station, false)?;

        for sensor in sensors {
            match readings.and_then(|readings| sensor.value(readings)) {
                Some(value) => {
                    self.publish(
                        self.topic(&[sensor.key(), APPENDIX_STATE]),
                        &value.to_string(),
                        false,
                    )?;
                    self.publish(
                        self.topic(&[sensor.key(), APPENDIX_AVAILABILITY]),
                        "online",
                        false,
                    )?;
                }
                None => {
                    self.publish(
                        self.topic(&[sensor.key(), APPENDIX_AVAILABILITY]),
                        "offline",
                        false,
                    )?;
                }
            }
        }
        Ok(())
    }

    pub fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect(None)
            .with_context(|| "Error disconnect mqtt client")?;
        Ok(())
    }
}
