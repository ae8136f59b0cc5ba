//! Register-map data model: which logical sensor lives at which Modbus
//! address, and how a raw register value becomes a presented measurement.
//!
//! A [`RegisterMap`] is built once at configuration time (from a template or
//! custom user input) and handed to the polling coordinator. It performs no
//! I/O; validation happens at construction so an invalid map never reaches
//! the polling path.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Configuration-time validation failures. These never occur in the polling
/// path; the configuration layer surfaces them before a map is accepted.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A sensor key may appear only once per map.
    #[error("duplicate sensor key: {0}")]
    DuplicateKey(String),

    /// Sensor keys identify readings and must not be empty.
    #[error("sensor key must not be empty")]
    EmptyKey,

    /// A template entry named a register type other than `input`/`holding`.
    #[error("unknown register type: {0}")]
    UnknownRegisterType(String),

    /// Baud rate is not one of the supported serial rates.
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// Modbus unit/slave ids live in 1..=247.
    #[error("unit id out of range (1-247): {0}")]
    UnitIdOutOfRange(u8),
}

/// Which Modbus address space a register lives in. The same numeric address
/// means different physical values depending on the space, so reads are
/// always keyed by `(address, RegisterType)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RegisterType {
    #[default]
    Input,
    Holding,
}

impl RegisterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterType::Input => "input",
            RegisterType::Holding => "holding",
        }
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegisterType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(RegisterType::Input),
            "holding" => Ok(RegisterType::Holding),
            other => Err(ValidationError::UnknownRegisterType(other.to_string())),
        }
    }
}

/// One logical sensor's physical binding: address, register type and the
/// linear transform turning the raw 16-bit value into an engineering unit.
///
/// The presentation fields (`display_name`, `unit`, `device_class`,
/// `unique_id`) are opaque to the polling core and only consumed by the
/// entity layer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterDescriptor {
    /// Stable identifier, unique within a map (e.g. "irradiance").
    pub key: String,
    pub address: u16,
    #[cfg_attr(feature = "serde", serde(default))]
    pub register_type: RegisterType,
    #[cfg_attr(feature = "serde", serde(default = "default_gain"))]
    pub gain: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub offset: f64,
    /// Disabled descriptors are excluded from reads and published entities.
    #[cfg_attr(feature = "serde", serde(default = "default_enabled"))]
    pub enabled: bool,
    pub display_name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub unit: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub device_class: Option<String>,
    /// Custom stable unique id; when absent the entity layer derives one.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub unique_id: Option<String>,
}

#[cfg(feature = "serde")]
fn default_gain() -> f64 {
    1.0
}

#[cfg(feature = "serde")]
fn default_enabled() -> bool {
    true
}

impl RegisterDescriptor {
    /// Creates a descriptor with gain 1.0, offset 0.0, input register type
    /// and no presentation metadata beyond the display name.
    pub fn new(key: impl Into<String>, display_name: impl Into<String>, address: u16) -> Self {
        Self {
            key: key.into(),
            address,
            register_type: RegisterType::default(),
            gain: 1.0,
            offset: 0.0,
            enabled: true,
            display_name: display_name.into(),
            unit: None,
            device_class: None,
            unique_id: None,
        }
    }

    pub fn with_register_type(mut self, register_type: RegisterType) -> Self {
        self.register_type = register_type;
        self
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_device_class(mut self, device_class: impl Into<String>) -> Self {
        self.device_class = Some(device_class.into());
        self
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    /// The presented value for this sensor from a published snapshot:
    /// `raw * gain + offset`, rounded to two decimals. `None` when the bound
    /// register was absent this cycle. Pure; calling it twice on the same
    /// snapshot yields the same result.
    pub fn presented_value(&self, readings: &ReadingSet) -> Option<f64> {
        readings
            .get(self.address, self.register_type)
            .map(|raw| round2(f64::from(raw) * self.gain + self.offset))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Ordered collection of descriptors, unique by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterMap {
    descriptors: Vec<RegisterDescriptor>,
}

impl RegisterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from descriptors, rejecting duplicate or empty keys.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = RegisterDescriptor>,
    ) -> Result<Self, ValidationError> {
        let mut map = Self::new();
        for descriptor in descriptors {
            map.push(descriptor)?;
        }
        Ok(map)
    }

    /// Appends a descriptor; fails if its key is empty or already present.
    pub fn push(&mut self, descriptor: RegisterDescriptor) -> Result<(), ValidationError> {
        if descriptor.key.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        if self.get(&descriptor.key).is_some() {
            return Err(ValidationError::DuplicateKey(descriptor.key));
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&RegisterDescriptor> {
        self.descriptors.iter().find(|d| d.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterDescriptor> {
        self.descriptors.iter()
    }

    /// Enabled descriptors only; the subset that contributes reads and
    /// published entities.
    pub fn enabled(&self) -> impl Iterator<Item = &RegisterDescriptor> {
        self.descriptors.iter().filter(|d| d.enabled)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// The distinct `(address, register type)` pairs one poll cycle must
    /// read, in first-seen descriptor order. Descriptors sharing a pair cost
    /// one wire read; the same address in both spaces is two different
    /// registers and costs two.
    pub fn needed_reads(&self) -> Vec<(u16, RegisterType)> {
        let mut pairs = Vec::new();
        for descriptor in self.enabled() {
            let pair = (descriptor.address, descriptor.register_type);
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        pairs
    }
}

/// Default register layout of the generic irradiance weather station.
/// Templates and the setup wizard start from this catalog.
pub fn default_descriptors() -> Vec<RegisterDescriptor> {
    vec![
        RegisterDescriptor::new("irradiance", "Irradiance", 0)
            .with_unit("W/m²")
            .with_device_class("irradiance"),
        RegisterDescriptor::new("temp_ext", "External Temperature", 1)
            .with_gain(0.1)
            .with_unit("°C")
            .with_device_class("temperature"),
        RegisterDescriptor::new("temp_int", "Internal Temperature", 2)
            .with_gain(0.1)
            .with_unit("°C")
            .with_device_class("temperature"),
        RegisterDescriptor::new("wind_v", "Wind Speed", 3)
            .with_gain(0.1)
            .with_unit("m/s")
            .with_device_class("wind_speed"),
        RegisterDescriptor::new("wind_dir", "Wind Direction", 4).with_unit("°"),
    ]
}

/// Snapshot of one poll cycle: raw register value per `(address, type)`
/// pair, or `None` where that single read failed. Immutable once published;
/// the coordinator replaces the whole snapshot atomically behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingSet {
    values: BTreeMap<(u16, RegisterType), Option<u16>>,
}

impl ReadingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one register read; `None` marks a read that
    /// errored this cycle.
    pub fn insert(&mut self, address: u16, register_type: RegisterType, value: Option<u16>) {
        self.values.insert((address, register_type), value);
    }

    /// Raw value for a register, or `None` if it was absent this cycle or
    /// never read.
    pub fn get(&self, address: u16, register_type: RegisterType) -> Option<u16> {
        self.values.get(&(address, register_type)).copied().flatten()
    }

    /// Whether a read of this register was attempted this cycle, regardless
    /// of its outcome.
    pub fn contains(&self, address: u16, register_type: RegisterType) -> bool {
        self.values.contains_key(&(address, register_type))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn reading(address: u16, register_type: RegisterType, raw: u16) -> ReadingSet {
        let mut set = ReadingSet::new();
        set.insert(address, register_type, Some(raw));
        set
    }

    #[test]
    fn presented_value_applies_gain_and_offset() {
        let set = reading(0, RegisterType::Input, 250);
        let descriptor = RegisterDescriptor::new("irradiance", "Irradiance", 0);
        assert_eq!(descriptor.presented_value(&set), Some(250.0));

        let set = reading(1, RegisterType::Input, 235);
        let descriptor = RegisterDescriptor::new("temp_ext", "External Temperature", 1).with_gain(0.1);
        assert_eq!(descriptor.presented_value(&set), Some(23.5));

        let set = reading(3, RegisterType::Input, 1000);
        let descriptor = RegisterDescriptor::new("wind_v", "Wind Speed", 3)
            .with_gain(0.1)
            .with_offset(-5.0);
        assert_eq!(descriptor.presented_value(&set), Some(95.0));
    }

    #[test]
    fn presented_value_rounds_to_two_decimals() {
        let set = reading(0, RegisterType::Input, 3);
        let descriptor = RegisterDescriptor::new("x", "X", 0).with_gain(1.0 / 3.0);
        assert_eq!(descriptor.presented_value(&set), Some(1.0));

        let set = reading(0, RegisterType::Input, 1234);
        let descriptor = RegisterDescriptor::new("x", "X", 0).with_gain(0.001);
        assert_eq!(descriptor.presented_value(&set), Some(1.23));
    }

    #[test]
    fn presented_value_is_idempotent() {
        let set = reading(2, RegisterType::Holding, 421);
        let descriptor = RegisterDescriptor::new("temp_int", "Internal Temperature", 2)
            .with_register_type(RegisterType::Holding)
            .with_gain(0.1);
        let first = descriptor.presented_value(&set);
        let second = descriptor.presented_value(&set);
        assert_eq!(first, second);
        assert_eq!(first, Some(42.1));
    }

    #[test]
    fn absent_reading_presents_as_none() {
        let mut set = ReadingSet::new();
        set.insert(0, RegisterType::Input, None);
        let descriptor = RegisterDescriptor::new("irradiance", "Irradiance", 0);
        assert_eq!(descriptor.presented_value(&set), None);
        // Same address in the other register space was never read at all.
        let holding = RegisterDescriptor::new("other", "Other", 0)
            .with_register_type(RegisterType::Holding);
        assert_eq!(holding.presented_value(&set), None);
    }

    #[test]
    fn same_pair_diverges_per_descriptor() {
        let set = reading(5, RegisterType::Input, 100);
        let a = RegisterDescriptor::new("a", "A", 5).with_gain(0.1);
        let b = RegisterDescriptor::new("b", "B", 5).with_gain(2.0).with_offset(1.0);
        assert_eq!(a.presented_value(&set), Some(10.0));
        assert_eq!(b.presented_value(&set), Some(201.0));
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut map = RegisterMap::new();
        map.push(RegisterDescriptor::new("irradiance", "Irradiance", 0))
            .unwrap();
        assert_matches!(
            map.push(RegisterDescriptor::new("irradiance", "Other", 7)),
            Err(ValidationError::DuplicateKey(key)) if key == "irradiance"
        );
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn empty_key_is_rejected() {
        let mut map = RegisterMap::new();
        assert_matches!(
            map.push(RegisterDescriptor::new("", "Nameless", 0)),
            Err(ValidationError::EmptyKey)
        );
    }

    #[test]
    fn needed_reads_deduplicates_by_address_and_type() {
        let map = RegisterMap::from_descriptors([
            RegisterDescriptor::new("a", "A", 0),
            RegisterDescriptor::new("b", "B", 0).with_gain(0.5),
            RegisterDescriptor::new("c", "C", 0).with_register_type(RegisterType::Holding),
            RegisterDescriptor::new("d", "D", 1),
        ])
        .unwrap();
        assert_eq!(
            map.needed_reads(),
            vec![
                (0, RegisterType::Input),
                (0, RegisterType::Holding),
                (1, RegisterType::Input),
            ]
        );
    }

    #[test]
    fn disabled_descriptors_do_not_contribute_reads() {
        let mut disabled = RegisterDescriptor::new("b", "B", 9);
        disabled.enabled = false;
        let map = RegisterMap::from_descriptors([
            RegisterDescriptor::new("a", "A", 0),
            disabled,
        ])
        .unwrap();
        assert_eq!(map.needed_reads(), vec![(0, RegisterType::Input)]);
        assert_eq!(map.enabled().count(), 1);
    }

    #[test]
    fn register_type_parses_from_template_strings() {
        assert_eq!("input".parse::<RegisterType>().unwrap(), RegisterType::Input);
        assert_eq!(
            "holding".parse::<RegisterType>().unwrap(),
            RegisterType::Holding
        );
        assert_matches!(
            "coil".parse::<RegisterType>(),
            Err(ValidationError::UnknownRegisterType(t)) if t == "coil"
        );
    }

    #[test]
    fn default_catalog_has_unique_keys() {
        let map = RegisterMap::from_descriptors(default_descriptors()).unwrap();
        assert_eq!(map.len(), 5);
        assert_eq!(map.get("irradiance").unwrap().address, 0);
        assert_eq!(map.get("wind_dir").unwrap().gain, 1.0);
    }
}
