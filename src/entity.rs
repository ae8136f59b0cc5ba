//! Host-facing sensor entities: one per enabled descriptor, carrying the
//! identity contract (stable unique id, prefixed display name) and the pure
//! presented-value lookup against a published snapshot.

use crate::registers::{ReadingSet, RegisterDescriptor, RegisterMap};

/// One logical measurement exposed to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    descriptor: RegisterDescriptor,
    name: String,
    unique_id: String,
}

impl Sensor {
    /// Binds a descriptor to its host identity. The display name is the
    /// configured entity-name prefix plus the descriptor's display name; the
    /// unique id is the descriptor's custom one when present, otherwise the
    /// `<instance id>_<key>` composite.
    pub fn new(descriptor: RegisterDescriptor, entity_name: &str, instance_id: &str) -> Self {
        let name = format!("{} {}", entity_name, descriptor.display_name);
        let unique_id = descriptor
            .unique_id
            .clone()
            .unwrap_or_else(|| format!("{}_{}", instance_id, descriptor.key));
        Self {
            descriptor,
            name,
            unique_id,
        }
    }

    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn unit(&self) -> Option<&str> {
        self.descriptor.unit.as_deref()
    }

    pub fn device_class(&self) -> Option<&str> {
        self.descriptor.device_class.as_deref()
    }

    pub fn descriptor(&self) -> &RegisterDescriptor {
        &self.descriptor
    }

    /// Presented value from a snapshot; `None` when the bound register was
    /// absent. Pure pass-through to the descriptor transform.
    pub fn value(&self, readings: &ReadingSet) -> Option<f64> {
        self.descriptor.presented_value(readings)
    }

    /// Whether this sensor should be presented as available. Callers pass
    /// `None` while the coordinator is in cycle-failure state (or before the
    /// first successful refresh), which marks every sensor unavailable in
    /// bulk.
    pub fn is_available(&self, readings: Option<&ReadingSet>) -> bool {
        readings.is_some_and(|readings| self.value(readings).is_some())
    }
}

/// Builds the published entity list: enabled descriptors only.
pub fn sensors_from_map(map: &RegisterMap, entity_name: &str, instance_id: &str) -> Vec<Sensor> {
    map.enabled()
        .cloned()
        .map(|descriptor| Sensor::new(descriptor, entity_name, instance_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{ReadingSet, RegisterDescriptor, RegisterMap, RegisterType};

    #[test]
    fn unique_id_prefers_custom_then_composite() {
        let custom = Sensor::new(
            RegisterDescriptor::new("irradiance", "Irradiance", 0).with_unique_id("roof_irr"),
            "Rooftop",
            "a1b2c3",
        );
        assert_eq!(custom.unique_id(), "roof_irr");

        let derived = Sensor::new(
            RegisterDescriptor::new("temp_ext", "External Temperature", 1),
            "Rooftop",
            "a1b2c3",
        );
        assert_eq!(derived.unique_id(), "a1b2c3_temp_ext");
    }

    #[test]
    fn display_name_carries_entity_prefix() {
        let sensor = Sensor::new(
            RegisterDescriptor::new("wind_v", "Wind Speed", 3),
            "Rooftop Station",
            "a1b2c3",
        );
        assert_eq!(sensor.name(), "Rooftop Station Wind Speed");
    }

    #[test]
    fn disabled_descriptors_are_not_published() {
        let mut disabled = RegisterDescriptor::new("wind_dir", "Wind Direction", 4);
        disabled.enabled = false;
        let map = RegisterMap::from_descriptors([
            RegisterDescriptor::new("irradiance", "Irradiance", 0),
            disabled,
        ])
        .unwrap();

        let sensors = sensors_from_map(&map, "Rooftop", "a1b2c3");
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].key(), "irradiance");
    }

    #[test]
    fn availability_tracks_snapshot_and_cycle_state() {
        let sensor = Sensor::new(
            RegisterDescriptor::new("irradiance", "Irradiance", 0),
            "Rooftop",
            "a1b2c3",
        );

        // Cycle-failure state: no snapshot to consult.
        assert!(!sensor.is_available(None));

        let mut readings = ReadingSet::new();
        readings.insert(0, RegisterType::Input, Some(410));
        assert!(sensor.is_available(Some(&readings)));
        assert_eq!(sensor.value(&readings), Some(410.0));

        let mut absent = ReadingSet::new();
        absent.insert(0, RegisterType::Input, None);
        assert!(!sensor.is_available(Some(&absent)));
    }
}
