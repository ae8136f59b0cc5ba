//! Named register-map templates, persisted as a JSON array of
//! `{ "name": ..., "registers": { key: { addr, gain, offset, type, unique_id } } }`.
//!
//! The polling core never touches the template file; the configuration layer
//! reads and writes it and hands the core a fully resolved [`RegisterMap`].
//! This module only defines the document model and the pure conversions in
//! both directions.

use crate::registers::{
    default_descriptors, RegisterDescriptor, RegisterMap, RegisterType, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One register row inside a template. Presentation metadata is not part of
/// the persisted format; it comes from the built-in sensor catalog at
/// resolve time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRegister {
    pub addr: u16,
    #[serde(default = "default_gain")]
    pub gain: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub register_type: Option<RegisterType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
}

fn default_gain() -> f64 {
    1.0
}

/// A named, reusable register mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub registers: BTreeMap<String, TemplateRegister>,
}

impl Template {
    /// Captures an existing map as a template, preserving
    /// addr/gain/offset/type/unique_id per key.
    pub fn from_map(name: impl Into<String>, map: &RegisterMap) -> Self {
        let registers = map
            .iter()
            .map(|descriptor| {
                (
                    descriptor.key.clone(),
                    TemplateRegister {
                        addr: descriptor.address,
                        gain: descriptor.gain,
                        offset: descriptor.offset,
                        register_type: Some(descriptor.register_type),
                        unique_id: descriptor.unique_id.clone(),
                    },
                )
            })
            .collect();
        Self {
            name: name.into(),
            registers,
        }
    }

    /// Resolves the template into a register map. Catalog sensors keep their
    /// presentation metadata and pick up the template's physical binding;
    /// keys outside the catalog become bare descriptors named after the key.
    /// Pure function, no I/O.
    pub fn resolve(&self) -> Result<RegisterMap, ValidationError> {
        let mut map = RegisterMap::new();
        for mut descriptor in default_descriptors() {
            if let Some(register) = self.registers.get(&descriptor.key) {
                apply(register, &mut descriptor);
            }
            map.push(descriptor)?;
        }
        for (key, register) in &self.registers {
            if map.get(key).is_some() {
                continue;
            }
            let mut descriptor = RegisterDescriptor::new(key.clone(), key.clone(), register.addr);
            apply(register, &mut descriptor);
            map.push(descriptor)?;
        }
        Ok(map)
    }
}

fn apply(register: &TemplateRegister, descriptor: &mut RegisterDescriptor) {
    descriptor.address = register.addr;
    descriptor.gain = register.gain;
    descriptor.offset = register.offset;
    if let Some(register_type) = register.register_type {
        descriptor.register_type = register_type;
    }
    descriptor.unique_id = register.unique_id.clone();
}

/// Parses the persisted template document (a JSON array).
pub fn parse_templates(json: &str) -> serde_json::Result<Vec<Template>> {
    serde_json::from_str(json)
}

/// Serializes templates back to the persisted document format.
pub fn to_json(templates: &[Template]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(templates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    [
      {
        "name": "Rooftop Station",
        "registers": {
          "irradiance": { "addr": 10, "gain": 1.0, "offset": 0.0, "type": "holding" },
          "temp_ext": { "addr": 11, "gain": 0.1, "offset": -2.5, "unique_id": "rooftop_t_ext" }
        }
      }
    ]
    "#;

    #[test]
    fn parses_persisted_document() {
        let templates = parse_templates(SAMPLE).unwrap();
        assert_eq!(templates.len(), 1);
        let template = &templates[0];
        assert_eq!(template.name, "Rooftop Station");
        let irradiance = &template.registers["irradiance"];
        assert_eq!(irradiance.addr, 10);
        assert_eq!(irradiance.register_type, Some(RegisterType::Holding));
        let temp = &template.registers["temp_ext"];
        assert_eq!(temp.offset, -2.5);
        assert_eq!(temp.register_type, None);
        assert_eq!(temp.unique_id.as_deref(), Some("rooftop_t_ext"));
    }

    #[test]
    fn gain_defaults_to_one_when_omitted() {
        let json = r#"[{"name": "t", "registers": {"irradiance": {"addr": 3}}}]"#;
        let templates = parse_templates(json).unwrap();
        let register = &templates[0].registers["irradiance"];
        assert_eq!(register.gain, 1.0);
        assert_eq!(register.offset, 0.0);
    }

    #[test]
    fn resolve_overlays_catalog_defaults() {
        let templates = parse_templates(SAMPLE).unwrap();
        let map = templates[0].resolve().unwrap();

        let irradiance = map.get("irradiance").unwrap();
        assert_eq!(irradiance.address, 10);
        assert_eq!(irradiance.register_type, RegisterType::Holding);
        // Catalog presentation metadata survives the overlay.
        assert_eq!(irradiance.unit.as_deref(), Some("W/m²"));

        let temp = map.get("temp_ext").unwrap();
        assert_eq!(temp.address, 11);
        assert_eq!(temp.register_type, RegisterType::Input);
        assert_eq!(temp.unique_id.as_deref(), Some("rooftop_t_ext"));

        // Catalog sensors missing from the template keep their defaults.
        assert_eq!(map.get("wind_v").unwrap().address, 3);
    }

    #[test]
    fn resolve_keeps_unknown_keys() {
        let json = r#"[{"name": "t", "registers": {"humidity": {"addr": 8, "gain": 0.1}}}]"#;
        let templates = parse_templates(json).unwrap();
        let map = templates[0].resolve().unwrap();
        let humidity = map.get("humidity").unwrap();
        assert_eq!(humidity.address, 8);
        assert_eq!(humidity.gain, 0.1);
        assert_eq!(humidity.display_name, "humidity");
    }

    #[test]
    fn map_round_trips_through_template_format() {
        let templates = parse_templates(SAMPLE).unwrap();
        let map = templates[0].resolve().unwrap();

        let reserialized = Template::from_map("Rooftop Station", &map);
        let json = to_json(&[reserialized]).unwrap();
        let reparsed = parse_templates(&json).unwrap();
        let map_again = reparsed[0].resolve().unwrap();

        for descriptor in map.iter() {
            let again = map_again.get(&descriptor.key).unwrap();
            assert_eq!(again.address, descriptor.address);
            assert_eq!(again.gain, descriptor.gain);
            assert_eq!(again.offset, descriptor.offset);
            assert_eq!(again.register_type, descriptor.register_type);
            assert_eq!(again.unique_id, descriptor.unique_id);
        }
    }
}
