//! Interactive configuration wizard: connection method, register mapping
//! with scaling coefficients, and template persistence.
//!
//! The wizard is the only writer of the template file and the device
//! configuration file; the polling core receives the fully resolved result.

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Select};
use irrcol_lib::connection::{BaudRate, ConnectionConfig, UnitId, DEFAULT_TCP_PORT, SUPPORTED_BAUD_RATES};
use irrcol_lib::poller::DEFAULT_POLL_INTERVAL;
use irrcol_lib::registers::{default_descriptors, RegisterDescriptor, RegisterMap, RegisterType};
use irrcol_lib::template::{parse_templates, to_json, Template};
use log::info;
use std::fs;
use std::path::Path;

use crate::config::DeviceConfig;

/// Wizard menu entry for a fully custom mapping.
const MODEL_CUSTOM: &str = "Add custom";

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

pub fn load_templates(path: &Path) -> Result<Vec<Template>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read template file {}", path.display()))?;
    parse_templates(&json).with_context(|| format!("Malformed template file {}", path.display()))
}

pub fn save_templates(path: &Path, templates: &[Template]) -> Result<()> {
    let json = to_json(templates).context("Cannot serialize templates")?;
    fs::write(path, json).with_context(|| format!("Cannot write template file {}", path.display()))
}

/// Updates a template in place when one with the same name exists, appends
/// it otherwise.
fn upsert_template(templates: &mut Vec<Template>, template: Template) {
    if let Some(existing) = templates.iter_mut().find(|t| t.name == template.name) {
        existing.registers = template.registers;
    } else {
        templates.push(template);
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

fn prompt_connection() -> Result<ConnectionConfig> {
    let method = Select::new()
        .with_prompt("Connection method")
        .items(&["Modbus TCP", "RS-485"])
        .default(0)
        .interact()?;

    if method == 0 {
        let host: String = Input::new()
            .with_prompt("Host or IP address")
            .interact_text()?;
        let port: u16 = Input::new()
            .with_prompt("TCP port")
            .default(DEFAULT_TCP_PORT)
            .validate_with(|port: &u16| {
                if *port == 0 {
                    Err("port must be in 1-65535")
                } else {
                    Ok(())
                }
            })
            .interact_text()?;
        Ok(ConnectionConfig::Tcp { host, port })
    } else {
        let device: String = Input::new()
            .with_prompt("Serial device")
            .default(default_device_name())
            .interact_text()?;
        let rates: Vec<String> = SUPPORTED_BAUD_RATES.iter().map(u32::to_string).collect();
        let baud_index = Select::new()
            .with_prompt("Baud rate")
            .items(&rates)
            .default(0)
            .interact()?;
        let baud_rate = BaudRate::try_from(SUPPORTED_BAUD_RATES[baud_index])?;
        let unit: u8 = Input::new()
            .with_prompt("Modbus unit id (1-247)")
            .default(*UnitId::default())
            .validate_with(|unit: &u8| UnitId::try_from(*unit).map(|_| ()).map_err(|e| e.to_string()))
            .interact_text()?;
        Ok(ConnectionConfig::Serial {
            device,
            baud_rate,
            unit: UnitId::try_from(unit)?,
        })
    }
}

fn prompt_descriptor(descriptor: &RegisterDescriptor) -> Result<RegisterDescriptor> {
    println!("--- {} ---", descriptor.display_name);
    let mut edited = descriptor.clone();

    edited.enabled = Confirm::new()
        .with_prompt("Enabled")
        .default(descriptor.enabled)
        .show_default(true)
        .interact()?;
    if !edited.enabled {
        return Ok(edited);
    }

    let address: String = Input::new()
        .with_prompt("Register address (decimal or hex)")
        .default(descriptor.address.to_string())
        .validate_with(|s: &String| clap_num::maybe_hex::<u16>(s).map(|_| ()))
        .interact_text()?;
    edited.address = clap_num::maybe_hex::<u16>(&address).map_err(anyhow::Error::msg)?;

    edited.gain = Input::new()
        .with_prompt("Gain")
        .default(descriptor.gain)
        .interact_text()?;
    edited.offset = Input::new()
        .with_prompt("Offset")
        .default(descriptor.offset)
        .interact_text()?;

    let type_index = Select::new()
        .with_prompt("Register type")
        .items(&[RegisterType::Input.as_str(), RegisterType::Holding.as_str()])
        .default(match descriptor.register_type {
            RegisterType::Input => 0,
            RegisterType::Holding => 1,
        })
        .interact()?;
    edited.register_type = if type_index == 0 {
        RegisterType::Input
    } else {
        RegisterType::Holding
    };

    let unique_id: String = Input::new()
        .with_prompt("Custom unique id (empty for automatic)")
        .default(descriptor.unique_id.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;
    edited.unique_id = if unique_id.trim().is_empty() {
        None
    } else {
        Some(unique_id.trim().to_string())
    };

    Ok(edited)
}

pub fn run(templates_path: &Path, config_path: &Path) -> Result<()> {
    let mut templates = load_templates(templates_path)?;

    let connection = prompt_connection()?;

    let mut model_names = vec![MODEL_CUSTOM.to_string()];
    model_names.extend(templates.iter().map(|t| t.name.clone()));
    let model_index = Select::new()
        .with_prompt("Sensor model")
        .items(&model_names)
        .default(0)
        .interact()?;
    let base_map = if model_index == 0 {
        RegisterMap::from_descriptors(default_descriptors())?
    } else {
        templates[model_index - 1].resolve()?
    };

    let mut descriptors = Vec::new();
    for descriptor in base_map.iter() {
        descriptors.push(prompt_descriptor(descriptor)?);
    }
    // Duplicate keys from a hand-edited template surface here, before
    // anything is persisted.
    let map = RegisterMap::from_descriptors(descriptors)?;

    let default_entity_name = if model_index == 0 {
        "Irradiance Sensor".to_string()
    } else {
        model_names[model_index].clone()
    };
    let entity_name: String = Input::new()
        .with_prompt("Entity name prefix")
        .default(default_entity_name)
        .interact_text()?;
    let instance_id = slugify(&entity_name);

    if Confirm::new()
        .with_prompt("Save this mapping as a template?")
        .default(false)
        .show_default(true)
        .interact()?
    {
        let template_name: String = Input::new()
            .with_prompt("Template name")
            .default(entity_name.clone())
            .interact_text()?;
        upsert_template(&mut templates, Template::from_map(template_name, &map));
        save_templates(templates_path, &templates)?;
        info!("Templates saved to {}", templates_path.display());
    }

    let config = DeviceConfig {
        entity_name,
        instance_id,
        connection,
        poll_interval: DEFAULT_POLL_INTERVAL,
        registers: map.iter().cloned().collect(),
    };
    config.save(config_path)?;
    println!("Configuration written to {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_produces_stable_instance_ids() {
        assert_eq!(slugify("Rooftop Station"), "rooftop_station");
        assert_eq!(slugify("  Solar / West #2 "), "solar_west_2");
        assert_eq!(slugify("Irradiance"), "irradiance");
    }

    #[test]
    fn upsert_replaces_registers_of_existing_template() {
        let map = RegisterMap::from_descriptors([RegisterDescriptor::new("irradiance", "Irradiance", 0)])
            .unwrap();
        let mut templates = vec![Template::from_map("Station", &map)];

        let updated_map = RegisterMap::from_descriptors([
            RegisterDescriptor::new("irradiance", "Irradiance", 10).with_gain(0.5),
        ])
        .unwrap();
        upsert_template(&mut templates, Template::from_map("Station", &updated_map));
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].registers["irradiance"].addr, 10);

        upsert_template(&mut templates, Template::from_map("Other", &map));
        assert_eq!(templates.len(), 2);
    }
}
