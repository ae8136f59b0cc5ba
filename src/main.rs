//! Irradiance Collector CLI
//!
//! A command-line application for polling Modbus irradiance/weather stations
//! over Modbus TCP or RS-485 and exposing the configured registers as named
//! measurements.
//!
//! This tool allows users to:
//! - Interactively configure the connection method, register addresses,
//!   scaling coefficients and per-sensor enablement (`setup`).
//! - Persist and reuse register mappings as named templates.
//! - Poll the device once and print the presented values (`read`).
//! - Run in a continuous daemon mode that polls on a background worker and
//!   publishes values to the console or to an MQTT broker (`daemon`).
//!
//! The CLI leverages the `irrcol_lib` crate for the register-map data model
//! and the polling coordinator.

use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use irrcol_lib::client::ModbusTransport;
use irrcol_lib::entity::{sensors_from_map, Sensor};
use irrcol_lib::poller::{Poller, PollerHandle, PollerWorker};
use irrcol_lib::registers::ReadingSet;
use log::*;
use std::panic;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod commandline;
mod config;
mod mqtt;
mod setup;

use commandline::{CliCommands, DaemonOutput};
use config::DeviceConfig;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));

        let cause = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<cause unknown>"
        };

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

fn build_poller(
    timeout: Duration,
    config: &DeviceConfig,
) -> Result<(Poller<ModbusTransport>, Vec<Sensor>)> {
    let map = config.register_map()?;
    let sensors = sensors_from_map(&map, &config.entity_name, &config.instance_id);
    let transport = ModbusTransport::new(config.connection.clone()).with_timeout(timeout);
    Ok((Poller::new(transport, map), sensors))
}

fn print_readings(sensors: &[Sensor], readings: Option<&ReadingSet>) {
    for sensor in sensors {
        match readings.and_then(|readings| sensor.value(readings)) {
            Some(value) => match sensor.unit() {
                Some(unit) => println!("{}: {value} {unit}", sensor.name()),
                None => println!("{}: {value}", sensor.name()),
            },
            None => println!("{}: unavailable", sensor.name()),
        }
    }
}

fn handle_read(timeout: Duration, config: &DeviceConfig) -> Result<()> {
    let (mut poller, sensors) = build_poller(timeout, config)?;
    let readings = poller
        .poll_once()
        .with_context(|| format!("Cannot read measurements from {}", config.connection))?;
    print_readings(&sensors, Some(&readings));
    poller.shutdown();
    Ok(())
}

fn handle_templates(path: &Path) -> Result<()> {
    let templates = setup::load_templates(path)?;
    if templates.is_empty() {
        println!("No templates stored in {}", path.display());
        return Ok(());
    }
    for template in &templates {
        println!("{}:", template.name);
        for (key, register) in &template.registers {
            let register_type = register
                .register_type
                .map(|t| t.as_str())
                .unwrap_or("input");
            print!(
                "  {key}: addr={} gain={} offset={} type={register_type}",
                register.addr, register.gain, register.offset
            );
            match &register.unique_id {
                Some(unique_id) => println!(" unique_id={unique_id}"),
                None => println!(),
            }
        }
    }
    Ok(())
}

fn install_ctrlc_handler() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
        trace!("Received Ctrl-C");
    })
    .context("Error setting Ctrl-C handler")?;
    Ok(running)
}

// Sleep out one publish period in short slices so Ctrl-C is honored
// promptly.
fn sleep_while_running(running: &AtomicBool, period: Duration) {
    const SLICE: Duration = Duration::from_millis(100);
    let mut remaining = period;
    while !remaining.is_zero() && running.load(Ordering::SeqCst) {
        let slice = remaining.min(SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
}

/// The latest snapshot for presentation: `None` while the coordinator is in
/// cycle-failure state, so dependent sensors go unavailable in bulk.
fn presentable_readings(handle: &PollerHandle) -> Option<Arc<ReadingSet>> {
    if let Some(error) = handle.last_error() {
        warn!("Last update failed: {error}");
        return None;
    }
    handle.latest()
}

fn handle_daemon(
    timeout: Duration,
    config: &DeviceConfig,
    poll_interval: Option<Duration>,
    output: &DaemonOutput,
) -> Result<()> {
    let interval = poll_interval.unwrap_or(config.poll_interval);
    let (mut poller, sensors) = build_poller(timeout, config)?;

    // The first refresh must succeed before anything is exposed; a failure
    // here is a setup failure, not a retried cycle.
    poller
        .poll_once()
        .with_context(|| "First refresh failed, not starting daemon")?;

    let running = install_ctrlc_handler()?;
    info!(
        "Starting daemon: {} ({} sensors, poll interval {interval:?})",
        config.connection,
        sensors.len()
    );
    let mut worker =
        PollerWorker::spawn(poller, interval).context("Cannot spawn polling worker")?;
    let handle = worker.handle();

    match output {
        DaemonOutput::Console => {
            while running.load(Ordering::SeqCst) {
                let readings = presentable_readings(&handle);
                print_readings(&sensors, readings.as_deref());
                sleep_while_running(&running, interval);
            }
        }
        DaemonOutput::Mqtt { config_file } => {
            let mqtt_config = mqtt::MqttConfig::load(Path::new(config_file))?;
            let publisher = mqtt::MqttPublisher::connect(&mqtt_config, &config.instance_id)?;
            publisher.go_online()?;
            while running.load(Ordering::SeqCst) {
                let readings = presentable_readings(&handle);
                publisher.publish_cycle(&sensors, readings.as_deref())?;
                sleep_while_running(&running, interval);
            }
            publisher.go_offline()?;
            publisher.disconnect()?;
        }
    }

    info!("Stopping...");
    worker.stop();
    Ok(())
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "irrcol started. Log level: {}",
        args.verbose.log_level_filter()
    );

    match &args.command {
        CliCommands::Setup => setup::run(&args.templates, &args.config),
        CliCommands::Templates => handle_templates(&args.templates),
        CliCommands::Read => {
            let config = DeviceConfig::load(&args.config)?;
            handle_read(args.timeout, &config)
        }
        CliCommands::Daemon {
            poll_interval,
            output,
        } => {
            let config = DeviceConfig::load(&args.config)?;
            handle_daemon(args.timeout, &config, *poll_interval, output)
        }
    }
}
