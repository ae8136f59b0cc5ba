use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum DaemonOutput {
    /// Print presented values to the standard output each poll period.
    Console,
    /// Publish presented values and availability to an MQTT broker.
    Mqtt {
        /// The configuration file for the MQTT broker.
        #[arg(long, default_value_t = crate::mqtt::MqttConfig::DEFAULT_CONFIG_FILE.to_string())]
        config_file: String,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Interactively configure the device: connection method, register
    /// mapping with scaling coefficients, and optional template persistence.
    /// Writes the resolved device configuration file used by `read` and
    /// `daemon`.
    #[clap(verbatim_doc_comment)]
    Setup,

    /// List the register templates stored in the template file.
    Templates,

    /// Poll the device once and print the presented value of every enabled
    /// sensor.
    Read,

    /// Run continuously: poll the device at a fixed interval on a background
    /// worker and publish the presented values.
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// Poll interval (e.g. "30s", "1m"). Overrides the configured value.
        #[arg(value_parser = humantime::parse_duration, short, long)]
        poll_interval: Option<Duration>,

        /// Specifies the output.
        #[command(subcommand)]
        output: DaemonOutput,
    },
}

const fn about_text() -> &'static str {
    "Irradiance Collector CLI - Poll Modbus irradiance/weather stations and expose named measurements."
}

#[derive(Parser, Debug)]
#[command(name="irrcol", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is off.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Device configuration file, written by `setup`.
    #[arg(global = true, long, default_value = "sensor.yml")]
    pub config: PathBuf,

    /// Template storage file (JSON).
    #[arg(global = true, long, default_value = "templates.json")]
    pub templates: PathBuf,

    /// Modbus I/O timeout for connect/read operations.
    /// Examples: "1s", "500ms".
    #[arg(global = true, long, default_value = "1s", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Duration,
}
