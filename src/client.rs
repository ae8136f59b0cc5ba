//! Synchronous `tokio-modbus` transport for the polling coordinator.
//!
//! [`ModbusTransport`] lazily connects from a [`ConnectionConfig`] (TCP or
//! RS-485 with 8N1 framing) and maps the nested `tokio-modbus` results onto
//! the two failure classes the coordinator distinguishes: a device-side
//! Modbus exception fails only the offending address, a transport-level
//! error fails the cycle.
//!
//! # Example
//!
//! ```no_run
//! use irrcol_lib::client::ModbusTransport;
//! use irrcol_lib::connection::ConnectionConfig;
//! use irrcol_lib::poller::Transport;
//! use irrcol_lib::registers::RegisterType;
//! use std::time::Duration;
//!
//! let config = ConnectionConfig::Tcp {
//!     host: "192.168.1.50".into(),
//!     port: 502,
//! };
//! let mut transport = ModbusTransport::new(config).with_timeout(Duration::from_secs(1));
//! if transport.connect() {
//!     let raw = transport.read_register(RegisterType::Input, 0);
//!     println!("raw irradiance register: {raw:?}");
//! }
//! ```

use crate::connection::{BaudRate, ConnectionConfig};
use crate::poller::{Transport, TransportError};
use crate::registers::RegisterType;
use log::debug;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;
use tokio_modbus::prelude::SyncReader;
use tokio_modbus::Slave;

/// The parity used for serial communication.
pub const PARITY: &tokio_serial::Parity = &tokio_serial::Parity::None;
/// The number of stop bits used for serial communication.
pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
/// The number of data bits used for serial communication.
pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;

/// Creates a `tokio_serial::SerialPortBuilder` with the collector's 8N1
/// framing.
pub fn serial_port_builder(
    device: &str,
    baud_rate: &BaudRate,
) -> tokio_serial::SerialPortBuilder {
    tokio_serial::new(device, u32::from(*baud_rate))
        .parity(*PARITY)
        .stop_bits(*STOP_BITS)
        .data_bits(*DATA_BITS)
        .flow_control(tokio_serial::FlowControl::None)
}

/// Lazily connected synchronous Modbus transport over TCP or RS-485.
///
/// All methods block the current thread; run them on the poller's worker.
pub struct ModbusTransport {
    config: ConnectionConfig,
    timeout: Option<Duration>,
    ctx: Option<tokio_modbus::client::sync::Context>,
}

impl std::fmt::Debug for ModbusTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusTransport")
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .field("connected", &self.ctx.is_some())
            .finish()
    }
}

impl ModbusTransport {
    /// Creates an unconnected transport; the first [`Transport::connect`]
    /// call establishes the connection.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            timeout: None,
            ctx: None,
        }
    }

    /// Sets the Modbus I/O timeout applied to connect and read calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn resolve_tcp(host: &str, port: u16) -> Option<SocketAddr> {
        match (host, port).to_socket_addrs() {
            Ok(mut addrs) => addrs.next(),
            Err(err) => {
                debug!("cannot resolve {host}:{port}: {err}");
                None
            }
        }
    }

    fn open(&self) -> Option<Result<tokio_modbus::client::sync::Context, std::io::Error>> {
        match &self.config {
            ConnectionConfig::Tcp { host, port } => {
                let socket_addr = Self::resolve_tcp(host, *port)?;
                Some(tokio_modbus::client::sync::tcp::connect_slave(
                    socket_addr,
                    Slave(*self.config.unit()),
                ))
            }
            ConnectionConfig::Serial {
                device,
                baud_rate,
                unit,
            } => Some(tokio_modbus::client::sync::rtu::connect_slave(
                &serial_port_builder(device, baud_rate),
                Slave(**unit),
            )),
        }
    }
}

impl Transport for ModbusTransport {
    fn connect(&mut self) -> bool {
        if self.ctx.is_some() {
            return true;
        }
        let Some(opened) = self.open() else {
            return false;
        };
        match opened {
            Ok(mut ctx) => {
                ctx.set_timeout(self.timeout);
                debug!("connected to {}", self.config);
                self.ctx = Some(ctx);
                true
            }
            Err(err) => {
                debug!("cannot connect to {}: {err}", self.config);
                false
            }
        }
    }

    fn read_register(
        &mut self,
        register_type: RegisterType,
        address: u16,
    ) -> Result<u16, TransportError> {
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| TransportError::Transport("not connected".into()))?;
        let response = match register_type {
            RegisterType::Input => ctx.read_input_registers(address, 1),
            RegisterType::Holding => ctx.read_holding_registers(address, 1),
        };
        match response {
            Ok(Ok(values)) => values
                .first()
                .copied()
                .ok_or_else(|| TransportError::Transport("empty register response".into())),
            Ok(Err(exception)) => Err(TransportError::Exception(exception.to_string())),
            Err(err) => Err(TransportError::Transport(err.to_string())),
        }
    }

    fn close(&mut self) {
        // Dropping the context releases the socket or serial port.
        self.ctx = None;
    }

    fn describe(&self) -> String {
        self.config.to_string()
    }
}
