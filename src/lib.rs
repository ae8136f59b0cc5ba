//! A library for polling Modbus irradiance/weather stations and exposing
//! their registers as named measurements.
//!
//! The crate is organized around a small data-acquisition core:
//!
//! 1. **Register map** ([`registers`]): which logical sensor lives at which
//!    `(address, register type)` pair, and the gain/offset transform that
//!    turns a raw 16-bit register into an engineering-unit value. Validated
//!    at construction; duplicate keys never reach the polling path.
//! 2. **Polling coordinator** ([`poller`]): the fixed-interval
//!    connect/read/publish cycle. Reads are deduplicated per
//!    `(address, type)` pair, a single bad register only blanks that
//!    address, and a connection failure fails the whole cycle while the
//!    previous snapshot stays in place. A background worker keeps the
//!    blocking Modbus I/O off the caller's thread.
//! 3. **Entities** ([`entity`]): the host-facing view, one sensor per
//!    enabled descriptor with a stable unique id and prefixed display name.
//!
//! Around the core sit the configuration pieces: [`connection`] models the
//! TCP/RS-485 parameters, and [`template`] the persisted JSON templates a
//! register map can be resolved from.
//!
//! ## Quick Start
//!
//! ```no_run
//! use irrcol_lib::client::ModbusTransport;
//! use irrcol_lib::connection::ConnectionConfig;
//! use irrcol_lib::poller::Poller;
//! use irrcol_lib::registers::{RegisterDescriptor, RegisterMap};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut map = RegisterMap::new();
//!     map.push(RegisterDescriptor::new("irradiance", "Irradiance", 0))?;
//!     map.push(RegisterDescriptor::new("temp_ext", "External Temperature", 1).with_gain(0.1))?;
//!
//!     let transport = ModbusTransport::new(ConnectionConfig::Tcp {
//!         host: "192.168.1.50".into(),
//!         port: 502,
//!     });
//!
//!     let mut poller = Poller::new(transport, map);
//!     let readings = poller.poll_once()?;
//!     for descriptor in poller.map().iter() {
//!         println!("{}: {:?}", descriptor.key, descriptor.presented_value(&readings));
//!     }
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod entity;
pub mod poller;
pub mod registers;

#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
#[cfg(feature = "serde")]
pub mod template;

#[cfg_attr(docsrs, doc(cfg(feature = "modbus-sync")))]
#[cfg(feature = "modbus-sync")]
pub mod client;
