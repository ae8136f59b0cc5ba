//! Connection parameters for the two supported transports: Modbus TCP and
//! RS-485 serial. Values are validated at construction, in the same spirit
//! as the register map: an out-of-range unit id or unsupported baud rate
//! never reaches the transport layer.

use crate::registers::ValidationError;
use std::fmt;

/// Serial baud rates the collector supports.
pub const SUPPORTED_BAUD_RATES: [u32; 6] = [9600, 14400, 19200, 38400, 57600, 115200];

/// Baud rate for RS-485 communication, restricted to the supported set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub enum BaudRate {
    #[default]
    B9600,
    B14400,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl TryFrom<u32> for BaudRate {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            9600 => Ok(BaudRate::B9600),
            14400 => Ok(BaudRate::B14400),
            19200 => Ok(BaudRate::B19200),
            38400 => Ok(BaudRate::B38400),
            57600 => Ok(BaudRate::B57600),
            115200 => Ok(BaudRate::B115200),
            other => Err(ValidationError::UnsupportedBaudRate(other)),
        }
    }
}

impl From<BaudRate> for u32 {
    fn from(baud_rate: BaudRate) -> u32 {
        match baud_rate {
            BaudRate::B9600 => 9600,
            BaudRate::B14400 => 14400,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", u32::from(*self))
    }
}

/// Modbus unit/slave id. Sub-address of a device on a shared RS-485 bus;
/// fixed to 1 for direct TCP connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct UnitId(u8);

impl UnitId {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 247;
}

impl Default for UnitId {
    fn default() -> Self {
        UnitId(1)
    }
}

impl TryFrom<u8> for UnitId {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(UnitId(value))
        } else {
            Err(ValidationError::UnitIdOutOfRange(value))
        }
    }
}

impl From<UnitId> for u8 {
    fn from(unit: UnitId) -> u8 {
        unit.0
    }
}

impl std::ops::Deref for UnitId {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How to reach the device. The `Display` form is the connection-method
/// label used in update-failure reasons.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "method", rename_all = "lowercase"))]
pub enum ConnectionConfig {
    /// Modbus TCP; the unit id is always 1.
    Tcp {
        host: String,
        #[cfg_attr(feature = "serde", serde(default = "default_tcp_port"))]
        port: u16,
    },
    /// Modbus RTU over RS-485.
    Serial {
        device: String,
        #[cfg_attr(feature = "serde", serde(default))]
        baud_rate: BaudRate,
        #[cfg_attr(feature = "serde", serde(default))]
        unit: UnitId,
    },
}

pub const DEFAULT_TCP_PORT: u16 = 502;

#[cfg(feature = "serde")]
fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

impl ConnectionConfig {
    /// The unit id the poll cycle addresses: the configured value on a
    /// serial bus, 1 on TCP.
    pub fn unit(&self) -> UnitId {
        match self {
            ConnectionConfig::Tcp { .. } => UnitId::default(),
            ConnectionConfig::Serial { unit, .. } => *unit,
        }
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionConfig::Tcp { host, port } => write!(f, "Modbus TCP {host}:{port}"),
            ConnectionConfig::Serial {
                device,
                baud_rate,
                unit,
            } => write!(f, "RS-485 {device} @ {baud_rate} (unit {unit})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn baud_rate_accepts_supported_values_only() {
        for rate in SUPPORTED_BAUD_RATES {
            assert_eq!(u32::from(BaudRate::try_from(rate).unwrap()), rate);
        }
        assert_matches!(
            BaudRate::try_from(4800),
            Err(ValidationError::UnsupportedBaudRate(4800))
        );
    }

    #[test]
    fn unit_id_range() {
        assert_matches!(UnitId::try_from(0), Err(ValidationError::UnitIdOutOfRange(0)));
        assert_eq!(*UnitId::try_from(1).unwrap(), 1);
        assert_eq!(*UnitId::try_from(247).unwrap(), 247);
        assert_matches!(
            UnitId::try_from(248),
            Err(ValidationError::UnitIdOutOfRange(248))
        );
    }

    #[test]
    fn tcp_unit_is_fixed_to_one() {
        let tcp = ConnectionConfig::Tcp {
            host: "192.168.1.50".into(),
            port: 502,
        };
        assert_eq!(*tcp.unit(), 1);

        let serial = ConnectionConfig::Serial {
            device: "/dev/ttyUSB0".into(),
            baud_rate: BaudRate::B19200,
            unit: UnitId::try_from(7).unwrap(),
        };
        assert_eq!(*serial.unit(), 7);
    }

    #[test]
    fn display_names_the_connection_method() {
        let tcp = ConnectionConfig::Tcp {
            host: "solar.local".into(),
            port: 502,
        };
        assert_eq!(tcp.to_string(), "Modbus TCP solar.local:502");

        let serial = ConnectionConfig::Serial {
            device: "/dev/ttyUSB0".into(),
            baud_rate: BaudRate::default(),
            unit: UnitId::default(),
        };
        assert_eq!(serial.to_string(), "RS-485 /dev/ttyUSB0 @ 9600 (unit 1)");
    }
}
