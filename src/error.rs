use std::fmt;

use crate::types::{AcMode, FanSpeed, ZonePower};

#[derive(Debug)]
pub enum Error {
    NotConnected,
    Io(std::io::Error),
    Timeout,
    Protocol(String),
    InvalidSetpoint {
        value: i32,
        ac_number: u8,
        ac_name: String,
        min: u8,
        max: u8,
    },
    UnsupportedMode {
        mode: AcMode,
        ac_number: u8,
        ac_name: String,
        supported: Vec<AcMode>,
    },
    UnsupportedFanSpeed {
        fan_speed: FanSpeed,
        ac_number: u8,
        ac_name: String,
        supported: Vec<FanSpeed>,
    },
    UnsupportedZonePower {
        power: ZonePower,
        zone_number: u8,
        zone_name: Option<String>,
    },
    InvalidOpenPercentage(u8),
    NoAcForZone {
        zone_number: u8,
        zone_name: Option<String>,
    },
    UnknownAc(u8),
    UnknownZone(u8),
    InvalidConfig(String),
}

impl Error {
    /// Connection unavailable or a read/write failed. Callers recover by
    /// restarting the service.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::NotConnected | Error::Io(_) | Error::Timeout)
    }

    /// A command value was rejected before anything was transmitted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidSetpoint { .. }
                | Error::UnsupportedMode { .. }
                | Error::UnsupportedFanSpeed { .. }
                | Error::UnsupportedZonePower { .. }
                | Error::InvalidOpenPercentage(_)
        )
    }

    /// The snapshot does not (yet) know the AC or zone being addressed.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Error::NoAcForZone { .. } | Error::UnknownAc(_) | Error::UnknownZone(_)
        )
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotConnected => write!(f, "not connected"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Timeout => write!(f, "timed out waiting for connection"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::InvalidSetpoint {
                value,
                ac_number,
                ac_name,
                min,
                max,
            } => write!(
                f,
                "setpoint {value} is not supported for AC '{ac_name}' ({ac_number}), accepted range is {min} - {max}"
            ),
            Error::UnsupportedMode {
                mode,
                ac_number,
                ac_name,
                supported,
            } => write!(
                f,
                "mode {mode} is not supported for AC '{ac_name}' ({ac_number}), accepted modes are: {}",
                join(supported)
            ),
            Error::UnsupportedFanSpeed {
                fan_speed,
                ac_number,
                ac_name,
                supported,
            } => write!(
                f,
                "fan speed {fan_speed} is not supported for AC '{ac_name}' ({ac_number}), accepted fan speeds are: {}",
                join(supported)
            ),
            Error::UnsupportedZonePower {
                power,
                zone_number,
                zone_name,
            } => write!(
                f,
                "{power} is not supported for zone '{}' ({zone_number})",
                zone_name.as_deref().unwrap_or("")
            ),
            Error::InvalidOpenPercentage(value) => {
                write!(f, "open percentage {value} is outside 0 - 100")
            }
            Error::NoAcForZone {
                zone_number,
                zone_name,
            } => write!(
                f,
                "unable to determine AC unit for zone '{}' ({zone_number})",
                zone_name.as_deref().unwrap_or("")
            ),
            Error::UnknownAc(n) => write!(f, "unknown AC unit: {n}"),
            Error::UnknownZone(n) => write!(f, "unknown zone: {n}"),
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
