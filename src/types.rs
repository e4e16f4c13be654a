use std::fmt;

use serde::Serialize;

use crate::status::DeviceSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AcPower {
    Off,
    On,
    AwayOff,
    AwayOn,
}

impl AcPower {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => AcPower::On,
            0b10 => AcPower::AwayOff,
            0b11 => AcPower::AwayOn,
            _ => AcPower::Off,
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, AcPower::On | AcPower::AwayOn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AcMode {
    Auto,
    Heat,
    Dry,
    Fan,
    Cool,
    AutoHeat,
    AutoCool,
}

impl AcMode {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(AcMode::Auto),
            1 => Some(AcMode::Heat),
            2 => Some(AcMode::Dry),
            3 => Some(AcMode::Fan),
            4 => Some(AcMode::Cool),
            8 => Some(AcMode::AutoHeat),
            9 => Some(AcMode::AutoCool),
            _ => None,
        }
    }

    /// Value written into the AC control message. The controller only accepts
    /// the five base modes; the auto variants are reported, never commanded.
    pub fn control_bits(&self) -> u8 {
        match self {
            AcMode::Auto | AcMode::AutoHeat | AcMode::AutoCool => 0,
            AcMode::Heat => 1,
            AcMode::Dry => 2,
            AcMode::Fan => 3,
            AcMode::Cool => 4,
        }
    }
}

impl fmt::Display for AcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AcMode::Auto => "AUTO",
            AcMode::Heat => "HEAT",
            AcMode::Dry => "DRY",
            AcMode::Fan => "FAN",
            AcMode::Cool => "COOL",
            AcMode::AutoHeat => "AUTO_HEAT",
            AcMode::AutoCool => "AUTO_COOL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FanSpeed {
    Auto,
    Quiet,
    Low,
    Medium,
    High,
    Powerful,
    Turbo,
}

impl FanSpeed {
    pub const ALL: [FanSpeed; 7] = [
        FanSpeed::Auto,
        FanSpeed::Quiet,
        FanSpeed::Low,
        FanSpeed::Medium,
        FanSpeed::High,
        FanSpeed::Powerful,
        FanSpeed::Turbo,
    ];

    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.get(bits as usize).copied()
    }

    pub fn bits(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FanSpeed::Auto => "AUTO",
            FanSpeed::Quiet => "QUIET",
            FanSpeed::Low => "LOW",
            FanSpeed::Medium => "MEDIUM",
            FanSpeed::High => "HIGH",
            FanSpeed::Powerful => "POWERFUL",
            FanSpeed::Turbo => "TURBO",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ZonePower {
    Off,
    On,
    Turbo,
}

impl ZonePower {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => ZonePower::On,
            0b11 => ZonePower::Turbo,
            _ => ZonePower::Off,
        }
    }

    pub fn from_command_str(s: &str) -> Option<Self> {
        match s {
            "POWER_OFF" | "OFF" => Some(ZonePower::Off),
            "POWER_ON" | "ON" => Some(ZonePower::On),
            "TURBO_POWER" | "TURBO" => Some(ZonePower::Turbo),
            _ => None,
        }
    }
}

impl fmt::Display for ZonePower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZonePower::Off => "POWER_OFF",
            ZonePower::On => "POWER_ON",
            ZonePower::Turbo => "TURBO_POWER",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ZoneControlMethod {
    #[default]
    Percentage,
    Temperature,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcStatus {
    pub ac_number: u8,
    pub power: AcPower,
    pub mode: Option<AcMode>,
    pub fan_speed: Option<FanSpeed>,
    pub setpoint: u8,
    pub temperature: f64,
    pub spill: bool,
    pub timer: bool,
    pub error_code: u16,
}

impl AcStatus {
    pub fn has_error(&self) -> bool {
        self.error_code != 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcAbility {
    pub ac_number: u8,
    pub name: String,
    pub start_zone: u8,
    pub zone_count: u8,
    pub supported_modes: Vec<AcMode>,
    pub supported_fan_speeds: Vec<FanSpeed>,
    pub min_setpoint: u8,
    pub max_setpoint: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneStatus {
    pub zone_number: u8,
    pub power: ZonePower,
    pub control_method: ZoneControlMethod,
    pub open_percentage: u8,
    pub setpoint: u8,
    pub turbo_supported: bool,
    pub spill: bool,
    /// Present only when the zone has a temperature sensor.
    pub temperature: Option<f64>,
    /// Present only when the zone has a temperature sensor.
    pub battery_low: Option<bool>,
}

impl ZoneStatus {
    pub fn has_sensor(&self) -> bool {
        self.temperature.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneName {
    pub zone_number: u8,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleVersion {
    pub update_available: bool,
    pub versions: Vec<String>,
}

/// Lifecycle of the service as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingFullUpdate,
    Ready,
}

/// Notifications delivered to the registered listener, in the order the
/// underlying responses arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// Every response of the latest full-update batch has been merged.
    FullUpdate(DeviceSnapshot),
    AcStatusChanged(Vec<AcStatus>),
    ZoneStatusChanged(Vec<ZoneStatus>),
}
