//! Guards applied to outbound commands before anything is transmitted.

use crate::status::DeviceSnapshot;
use crate::types::*;
use crate::{Error, Result};

fn check_setpoint(ability: &AcAbility, value: i32) -> Result<()> {
    if value < ability.min_setpoint as i32 || value > ability.max_setpoint as i32 {
        return Err(Error::InvalidSetpoint {
            value,
            ac_number: ability.ac_number,
            ac_name: ability.name.clone(),
            min: ability.min_setpoint,
            max: ability.max_setpoint,
        });
    }
    Ok(())
}

impl DeviceSnapshot {
    pub fn validate_ac_setpoint(&self, ac_number: u8, value: i32) -> Result<()> {
        check_setpoint(self.ac_ability(ac_number)?, value)
    }

    pub fn validate_ac_mode(&self, ac_number: u8, mode: AcMode) -> Result<()> {
        let ability = self.ac_ability(ac_number)?;
        if !ability.supported_modes.contains(&mode) {
            return Err(Error::UnsupportedMode {
                mode,
                ac_number,
                ac_name: ability.name.clone(),
                supported: ability.supported_modes.clone(),
            });
        }
        Ok(())
    }

    pub fn validate_ac_fan_speed(&self, ac_number: u8, fan_speed: FanSpeed) -> Result<()> {
        let ability = self.ac_ability(ac_number)?;
        if !ability.supported_fan_speeds.contains(&fan_speed) {
            return Err(Error::UnsupportedFanSpeed {
                fan_speed,
                ac_number,
                ac_name: ability.name.clone(),
                supported: ability.supported_fan_speeds.clone(),
            });
        }
        Ok(())
    }

    /// Turbo is only accepted for zones whose status reports support for it.
    pub fn validate_zone_power(&self, zone_number: u8, power: ZonePower) -> Result<()> {
        if power != ZonePower::Turbo {
            return Ok(());
        }
        let zone = self
            .zone_status(zone_number)
            .ok_or(Error::UnknownZone(zone_number))?;
        if !zone.turbo_supported {
            return Err(Error::UnsupportedZonePower {
                power,
                zone_number,
                zone_name: self.zone_name(zone_number).map(str::to_string),
            });
        }
        Ok(())
    }

    /// Zone setpoints are bounded by the owning AC unit's range.
    pub fn validate_zone_setpoint(&self, zone_number: u8, value: i32) -> Result<()> {
        check_setpoint(self.find_ac_for_zone(zone_number)?, value)
    }

    pub fn validate_zone_open_percentage(&self, value: u8) -> Result<()> {
        if value > 100 {
            return Err(Error::InvalidOpenPercentage(value));
        }
        Ok(())
    }
}
