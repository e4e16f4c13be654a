use std::collections::BTreeMap;

use serde::Serialize;

use crate::protocol::{Payload, Response};
use crate::types::*;
use crate::{Error, Result};

/// Most recently reported state of every AC unit and zone.
///
/// Each response replaces its section wholesale; records are never merged
/// field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub ac_statuses: Vec<AcStatus>,
    pub ac_abilities: BTreeMap<u8, AcAbility>,
    pub zone_statuses: Vec<ZoneStatus>,
    pub zone_names: BTreeMap<u8, String>,
    pub console_version: Option<ConsoleVersion>,
}

impl DeviceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, response: &Response) {
        match &response.payload {
            Payload::AcStatus(statuses) => self.ac_statuses = statuses.clone(),
            Payload::ZoneStatus(statuses) => self.zone_statuses = statuses.clone(),
            Payload::ZoneName(names) => {
                self.zone_names = names
                    .iter()
                    .map(|n| (n.zone_number, n.name.clone()))
                    .collect();
            }
            Payload::AcAbility(abilities) => {
                self.ac_abilities = abilities
                    .iter()
                    .map(|a| (a.ac_number, a.clone()))
                    .collect();
            }
            Payload::ConsoleVersion(versions) => self.console_version = versions.first().cloned(),
            Payload::Other(_) => {}
        }
    }

    pub fn zone_status(&self, zone_number: u8) -> Option<&ZoneStatus> {
        self.zone_statuses.iter().find(|z| z.zone_number == zone_number)
    }

    pub fn ac_status(&self, ac_number: u8) -> Option<&AcStatus> {
        self.ac_statuses.iter().find(|a| a.ac_number == ac_number)
    }

    pub fn ac_ability(&self, ac_number: u8) -> Result<&AcAbility> {
        self.ac_abilities
            .get(&ac_number)
            .ok_or(Error::UnknownAc(ac_number))
    }

    pub fn zone_name(&self, zone_number: u8) -> Option<&str> {
        self.zone_names.get(&zone_number).map(String::as_str)
    }

    /// AC units own contiguous zone ranges starting at their `start_zone`.
    /// The owner of `zone_number` is the unit with the highest start not
    /// above it.
    pub fn find_ac_for_zone(&self, zone_number: u8) -> Result<&AcAbility> {
        self.ac_abilities
            .values()
            .filter(|ac| ac.start_zone <= zone_number)
            .max_by_key(|ac| ac.start_zone)
            .ok_or_else(|| Error::NoAcForZone {
                zone_number,
                zone_name: self.zone_name(zone_number).map(str::to_string),
            })
    }

    /// Zones that have a name but no status record yet.
    pub fn zones_missing_status(&self) -> Vec<u8> {
        self.zone_names
            .keys()
            .copied()
            .filter(|n| self.zone_status(*n).is_none())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::MessageType;

    pub(crate) fn ability(ac_number: u8, start_zone: u8) -> AcAbility {
        AcAbility {
            ac_number,
            name: format!("AC{ac_number}"),
            start_zone,
            zone_count: 4,
            supported_modes: vec![AcMode::Auto, AcMode::Heat, AcMode::Cool],
            supported_fan_speeds: vec![FanSpeed::Auto, FanSpeed::Low, FanSpeed::High],
            min_setpoint: 16,
            max_setpoint: 30,
        }
    }

    pub(crate) fn zone(zone_number: u8, turbo_supported: bool) -> ZoneStatus {
        ZoneStatus {
            zone_number,
            power: ZonePower::On,
            control_method: ZoneControlMethod::Temperature,
            open_percentage: 100,
            setpoint: 22,
            turbo_supported,
            spill: false,
            temperature: Some(21.5),
            battery_low: Some(false),
        }
    }

    pub(crate) fn ac(ac_number: u8, setpoint: u8) -> AcStatus {
        AcStatus {
            ac_number,
            power: AcPower::On,
            mode: Some(AcMode::Cool),
            fan_speed: Some(FanSpeed::Auto),
            setpoint,
            temperature: 23.0,
            spill: false,
            timer: false,
            error_code: 0,
        }
    }

    fn with_abilities(abilities: Vec<AcAbility>) -> DeviceSnapshot {
        let mut snapshot = DeviceSnapshot::new();
        snapshot.merge(&Response::new(
            1,
            MessageType::AcAbility,
            Payload::AcAbility(abilities),
        ));
        snapshot
    }

    #[test]
    fn ac_status_merge_is_idempotent() {
        let mut snapshot = DeviceSnapshot::new();
        let resp = Response::new(1, MessageType::AcStatus, Payload::AcStatus(vec![ac(0, 22), ac(1, 24)]));
        snapshot.merge(&resp);
        let once = snapshot.clone();
        snapshot.merge(&resp);
        assert_eq!(snapshot, once);
        assert_eq!(snapshot.ac_statuses.len(), 2);
    }

    #[test]
    fn status_records_replaced_not_accumulated() {
        let mut snapshot = DeviceSnapshot::new();
        snapshot.merge(&Response::new(
            1,
            MessageType::ZoneStatus,
            Payload::ZoneStatus(vec![zone(0, false), zone(1, false), zone(2, false)]),
        ));
        snapshot.merge(&Response::new(
            2,
            MessageType::ZoneStatus,
            Payload::ZoneStatus(vec![zone(0, true)]),
        ));
        assert_eq!(snapshot.zone_statuses, vec![zone(0, true)]);
    }

    #[test]
    fn names_and_console_version_merge() {
        let mut snapshot = DeviceSnapshot::new();
        snapshot.merge(&Response::new(
            1,
            MessageType::ZoneName,
            Payload::ZoneName(vec![
                ZoneName { zone_number: 0, name: "Living".into() },
                ZoneName { zone_number: 1, name: "Study".into() },
            ]),
        ));
        assert_eq!(snapshot.zone_name(1), Some("Study"));
        assert_eq!(snapshot.zones_missing_status(), vec![0, 1]);

        let version = ConsoleVersion {
            update_available: false,
            versions: vec!["1.2.3".into()],
        };
        snapshot.merge(&Response::new(
            2,
            MessageType::ConsoleVersion,
            Payload::ConsoleVersion(vec![version.clone()]),
        ));
        assert_eq!(snapshot.console_version, Some(version));

        snapshot.merge(&Response::new(3, MessageType::ConsoleVersion, Payload::ConsoleVersion(vec![])));
        assert_eq!(snapshot.console_version, None);
    }

    #[test]
    fn unknown_payloads_are_ignored() {
        let mut snapshot = with_abilities(vec![ability(0, 0)]);
        let before = snapshot.clone();
        snapshot.merge(&Response::new(9, MessageType::Unknown(0x77), Payload::Other(vec![1, 2, 3])));
        snapshot.merge(&Response::new(10, MessageType::ZoneControl, Payload::Other(vec![])));
        assert_eq!(snapshot, before);
    }

    #[test]
    fn zones_resolve_to_contiguous_ac_ranges() {
        let snapshot = with_abilities(vec![ability(0, 0), ability(1, 4)]);
        for z in 0..4 {
            assert_eq!(snapshot.find_ac_for_zone(z).unwrap().ac_number, 0, "zone {z}");
        }
        for z in [4, 5, 7, 15] {
            assert_eq!(snapshot.find_ac_for_zone(z).unwrap().ac_number, 1, "zone {z}");
        }
    }

    #[test]
    fn boundary_zone_is_not_assigned_to_the_next_ac() {
        // A reversed comparison (start >= zone) would hand zones 1..=4 to AC 1.
        let snapshot = with_abilities(vec![ability(1, 4), ability(0, 0)]);
        assert_eq!(snapshot.find_ac_for_zone(2).unwrap().ac_number, 0);
        assert_eq!(snapshot.find_ac_for_zone(3).unwrap().ac_number, 0);
        assert_eq!(snapshot.find_ac_for_zone(4).unwrap().ac_number, 1);
    }

    #[test]
    fn zone_below_every_range_is_a_lookup_error() {
        let snapshot = with_abilities(vec![ability(0, 2), ability(1, 6)]);
        let err = snapshot.find_ac_for_zone(1).unwrap_err();
        assert!(err.is_lookup(), "got {err:?}");
        assert!(matches!(err, Error::NoAcForZone { zone_number: 1, .. }));
    }

    #[test]
    fn empty_abilities_is_a_lookup_error() {
        let snapshot = DeviceSnapshot::new();
        assert!(matches!(
            snapshot.find_ac_for_zone(0),
            Err(Error::NoAcForZone { zone_number: 0, zone_name: None })
        ));
        assert!(matches!(snapshot.ac_ability(0), Err(Error::UnknownAc(0))));
    }
}
