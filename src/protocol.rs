use std::fmt;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::types::*;
use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 9004;

const HEADER: [u8; 2] = [0x55, 0x55];
/// Header, address, id, type and length.
const PREAMBLE_LEN: usize = 8;
const MAX_DATA_LEN: usize = 2048;

pub const ADDRESS_STANDARD_REQUEST: u16 = 0x80b0;
pub const ADDRESS_EXTENDED_REQUEST: u16 = 0x90b0;
pub const ADDRESS_STANDARD_RESPONSE: u16 = 0xb080;
pub const ADDRESS_EXTENDED_RESPONSE: u16 = 0xb090;

pub const TYPE_ZONE_CONTROL: u8 = 0x2a;
pub const TYPE_ZONE_STATUS: u8 = 0x2b;
pub const TYPE_AC_CONTROL: u8 = 0x2c;
pub const TYPE_AC_STATUS: u8 = 0x2d;
pub const TYPE_EXTENDED: u8 = 0x1f;

pub const EXTENDED_AC_ERROR: [u8; 2] = [0xff, 0x10];
pub const EXTENDED_AC_ABILITY: [u8; 2] = [0xff, 0x11];
pub const EXTENDED_ZONE_NAME: [u8; 2] = [0xff, 0x12];
pub const EXTENDED_CONSOLE_VERSION: [u8; 2] = [0xff, 0x30];

const ZONE_STATUS_LEN: usize = 6;
const AC_STATUS_LEN: usize = 8;
const ZONE_NAME_LEN: usize = 9;
const AC_NAME_LEN: usize = 16;
const AC_ABILITY_MIN_LEN: usize = AC_NAME_LEN + 6;

/// CRC16/MODBUS, as appended (big-endian) to every frame.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for byte in data {
        crc ^= *byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xa001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    ZoneControl,
    ZoneStatus,
    AcControl,
    AcStatus,
    ZoneName,
    AcAbility,
    AcError,
    ConsoleVersion,
    /// Extended message with a sub-type this crate does not decode.
    Extended(u8),
    Unknown(u8),
}

impl MessageType {
    fn classify(message_type: u8, data: &[u8]) -> Self {
        match message_type {
            TYPE_ZONE_CONTROL => MessageType::ZoneControl,
            TYPE_ZONE_STATUS => MessageType::ZoneStatus,
            TYPE_AC_CONTROL => MessageType::AcControl,
            TYPE_AC_STATUS => MessageType::AcStatus,
            TYPE_EXTENDED => match data.get(..2) {
                Some(sub) if sub == EXTENDED_AC_ABILITY => MessageType::AcAbility,
                Some(sub) if sub == EXTENDED_ZONE_NAME => MessageType::ZoneName,
                Some(sub) if sub == EXTENDED_AC_ERROR => MessageType::AcError,
                Some(sub) if sub == EXTENDED_CONSOLE_VERSION => MessageType::ConsoleVersion,
                Some(sub) => MessageType::Extended(sub[1]),
                None => MessageType::Extended(0),
            },
            other => MessageType::Unknown(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::ZoneControl => "zone_control",
            MessageType::ZoneStatus => "zone_status",
            MessageType::AcControl => "ac_control",
            MessageType::AcStatus => "ac_status",
            MessageType::ZoneName => "zone_name",
            MessageType::AcAbility => "ac_ability",
            MessageType::AcError => "ac_error",
            MessageType::ConsoleVersion => "console_version",
            MessageType::Extended(_) => "extended",
            MessageType::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Extended(sub) => write!(f, "extended(0x{sub:02x})"),
            MessageType::Unknown(t) => write!(f, "unknown(0x{t:02x})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// One raw frame, without header and checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: u16,
    pub message_id: u8,
    pub message_type: u8,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(address: u16, message_id: u8, message_type: u8, data: Vec<u8>) -> Self {
        Self {
            address,
            message_id,
            message_type,
            data,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PREAMBLE_LEN + self.data.len() + 2);
        out.extend_from_slice(&HEADER);
        out.extend_from_slice(&self.address.to_be_bytes());
        out.push(self.message_id);
        out.push(self.message_type);
        out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.data);
        let crc = crc16(&out[HEADER.len()..]);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    /// Decode one complete frame, header and checksum included.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PREAMBLE_LEN + 2 {
            return Err(Error::Protocol(format!("frame too short: {} bytes", bytes.len())));
        }
        if bytes[..2] != HEADER {
            return Err(Error::Protocol(format!("bad header: {}", to_hex(&bytes[..2]))));
        }
        let data_len = u16::from_be_bytes([bytes[6], bytes[7]]) as usize;
        if bytes.len() != PREAMBLE_LEN + data_len + 2 {
            return Err(Error::Protocol(format!(
                "length mismatch: header says {data_len} data bytes, frame has {}",
                bytes.len()
            )));
        }
        let body_end = PREAMBLE_LEN + data_len;
        let expected = u16::from_be_bytes([bytes[body_end], bytes[body_end + 1]]);
        let actual = crc16(&bytes[2..body_end]);
        if expected != actual {
            return Err(Error::Protocol(format!(
                "checksum mismatch: expected {expected:04x}, computed {actual:04x}"
            )));
        }
        Ok(Self {
            address: u16::from_be_bytes([bytes[2], bytes[3]]),
            message_id: bytes[4],
            message_type: bytes[5],
            data: bytes[PREAMBLE_LEN..body_end].to_vec(),
        })
    }
}

/// Read the next frame from `reader`, skipping any bytes before a header.
///
/// No address starts with `0x55`, so a run of `0x55` bytes is treated as
/// noise ending in the header and the frame starts at the first other byte.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame> {
    let mut previous = 0u8;
    loop {
        let byte = reader.read_u8().await?;
        if previous == HEADER[0] && byte == HEADER[1] {
            break;
        }
        previous = byte;
    }
    let mut first = reader.read_u8().await?;
    while first == HEADER[1] {
        first = reader.read_u8().await?;
    }

    let mut bytes = vec![0u8; PREAMBLE_LEN];
    bytes[..2].copy_from_slice(&HEADER);
    bytes[2] = first;
    reader.read_exact(&mut bytes[3..]).await?;
    let data_len = u16::from_be_bytes([bytes[6], bytes[7]]) as usize;
    if data_len > MAX_DATA_LEN {
        return Err(Error::Protocol(format!("frame data too long: {data_len} bytes")));
    }
    bytes.resize(PREAMBLE_LEN + data_len + 2, 0);
    reader.read_exact(&mut bytes[PREAMBLE_LEN..]).await?;
    Frame::decode(&bytes)
}

/// An outbound message, ready to be written by the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    message_type: MessageType,
    frame: Frame,
}

impl Request {
    fn standard(message_id: u8, message_type: u8, data: Vec<u8>) -> Self {
        Self {
            message_type: MessageType::classify(message_type, &data),
            frame: Frame::new(ADDRESS_STANDARD_REQUEST, message_id, message_type, data),
        }
    }

    fn extended(message_id: u8, sub_type: [u8; 2]) -> Self {
        let data = sub_type.to_vec();
        Self {
            message_type: MessageType::classify(TYPE_EXTENDED, &data),
            frame: Frame::new(ADDRESS_EXTENDED_REQUEST, message_id, TYPE_EXTENDED, data),
        }
    }

    pub fn zone_status(message_id: u8) -> Self {
        Self::standard(message_id, TYPE_ZONE_STATUS, Vec::new())
    }

    pub fn ac_status(message_id: u8) -> Self {
        Self::standard(message_id, TYPE_AC_STATUS, Vec::new())
    }

    pub fn zone_names(message_id: u8) -> Self {
        Self::extended(message_id, EXTENDED_ZONE_NAME)
    }

    pub fn ac_abilities(message_id: u8) -> Self {
        Self::extended(message_id, EXTENDED_AC_ABILITY)
    }

    pub fn console_version(message_id: u8) -> Self {
        Self::extended(message_id, EXTENDED_CONSOLE_VERSION)
    }

    pub fn message_id(&self) -> u8 {
        self.frame.message_id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.frame.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.to_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneSetting {
    #[default]
    Keep,
    Decrease,
    Increase,
    /// Setpoint or open percentage, as selected by the control method sent
    /// alongside it.
    Value(u8),
}

/// Builder for a zone (group) control message.
#[derive(Debug, Clone)]
pub struct ZoneControl {
    zone_number: u8,
    power: Option<ZonePower>,
    setting: ZoneSetting,
    control_method: Option<ZoneControlMethod>,
}

impl ZoneControl {
    pub fn new(zone_number: u8) -> Self {
        Self {
            zone_number,
            power: None,
            setting: ZoneSetting::Keep,
            control_method: None,
        }
    }

    pub fn power(mut self, power: ZonePower) -> Self {
        self.power = Some(power);
        self
    }

    pub fn setting(mut self, setting: ZoneSetting) -> Self {
        self.setting = setting;
        self
    }

    /// Switches the zone between percentage and temperature control.
    pub fn control_method(mut self, method: ZoneControlMethod) -> Self {
        self.control_method = Some(method);
        self
    }

    /// Sets the target temperature and puts the zone under temperature
    /// control.
    pub fn setpoint(self, value: u8) -> Self {
        self.setting(ZoneSetting::Value(value))
            .control_method(ZoneControlMethod::Temperature)
    }

    /// Sets the damper opening and puts the zone under percentage control.
    pub fn open_percentage(self, value: u8) -> Self {
        self.setting(ZoneSetting::Value(value))
            .control_method(ZoneControlMethod::Percentage)
    }

    pub fn build(self, message_id: u8) -> Request {
        let power_bits = match self.power {
            None => 0b000,
            Some(ZonePower::Off) => 0b010,
            Some(ZonePower::On) => 0b011,
            Some(ZonePower::Turbo) => 0b101,
        };
        let (setting_bits, value) = match self.setting {
            ZoneSetting::Keep => (0b000, 0),
            ZoneSetting::Decrease => (0b010, 0),
            ZoneSetting::Increase => (0b011, 0),
            ZoneSetting::Value(v) => (0b100, v),
        };
        let method_bits = match self.control_method {
            None => 0b00,
            Some(ZoneControlMethod::Percentage) => 0b10,
            Some(ZoneControlMethod::Temperature) => 0b11,
        };
        let data = vec![
            self.zone_number,
            (setting_bits << 5) | (method_bits << 3) | power_bits,
            value,
            0,
        ];
        Request::standard(message_id, TYPE_ZONE_CONTROL, data)
    }
}

/// Builder for an AC unit control message. Unset fields keep their value.
#[derive(Debug, Clone)]
pub struct AcControl {
    ac_number: u8,
    power: Option<bool>,
    mode: Option<AcMode>,
    fan_speed: Option<FanSpeed>,
    setpoint: Option<u8>,
}

impl AcControl {
    pub fn new(ac_number: u8) -> Self {
        Self {
            ac_number,
            power: None,
            mode: None,
            fan_speed: None,
            setpoint: None,
        }
    }

    pub fn power(mut self, on: bool) -> Self {
        self.power = Some(on);
        self
    }

    pub fn mode(mut self, mode: AcMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn fan_speed(mut self, fan_speed: FanSpeed) -> Self {
        self.fan_speed = Some(fan_speed);
        self
    }

    pub fn setpoint(mut self, setpoint: u8) -> Self {
        self.setpoint = Some(setpoint);
        self
    }

    pub fn build(self, message_id: u8) -> Request {
        let power_bits = match self.power {
            None => 0b00,
            Some(false) => 0b10,
            Some(true) => 0b11,
        };
        let mode_bits = self.mode.map_or(0x0f, |m| m.control_bits());
        let fan_bits = self.fan_speed.map_or(0x0f, |f| f.bits());
        let setpoint_byte = match self.setpoint {
            None => 0,
            Some(sp) => 0b0100_0000 | (sp & 0x3f),
        };
        let data = vec![
            (power_bits << 6) | (self.ac_number & 0x3f),
            (mode_bits << 4) | fan_bits,
            setpoint_byte,
            0,
        ];
        Request::standard(message_id, TYPE_AC_CONTROL, data)
    }
}

/// Decoded body of a response. Anything the aggregator does not consume is
/// carried as `Other`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Payload {
    AcStatus(Vec<AcStatus>),
    ZoneStatus(Vec<ZoneStatus>),
    ZoneName(Vec<ZoneName>),
    AcAbility(Vec<AcAbility>),
    ConsoleVersion(Vec<ConsoleVersion>),
    Other(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub message_id: u8,
    pub message_type: MessageType,
    pub payload: Payload,
}

impl Response {
    pub fn new(message_id: u8, message_type: MessageType, payload: Payload) -> Self {
        Self {
            message_id,
            message_type,
            payload,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_frame(&Frame::decode(bytes)?)
    }

    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let message_type = MessageType::classify(frame.message_type, &frame.data);
        let data = frame.data.as_slice();
        let payload = match message_type {
            MessageType::ZoneStatus => Payload::ZoneStatus(parse_zone_statuses(data)?),
            MessageType::AcStatus => Payload::AcStatus(parse_ac_statuses(data)?),
            MessageType::ZoneName => Payload::ZoneName(parse_zone_names(&data[2..])?),
            MessageType::AcAbility => Payload::AcAbility(parse_ac_abilities(&data[2..])?),
            MessageType::ConsoleVersion => {
                Payload::ConsoleVersion(parse_console_version(&data[2..])?)
            }
            _ => Payload::Other(data.to_vec()),
        };
        Ok(Self {
            message_id: frame.message_id,
            message_type,
            payload,
        })
    }
}

fn check_record_len(data: &[u8], record_len: usize, what: &str) -> Result<()> {
    if data.len() % record_len != 0 {
        return Err(Error::Protocol(format!(
            "{what} data length {} is not a multiple of {record_len}",
            data.len()
        )));
    }
    Ok(())
}

/// Bits 16-6 of a two-byte field hold `temperature * 10 + 500`.
fn decode_temperature(high: u8, low: u8) -> f64 {
    let raw = u16::from_be_bytes([high, low]) >> 5;
    (raw as f64 - 500.0) / 10.0
}

fn decode_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

fn parse_zone_statuses(data: &[u8]) -> Result<Vec<ZoneStatus>> {
    check_record_len(data, ZONE_STATUS_LEN, "zone status")?;
    Ok(data
        .chunks_exact(ZONE_STATUS_LEN)
        .map(|r| {
            let has_sensor = r[3] & 0x80 != 0;
            ZoneStatus {
                zone_number: r[0] & 0x3f,
                power: ZonePower::from_bits(r[0] >> 6),
                control_method: if r[1] & 0x80 != 0 {
                    ZoneControlMethod::Temperature
                } else {
                    ZoneControlMethod::Percentage
                },
                open_percentage: r[1] & 0x7f,
                setpoint: r[2] & 0x3f,
                turbo_supported: r[2] & 0x40 != 0,
                spill: r[5] & 0x10 != 0,
                temperature: has_sensor.then(|| decode_temperature(r[4], r[5])),
                battery_low: has_sensor.then_some(r[2] & 0x80 != 0),
            }
        })
        .collect())
}

fn parse_ac_statuses(data: &[u8]) -> Result<Vec<AcStatus>> {
    check_record_len(data, AC_STATUS_LEN, "AC status")?;
    Ok(data
        .chunks_exact(AC_STATUS_LEN)
        .map(|r| AcStatus {
            ac_number: r[0] & 0x3f,
            power: AcPower::from_bits(r[0] >> 6),
            mode: AcMode::from_bits(r[1] >> 4),
            fan_speed: FanSpeed::from_bits(r[1] & 0x0f),
            setpoint: r[2] & 0x3f,
            temperature: decode_temperature(r[4], r[5]),
            spill: r[2] & 0x80 != 0,
            timer: r[2] & 0x40 != 0,
            error_code: u16::from_be_bytes([r[6], r[7]]),
        })
        .collect())
}

fn parse_zone_names(data: &[u8]) -> Result<Vec<ZoneName>> {
    check_record_len(data, ZONE_NAME_LEN, "zone name")?;
    Ok(data
        .chunks_exact(ZONE_NAME_LEN)
        .map(|r| ZoneName {
            zone_number: r[0],
            name: decode_name(&r[1..]),
        })
        .collect())
}

fn parse_ac_abilities(mut data: &[u8]) -> Result<Vec<AcAbility>> {
    let mut abilities = Vec::new();
    while !data.is_empty() {
        if data.len() < 2 {
            return Err(Error::Protocol("truncated AC ability record".to_string()));
        }
        let ac_number = data[0];
        let len = data[1] as usize;
        let Some(body) = data.get(2..2 + len) else {
            return Err(Error::Protocol(format!(
                "AC ability record for AC {ac_number} claims {len} bytes, {} available",
                data.len() - 2
            )));
        };
        if len < AC_ABILITY_MIN_LEN {
            return Err(Error::Protocol(format!(
                "AC ability record for AC {ac_number} too short: {len} bytes"
            )));
        }
        let rest = &body[AC_NAME_LEN..];
        let mode_bits = rest[2];
        let supported_modes = [
            (0x01, AcMode::Auto),
            (0x02, AcMode::Heat),
            (0x04, AcMode::Dry),
            (0x08, AcMode::Fan),
            (0x10, AcMode::Cool),
        ]
        .into_iter()
        .filter(|(bit, _)| mode_bits & bit != 0)
        .map(|(_, mode)| mode)
        .collect();
        let fan_bits = rest[3];
        let supported_fan_speeds = FanSpeed::ALL
            .into_iter()
            .filter(|f| fan_bits & (1 << f.bits()) != 0)
            .collect();

        abilities.push(AcAbility {
            ac_number,
            name: decode_name(&body[..AC_NAME_LEN]),
            start_zone: rest[0],
            zone_count: rest[1],
            supported_modes,
            supported_fan_speeds,
            min_setpoint: rest[4],
            max_setpoint: rest[5],
        });
        data = &data[2 + len..];
    }
    Ok(abilities)
}

fn parse_console_version(data: &[u8]) -> Result<Vec<ConsoleVersion>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() < 2 {
        return Err(Error::Protocol("truncated console version".to_string()));
    }
    let len = data[1] as usize;
    let text = data
        .get(2..2 + len)
        .ok_or_else(|| Error::Protocol(format!("console version claims {len} bytes")))?;
    let versions = String::from_utf8_lossy(text)
        .split('|')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    Ok(vec![ConsoleVersion {
        update_available: data[0] != 0,
        versions,
    }])
}
