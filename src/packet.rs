//! Rocket-live packet schema.
//!
//! Telemetry and tracker receivers publish overlapping records; both are
//! decoded into the flat [`RocketLivePacket`]. [`PacketType`] names the subset
//! of fields each kind of topic actually carries, and [`LAST_PACKET_KEYS`] is
//! the field list of the "last packet" view, in display order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("Malformed packet payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unknown packet field '{0}'")]
    UnknownField(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightStatus {
    Launchpad,
    #[serde(rename = "Mach Delay")]
    MachDelay,
    Coast,
    #[serde(rename = "Drogue Deployment")]
    DrogueDeployment,
    #[serde(rename = "Drogue Descent")]
    DrogueDescent,
    #[serde(rename = "Main Deployment")]
    MainDeployment,
    #[serde(rename = "Main Descent")]
    MainDescent,
    Landed,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Header flags: four user flags and the 3-bit flight state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Flags {
    pub flag1: bool,
    pub flag2: bool,
    pub flag3: bool,
    pub flag4: bool,
    pub flight_state: FlightStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketInfo {
    pub msg_len: u8,
    pub id_tx: u8,
    pub flags: Flags,
}

/// Union of every telemetry and tracker field. Fields a payload omits keep
/// their default value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RocketLivePacket {
    pub info: PacketInfo,
    pub counter: u32,
    pub time_between_packets: f64,

    // gps
    pub time_utc: String,
    pub latitude: f64,
    pub longitude: f64,
    pub satelites_number: u32,

    // barometer
    pub pressure: f64,
    pub altitude: f64,
    pub max_altitude: f64,
    pub temperature: f64,

    // telemetry
    pub acceleration_x: f64,
    pub acceleration_y: f64,
    pub acceleration_z: f64,
    pub max_acceleration_x: f64,
    pub max_acceleration_y: f64,
    pub max_acceleration_z: f64,
    pub true_air_speed: f64,
    pub mach_number: f64,
    pub roll: f64,
    pub pitch: f64,
    pub heading: f64,
    pub q0: f64,
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
    pub displacement_x: f64,
    pub displacement_y: f64,
    pub velocity_horizontal: f64,
    pub velocity_vertical: f64,
    pub n2o_pressure: f64,
    pub pitot_pressure: f64,
    pub gyr_x: f64,
    pub gyr_y: f64,
    pub gyr_z: f64,

    // tracker
    pub latitude_direction: f64,
    pub longitude_direction: f64,
    pub hdop: f64,
    pub course: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKey {
    Counter,
    TimeBetweenPackets,
    TimeUtc,
    Latitude,
    Longitude,
    SatelitesNumber,
    Pressure,
    Altitude,
    MaxAltitude,
    Temperature,
    AccelerationX,
    AccelerationY,
    AccelerationZ,
    MaxAccelerationX,
    MaxAccelerationY,
    MaxAccelerationZ,
    TrueAirSpeed,
    MachNumber,
    Roll,
    Pitch,
    Heading,
    Q0,
    Q1,
    Q2,
    Q3,
    DisplacementX,
    DisplacementY,
    VelocityHorizontal,
    VelocityVertical,
    N2oPressure,
    PitotPressure,
    GyrX,
    GyrY,
    GyrZ,
    LatitudeDirection,
    LongitudeDirection,
    Hdop,
    Course,
}

impl PacketKey {
    pub const ALL: [PacketKey; 38] = [
        PacketKey::Counter,
        PacketKey::TimeBetweenPackets,
        PacketKey::TimeUtc,
        PacketKey::Latitude,
        PacketKey::Longitude,
        PacketKey::SatelitesNumber,
        PacketKey::Pressure,
        PacketKey::Altitude,
        PacketKey::MaxAltitude,
        PacketKey::Temperature,
        PacketKey::AccelerationX,
        PacketKey::AccelerationY,
        PacketKey::AccelerationZ,
        PacketKey::MaxAccelerationX,
        PacketKey::MaxAccelerationY,
        PacketKey::MaxAccelerationZ,
        PacketKey::TrueAirSpeed,
        PacketKey::MachNumber,
        PacketKey::Roll,
        PacketKey::Pitch,
        PacketKey::Heading,
        PacketKey::Q0,
        PacketKey::Q1,
        PacketKey::Q2,
        PacketKey::Q3,
        PacketKey::DisplacementX,
        PacketKey::DisplacementY,
        PacketKey::VelocityHorizontal,
        PacketKey::VelocityVertical,
        PacketKey::N2oPressure,
        PacketKey::PitotPressure,
        PacketKey::GyrX,
        PacketKey::GyrY,
        PacketKey::GyrZ,
        PacketKey::LatitudeDirection,
        PacketKey::LongitudeDirection,
        PacketKey::Hdop,
        PacketKey::Course,
    ];

    /// Field name as it appears in packet payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            PacketKey::Counter => "counter",
            PacketKey::TimeBetweenPackets => "time_between_packets",
            PacketKey::TimeUtc => "time_utc",
            PacketKey::Latitude => "latitude",
            PacketKey::Longitude => "longitude",
            PacketKey::SatelitesNumber => "satelites_number",
            PacketKey::Pressure => "pressure",
            PacketKey::Altitude => "altitude",
            PacketKey::MaxAltitude => "max_altitude",
            PacketKey::Temperature => "temperature",
            PacketKey::AccelerationX => "acceleration_x",
            PacketKey::AccelerationY => "acceleration_y",
            PacketKey::AccelerationZ => "acceleration_z",
            PacketKey::MaxAccelerationX => "max_acceleration_x",
            PacketKey::MaxAccelerationY => "max_acceleration_y",
            PacketKey::MaxAccelerationZ => "max_acceleration_z",
            PacketKey::TrueAirSpeed => "true_air_speed",
            PacketKey::MachNumber => "mach_number",
            PacketKey::Roll => "roll",
            PacketKey::Pitch => "pitch",
            PacketKey::Heading => "heading",
            PacketKey::Q0 => "q0",
            PacketKey::Q1 => "q1",
            PacketKey::Q2 => "q2",
            PacketKey::Q3 => "q3",
            PacketKey::DisplacementX => "displacement_x",
            PacketKey::DisplacementY => "displacement_y",
            PacketKey::VelocityHorizontal => "velocity_horizontal",
            PacketKey::VelocityVertical => "velocity_vertical",
            PacketKey::N2oPressure => "n2o_pressure",
            PacketKey::PitotPressure => "pitot_pressure",
            PacketKey::GyrX => "gyr_x",
            PacketKey::GyrY => "gyr_y",
            PacketKey::GyrZ => "gyr_z",
            PacketKey::LatitudeDirection => "latitude_direction",
            PacketKey::LongitudeDirection => "longitude_direction",
            PacketKey::Hdop => "hdop",
            PacketKey::Course => "course",
        }
    }
}

impl fmt::Display for PacketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PacketKey {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PacketKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| PacketError::UnknownField(s.to_string()))
    }
}

/// Field list of the "last packet" view, in display order.
pub const LAST_PACKET_KEYS: [PacketKey; 33] = [
    PacketKey::Counter,
    PacketKey::TimeUtc,
    PacketKey::Latitude,
    PacketKey::Longitude,
    PacketKey::AccelerationX,
    PacketKey::AccelerationY,
    PacketKey::AccelerationZ,
    PacketKey::GyrX,
    PacketKey::GyrY,
    PacketKey::GyrZ,
    PacketKey::Pressure,
    PacketKey::Altitude,
    PacketKey::Roll,
    PacketKey::Pitch,
    PacketKey::Heading,
    PacketKey::Q0,
    PacketKey::Q1,
    PacketKey::Q2,
    PacketKey::Q3,
    PacketKey::N2oPressure,
    PacketKey::PitotPressure,
    PacketKey::SatelitesNumber,
    PacketKey::Temperature,
    PacketKey::MachNumber,
    PacketKey::TrueAirSpeed,
    PacketKey::MaxAccelerationX,
    PacketKey::MaxAccelerationY,
    PacketKey::MaxAccelerationZ,
    PacketKey::MaxAltitude,
    PacketKey::LongitudeDirection,
    PacketKey::LatitudeDirection,
    PacketKey::Hdop,
    PacketKey::Course,
];

const GPS_KEYS: [PacketKey; 4] = [
    PacketKey::TimeUtc,
    PacketKey::Latitude,
    PacketKey::Longitude,
    PacketKey::SatelitesNumber,
];

const TELEMETRY_KEYS: [PacketKey; 34] = [
    PacketKey::Counter,
    PacketKey::TimeBetweenPackets,
    PacketKey::TimeUtc,
    PacketKey::Latitude,
    PacketKey::Longitude,
    PacketKey::SatelitesNumber,
    PacketKey::Pressure,
    PacketKey::Altitude,
    PacketKey::MaxAltitude,
    PacketKey::Temperature,
    PacketKey::AccelerationX,
    PacketKey::AccelerationY,
    PacketKey::AccelerationZ,
    PacketKey::MaxAccelerationX,
    PacketKey::MaxAccelerationY,
    PacketKey::MaxAccelerationZ,
    PacketKey::TrueAirSpeed,
    PacketKey::MachNumber,
    PacketKey::Roll,
    PacketKey::Pitch,
    PacketKey::Heading,
    PacketKey::Q0,
    PacketKey::Q1,
    PacketKey::Q2,
    PacketKey::Q3,
    PacketKey::DisplacementX,
    PacketKey::DisplacementY,
    PacketKey::VelocityHorizontal,
    PacketKey::VelocityVertical,
    PacketKey::N2oPressure,
    PacketKey::PitotPressure,
    PacketKey::GyrX,
    PacketKey::GyrY,
    PacketKey::GyrZ,
];

const TRACKER_KEYS: [PacketKey; 14] = [
    PacketKey::Counter,
    PacketKey::TimeBetweenPackets,
    PacketKey::TimeUtc,
    PacketKey::Latitude,
    PacketKey::Longitude,
    PacketKey::SatelitesNumber,
    PacketKey::Pressure,
    PacketKey::Altitude,
    PacketKey::MaxAltitude,
    PacketKey::Temperature,
    PacketKey::LatitudeDirection,
    PacketKey::LongitudeDirection,
    PacketKey::Hdop,
    PacketKey::Course,
];

/// Which kind of rocket-live packet a topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketType {
    Telemetry,
    Tracker,
    Gps,
}

impl PacketType {
    pub fn keys(self) -> &'static [PacketKey] {
        match self {
            PacketType::Telemetry => &TELEMETRY_KEYS,
            PacketType::Tracker => &TRACKER_KEYS,
            PacketType::Gps => &GPS_KEYS,
        }
    }

    pub fn carries(self, key: PacketKey) -> bool {
        self.keys().contains(&key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacketValue<'a> {
    Number(f64),
    Text(&'a str),
}

impl fmt::Display for PacketValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketValue::Number(value) => write!(f, "{}", value),
            PacketValue::Text(value) => f.write_str(value),
        }
    }
}

impl RocketLivePacket {
    /// Decodes a JSON payload. Missing fields keep their defaults, so partial
    /// packets decode; anything that is not a JSON object of the right field
    /// types is an error.
    pub fn decode(payload: &str) -> Result<Self, PacketError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn flight_state(&self) -> FlightStatus {
        self.info.flags.flight_state
    }

    pub fn field(&self, key: PacketKey) -> PacketValue<'_> {
        let number = match key {
            PacketKey::TimeUtc => return PacketValue::Text(&self.time_utc),
            PacketKey::Counter => f64::from(self.counter),
            PacketKey::SatelitesNumber => f64::from(self.satelites_number),
            PacketKey::TimeBetweenPackets => self.time_between_packets,
            PacketKey::Latitude => self.latitude,
            PacketKey::Longitude => self.longitude,
            PacketKey::Pressure => self.pressure,
            PacketKey::Altitude => self.altitude,
            PacketKey::MaxAltitude => self.max_altitude,
            PacketKey::Temperature => self.temperature,
            PacketKey::AccelerationX => self.acceleration_x,
            PacketKey::AccelerationY => self.acceleration_y,
            PacketKey::AccelerationZ => self.acceleration_z,
            PacketKey::MaxAccelerationX => self.max_acceleration_x,
            PacketKey::MaxAccelerationY => self.max_acceleration_y,
            PacketKey::MaxAccelerationZ => self.max_acceleration_z,
            PacketKey::TrueAirSpeed => self.true_air_speed,
            PacketKey::MachNumber => self.mach_number,
            PacketKey::Roll => self.roll,
            PacketKey::Pitch => self.pitch,
            PacketKey::Heading => self.heading,
            PacketKey::Q0 => self.q0,
            PacketKey::Q1 => self.q1,
            PacketKey::Q2 => self.q2,
            PacketKey::Q3 => self.q3,
            PacketKey::DisplacementX => self.displacement_x,
            PacketKey::DisplacementY => self.displacement_y,
            PacketKey::VelocityHorizontal => self.velocity_horizontal,
            PacketKey::VelocityVertical => self.velocity_vertical,
            PacketKey::N2oPressure => self.n2o_pressure,
            PacketKey::PitotPressure => self.pitot_pressure,
            PacketKey::GyrX => self.gyr_x,
            PacketKey::GyrY => self.gyr_y,
            PacketKey::GyrZ => self.gyr_z,
            PacketKey::LatitudeDirection => self.latitude_direction,
            PacketKey::LongitudeDirection => self.longitude_direction,
            PacketKey::Hdop => self.hdop,
            PacketKey::Course => self.course,
        };
        PacketValue::Number(number)
    }

    /// `(key, value)` pairs for `keys`, in the given order.
    pub fn select<'a>(
        &'a self,
        keys: &'a [PacketKey],
    ) -> impl Iterator<Item = (PacketKey, PacketValue<'a>)> + 'a {
        keys.iter().map(move |&key| (key, self.field(key)))
    }
}
