use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of sensor channels carried by every drifter.
pub const SENSOR_COUNT: usize = 7;

/// One value per sensor channel, indexed by [`Sensor::index`].
pub type SensorVector = [f32; SENSOR_COUNT];

/// Sensor channels recorded by the drifters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sensor {
    Salinity,
    Temperature,
    Cdom,
    Chlorophyll,
    Do,
    DoSat,
    DoAnomaly,
}

impl Sensor {
    pub const ALL: [Sensor; SENSOR_COUNT] = [
        Sensor::Salinity,
        Sensor::Temperature,
        Sensor::Cdom,
        Sensor::Chlorophyll,
        Sensor::Do,
        Sensor::DoSat,
        Sensor::DoAnomaly,
    ];

    /// Position of this channel in a [`SensorVector`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Sensor> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Sensor::Salinity => "Salinity",
            Sensor::Temperature => "Temperature",
            Sensor::Cdom => "CDOM",
            Sensor::Chlorophyll => "Chlorophyll",
            Sensor::Do => "DO",
            Sensor::DoSat => "DOSat",
            Sensor::DoAnomaly => "DO_Anomaly",
        }
    }

    pub fn units(self) -> &'static str {
        match self {
            Sensor::Salinity => "PSU",
            Sensor::Temperature => "Degree Celsius",
            Sensor::Cdom => "ug/l",
            Sensor::Chlorophyll => "arb. unit",
            Sensor::Do | Sensor::DoAnomaly => "umol",
            Sensor::DoSat => "percent",
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown sensor name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSensor(pub String);

impl fmt::Display for UnknownSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown sensor '{}'", self.0)
    }
}

impl std::error::Error for UnknownSensor {}

impl FromStr for Sensor {
    type Err = UnknownSensor;

    /// Parse a channel name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sensor| sensor.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownSensor(s.to_string()))
    }
}
