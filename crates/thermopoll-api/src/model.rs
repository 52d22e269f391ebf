// ── Addressing and decode types ──
//
// Every data point on the device is either a telemetry reading (small
// integer id) or a property (three-part path). A `DecodeSpec` says how to
// interpret the bytes that come back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Error;

/// Logical name of a configured device (e.g. `"main"`, `"garage"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The two addressable kinds of scalar data point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Telemetry,
    Property,
}

/// Three-part property address, rendered as `a.b.c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyPath {
    pub group: u8,
    pub section: u8,
    pub index: u8,
}

impl PropertyPath {
    pub const fn new(group: u8, section: u8, index: u8) -> Self {
        Self {
            group,
            section,
            index,
        }
    }

    /// The byte that prefixes property payloads on the wire.
    pub const fn identifier_byte(self) -> u8 {
        self.index
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.group, self.section, self.index)
    }
}

impl FromStr for PropertyPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(['.', '/']).collect();
        let [group, section, index] = parts.as_slice() else {
            return Err(Error::validation(format!(
                "property path must have three parts, got '{s}'"
            )));
        };
        let parse = |part: &str| {
            part.trim().parse::<u8>().map_err(|_| {
                Error::validation(format!(
                    "property path component '{part}' in '{s}' is not an integer in 0..=255"
                ))
            })
        };
        Ok(Self::new(parse(group)?, parse(section)?, parse(index)?))
    }
}

/// A single addressable data point on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    Telemetry(u16),
    Property(PropertyPath),
}

impl Resource {
    pub fn kind(self) -> ResourceKind {
        match self {
            Self::Telemetry(_) => ResourceKind::Telemetry,
            Self::Property(_) => ResourceKind::Property,
        }
    }

    /// Build a resource from its kind and textual identifier
    /// (`"12"` for telemetry, `"1.2.3"` for properties).
    pub fn parse(kind: ResourceKind, identifier: &str) -> Result<Self, Error> {
        match kind {
            ResourceKind::Telemetry => identifier
                .trim()
                .parse::<u16>()
                .map(Self::Telemetry)
                .map_err(|_| {
                    Error::validation(format!("telemetry id '{identifier}' is not a u16"))
                }),
            ResourceKind::Property => identifier.parse().map(Self::Property),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telemetry(id) => write!(f, "telemetry:{id}"),
            Self::Property(path) => write!(f, "property:{path}"),
        }
    }
}

/// Width of a wire value. The device only uses one- and two-byte integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteWidth {
    One,
    Two,
}

impl ByteWidth {
    pub const fn len(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl TryFrom<u8> for ByteWidth {
    type Error = Error;

    fn try_from(count: u8) -> Result<Self, Self::Error> {
        match count {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(Error::validation(format!(
                "byte_count must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl From<ByteWidth> for u8 {
    fn from(width: ByteWidth) -> Self {
        match width {
            ByteWidth::One => 1,
            ByteWidth::Two => 2,
        }
    }
}

/// How to interpret the raw bytes of one data point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeSpec {
    pub width: ByteWidth,
    pub signed: bool,
    pub scale: f64,
}

impl DecodeSpec {
    /// Validated constructor: `byte_count` must be 1 or 2 and `scale`
    /// finite and positive.
    pub fn new(byte_count: u8, signed: bool, scale: f64) -> Result<Self, Error> {
        let width = ByteWidth::try_from(byte_count)?;
        crate::codec::check_scale(scale)?;
        Ok(Self {
            width,
            signed,
            scale,
        })
    }

    /// Unscaled unsigned single byte.
    pub const fn raw_u8() -> Self {
        Self {
            width: ByteWidth::One,
            signed: false,
            scale: 1.0,
        }
    }

    pub fn byte_count(self) -> u8 {
        self.width.into()
    }

    pub fn decode(self, raw: &[u8]) -> Result<f64, Error> {
        crate::codec::decode(raw, self.signed, self.scale)
    }

    pub fn encode(self, value: f64) -> Result<Vec<u8>, Error> {
        crate::codec::encode(value, self.byte_count(), self.signed, self.scale)
    }
}

/// A decoded read together with the bytes it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub raw: Vec<u8>,
    pub value: f64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn property_path_parses_dotted_and_slashed_forms() {
        assert_eq!(
            "1.2.3".parse::<PropertyPath>().unwrap(),
            PropertyPath::new(1, 2, 3)
        );
        assert_eq!(
            "0/10/255".parse::<PropertyPath>().unwrap(),
            PropertyPath::new(0, 10, 255)
        );
    }

    #[test]
    fn property_path_rejects_bad_input() {
        assert!("1.2".parse::<PropertyPath>().is_err());
        assert!("1.2.3.4".parse::<PropertyPath>().is_err());
        assert!("1.2.256".parse::<PropertyPath>().is_err());
        assert!("1.-2.3".parse::<PropertyPath>().is_err());
    }

    #[test]
    fn resource_parse_and_display() {
        let t = Resource::parse(ResourceKind::Telemetry, "12").unwrap();
        assert_eq!(t.to_string(), "telemetry:12");
        assert_eq!(t.kind(), ResourceKind::Telemetry);

        let p = Resource::parse(ResourceKind::Property, "2.0.7").unwrap();
        assert_eq!(p.to_string(), "property:2.0.7");
        assert_eq!(p.kind(), ResourceKind::Property);

        assert!(Resource::parse(ResourceKind::Telemetry, "70000").is_err());
    }

    #[test]
    fn resource_kind_round_trips_through_strum() {
        assert_eq!(ResourceKind::Telemetry.to_string(), "telemetry");
        assert_eq!(
            "property".parse::<ResourceKind>().unwrap(),
            ResourceKind::Property
        );
    }

    #[test]
    fn decode_spec_validates_inputs() {
        assert!(DecodeSpec::new(2, true, 0.1).is_ok());
        assert!(matches!(
            DecodeSpec::new(3, true, 0.1),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            DecodeSpec::new(1, false, 0.0),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            DecodeSpec::new(1, false, f64::NAN),
            Err(Error::Validation(_))
        ));
    }
}
