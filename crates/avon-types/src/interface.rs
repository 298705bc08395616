//! Interface kinds and the per-interface data, command and config records.
//!
//! The numeric caps below are part of the wire contract: a record that
//! exceeds one of them is rejected, never truncated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AvonError;
use crate::geometry::{Bounds, Geom, Pose6};

/// Maximum number of transducers in one ranger scan or config.
pub const RANGER_TRANSDUCERS_MAX: usize = 64;
/// Maximum number of samples produced by one ranger transducer.
pub const RANGER_SAMPLES_MAX: usize = 1024;
/// Maximum number of fiducials reported in one fiducial scan.
pub const FIDUCIALS_DETECTED_MAX: usize = 1024;

/// Functional category of a model.
///
/// The discriminants match the wire indices.  [`InterfaceKind::Position2d`]
/// is reserved: it parses, but cannot be registered or bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Sim = 0,
    Generic = 1,
    Position2d = 2,
    Ranger = 3,
    Fiducial = 4,
}

impl InterfaceKind {
    /// Every kind, in wire-index order.
    pub const ALL: [InterfaceKind; 5] = [
        InterfaceKind::Sim,
        InterfaceKind::Generic,
        InterfaceKind::Position2d,
        InterfaceKind::Ranger,
        InterfaceKind::Fiducial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceKind::Sim => "sim",
            InterfaceKind::Generic => "generic",
            InterfaceKind::Position2d => "position2d",
            InterfaceKind::Ranger => "ranger",
            InterfaceKind::Fiducial => "fiducial",
        }
    }

    /// `false` for reserved kinds that no model or handler may use.
    pub fn is_usable(&self) -> bool {
        !matches!(self, InterfaceKind::Position2d)
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceKind {
    type Err = AvonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AvonError::InvalidInterface(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ranger
// ─────────────────────────────────────────────────────────────────────────────

/// One ranger return in spherical coordinates.
///
/// `intensity == 0.0` means no reflection was detected (beam timeout or
/// return below threshold); the range is then meaningless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangerSample {
    /// Angle around z (horizontal), radians.
    pub bearing: f64,
    /// Angle around y (vertical), radians.
    pub azimuth: f64,
    /// Distance along the beam, meters.
    pub range: f64,
    pub intensity: f64,
}

/// Readings from a single ranging element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangerTransducer {
    /// Origin of this transducer's beams in the ranger's local frame.
    pub pose: Pose6,
    pub samples: Vec<RangerSample>,
}

/// A full ranger reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangerScan {
    #[serde(default)]
    pub time: u64,
    /// Origin of the ranger in local coordinates.
    pub pose: Pose6,
    pub transducers: Vec<RangerTransducer>,
}

/// Placement and field of view of one transducer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangerTransducerConfig {
    pub geom: Geom,
    /// Field of view: `[bearing, azimuth, range]`.
    pub fov: [Bounds; 3],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangerConfig {
    #[serde(default)]
    pub time: u64,
    pub transducers: Vec<RangerTransducerConfig>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Fiducial
// ─────────────────────────────────────────────────────────────────────────────

/// A detected marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Fiducial {
    pub id: u64,
    /// Spherical pose of the marker: `[bearing, azimuth, range]`.
    pub pose: [f64; 3],
    /// Pose and size of the marker in its own frame, with origin at `pose`.
    pub geom: Geom,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FiducialScan {
    #[serde(default)]
    pub time: u64,
    pub fiducials: Vec<Fiducial>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FiducialConfig {
    /// Field of view: `[bearing, azimuth, range]`.
    pub fov: [Bounds; 3],
}

// ─────────────────────────────────────────────────────────────────────────────
// Generic envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque interface-specific payload, used wherever no typed record applies.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub time: u64,
    pub interface: InterfaceKind,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(interface: InterfaceKind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            time: 0,
            interface,
            payload: payload.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Data returned by an interface handler's `get_data`.
#[derive(Debug, Clone, PartialEq)]
pub enum InterfaceData {
    Ranger(RangerScan),
    Fiducial(FiducialScan),
    Message(Message),
}

impl InterfaceData {
    /// The interface kind this payload belongs to.
    pub fn kind(&self) -> InterfaceKind {
        match self {
            InterfaceData::Ranger(_) => InterfaceKind::Ranger,
            InterfaceData::Fiducial(_) => InterfaceKind::Fiducial,
            InterfaceData::Message(m) => m.interface,
        }
    }
}

/// Configuration exchanged through `get_config` / `set_config`.
#[derive(Debug, Clone, PartialEq)]
pub enum InterfaceConfig {
    Ranger(RangerConfig),
    Fiducial(FiducialConfig),
    Message(Message),
}

impl InterfaceConfig {
    pub fn kind(&self) -> InterfaceKind {
        match self {
            InterfaceConfig::Ranger(_) => InterfaceKind::Ranger,
            InterfaceConfig::Fiducial(_) => InterfaceKind::Fiducial,
            InterfaceConfig::Message(m) => m.interface,
        }
    }
}
