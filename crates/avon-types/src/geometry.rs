//! Fixed-shape motion and geometry records shared by every interface.
//!
//! All six-axis vectors are ordered `x, y, z, roll, pitch, yaw`.  Linear
//! components are in meters, angular components in radians.

use serde::{Deserialize, Serialize};

/// A six-axis vector: `[x, y, z, roll, pitch, yaw]`.
pub type Pose6 = [f64; 6];

/// Index of each axis inside a [`Pose6`].
pub mod axis {
    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const Z: usize = 2;
    pub const ROLL: usize = 3;
    pub const PITCH: usize = 4;
    pub const YAW: usize = 5;
}

/// Pose, velocity and acceleration of a model.
///
/// The pose `p` is expressed in the parent's coordinate frame; the velocity
/// `v` and acceleration `a` are expressed in the model's local frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pva {
    /// Capture time in clock ticks.  `0` means "not captured" and is
    /// replaced by the server clock when the record is encoded.
    #[serde(default)]
    pub time: u64,
    pub p: Pose6,
    pub v: Pose6,
    pub a: Pose6,
}

/// Placement of an object on its parent plus the size of its bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Geom {
    #[serde(default)]
    pub time: u64,
    /// Six-axis pose in the parent's frame.
    pub pose: Pose6,
    /// Bounding box size along the local x, y and z axes.
    pub extent: [f64; 3],
}

/// A `(min, max)` limit along one axis, e.g. one field-of-view dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Return `true` when `value` lies inside `[min, max]`.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pva_missing_time_defaults_to_zero() {
        let json = r#"{"p":[1,2,3,0,0,0.5],"v":[0,0,0,0,0,0],"a":[0,0,0,0,0,0]}"#;
        let pva: Pva = serde_json::from_str(json).unwrap();
        assert_eq!(pva.time, 0);
        assert!((pva.p[axis::YAW] - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn bounds_contains_is_inclusive() {
        let b = Bounds::new(-1.0, 1.0);
        assert!(b.contains(-1.0));
        assert!(b.contains(1.0));
        assert!(!b.contains(1.0001));
    }
}
