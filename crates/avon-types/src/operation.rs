use std::fmt;

use serde::{Deserialize, Serialize};

/// The eight addressable operations on a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    GetPva,
    SetPva,
    GetGeom,
    SetGeom,
    GetData,
    SetCommand,
    GetConfig,
    SetConfig,
}

impl Operation {
    /// `true` for the pose/geometry operations every model supports,
    /// regardless of its interface kind.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Operation::GetPva | Operation::SetPva | Operation::GetGeom | Operation::SetGeom
        )
    }

    /// `true` when the operation carries a request body.
    pub fn takes_body(&self) -> bool {
        matches!(
            self,
            Operation::SetPva | Operation::SetGeom | Operation::SetCommand | Operation::SetConfig
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetPva => "getPva",
            Operation::SetPva => "setPva",
            Operation::GetGeom => "getGeom",
            Operation::SetGeom => "setGeom",
            Operation::GetData => "getData",
            Operation::SetCommand => "setCommand",
            Operation::GetConfig => "getConfig",
            Operation::SetConfig => "setConfig",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_ops_are_the_pose_and_geometry_accessors() {
        let motion: Vec<_> = [
            Operation::GetPva,
            Operation::SetPva,
            Operation::GetGeom,
            Operation::SetGeom,
            Operation::GetData,
            Operation::SetCommand,
            Operation::GetConfig,
            Operation::SetConfig,
        ]
        .into_iter()
        .filter(Operation::is_motion)
        .collect();
        assert_eq!(motion.len(), 4);
        assert!(!Operation::GetData.is_motion());
    }

    #[test]
    fn display_matches_serde_name() {
        let json = serde_json::to_string(&Operation::SetCommand).unwrap();
        assert_eq!(json, format!("\"{}\"", Operation::SetCommand));
    }
}
