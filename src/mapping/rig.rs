use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Naming convention family of a skeleton. Serialized lowercase; unknown
/// values read back as `custom`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RigType {
    Mixamo,
    Ue5,
    Unity,
    Humanoid,
    #[default]
    Custom,
}

impl RigType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RigType::Mixamo => "mixamo",
            RigType::Ue5 => "ue5",
            RigType::Unity => "unity",
            RigType::Humanoid => "humanoid",
            RigType::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "mixamo" => RigType::Mixamo,
            "ue5" => RigType::Ue5,
            "unity" => RigType::Unity,
            "humanoid" => RigType::Humanoid,
            _ => RigType::Custom,
        }
    }
}

impl From<String> for RigType {
    fn from(value: String) -> Self {
        RigType::parse(&value)
    }
}

impl From<RigType> for String {
    fn from(value: RigType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a set of lowercased bone names.
pub fn detect_rig_type(names: &HashSet<String>) -> RigType {
    let has = |name: &str| names.contains(name);
    let any_contains = |needle: &str| names.iter().any(|name| name.contains(needle));

    if any_contains("mixamorig:") {
        return RigType::Mixamo;
    }

    if has("pelvis") && has("spine_01") && (has("clavicle_l") || has("clavicle_r")) {
        return RigType::Ue5;
    }

    if has("hips") && has("spine") && has("chest") && (has("leftupperarm") || has("left upper arm"))
    {
        return RigType::Unity;
    }

    let hips_like = any_contains("hips") || any_contains("pelvis");
    let head_or_neck = any_contains("head") || any_contains("neck");
    let arm_or_shoulder = any_contains("arm") || any_contains("shoulder");
    let leg_or_thigh = any_contains("leg") || any_contains("thigh");
    if hips_like && any_contains("spine") && head_or_neck && arm_or_shoulder && leg_or_thigh {
        return RigType::Humanoid;
    }

    RigType::Custom
}
