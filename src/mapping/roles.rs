use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::skeleton::Skeleton;

// ─── Roles ────────────────────────────────────────────────────────────────────

/// Anatomical role of a bone, independent of any naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Hips,
    Spine,
    Spine1,
    Spine2,
    Neck,
    Head,
    LeftShoulder,
    LeftArm,
    LeftForeArm,
    LeftHand,
    LeftUpLeg,
    LeftLeg,
    LeftFoot,
    LeftToeBase,
    RightShoulder,
    RightArm,
    RightForeArm,
    RightHand,
    RightUpLeg,
    RightLeg,
    RightFoot,
    RightToeBase,
    Finger(Side, Finger, u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Side {
    fn long(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    fn short(&self) -> &'static str {
        match self {
            Side::Left => "l",
            Side::Right => "r",
        }
    }
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    fn name(&self) -> &'static str {
        match self {
            Finger::Thumb => "thumb",
            Finger::Index => "index",
            Finger::Middle => "middle",
            Finger::Ring => "ring",
            Finger::Pinky => "pinky",
        }
    }

    /// Alternative spelling used by the VRM/Unity humanoid convention.
    fn alias(&self) -> &'static str {
        match self {
            Finger::Pinky => "little",
            other => other.name(),
        }
    }
}

/// Markers that identify a finger bone.
const FINGER_MARKERS: [&str; 6] = ["thumb", "index", "middle", "ring", "pinky", "little"];

/// Base roles with their name patterns, in resolution order.
///
/// Patterns are compared against normalized names (lowercase, separators
/// removed), first by equality across all patterns, then by containment.
pub const BASE_ROLE_PATTERNS: [(Role, &[&str]); 22] = [
    (Role::Hips, &["hips", "pelvis", "hip", "root_hips"]),
    (Role::Spine, &["spine", "spine01", "spine0", "torso"]),
    (Role::Spine1, &["spine1", "spine02", "chest"]),
    (Role::Spine2, &["spine2", "spine03", "upperchest"]),
    (Role::Neck, &["neck", "neck01"]),
    (Role::Head, &["head"]),
    (
        Role::LeftShoulder,
        &["leftshoulder", "claviclel", "lshoulder", "shoulderl", "leftcollar", "lcollar"],
    ),
    (
        Role::LeftArm,
        &["leftarm", "upperarml", "leftupperarm", "lupperarm", "larm"],
    ),
    (
        Role::LeftForeArm,
        &["leftforearm", "lowerarml", "leftlowerarm", "forearml", "lforearm", "leftelbow"],
    ),
    (Role::LeftHand, &["lefthand", "handl", "lhand", "leftwrist"]),
    (
        Role::LeftUpLeg,
        &["leftupleg", "thighl", "leftupperleg", "leftthigh", "lthigh"],
    ),
    (
        Role::LeftLeg,
        &["leftleg", "calfl", "leftlowerleg", "leftknee", "leftshin", "lcalf"],
    ),
    (Role::LeftFoot, &["leftfoot", "footl", "leftankle", "lfoot"]),
    (
        Role::LeftToeBase,
        &["lefttoebase", "balll", "lefttoes", "lefttoe", "ltoe"],
    ),
    (
        Role::RightShoulder,
        &["rightshoulder", "clavicler", "rshoulder", "shoulderr", "rightcollar", "rcollar"],
    ),
    (
        Role::RightArm,
        &["rightarm", "upperarmr", "rightupperarm", "rupperarm", "rarm"],
    ),
    (
        Role::RightForeArm,
        &["rightforearm", "lowerarmr", "rightlowerarm", "forearmr", "rforearm", "rightelbow"],
    ),
    (Role::RightHand, &["righthand", "handr", "rhand", "rightwrist"]),
    (
        Role::RightUpLeg,
        &["rightupleg", "thighr", "rightupperleg", "rightthigh", "rthigh"],
    ),
    (
        Role::RightLeg,
        &["rightleg", "calfr", "rightlowerleg", "rightknee", "rightshin", "rcalf"],
    ),
    (Role::RightFoot, &["rightfoot", "footr", "rightankle", "rfoot"]),
    (
        Role::RightToeBase,
        &["righttoebase", "ballr", "righttoes", "righttoe", "rtoe"],
    ),
];

/// Number of base roles; the denominator of the mapping confidence.
pub const BASE_ROLE_COUNT: usize = BASE_ROLE_PATTERNS.len();

impl Role {
    pub fn is_finger(&self) -> bool {
        matches!(self, Role::Finger(..))
    }

    /// True for hand roles, whose patterns would otherwise capture finger bones.
    fn excludes_fingers(&self) -> bool {
        matches!(self, Role::LeftHand | Role::RightHand)
    }

    /// Finger roles in resolution order: left before right, thumb to pinky,
    /// proximal to distal.
    pub fn finger_roles() -> Vec<Role> {
        [Side::Left, Side::Right]
            .into_iter()
            .flat_map(|side| {
                Finger::ALL
                    .into_iter()
                    .flat_map(move |finger| (1..=3).map(move |segment| Role::Finger(side, finger, segment)))
            })
            .collect()
    }

    pub fn patterns(&self) -> Vec<String> {
        match self {
            Role::Finger(side, finger, segment) => finger_patterns(*side, *finger, *segment),
            base => BASE_ROLE_PATTERNS
                .iter()
                .find(|(role, _)| role == base)
                .map(|(_, patterns)| patterns.iter().map(|p| p.to_string()).collect())
                .unwrap_or_default(),
        }
    }
}

fn finger_patterns(side: Side, finger: Finger, segment: u8) -> Vec<String> {
    let phalanx = match segment {
        1 => "proximal",
        2 => "intermediate",
        _ => "distal",
    };
    vec![
        // Mixamo: LeftHandThumb1
        format!("{}hand{}{}", side.long(), finger.name(), segment),
        // UE: thumb_01_l
        format!("{}0{}{}", finger.name(), segment, side.short()),
        // Unity/VRM: LeftThumbProximal, LeftLittleProximal
        format!("{}{}{}", side.long(), finger.alias(), phalanx),
        format!("{}{}{}", side.long(), finger.name(), segment),
        format!("{}{}{}", side.short(), finger.name(), segment),
    ]
}

// ─── Name matching ────────────────────────────────────────────────────────────

/// Lowercases a name and strips separators (`_ - . : space`).
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | '.' | ':' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn is_finger_name(normalized: &str) -> bool {
    FINGER_MARKERS
        .iter()
        .any(|marker| normalized.contains(marker))
}

/// Finds the first unclaimed bone matching a role: exact equality over all
/// patterns first, then containment.
pub fn find_role_bone(
    role: Role,
    normalized_names: &[String],
    claimed: &HashSet<usize>,
) -> Option<usize> {
    let patterns: Vec<String> = role.patterns().iter().map(|p| normalize_name(p)).collect();
    let candidate = |index: usize| {
        !claimed.contains(&index)
            && !(role.excludes_fingers() && is_finger_name(&normalized_names[index]))
    };

    for pattern in &patterns {
        if let Some(index) = (0..normalized_names.len())
            .find(|&index| candidate(index) && normalized_names[index] == *pattern)
        {
            return Some(index);
        }
    }
    for pattern in &patterns {
        if let Some(index) = (0..normalized_names.len())
            .find(|&index| candidate(index) && normalized_names[index].contains(pattern.as_str()))
        {
            return Some(index);
        }
    }
    None
}

/// Resolves bone indices for the base roles (and fingers when requested).
/// Base roles are resolved first so finger patterns cannot take their bones.
pub fn detect_roles(skeleton: &Skeleton, include_fingers: bool) -> BTreeMap<Role, usize> {
    let normalized: Vec<String> = skeleton
        .bones
        .iter()
        .map(|bone| normalize_name(&bone.name))
        .collect();
    let mut claimed = HashSet::new();
    let mut roles = BTreeMap::new();

    let mut order: Vec<Role> = BASE_ROLE_PATTERNS.iter().map(|(role, _)| *role).collect();
    if include_fingers {
        order.extend(Role::finger_roles());
    }

    for role in order {
        if let Some(index) = find_role_bone(role, &normalized, &claimed) {
            claimed.insert(index);
            roles.insert(role, index);
        }
    }
    roles
}
