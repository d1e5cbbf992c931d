//! Bone correspondence between a source and a target skeleton.

mod rig;
mod roles;
mod store;

use std::collections::{BTreeMap, HashSet};

use log::{debug, info, warn};

use crate::error::RetargetError;
use crate::skeleton::Skeleton;

pub use rig::{RigType, detect_rig_type};
pub use roles::{
    BASE_ROLE_COUNT, BASE_ROLE_PATTERNS, Finger, Role, Side, detect_roles, find_role_bone,
    is_finger_name, normalize_name,
};
pub use store::{BoneMapStore, SavedBoneMap, load_bone_map_file, sanitize_map_name};

// ─── BoneMap ──────────────────────────────────────────────────────────────────

/// Partial, injective `source index -> target index` mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoneMap {
    forward: BTreeMap<usize, usize>,
    reverse: BTreeMap<usize, usize>,
}

impl BoneMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity map over bones present by name in both skeletons.
    pub fn identity_by_name(source: &Skeleton, target: &Skeleton) -> Self {
        let target_index = target.name_index();
        let mut map = Self::new();
        for (source_index, bone) in source.bones.iter().enumerate() {
            if let Some(&target_index) = target_index.get(&bone.name)
                && let Err(owner) = map.insert(source_index, target_index)
            {
                debug!(
                    "skipping '{}' (#{}): target '{}' is already driven by #{}",
                    bone.name, source_index, target.bones[target_index].name, owner
                );
            }
        }
        map
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn get(&self, source: usize) -> Option<usize> {
        self.forward.get(&source).copied()
    }

    /// Source bone currently driving `target`.
    pub fn source_for(&self, target: usize) -> Option<usize> {
        self.reverse.get(&target).copied()
    }

    /// `(source, target)` pairs in source order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.forward.iter().map(|(&source, &target)| (source, target))
    }

    /// Maps `source` to `target`, replacing any previous target of `source`.
    ///
    /// Fails with the index of the other source bone when `target` is already
    /// claimed; the existing mapping is kept.
    pub fn insert(&mut self, source: usize, target: usize) -> Result<(), usize> {
        if let Some(owner) = self.source_for(target) {
            if owner == source {
                return Ok(());
            }
            return Err(owner);
        }
        if let Some(previous) = self.forward.insert(source, target) {
            self.reverse.remove(&previous);
        }
        self.reverse.insert(target, source);
        Ok(())
    }

    pub fn remove_source(&mut self, source: usize) -> Option<usize> {
        let target = self.forward.remove(&source)?;
        self.reverse.remove(&target);
        Some(target)
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }

    /// Name-level override: `source_name` now drives `target_name`.
    pub fn add(
        &mut self,
        source: &Skeleton,
        target: &Skeleton,
        source_name: &str,
        target_name: &str,
    ) -> Result<(), RetargetError> {
        let source_index = source.find_bone(source_name).ok_or_else(|| {
            RetargetError::MappingConflict {
                message: format!(
                    "source bone '{}' does not exist in skeleton '{}'",
                    source_name, source.name
                ),
                source_bone: Some(source_name.to_string()),
                target_bone: Some(target_name.to_string()),
            }
        })?;
        let target_index = target.find_bone(target_name).ok_or_else(|| {
            RetargetError::MappingConflict {
                message: format!(
                    "target bone '{}' does not exist in skeleton '{}'",
                    target_name, target.name
                ),
                source_bone: Some(source_name.to_string()),
                target_bone: Some(target_name.to_string()),
            }
        })?;

        self.insert(source_index, target_index)
            .map_err(|owner| RetargetError::MappingConflict {
                message: format!(
                    "target '{}' is already driven by source '{}'; '{}' cannot also drive it",
                    target_name, source.bones[owner].name, source_name
                ),
                source_bone: Some(source_name.to_string()),
                target_bone: Some(target_name.to_string()),
            })
    }

    /// Removes the mapping of `source_name`; returns whether one existed.
    pub fn remove(&mut self, source: &Skeleton, source_name: &str) -> bool {
        source
            .find_bone(source_name)
            .and_then(|index| self.remove_source(index))
            .is_some()
    }

    /// Builds a map from a persisted `{source name -> target name}` table.
    pub fn from_names(
        names: &BTreeMap<String, String>,
        source: &Skeleton,
        target: &Skeleton,
    ) -> Result<Self, RetargetError> {
        let mut map = Self::new();
        for (source_name, target_name) in names {
            map.add(source, target, source_name, target_name)?;
        }
        Ok(map)
    }

    pub fn to_names(&self, source: &Skeleton, target: &Skeleton) -> BTreeMap<String, String> {
        self.pairs()
            .filter_map(|(s, t)| {
                Some((
                    source.bones.get(s)?.name.clone(),
                    target.bones.get(t)?.name.clone(),
                ))
            })
            .collect()
    }

    /// Checks that every index refers to an existing bone.
    pub fn validate(&self, source: &Skeleton, target: &Skeleton) -> Result<(), RetargetError> {
        for (s, t) in self.pairs() {
            if s >= source.len() || t >= target.len() {
                return Err(RetargetError::MappingConflict {
                    message: format!(
                        "pair {} -> {} is out of range ({} source bones, {} target bones)",
                        s,
                        t,
                        source.len(),
                        target.len()
                    ),
                    source_bone: source.bones.get(s).map(|bone| bone.name.clone()),
                    target_bone: target.bones.get(t).map(|bone| bone.name.clone()),
                });
            }
        }
        Ok(())
    }
}

// ─── Automatic mapping ────────────────────────────────────────────────────────

/// Result of automatic mapping.
#[derive(Debug, Clone)]
pub struct AutoMapping {
    pub map: BoneMap,
    /// Fraction of base roles found on both sides.
    pub confidence: f32,
    pub source_rig: RigType,
    pub target_rig: RigType,
    pub matched_roles: Vec<Role>,
}

/// Generates bone maps from naming heuristics.
#[derive(Debug, Clone, Copy)]
pub struct BoneMapper {
    pub include_fingers: bool,
    /// After role matching, pair remaining bones whose normalized names agree.
    pub match_identical_names: bool,
}

impl Default for BoneMapper {
    fn default() -> Self {
        Self {
            include_fingers: false,
            match_identical_names: true,
        }
    }
}

impl BoneMapper {
    pub fn auto_map(&self, source: &Skeleton, target: &Skeleton) -> AutoMapping {
        let source_rig = detect_rig_type(&source.lowercase_names());
        let target_rig = detect_rig_type(&target.lowercase_names());

        let source_roles = detect_roles(source, self.include_fingers);
        let target_roles = detect_roles(target, self.include_fingers);

        let mut map = BoneMap::new();
        let mut matched_roles = Vec::new();
        for (role, source_index) in &source_roles {
            let Some(target_index) = target_roles.get(role).copied() else {
                continue;
            };
            if map.insert(*source_index, target_index).is_ok() {
                matched_roles.push(*role);
            }
        }

        let base_matched = matched_roles.iter().filter(|role| !role.is_finger()).count();
        let confidence = base_matched as f32 / BASE_ROLE_COUNT as f32;

        if self.match_identical_names {
            let target_names: Vec<String> = target
                .bones
                .iter()
                .map(|bone| normalize_name(&bone.name))
                .collect();
            for (source_index, bone) in source.bones.iter().enumerate() {
                if map.get(source_index).is_some() {
                    continue;
                }
                let normalized = normalize_name(&bone.name);
                if let Some(target_index) = target_names
                    .iter()
                    .enumerate()
                    .position(|(index, name)| *name == normalized && map.source_for(index).is_none())
                    && let Err(owner) = map.insert(source_index, target_index)
                {
                    debug!(
                        "name match '{}' -> '{}' skipped: target owned by '{}'",
                        bone.name, target.bones[target_index].name, source.bones[owner].name
                    );
                }
            }
        }

        info!(
            "auto-mapped {} bones ({} -> {}), confidence {:.2}",
            map.len(),
            source_rig,
            target_rig,
            confidence
        );

        AutoMapping {
            map,
            confidence,
            source_rig,
            target_rig,
            matched_roles,
        }
    }
}

/// Fraction of base roles that the map covers on both sides.
pub fn mapping_confidence(map: &BoneMap, source: &Skeleton, target: &Skeleton) -> f32 {
    let source_roles = detect_roles(source, false);
    let target_roles = detect_roles(target, false);
    let covered = source_roles
        .iter()
        .filter(|(role, source_index)| {
            map.get(**source_index).is_some() && target_roles.contains_key(role)
        })
        .count();
    covered as f32 / BASE_ROLE_COUNT as f32
}

/// Guarantees that the effective source root drives the effective target
/// root. A conflicting mapping onto the target root is removed.
pub fn ensure_root_mapping(map: &mut BoneMap, source: &Skeleton, target: &Skeleton) -> (usize, usize) {
    let source_root = source.effective_root();
    let target_root = target.effective_root();

    if map.get(source_root) == Some(target_root) {
        return (source_root, target_root);
    }

    if let Some(owner) = map.source_for(target_root) {
        warn!(
            "root '{}' was driven by '{}'; remapping it from root '{}'",
            target.bones[target_root].name, source.bones[owner].name, source.bones[source_root].name
        );
        map.remove_source(owner);
    }
    if let Some(previous) = map.remove_source(source_root) {
        debug!(
            "source root '{}' no longer drives '{}'",
            source.bones[source_root].name, target.bones[previous].name
        );
    }
    // Both slots are free at this point.
    let _ = map.insert(source_root, target_root);
    (source_root, target_root)
}

/// Names of source bones that are referenced by the map but duplicated.
pub fn duplicated_mapped_names(map: &BoneMap, source: &Skeleton) -> Vec<String> {
    let duplicates: HashSet<String> = source.duplicate_names().into_iter().collect();
    map.pairs()
        .filter_map(|(s, _)| source.bones.get(s))
        .filter(|bone| duplicates.contains(&bone.name))
        .map(|bone| bone.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Transform;
    use crate::skeleton::Bone;
    use nalgebra::Vector3;

    fn named_skeleton(name: &str, names: &[&str]) -> Skeleton {
        let bones = names
            .iter()
            .enumerate()
            .map(|(index, bone)| {
                Bone::new(
                    *bone,
                    Transform::from_translation(Vector3::new(0.0, 0.1, 0.0)),
                    if index == 0 { None } else { Some(index - 1) },
                )
            })
            .collect();
        Skeleton::new(name, bones).expect("valid skeleton")
    }

    #[test]
    fn given_mixamo_and_unreal_rigs_when_auto_mapping_then_roles_are_paired() {
        let source = named_skeleton(
            "mixamo",
            &[
                "mixamorig:Hips",
                "mixamorig:Spine",
                "mixamorig:Spine1",
                "mixamorig:Spine2",
                "mixamorig:Neck",
                "mixamorig:Head",
                "mixamorig:LeftShoulder",
                "mixamorig:LeftArm",
                "mixamorig:LeftForeArm",
                "mixamorig:LeftHand",
                "mixamorig:LeftHandThumb1",
            ],
        );
        let target = named_skeleton(
            "ue5",
            &[
                "pelvis",
                "spine_01",
                "spine_02",
                "spine_03",
                "neck_01",
                "head",
                "clavicle_l",
                "upperarm_l",
                "lowerarm_l",
                "hand_l",
                "thumb_01_l",
            ],
        );

        let result = BoneMapper::default().auto_map(&source, &target);

        assert_eq!(result.source_rig, RigType::Mixamo);
        assert_eq!(result.target_rig, RigType::Ue5);
        for index in 0..10 {
            assert_eq!(result.map.get(index), Some(index), "bone {index}");
        }
        assert_eq!(result.map.get(10), None);
        assert!((result.confidence - 10.0 / 22.0).abs() < 0.0001);
    }

    #[test]
    fn given_fingers_enabled_when_auto_mapping_then_finger_roles_are_paired() {
        let source = named_skeleton("src", &["Hips", "LeftHand", "LeftHandIndex1"]);
        let target = named_skeleton("trg", &["pelvis", "hand_l", "index_01_l"]);
        let mapper = BoneMapper {
            include_fingers: true,
            match_identical_names: false,
        };
        let result = mapper.auto_map(&source, &target);
        assert_eq!(result.map.get(1), Some(1));
        assert_eq!(result.map.get(2), Some(2));
    }

    #[test]
    fn given_duplicate_target_when_building_from_names_then_conflict_names_target() {
        let source = named_skeleton("src", &["Hips", "LeftHand", "RightHand"]);
        let target = named_skeleton("trg", &["Hips", "Hand"]);
        let names: BTreeMap<String, String> = [
            ("LeftHand".to_string(), "Hand".to_string()),
            ("RightHand".to_string(), "Hand".to_string()),
        ]
        .into_iter()
        .collect();

        let error = BoneMap::from_names(&names, &source, &target).expect_err("must conflict");
        assert_eq!(error.kind(), crate::error::ErrorKind::MappingConflict);
        assert!(error.to_string().contains("'Hand'"));
    }

    #[test]
    fn given_existing_mapping_when_adding_duplicate_target_then_existing_wins() {
        let source = named_skeleton("src", &["a", "b"]);
        let target = named_skeleton("trg", &["x", "y"]);
        let mut map = BoneMap::new();
        map.add(&source, &target, "a", "x").expect("first mapping");
        assert!(map.add(&source, &target, "b", "x").is_err());
        assert_eq!(map.get(0), Some(0));
        assert_eq!(map.get(1), None);

        map.add(&source, &target, "a", "y").expect("override");
        assert_eq!(map.get(0), Some(1));
        assert_eq!(map.source_for(0), None);

        assert!(map.remove(&source, "a"));
        assert!(map.is_empty());
    }

    #[test]
    fn given_unknown_name_when_adding_then_conflict_is_reported() {
        let source = named_skeleton("src", &["a"]);
        let target = named_skeleton("trg", &["x"]);
        let mut map = BoneMap::new();
        assert!(map.add(&source, &target, "missing", "x").is_err());
        assert!(map.add(&source, &target, "a", "missing").is_err());
    }

    #[test]
    fn given_root_claimed_by_other_bone_when_ensuring_root_then_root_pair_wins() {
        let source = named_skeleton("src", &["root", "spine"]);
        let target = named_skeleton("trg", &["Hips", "Spine"]);
        let mut map = BoneMap::new();
        map.insert(1, 0).expect("spine drives hips");

        let (source_root, target_root) = ensure_root_mapping(&mut map, &source, &target);

        assert_eq!((source_root, target_root), (0, 0));
        assert_eq!(map.get(0), Some(0));
        assert_eq!(map.get(1), None);
    }

    #[test]
    fn given_map_when_round_tripping_names_then_pairs_survive() {
        let source = named_skeleton("src", &["root", "spine", "head"]);
        let target = named_skeleton("trg", &["Hips", "Spine1", "Head1"]);
        let mut map = BoneMap::new();
        map.add(&source, &target, "root", "Hips").expect("valid");
        map.add(&source, &target, "head", "Head1").expect("valid");

        let names = map.to_names(&source, &target);
        let rebuilt = BoneMap::from_names(&names, &source, &target).expect("valid names");
        assert_eq!(rebuilt, map);
    }

    #[test]
    fn given_duplicated_source_name_when_mapping_by_name_then_later_bone_is_skipped() {
        let source = named_skeleton("src", &["root", "spine", "spine"]);
        let target = named_skeleton("trg", &["root", "spine"]);

        let map = BoneMap::identity_by_name(&source, &target);

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(1), Some(1));
        assert_eq!(map.get(2), None);
        assert_eq!(map.source_for(1), Some(1));
    }
}
