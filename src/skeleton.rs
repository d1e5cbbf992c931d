use std::collections::{HashMap, HashSet};

use log::warn;
use nalgebra::{Matrix4, Vector3};

use crate::error::RetargetError;
use crate::math::{Transform, compute_world_matrices, matrix_translation};

/// A single joint. Parents are referenced by index into the owning skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub local: Transform,
    pub parent: Option<usize>,
}

impl Bone {
    pub fn new(name: impl Into<String>, local: Transform, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            local,
            parent,
        }
    }
}

/// Bones stored as a flat array in topological order (`parent < index`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    /// Name of the asset node that owns the skeleton; used for axis hints.
    pub name: String,
    pub bones: Vec<Bone>,
    /// Stored rest pose as one inverse world matrix per bone, when the asset
    /// provides one.
    pub inverse_bind_matrices: Option<Vec<Matrix4<f32>>>,
    /// World transform of the scene node above the root bone.
    pub parent_transform: Option<Transform>,
    /// Operator-selected root bone name.
    pub root_override: Option<String>,
}

impl Skeleton {
    /// Builds a skeleton and checks its structural invariants.
    pub fn new(name: impl Into<String>, bones: Vec<Bone>) -> Result<Self, RetargetError> {
        let skeleton = Self {
            name: name.into(),
            bones,
            ..Self::default()
        };
        skeleton.validate()?;
        Ok(skeleton)
    }

    /// Checks topological order, quaternion norms and bind-matrix counts.
    pub fn validate(&self) -> Result<(), RetargetError> {
        if self.bones.is_empty() {
            return Err(RetargetError::input_shape(format!(
                "skeleton '{}' has no bones",
                self.name
            )));
        }

        for (index, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.parent
                && parent >= index
            {
                return Err(RetargetError::input_shape(format!(
                    "bone '{}' (index {}) references parent {} which does not precede it",
                    bone.name, index, parent
                )));
            }
            if !bone.local.is_finite() {
                return Err(RetargetError::input_shape(format!(
                    "bone '{}' has a non-finite local transform",
                    bone.name
                )));
            }
            if (bone.local.rotation.quaternion().norm() - 1.0).abs() > 1e-3 {
                return Err(RetargetError::input_shape(format!(
                    "bone '{}' has a non-unit rotation",
                    bone.name
                )));
            }
        }

        if let Some(inverses) = &self.inverse_bind_matrices
            && inverses.len() != self.bones.len()
        {
            return Err(RetargetError::input_shape(format!(
                "skeleton '{}' has {} bones but {} inverse bind matrices",
                self.name,
                self.bones.len(),
                inverses.len()
            )));
        }

        let roots = self.roots();
        if roots.len() > 1 && self.parent_transform.is_none() {
            warn!(
                "skeleton '{}' has {} root bones; the first is used as the effective root",
                self.name,
                roots.len()
            );
        }

        let duplicates = self.duplicate_names();
        if !duplicates.is_empty() {
            warn!(
                "skeleton '{}' has duplicate bone names ({}); lookups resolve to the first occurrence",
                self.name,
                duplicates.join(", ")
            );
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn parents(&self) -> Vec<Option<usize>> {
        self.bones.iter().map(|bone| bone.parent).collect()
    }

    /// Index of the first bone with the given name.
    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|bone| bone.name == name)
    }

    /// Name to index table; the first occurrence of a duplicated name wins.
    pub fn name_index(&self) -> HashMap<String, usize> {
        let mut index = HashMap::with_capacity(self.bones.len());
        for (i, bone) in self.bones.iter().enumerate() {
            index.entry(bone.name.clone()).or_insert(i);
        }
        index
    }

    pub fn duplicate_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for bone in &self.bones {
            if !seen.insert(bone.name.as_str()) && !duplicates.contains(&bone.name) {
                duplicates.push(bone.name.clone());
            }
        }
        duplicates
    }

    pub fn roots(&self) -> Vec<usize> {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, bone)| bone.parent.is_none())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn children(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .skip(index + 1)
            .filter(move |(_, bone)| bone.parent == Some(index))
            .map(|(child, _)| child)
    }

    pub fn first_child(&self, index: usize) -> Option<usize> {
        self.children(index).next()
    }

    /// The operator-selected root if it names a bone, else the single
    /// parentless bone, else the first bone.
    pub fn effective_root(&self) -> usize {
        if let Some(name) = &self.root_override {
            match self.find_bone(name) {
                Some(index) => return index,
                None => warn!(
                    "root override '{}' is not a bone of skeleton '{}'",
                    name, self.name
                ),
            }
        }
        let roots = self.roots();
        match roots.as_slice() {
            [single] => *single,
            _ => 0,
        }
    }

    /// Bones from `origin` down to `end`, or `None` when `origin` is not an
    /// ancestor of `end`.
    pub fn chain(&self, origin: usize, end: usize) -> Option<Vec<usize>> {
        let mut chain = vec![end];
        let mut current = end;
        while current != origin {
            current = self.bones.get(current)?.parent?;
            chain.push(current);
        }
        chain.reverse();
        Some(chain)
    }

    pub fn local_matrices(&self) -> Vec<Matrix4<f32>> {
        self.bones.iter().map(|bone| bone.local.to_matrix()).collect()
    }

    /// World matrices in the skeleton's root frame.
    pub fn world_matrices(&self) -> Vec<Matrix4<f32>> {
        compute_world_matrices(&self.local_matrices(), &self.parents())
    }

    pub fn world_transforms(&self) -> Vec<Transform> {
        self.world_matrices()
            .iter()
            .map(Transform::from_matrix)
            .collect()
    }

    pub fn world_positions(&self) -> Vec<Vector3<f32>> {
        self.world_matrices().iter().map(matrix_translation).collect()
    }

    /// Lowercased bone names, used by rig detection.
    pub fn lowercase_names(&self) -> HashSet<String> {
        self.bones
            .iter()
            .map(|bone| bone.name.to_lowercase())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use nalgebra::{UnitQuaternion, Vector3};

    /// `root -> spine -> head` stacked along +Y.
    pub(crate) fn three_bone_chain(names: [&str; 3], segment: f32) -> Skeleton {
        let bones = vec![
            Bone::new(names[0], Transform::identity(), None),
            Bone::new(
                names[1],
                Transform::from_translation(Vector3::new(0.0, segment, 0.0)),
                Some(0),
            ),
            Bone::new(
                names[2],
                Transform::from_translation(Vector3::new(0.0, segment, 0.0)),
                Some(1),
            ),
        ];
        Skeleton::new("chain", bones).expect("valid chain")
    }

    #[test]
    fn given_child_before_parent_when_validating_then_input_shape_is_reported() {
        let bones = vec![
            Bone::new("child", Transform::identity(), Some(1)),
            Bone::new("parent", Transform::identity(), None),
        ];
        let error = Skeleton::new("broken", bones).expect_err("order must be rejected");
        assert!(error.to_string().contains("does not precede"));
    }

    #[test]
    fn given_empty_bone_list_when_validating_then_input_shape_is_reported() {
        assert!(Skeleton::new("empty", Vec::new()).is_err());
    }

    #[test]
    fn given_chain_when_computing_world_positions_then_segments_accumulate() {
        let skeleton = three_bone_chain(["root", "spine", "head"], 0.5);
        let positions = skeleton.world_positions();
        assert!((positions[2] - Vector3::new(0.0, 1.0, 0.0)).norm() < 0.0001);
    }

    #[test]
    fn given_rotated_parent_when_computing_worlds_then_child_follows_rotation() {
        let mut skeleton = three_bone_chain(["root", "spine", "head"], 1.0);
        skeleton.bones[1].local.rotation =
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -std::f32::consts::FRAC_PI_2);

        let positions = skeleton.world_positions();
        assert!((positions[2] - Vector3::new(1.0, 1.0, 0.0)).norm() < 0.0001);
    }

    #[test]
    fn given_root_override_when_resolving_effective_root_then_override_wins() {
        let mut skeleton = three_bone_chain(["root", "spine", "head"], 1.0);
        assert_eq!(skeleton.effective_root(), 0);

        skeleton.root_override = Some("spine".to_string());
        assert_eq!(skeleton.effective_root(), 1);

        skeleton.root_override = Some("missing".to_string());
        assert_eq!(skeleton.effective_root(), 0);
    }

    #[test]
    fn given_descendant_when_walking_chain_then_path_runs_origin_to_end() {
        let skeleton = three_bone_chain(["root", "spine", "head"], 1.0);
        assert_eq!(skeleton.chain(0, 2), Some(vec![0, 1, 2]));
        assert_eq!(skeleton.chain(2, 0), None);
    }

    #[test]
    fn given_duplicate_names_when_indexing_then_first_occurrence_wins() {
        let bones = vec![
            Bone::new("a", Transform::identity(), None),
            Bone::new("a", Transform::identity(), Some(0)),
        ];
        let skeleton = Skeleton::new("dup", bones).expect("duplicates are a warning");
        assert_eq!(skeleton.duplicate_names(), vec!["a".to_string()]);
        assert_eq!(skeleton.name_index().get("a"), Some(&0));
    }
}
