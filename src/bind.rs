use std::collections::HashMap;

use log::{debug, warn};
use nalgebra::{Matrix4, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::RetargetError;
use crate::math::{Transform, compute_world_matrices, matrix_translation};
use crate::skeleton::Skeleton;

/// Which pose a bind snapshot is captured from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PoseMode {
    /// Stored rest pose (inverse bind matrices).
    #[default]
    Default = 0,
    /// Live local transforms.
    Current = 1,
}

/// Non-identity transform of the scene node above the root bone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddedWorld {
    pub forward: Transform,
    pub inverse: Transform,
    pub forward_matrix: Matrix4<f32>,
    pub inverse_matrix: Matrix4<f32>,
}

impl EmbeddedWorld {
    pub fn new(forward: Transform) -> Option<Self> {
        let forward_matrix = forward.to_matrix();
        let inverse_matrix = forward_matrix.try_inverse()?;
        Some(Self {
            forward,
            inverse: Transform::from_matrix(&inverse_matrix),
            forward_matrix,
            inverse_matrix,
        })
    }
}

/// Value copy of a skeleton with precomputed world transforms and inverses.
#[derive(Debug, Clone)]
pub struct BindPoseSnapshot {
    /// Copied skeleton whose locals agree with `world`.
    pub skeleton: Skeleton,
    pub mode: PoseMode,
    pub world: Vec<Transform>,
    pub world_inverse: Vec<Transform>,
    pub world_matrices: Vec<Matrix4<f32>>,
    pub embedded_world: Option<EmbeddedWorld>,
    pub root: usize,
    name_index: HashMap<String, usize>,
}

impl BindPoseSnapshot {
    pub fn capture(
        skeleton: &Skeleton,
        mode: PoseMode,
        embed_world: bool,
    ) -> Result<Self, RetargetError> {
        skeleton.validate()?;
        let mut copy = skeleton.clone();

        let world_matrices = match mode {
            PoseMode::Default => match rest_worlds_from_inverses(skeleton) {
                Some(worlds) => {
                    rederive_locals(&mut copy, &worlds);
                    worlds
                }
                None => {
                    warn!(
                        "'{}' has no usable inverse bind matrices; capturing the current pose",
                        skeleton.name
                    );
                    copy.world_matrices()
                }
            },
            PoseMode::Current => compute_world_matrices(&copy.local_matrices(), &copy.parents()),
        };

        let mut world = Vec::with_capacity(world_matrices.len());
        let mut world_inverse = Vec::with_capacity(world_matrices.len());
        for (index, matrix) in world_matrices.iter().enumerate() {
            let inverse = matrix.try_inverse().ok_or_else(|| {
                RetargetError::input_shape(format!(
                    "bone '{}' of '{}' has a singular world matrix",
                    copy.bones[index].name, copy.name
                ))
            })?;
            world.push(Transform::from_matrix(matrix));
            world_inverse.push(Transform::from_matrix(&inverse));
        }

        let embedded_world = if embed_world {
            match skeleton.parent_transform {
                Some(parent) if !parent.is_identity(1e-6) => {
                    let embedded = EmbeddedWorld::new(parent);
                    if embedded.is_none() {
                        warn!(
                            "'{}' has a singular parent transform; it is not embedded",
                            skeleton.name
                        );
                    }
                    embedded
                }
                _ => None,
            }
        } else {
            None
        };

        let root = copy.effective_root();
        let name_index = copy.name_index();
        debug!(
            "captured {:?} bind pose of '{}' ({} bones, embedded world: {})",
            mode,
            copy.name,
            copy.len(),
            embedded_world.is_some()
        );

        Ok(Self {
            skeleton: copy,
            mode,
            world,
            world_inverse,
            world_matrices,
            embedded_world,
            root,
            name_index,
        })
    }

    pub fn len(&self) -> usize {
        self.world.len()
    }

    pub fn is_empty(&self) -> bool {
        self.world.is_empty()
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    pub fn bone_name(&self, index: usize) -> &str {
        self.skeleton
            .bones
            .get(index)
            .map(|bone| bone.name.as_str())
            .unwrap_or("")
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.skeleton.bones.get(index).and_then(|bone| bone.parent)
    }

    pub fn local(&self, index: usize) -> &Transform {
        &self.skeleton.bones[index].local
    }

    pub fn world_rotation(&self, index: usize) -> UnitQuaternion<f32> {
        self.world[index].rotation
    }

    /// World rotation of the parent; identity above a root.
    pub fn parent_world_rotation(&self, index: usize) -> UnitQuaternion<f32> {
        self.parent(index)
            .map(|parent| self.world[parent].rotation)
            .unwrap_or_else(UnitQuaternion::identity)
    }

    /// Matrix of the parent's world frame; identity above a root.
    pub fn parent_world_matrix(&self, index: usize) -> Matrix4<f32> {
        self.parent(index)
            .map(|parent| self.world_matrices[parent])
            .unwrap_or_else(Matrix4::identity)
    }

    pub fn world_position(&self, index: usize) -> Vector3<f32> {
        matrix_translation(&self.world_matrices[index])
    }

    /// World position including the embedded parent transform.
    pub fn full_world_position(&self, index: usize) -> Vector3<f32> {
        let position = self.world_position(index);
        match &self.embedded_world {
            Some(embedded) => embedded.forward.transform_point(&position),
            None => position,
        }
    }

    pub fn embedded_rotation(&self) -> UnitQuaternion<f32> {
        self.embedded_world
            .map(|embedded| embedded.forward.rotation)
            .unwrap_or_else(UnitQuaternion::identity)
    }
}

/// World matrices implied by the stored inverse bind matrices, or `None`
/// when they are absent or any is singular.
fn rest_worlds_from_inverses(skeleton: &Skeleton) -> Option<Vec<Matrix4<f32>>> {
    let inverses = skeleton.inverse_bind_matrices.as_ref()?;
    if inverses.len() != skeleton.len() {
        return None;
    }
    inverses.iter().map(|inverse| inverse.try_inverse()).collect()
}

/// Rewrites locals as `parentWorld^-1 * world` so they describe the rest pose.
fn rederive_locals(skeleton: &mut Skeleton, worlds: &[Matrix4<f32>]) {
    for index in 0..skeleton.len() {
        let local = match skeleton.bones[index].parent {
            Some(parent) => match worlds[parent].try_inverse() {
                Some(parent_inverse) => parent_inverse * worlds[index],
                None => continue,
            },
            None => worlds[index],
        };
        skeleton.bones[index].local = Transform::from_matrix(&local);
    }
}
