//! Reference-pose normalization: straightens bone chains and points limbs
//! along fixed axes so two skeletons share a T- or A-pose before binding.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info, warn};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::mapping::{Role, detect_roles};
use crate::math::{DegenerateRotation, rotation_between};
use crate::skeleton::Skeleton;

/// Shared reference pose both skeletons are brought into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferencePose {
    #[default]
    #[serde(rename = "t")]
    T,
    #[serde(rename = "a")]
    A,
}

/// A joint that was left untouched because its rotation is undefined.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseWarning {
    pub bone: String,
    pub operation: String,
    pub reason: String,
}

impl PoseWarning {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PoseDegenerate
    }
}

impl fmt::Display for PoseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} skipped bone '{}': {}",
            self.operation, self.bone, self.reason
        )
    }
}

/// Reorients chains of a skeleton in place, collecting degenerate joints.
#[derive(Debug, Default)]
pub struct PoseNormalizer {
    warnings: Vec<PoseWarning>,
}

impl PoseNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> &[PoseWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<PoseWarning> {
        self.warnings
    }

    /// Straightens the chain `origin..end`: every intermediate joint is
    /// rotated so its outgoing segment continues the incoming one.
    pub fn extend_chain(&mut self, skeleton: &mut Skeleton, origin: usize, end: usize) {
        let Some(chain) = skeleton.chain(origin, end) else {
            self.warn(skeleton, end, "extend_chain", "bone is not below the chain origin");
            return;
        };

        for window in chain.windows(3) {
            let (parent, joint, child) = (window[0], window[1], window[2]);
            let positions = skeleton.world_positions();
            let incoming = positions[joint] - positions[parent];
            let outgoing = positions[child] - positions[joint];
            match rotation_between(&outgoing, &incoming) {
                Ok(delta) => rotate_joint_world(skeleton, joint, &delta),
                Err(reason) => self.warn(skeleton, joint, "extend_chain", describe(reason)),
            }
        }
    }

    /// Rotates `origin` so the world direction `origin -> end` equals `axis`.
    pub fn align_bone_to_axis(
        &mut self,
        skeleton: &mut Skeleton,
        origin: usize,
        end: usize,
        axis: &Vector3<f32>,
    ) {
        if skeleton.chain(origin, end).is_none() {
            self.warn(skeleton, end, "align_bone_to_axis", "bone is not below the chain origin");
            return;
        }
        let positions = skeleton.world_positions();
        let direction = positions[end] - positions[origin];
        match rotation_between(&direction, axis) {
            Ok(delta) => rotate_joint_world(skeleton, origin, &delta),
            Err(reason) => self.warn(skeleton, origin, "align_bone_to_axis", describe(reason)),
        }
    }

    /// Spine up, legs down, arms horizontal along +X (left) and -X (right).
    pub fn apply_t_pose(&mut self, skeleton: &mut Skeleton, roles: Option<&BTreeMap<Role, usize>>) {
        self.apply_reference_pose(skeleton, ReferencePose::T, roles);
    }

    /// Like the T-pose, with arms 45 degrees below horizontal.
    pub fn apply_a_pose(&mut self, skeleton: &mut Skeleton, roles: Option<&BTreeMap<Role, usize>>) {
        self.apply_reference_pose(skeleton, ReferencePose::A, roles);
    }

    pub fn apply_reference_pose(
        &mut self,
        skeleton: &mut Skeleton,
        pose: ReferencePose,
        roles: Option<&BTreeMap<Role, usize>>,
    ) {
        let detected;
        let roles = match roles {
            Some(roles) => roles,
            None => {
                detected = detect_roles(skeleton, false);
                &detected
            }
        };
        let role = |role: Role| roles.get(&role).copied();

        let (left_arm_axis, right_arm_axis) = match pose {
            ReferencePose::T => (Vector3::x(), -Vector3::x()),
            ReferencePose::A => (
                Vector3::new(1.0, -1.0, 0.0).normalize(),
                Vector3::new(-1.0, -1.0, 0.0).normalize(),
            ),
        };

        let spine_extent = (role(Role::Hips), role(Role::Head));
        let spine_align = (role(Role::Spine), role(Role::Head));
        let limbs = [
            (Role::LeftArm, Role::LeftHand, left_arm_axis),
            (Role::RightArm, Role::RightHand, right_arm_axis),
            (Role::LeftUpLeg, Role::LeftFoot, -Vector3::y()),
            (Role::RightUpLeg, Role::RightFoot, -Vector3::y()),
        ];

        match spine_extent {
            (Some(hips), Some(head)) => self.extend_chain(skeleton, hips, head),
            _ => warn!("'{}': spine roles missing; spine is not extended", skeleton.name),
        }
        for (origin, end, _) in &limbs {
            if let (Some(origin), Some(end)) = (role(*origin), role(*end)) {
                self.extend_chain(skeleton, origin, end);
            }
        }

        if let (Some(spine), Some(head)) = spine_align {
            self.align_bone_to_axis(skeleton, spine, head, &Vector3::y());
        }
        for (origin_role, end_role, axis) in &limbs {
            match (role(*origin_role), role(*end_role)) {
                (Some(origin), Some(end)) => self.align_bone_to_axis(skeleton, origin, end, axis),
                _ => debug!(
                    "'{}': {:?} -> {:?} not found; limb is not aligned",
                    skeleton.name, origin_role, end_role
                ),
            }
        }

        info!(
            "applied {:?}-pose to '{}' ({} degenerate joints)",
            pose,
            skeleton.name,
            self.warnings.len()
        );
    }

    fn warn(&mut self, skeleton: &Skeleton, bone: usize, operation: &str, reason: &str) {
        let warning = PoseWarning {
            bone: skeleton
                .bones
                .get(bone)
                .map(|bone| bone.name.clone())
                .unwrap_or_default(),
            operation: operation.to_string(),
            reason: reason.to_string(),
        };
        warn!("'{}': {}", skeleton.name, warning);
        self.warnings.push(warning);
    }
}

fn describe(reason: DegenerateRotation) -> &'static str {
    match reason {
        DegenerateRotation::ZeroLength => "segment has zero length",
        DegenerateRotation::Opposed => "segments point in opposite directions",
    }
}

/// Applies a world-space rotation `delta` to `joint` about its own origin.
fn rotate_joint_world(skeleton: &mut Skeleton, joint: usize, delta: &UnitQuaternion<f32>) {
    let parent_rotation = match skeleton.bones[joint].parent {
        Some(parent) => skeleton.world_transforms()[parent].rotation,
        None => UnitQuaternion::identity(),
    };
    let local = &mut skeleton.bones[joint].local;
    let rotated = parent_rotation.inverse() * delta * parent_rotation * local.rotation;
    local.rotation = UnitQuaternion::new_normalize(rotated.into_inner());
}
