//! Up-axis, forward-axis and unit-scale detection, and conversion of a
//! skeleton and its clips into the canonical frame: right-handed, +Y up,
//! +Z forward, one unit per metre.

use std::collections::HashSet;

use log::{debug, info};
use nalgebra::{Matrix4, Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::clip::{AnimationClip, TrackProperty};
use crate::math::{quaternion_from_xyzw, quaternion_to_xyzw, rotation_between};
use crate::skeleton::Skeleton;

/// Confidence assigned to name hints and to a dominant root-to-child direction.
const STRONG_CONFIDENCE: f32 = 0.95;
/// Minimum forward confidence for the yaw correction to be applied.
const FORWARD_APPLY_CONFIDENCE: f32 = 0.7;

/// A signed coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisDirection {
    #[serde(rename = "+x")]
    PosX,
    #[serde(rename = "-x")]
    NegX,
    #[serde(rename = "+y")]
    PosY,
    #[serde(rename = "-y")]
    NegY,
    #[serde(rename = "+z")]
    PosZ,
    #[serde(rename = "-z")]
    NegZ,
}

impl AxisDirection {
    pub fn from_component(component: usize, negative: bool) -> Self {
        match (component, negative) {
            (0, false) => AxisDirection::PosX,
            (0, true) => AxisDirection::NegX,
            (1, false) => AxisDirection::PosY,
            (1, true) => AxisDirection::NegY,
            (2, false) => AxisDirection::PosZ,
            _ => AxisDirection::NegZ,
        }
    }

    pub fn component(&self) -> usize {
        match self {
            AxisDirection::PosX | AxisDirection::NegX => 0,
            AxisDirection::PosY | AxisDirection::NegY => 1,
            AxisDirection::PosZ | AxisDirection::NegZ => 2,
        }
    }

    pub fn vector(&self) -> Vector3<f32> {
        match self {
            AxisDirection::PosX => Vector3::x(),
            AxisDirection::NegX => -Vector3::x(),
            AxisDirection::PosY => Vector3::y(),
            AxisDirection::NegY => -Vector3::y(),
            AxisDirection::PosZ => Vector3::z(),
            AxisDirection::NegZ => -Vector3::z(),
        }
    }

    /// Rotation carrying this axis onto +Y.
    pub fn rotation_to_y_up(&self) -> UnitQuaternion<f32> {
        use std::f32::consts::{FRAC_PI_2, PI};
        match self {
            AxisDirection::PosY => UnitQuaternion::identity(),
            AxisDirection::PosZ => UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -FRAC_PI_2),
            AxisDirection::NegZ => UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2),
            AxisDirection::PosX => UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
            AxisDirection::NegX => UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -FRAC_PI_2),
            AxisDirection::NegY => UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI),
        }
    }
}

/// What detection concluded about a skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalReport {
    pub up: AxisDirection,
    pub up_confidence: f32,
    pub forward: AxisDirection,
    pub forward_confidence: f32,
    pub scale_factor: f32,
    pub humanoid: bool,
}

/// The rotation and uniform scale that take a skeleton into canonical space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalFrame {
    pub rotation: UnitQuaternion<f32>,
    pub scale: f32,
}

impl Default for CanonicalFrame {
    fn default() -> Self {
        Self::identity()
    }
}

impl CanonicalFrame {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            scale: 1.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.rotation.angle() < 1e-6 && (self.scale - 1.0).abs() < 1e-6
    }

    pub fn inverse(&self) -> Self {
        Self {
            rotation: self.rotation.inverse(),
            scale: 1.0 / self.scale,
        }
    }

    /// Rotates the root bones, scales every translation and rebuilds the stored
    /// bind matrices to match.
    pub fn apply_to_skeleton(&self, skeleton: &mut Skeleton) {
        if self.is_identity() {
            return;
        }
        for bone in &mut skeleton.bones {
            if bone.parent.is_none() {
                bone.local.rotation = self.rotation * bone.local.rotation;
                bone.local.translation = self.scale * (self.rotation * bone.local.translation);
            } else {
                bone.local.translation *= self.scale;
            }
        }

        if let Some(inverses) = skeleton.inverse_bind_matrices.as_mut() {
            let scale_up = Matrix4::new_scaling(self.scale);
            let frame_inverse =
                self.rotation.inverse().to_homogeneous() * Matrix4::new_scaling(1.0 / self.scale);
            for inverse in inverses.iter_mut() {
                *inverse = scale_up * *inverse * frame_inverse;
            }
        }
    }

    /// Converts root rotation/translation keys and scales other translations.
    pub fn apply_to_clip(&self, clip: &mut AnimationClip, root_names: &HashSet<String>) {
        if self.is_identity() {
            return;
        }
        for track in &mut clip.tracks {
            let is_root = root_names.contains(&track.bone);
            match track.property {
                TrackProperty::Rotation if is_root => {
                    for key in track.values.chunks_exact_mut(4) {
                        let q: Quaternion<f32> =
                            self.rotation.quaternion() * quaternion_from_xyzw(key);
                        key.copy_from_slice(&quaternion_to_xyzw(&q));
                    }
                }
                TrackProperty::Translation => {
                    for key in track.values.chunks_exact_mut(3) {
                        let mut p = Vector3::new(key[0], key[1], key[2]);
                        if is_root {
                            p = self.rotation * p;
                        }
                        p *= self.scale;
                        key.copy_from_slice(p.as_slice());
                    }
                }
                _ => {}
            }
        }
    }

    /// Undoes [`CanonicalFrame::apply_to_clip`].
    pub fn revert_clip(&self, clip: &mut AnimationClip, root_names: &HashSet<String>) {
        self.inverse().apply_to_clip(clip, root_names);
    }
}

/// Names of the parentless bones of a skeleton.
pub fn root_names(skeleton: &Skeleton) -> HashSet<String> {
    skeleton
        .roots()
        .into_iter()
        .map(|index| skeleton.bones[index].name.clone())
        .collect()
}

/// Detects and normalizes coordinate conventions.
#[derive(Debug, Clone, Copy)]
pub struct Canonicalizer {
    /// Height a detected humanoid is scaled to, in metres.
    pub humanoid_height: f32,
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self {
            humanoid_height: 1.7,
        }
    }
}

impl Canonicalizer {
    pub fn detect(&self, skeleton: &Skeleton) -> CanonicalReport {
        let positions = skeleton.world_positions();
        let size = bounding_size(&positions);
        let hints = name_hints(skeleton);

        let (up, up_confidence) = match hints.up {
            Some(up) => (up, STRONG_CONFIDENCE),
            None => detect_up(skeleton, &positions, &size),
        };

        let (forward, forward_confidence) = match hints.forward {
            Some(forward) => (forward, STRONG_CONFIDENCE),
            None => detect_forward(up, &size),
        };

        let up_rotation = up.rotation_to_y_up();
        let rotated = up_rotation * size;
        let canonical_size = Vector3::new(rotated.x.abs(), rotated.y.abs(), rotated.z.abs());
        let (scale_factor, humanoid) = self.detect_scale(&canonical_size);

        CanonicalReport {
            up,
            up_confidence,
            forward,
            forward_confidence,
            scale_factor,
            humanoid,
        }
    }

    /// Builds the single rotation and scale implied by a report.
    pub fn frame_for(&self, report: &CanonicalReport) -> CanonicalFrame {
        let up_rotation = report.up.rotation_to_y_up();
        let mut rotation = up_rotation;

        if report.forward_confidence >= FORWARD_APPLY_CONFIDENCE {
            let forward = up_rotation * report.forward.vector();
            if forward.x.abs() > 0.5
                && let Ok(yaw) = rotation_between(&forward, &Vector3::z())
            {
                rotation = yaw * up_rotation;
            }
        }

        CanonicalFrame {
            rotation,
            scale: report.scale_factor,
        }
    }

    /// Converts a skeleton and its clips in place and returns what was done.
    pub fn canonicalize(
        &self,
        skeleton: &mut Skeleton,
        clips: &mut [AnimationClip],
    ) -> (CanonicalReport, CanonicalFrame) {
        let report = self.detect(skeleton);
        let frame = self.frame_for(&report);
        info!(
            "canonicalizing '{}': up {:?} ({:.2}), forward {:?} ({:.2}), scale {:.4}",
            skeleton.name,
            report.up,
            report.up_confidence,
            report.forward,
            report.forward_confidence,
            report.scale_factor
        );

        let roots = root_names(skeleton);
        frame.apply_to_skeleton(skeleton);
        for clip in clips.iter_mut() {
            frame.apply_to_clip(clip, &roots);
        }
        (report, frame)
    }

    fn detect_scale(&self, size: &Vector3<f32>) -> (f32, bool) {
        let horizontal = size.x.max(size.z);
        if horizontal > 0.0 && size.y > 0.0 {
            let ratio = size.y / horizontal;
            if (2.0..=6.0).contains(&ratio) {
                return (self.humanoid_height / size.y, true);
            }
        }

        let max_dimension = size.max();
        let factor = if max_dimension <= 0.0 || !max_dimension.is_finite() {
            1.0
        } else if max_dimension < 0.1 {
            100.0
        } else if max_dimension > 100.0 {
            0.01
        } else {
            1.0
        };
        (factor, false)
    }
}

#[derive(Debug, Default)]
struct NameHints {
    up: Option<AxisDirection>,
    forward: Option<AxisDirection>,
}

fn name_hints(skeleton: &Skeleton) -> NameHints {
    let mut names: Vec<String> = vec![skeleton.name.to_lowercase()];
    names.extend(
        skeleton
            .roots()
            .into_iter()
            .map(|index| skeleton.bones[index].name.to_lowercase()),
    );

    let mut hints = NameHints::default();
    for name in &names {
        if hints.up.is_none() {
            if name.contains("y_up") || name.contains("yup") {
                hints.up = Some(AxisDirection::PosY);
            } else if name.contains("z_up") || name.contains("zup") {
                hints.up = Some(AxisDirection::PosZ);
            }
        }
        if hints.forward.is_none() {
            if name.contains("z_forward") || name.contains("zforward") {
                hints.forward = Some(AxisDirection::PosZ);
            } else if name.contains("y_forward") || name.contains("yforward") {
                hints.forward = Some(AxisDirection::PosY);
            }
        }
    }
    hints
}

fn bounding_size(positions: &[Vector3<f32>]) -> Vector3<f32> {
    let Some(first) = positions.first() else {
        return Vector3::zeros();
    };
    let (min, max) = positions
        .iter()
        .fold((*first, *first), |(min, max), p| (min.inf(p), max.sup(p)));
    max - min
}

fn detect_up(
    skeleton: &Skeleton,
    positions: &[Vector3<f32>],
    size: &Vector3<f32>,
) -> (AxisDirection, f32) {
    let (mut up, mut confidence) = bounding_box_prior(size);

    let root = skeleton.effective_root();
    if let Some(child) = spine_like_child(skeleton, root) {
        let direction = positions[child] - positions[root];
        let magnitudes = direction.abs();
        let dominant = magnitudes.imax();
        let dominates = (0..3)
            .filter(|&axis| axis != dominant)
            .all(|axis| magnitudes[dominant] > magnitudes[axis]);
        if dominates && magnitudes[dominant] > 0.0 {
            up = AxisDirection::from_component(dominant, direction[dominant] < 0.0);
            confidence = STRONG_CONFIDENCE;
        }
    }

    debug!(
        "up axis for '{}': {:?} (confidence {:.2})",
        skeleton.name, up, confidence
    );
    (up, confidence)
}

/// The root's child with the largest subtree; ties keep the first child.
fn spine_like_child(skeleton: &Skeleton, root: usize) -> Option<usize> {
    let mut subtree = vec![1usize; skeleton.len()];
    for index in (0..skeleton.len()).rev() {
        if let Some(parent) = skeleton.bones[index].parent {
            subtree[parent] += subtree[index];
        }
    }
    skeleton
        .children(root)
        .fold(None, |best: Option<usize>, child| match best {
            Some(current) if subtree[current] >= subtree[child] => Some(current),
            _ => Some(child),
        })
}

fn bounding_box_prior(size: &Vector3<f32>) -> (AxisDirection, f32) {
    let largest = size.imax();
    let second = (0..3)
        .filter(|&axis| axis != largest)
        .map(|axis| size[axis])
        .fold(0.0f32, f32::max);
    if size[largest] <= 0.0 {
        return (AxisDirection::PosY, 0.0);
    }
    let confidence = if second <= 0.0 {
        0.85
    } else {
        let excess = (size[largest] / second - 1.0).min(1.0);
        0.6 + 0.25 * excess
    };
    (AxisDirection::from_component(largest, false), confidence)
}

fn detect_forward(up: AxisDirection, size: &Vector3<f32>) -> (AxisDirection, f32) {
    let others: Vec<usize> = (0..3).filter(|&axis| axis != up.component()).collect();
    let (a, b) = (others[0], others[1]);
    let (narrow, wide) = if size[a] < size[b] {
        (a, b)
    } else if size[b] < size[a] {
        (b, a)
    } else {
        // Degenerate footprint: keep +Z when it is horizontal.
        let fallback = if a == 2 || b == 2 { 2 } else { b };
        return (AxisDirection::from_component(fallback, false), 0.5);
    };
    let confidence = if size[narrow] <= 0.0 {
        0.8
    } else {
        0.5 + 0.3 * (size[wide] / size[narrow] - 1.0).min(1.0)
    };
    (AxisDirection::from_component(narrow, false), confidence)
}
