use log::{debug, info, warn};
use nalgebra::{Matrix4, Point3, Quaternion, UnitQuaternion, Vector3};

use crate::bind::BindPoseSnapshot;
use crate::error::RetargetError;
use crate::mapping::BoneMap;

use super::types::RetargetOptions;

/// Segments shorter than this are ignored by the proportion ratio.
const MIN_SEGMENT_LENGTH: f32 = 0.001;

/// Immutable per-session state: both bind snapshots, the map and the
/// precomputed left/right factors.
#[derive(Debug, Clone)]
pub struct RetargetContext {
    source: BindPoseSnapshot,
    target: BindPoseSnapshot,
    map: BoneMap,
    options: RetargetOptions,
    left: Vec<Option<UnitQuaternion<f32>>>,
    right: Vec<Option<UnitQuaternion<f32>>>,
    proportion_ratio: f32,
    proportion_fallback: bool,
    source_root: usize,
    target_root: usize,
    /// Source root-parent frame into full world (`F_src * W_parent`).
    source_root_frame: Matrix4<f32>,
    /// Full world into the target root-parent frame.
    target_root_frame_inverse: Matrix4<f32>,
    bind_source_root_position: Vector3<f32>,
    bind_target_root_position: Vector3<f32>,
}

impl RetargetContext {
    pub fn new(
        source: BindPoseSnapshot,
        target: BindPoseSnapshot,
        map: BoneMap,
        options: RetargetOptions,
    ) -> Result<Self, RetargetError> {
        if source.is_empty() || target.is_empty() {
            return Err(RetargetError::input_shape(
                "source and target skeletons must both have bones",
            ));
        }
        if map.is_empty() {
            return Err(RetargetError::MappingEmpty);
        }
        map.validate(&source.skeleton, &target.skeleton)?;

        let source_embedded = source.embedded_rotation();
        let target_embedded_inverse = target.embedded_rotation().inverse();

        let mut left = vec![None; source.len()];
        let mut right = vec![None; source.len()];
        for (i, j) in map.pairs() {
            let l = target.parent_world_rotation(j).inverse()
                * target_embedded_inverse
                * source_embedded
                * source.parent_world_rotation(i);
            let r = source.world_rotation(i).inverse()
                * source_embedded.inverse()
                * target_embedded_inverse.inverse()
                * target.world_rotation(j);
            if !l.coords.iter().chain(r.coords.iter()).all(|value| value.is_finite()) {
                return Err(RetargetError::Numeric {
                    message: "bind rotations produced a non-finite factor".to_string(),
                    bone: source.bone_name(i).to_string(),
                    track_index: 0,
                    key_index: 0,
                });
            }
            left[i] = Some(l);
            right[i] = Some(r);
        }

        let (proportion_ratio, proportion_fallback) = proportion_ratio(&source, &target, &map);

        let source_root = source.root;
        let target_root = map.get(source_root).unwrap_or(target.root);

        let source_root_frame = embedded_forward(&source) * source.parent_world_matrix(source_root);
        let target_root_frame = embedded_forward(&target) * target.parent_world_matrix(target_root);
        let target_root_frame_inverse = target_root_frame.try_inverse().ok_or_else(|| {
            RetargetError::input_shape(format!(
                "parent frame of target root '{}' is singular",
                target.bone_name(target_root)
            ))
        })?;

        let bind_source_root_position = source.full_world_position(source_root);
        let bind_target_root_position = target.full_world_position(target_root);

        info!(
            "retarget context: {} mapped bones, proportion ratio {:.4}, root '{}' -> '{}'",
            map.len(),
            proportion_ratio,
            source.bone_name(source_root),
            target.bone_name(target_root)
        );

        Ok(Self {
            source,
            target,
            map,
            options,
            left,
            right,
            proportion_ratio,
            proportion_fallback,
            source_root,
            target_root,
            source_root_frame,
            target_root_frame_inverse,
            bind_source_root_position,
            bind_target_root_position,
        })
    }

    pub fn source(&self) -> &BindPoseSnapshot {
        &self.source
    }

    pub fn target(&self) -> &BindPoseSnapshot {
        &self.target
    }

    pub fn map(&self) -> &BoneMap {
        &self.map
    }

    pub fn options(&self) -> &RetargetOptions {
        &self.options
    }

    pub fn left(&self, source_index: usize) -> Option<&UnitQuaternion<f32>> {
        self.left.get(source_index).and_then(Option::as_ref)
    }

    pub fn right(&self, source_index: usize) -> Option<&UnitQuaternion<f32>> {
        self.right.get(source_index).and_then(Option::as_ref)
    }

    pub fn proportion_ratio(&self) -> f32 {
        self.proportion_ratio
    }

    /// True when no usable segment pair existed and the ratio fell back to 1.
    pub fn proportion_fallback(&self) -> bool {
        self.proportion_fallback
    }

    pub fn source_root(&self) -> usize {
        self.source_root
    }

    pub fn target_root(&self) -> usize {
        self.target_root
    }

    /// `left(i) * q * right(i)` without normalization; `None` when unmapped.
    pub fn rotate(&self, source_index: usize, q: &Quaternion<f32>) -> Option<Quaternion<f32>> {
        let left = self.left(source_index)?;
        let right = self.right(source_index)?;
        Some(left.quaternion() * q * right.quaternion())
    }

    /// Maps a source root translation key into the target root's local frame.
    pub fn root_position(&self, position: &Vector3<f32>) -> Vector3<f32> {
        let world = self
            .source_root_frame
            .transform_point(&Point3::from(*position))
            .coords;
        let scaled = self.proportion_ratio * (world - self.bind_source_root_position)
            + self.bind_target_root_position;
        self.target_root_frame_inverse
            .transform_point(&Point3::from(scaled))
            .coords
    }
}

fn embedded_forward(snapshot: &BindPoseSnapshot) -> Matrix4<f32> {
    snapshot
        .embedded_world
        .map(|embedded| embedded.forward_matrix)
        .unwrap_or_else(Matrix4::identity)
}

/// `sum(target segment) / sum(source segment)` over mapped pairs where both
/// bones have a child and both segments are at least 1 mm. Falls back to 1.
fn proportion_ratio(
    source: &BindPoseSnapshot,
    target: &BindPoseSnapshot,
    map: &BoneMap,
) -> (f32, bool) {
    let segment = |snapshot: &BindPoseSnapshot, bone: usize| -> Option<f32> {
        let child = snapshot.skeleton.first_child(bone)?;
        let length =
            (snapshot.full_world_position(child) - snapshot.full_world_position(bone)).norm();
        (length >= MIN_SEGMENT_LENGTH).then_some(length)
    };

    let mut source_total = 0.0f32;
    let mut target_total = 0.0f32;
    let mut pairs = 0usize;
    for (i, j) in map.pairs() {
        if let (Some(source_length), Some(target_length)) = (segment(source, i), segment(target, j)) {
            source_total += source_length;
            target_total += target_length;
            pairs += 1;
        }
    }

    let ratio = target_total / source_total;
    if pairs == 0 || !ratio.is_finite() || ratio <= 0.0 {
        warn!(
            "no mapped bone pair has measurable segments on both sides; proportion ratio is 1"
        );
        return (1.0, true);
    }
    debug!("proportion ratio {:.6} from {} segment pairs", ratio, pairs);
    (ratio, false)
}
