use nalgebra::{Matrix4, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::clip::{AnimationClip, Interpolation, KeyframeTrack, TrackProperty};
use crate::error::RetargetError;
use crate::math::{Transform, quaternion_from_xyzw, quaternion_to_xyzw};
use crate::skeleton::{Bone, Skeleton};

// ─── Transforms ───────────────────────────────────────────────────────────────

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

/// `(translation, rotation xyzw, scale)` as stored in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDocument {
    #[serde(default)]
    pub translation: [f32; 3],
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

impl Default for TransformDocument {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: identity_rotation(),
            scale: unit_scale(),
        }
    }
}

impl From<&Transform> for TransformDocument {
    fn from(transform: &Transform) -> Self {
        Self {
            translation: transform.translation.into(),
            rotation: quaternion_to_xyzw(transform.rotation.quaternion()),
            scale: transform.scale.into(),
        }
    }
}

impl TransformDocument {
    /// Rotations within 1e-3 of unit length are renormalized; anything else is
    /// kept as read so skeleton validation can report it.
    pub fn to_transform(&self) -> Transform {
        let q = quaternion_from_xyzw(&self.rotation);
        let rotation = if (q.norm() - 1.0).abs() <= 1e-3 {
            UnitQuaternion::new_normalize(q)
        } else {
            UnitQuaternion::new_unchecked(q)
        };
        Transform::new(Vector3::from(self.translation), rotation, Vector3::from(self.scale))
    }
}

// ─── Skeleton ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    #[serde(flatten)]
    pub transform: TransformDocument,
}

/// JSON skeleton: bones in topological order with parent indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkeletonDocument {
    #[serde(default)]
    pub name: String,
    pub bones: Vec<BoneDocument>,
    /// Column-major inverse world matrices, one per bone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse_bind_matrices: Option<Vec<[f32; 16]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_transform: Option<TransformDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

impl SkeletonDocument {
    pub fn into_skeleton(self) -> Result<Skeleton, RetargetError> {
        let bones = self
            .bones
            .iter()
            .map(|bone| Bone::new(bone.name.clone(), bone.transform.to_transform(), bone.parent))
            .collect();
        let skeleton = Skeleton {
            name: self.name,
            bones,
            inverse_bind_matrices: self.inverse_bind_matrices.map(|matrices| {
                matrices
                    .iter()
                    .map(|values| Matrix4::from_column_slice(values))
                    .collect()
            }),
            parent_transform: self.parent_transform.map(|transform| transform.to_transform()),
            root_override: self.root,
        };
        skeleton.validate()?;
        Ok(skeleton)
    }

    pub fn from_skeleton(skeleton: &Skeleton) -> Self {
        Self {
            name: skeleton.name.clone(),
            bones: skeleton
                .bones
                .iter()
                .map(|bone| BoneDocument {
                    name: bone.name.clone(),
                    parent: bone.parent,
                    transform: TransformDocument::from(&bone.local),
                })
                .collect(),
            inverse_bind_matrices: skeleton.inverse_bind_matrices.as_ref().map(|matrices| {
                matrices
                    .iter()
                    .map(|matrix| {
                        let mut values = [0.0f32; 16];
                        values.copy_from_slice(matrix.as_slice());
                        values
                    })
                    .collect()
            }),
            parent_transform: skeleton.parent_transform.as_ref().map(TransformDocument::from),
            root: skeleton.root_override.clone(),
        }
    }
}

// ─── Clips ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDocument {
    pub bone: String,
    pub property: TrackProperty,
    pub times: Vec<f32>,
    pub values: Vec<f32>,
    #[serde(default)]
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipDocument {
    pub name: String,
    /// Defaults to the last key time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f32>,
    pub tracks: Vec<TrackDocument>,
}

impl ClipDocument {
    pub fn into_clip(self) -> Result<AnimationClip, RetargetError> {
        let tracks: Vec<KeyframeTrack> = self
            .tracks
            .into_iter()
            .map(|track| {
                KeyframeTrack::new(track.bone, track.property, track.times, track.values)
                    .with_interpolation(track.interpolation)
            })
            .collect();
        let clip = match self.duration {
            Some(duration) => AnimationClip::new(self.name, duration, tracks),
            None => AnimationClip::from_tracks(self.name, tracks),
        };
        clip.validate()?;
        Ok(clip)
    }

    pub fn from_clip(clip: &AnimationClip) -> Self {
        Self {
            name: clip.name.clone(),
            duration: Some(clip.duration),
            tracks: clip
                .tracks
                .iter()
                .map(|track| TrackDocument {
                    bone: track.bone.clone(),
                    property: track.property,
                    times: track.times.clone(),
                    values: track.values.clone(),
                    interpolation: track.interpolation,
                })
                .collect(),
        }
    }
}

/// A clip file holds either one clip or a `clips` library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClipFile {
    Library { clips: Vec<ClipDocument> },
    Single(ClipDocument),
}

impl ClipFile {
    pub fn into_clips(self) -> Vec<ClipDocument> {
        match self {
            ClipFile::Library { clips } => clips,
            ClipFile::Single(clip) => vec![clip],
        }
    }
}
