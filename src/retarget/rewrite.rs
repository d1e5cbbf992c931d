use log::{debug, info};
use nalgebra::{Quaternion, Vector3};

use crate::clip::{AnimationClip, KeyframeTrack, TrackProperty};
use crate::error::RetargetError;
use crate::math::{align_hemisphere, normalize_quaternion, quaternion_from_xyzw};

use super::context::RetargetContext;
use super::types::{DropReason, DroppedTrack};

/// Suffix appended to the name of a retargeted clip.
pub const RETARGETED_SUFFIX: &str = "_retargeted";

/// A rewritten clip and what was left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct RetargetOutcome {
    pub clip: AnimationClip,
    pub dropped: Vec<DroppedTrack>,
}

impl RetargetOutcome {
    pub fn emitted_tracks(&self) -> usize {
        self.clip.tracks.len()
    }
}

enum TrackPlan {
    Rotation { source: usize, target: usize },
    RootTranslation { target: usize },
    Translation { target: usize },
    Drop(DropReason),
}

impl RetargetContext {
    /// Rewrites every track of `clip` for the target skeleton. Either the
    /// whole clip is produced or an error is returned.
    pub fn retarget_clip(&self, clip: &AnimationClip) -> Result<RetargetOutcome, RetargetError> {
        clip.validate()?;
        if clip.tracks.is_empty() {
            return Err(RetargetError::input_shape(format!(
                "clip '{}' has no tracks",
                clip.name
            )));
        }

        let mut tracks = Vec::with_capacity(clip.tracks.len());
        let mut dropped = Vec::new();

        for (track_index, track) in clip.tracks.iter().enumerate() {
            let emitted = match self.plan(track) {
                TrackPlan::Rotation { source, target } => {
                    self.rewrite_rotation(track, track_index, source, target)?
                }
                TrackPlan::RootTranslation { target } => {
                    self.rewrite_root_translation(track, track_index, target)?
                }
                TrackPlan::Translation { target } => {
                    self.rewrite_translation(track, track_index, target)?
                }
                TrackPlan::Drop(reason) => {
                    debug!("dropping track '{}': {}", track.target_path(), reason.as_str());
                    dropped.push(DroppedTrack {
                        track_index,
                        target_path: track.target_path(),
                        reason,
                    });
                    continue;
                }
            };
            tracks.push(emitted);
        }

        if tracks.is_empty() {
            return Err(RetargetError::NoOutputTracks {
                dropped: dropped.len(),
            });
        }

        let clip = AnimationClip::new(
            format!("{}{}", clip.name, RETARGETED_SUFFIX),
            clip.duration,
            tracks,
        );
        info!(
            "retargeted clip '{}': {} tracks emitted, {} dropped",
            clip.name,
            clip.tracks.len(),
            dropped.len()
        );
        Ok(RetargetOutcome { clip, dropped })
    }

    fn plan(&self, track: &KeyframeTrack) -> TrackPlan {
        let Some(source) = self.source().find_bone(&track.bone) else {
            return TrackPlan::Drop(DropReason::UnknownBone);
        };
        let Some(target) = self.map().get(source) else {
            return TrackPlan::Drop(DropReason::UnmappedBone);
        };
        match track.property {
            TrackProperty::Rotation => TrackPlan::Rotation { source, target },
            TrackProperty::Translation if source == self.source_root() => {
                if self.options().preserve_root_motion {
                    TrackPlan::RootTranslation { target }
                } else {
                    TrackPlan::Drop(DropReason::RootMotionDisabled)
                }
            }
            TrackProperty::Translation => TrackPlan::Translation { target },
            TrackProperty::Scale => TrackPlan::Drop(DropReason::ScaleTrack),
        }
    }

    fn rewrite_rotation(
        &self,
        track: &KeyframeTrack,
        track_index: usize,
        source: usize,
        target: usize,
    ) -> Result<KeyframeTrack, RetargetError> {
        let mut values = Vec::with_capacity(track.values.len());
        let mut previous: Option<Quaternion<f32>> = None;

        for (key_index, key) in track.values.chunks_exact(4).enumerate() {
            let numeric = |message: &str| RetargetError::Numeric {
                message: message.to_string(),
                bone: track.bone.clone(),
                track_index,
                key_index,
            };

            let q = normalize_quaternion(quaternion_from_xyzw(key))
                .ok_or_else(|| numeric("input quaternion is non-finite or has zero norm"))?;
            let rotated = self
                .rotate(source, q.quaternion())
                .ok_or_else(|| numeric("bone has no precomputed factors"))?;
            let normalized = normalize_quaternion(rotated)
                .ok_or_else(|| numeric("retargeted quaternion is non-finite or has zero norm"))?
                .into_inner();
            let output = match &previous {
                Some(previous) => align_hemisphere(previous, normalized),
                None => normalized,
            };
            values.extend_from_slice(&[output.i, output.j, output.k, output.w]);
            previous = Some(output);
        }

        Ok(self.emit(track, target, values))
    }

    fn rewrite_root_translation(
        &self,
        track: &KeyframeTrack,
        track_index: usize,
        target: usize,
    ) -> Result<KeyframeTrack, RetargetError> {
        let mut values = Vec::with_capacity(track.values.len());
        for (key_index, key) in track.values.chunks_exact(3).enumerate() {
            let position = self.root_position(&Vector3::new(key[0], key[1], key[2]));
            check_finite(track, track_index, key_index, &position)?;
            values.extend_from_slice(position.as_slice());
        }
        Ok(self.emit(track, target, values))
    }

    fn rewrite_translation(
        &self,
        track: &KeyframeTrack,
        track_index: usize,
        target: usize,
    ) -> Result<KeyframeTrack, RetargetError> {
        let factor = if self.options().scale_child_translations {
            self.proportion_ratio()
        } else {
            1.0
        };
        let mut values = Vec::with_capacity(track.values.len());
        for (key_index, key) in track.values.chunks_exact(3).enumerate() {
            let position = Vector3::new(key[0], key[1], key[2]) * factor;
            check_finite(track, track_index, key_index, &position)?;
            values.extend_from_slice(position.as_slice());
        }
        Ok(self.emit(track, target, values))
    }

    fn emit(&self, track: &KeyframeTrack, target: usize, values: Vec<f32>) -> KeyframeTrack {
        KeyframeTrack::new(
            self.target().bone_name(target),
            track.property,
            track.times.clone(),
            values,
        )
        .with_interpolation(track.interpolation)
    }
}

fn check_finite(
    track: &KeyframeTrack,
    track_index: usize,
    key_index: usize,
    position: &Vector3<f32>,
) -> Result<(), RetargetError> {
    if position.iter().all(|value| value.is_finite()) {
        return Ok(());
    }
    Err(RetargetError::Numeric {
        message: "translation is non-finite".to_string(),
        bone: track.bone.clone(),
        track_index,
        key_index,
    })
}
