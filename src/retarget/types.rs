use serde::{Deserialize, Serialize};

use crate::bind::PoseMode;
use crate::pose::ReferencePose;

/// Retargeting options. Every field has a default, so partial JSON loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetargetOptions {
    pub source_pose_mode: PoseMode,
    pub target_pose_mode: PoseMode,
    pub embed_source_world: bool,
    pub embed_target_world: bool,
    pub apply_t_pose: bool,
    pub reference_pose: ReferencePose,
    pub preserve_root_motion: bool,
    /// Scale non-root translations by the proportion ratio as well.
    pub scale_child_translations: bool,
    pub canonicalize: bool,
    pub include_fingers: bool,
    pub source_root: Option<String>,
    pub target_root: Option<String>,
}

impl Default for RetargetOptions {
    fn default() -> Self {
        Self {
            source_pose_mode: PoseMode::Default,
            target_pose_mode: PoseMode::Default,
            embed_source_world: false,
            embed_target_world: false,
            apply_t_pose: false,
            reference_pose: ReferencePose::T,
            preserve_root_motion: true,
            scale_child_translations: false,
            canonicalize: true,
            include_fingers: false,
            source_root: None,
            target_root: None,
        }
    }
}

impl RetargetOptions {
    /// Options as applied: pose normalization captures the live pose.
    pub fn effective(&self) -> Self {
        let mut options = self.clone();
        if options.apply_t_pose {
            options.source_pose_mode = PoseMode::Current;
            options.target_pose_mode = PoseMode::Current;
        }
        options
    }
}

/// Why an input track produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DropReason {
    UnknownBone,
    UnmappedBone,
    ScaleTrack,
    RootMotionDisabled,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::UnknownBone => "bone not in source skeleton",
            DropReason::UnmappedBone => "bone not mapped",
            DropReason::ScaleTrack => "scale tracks are not retargeted",
            DropReason::RootMotionDisabled => "root motion disabled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedTrack {
    pub track_index: usize,
    pub target_path: String,
    pub reason: DropReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_partial_json_when_parsing_options_then_missing_fields_take_defaults() {
        let options: RetargetOptions =
            serde_json::from_str(r#"{"applyTPose": true, "referencePose": "a", "sourcePoseMode": "current"}"#)
                .expect("parse options");
        assert!(options.apply_t_pose);
        assert_eq!(options.reference_pose, ReferencePose::A);
        assert_eq!(options.source_pose_mode, PoseMode::Current);
        assert!(options.preserve_root_motion);
        assert!(options.canonicalize);
    }

    #[test]
    fn given_t_pose_request_when_resolving_effective_options_then_modes_are_current() {
        let options = RetargetOptions {
            apply_t_pose: true,
            ..RetargetOptions::default()
        };
        let effective = options.effective();
        assert_eq!(effective.source_pose_mode, PoseMode::Current);
        assert_eq!(effective.target_pose_mode, PoseMode::Current);
        assert_eq!(RetargetOptions::default().effective().source_pose_mode, PoseMode::Default);
    }

    #[test]
    fn given_pose_modes_when_casting_then_discriminants_are_stable() {
        assert_eq!(PoseMode::Default as u8, 0);
        assert_eq!(PoseMode::Current as u8, 1);
    }
}
