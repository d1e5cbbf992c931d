use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::bind::BindPoseSnapshot;
use crate::canonical::{CanonicalFrame, CanonicalReport, Canonicalizer, root_names};
use crate::clip::AnimationClip;
use crate::error::RetargetError;
use crate::mapping::{
    BoneMap, BoneMapper, RigType, detect_rig_type, duplicated_mapped_names, ensure_root_mapping,
    mapping_confidence,
};
use crate::pose::PoseNormalizer;
use crate::retarget::{DroppedTrack, RetargetContext, RetargetOptions};
use crate::skeleton::Skeleton;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
/// Summary of one retargeting run.
pub struct RetargetReport {
    /// Naming convention detected on the source skeleton.
    pub source_rig: RigType,
    /// Naming convention detected on the target skeleton.
    pub target_rig: RigType,
    /// Fraction of base roles covered by the map.
    pub confidence: f32,
    /// Number of `source -> target` pairs used.
    pub mapped_bones: usize,
    /// Target/source length ratio applied to root motion, in the skeletons'
    /// authored units.
    pub proportion_ratio: f32,
    /// Number of tracks in the output clip.
    pub emitted_tracks: usize,
    /// Input tracks that produced no output, with the reason.
    pub dropped_tracks: Vec<DroppedTrack>,
    /// Non-fatal problems met along the way.
    pub warnings: Vec<String>,
    /// Canonicalization of the source, when enabled.
    pub source_canonical: Option<CanonicalReport>,
    /// Canonicalization of the target, when enabled.
    pub target_canonical: Option<CanonicalReport>,
}

#[derive(Debug, Clone)]
/// Output of [`retarget_animation`].
pub struct RetargetResult {
    /// Clip for the target skeleton in its authored frame.
    pub clip: AnimationClip,
    /// Bone map that was applied. Indices refer to the input skeletons.
    pub map: BoneMap,
    pub report: RetargetReport,
}

/// Runs the whole flow: canonicalize, normalize the reference pose, map,
/// capture bind poses, rewrite the clip and convert it back into the
/// target's authored frame.
///
/// # Arguments
///
/// * `source` - Skeleton the clip was authored for.
/// * `target` - Skeleton that should play the clip.
/// * `clip` - Source animation.
/// * `map` - Operator map; when `None` one is generated from bone names.
/// * `options` - Retargeting options.
///
/// # Errors
///
/// Returns the first [`RetargetError`] met. No partial clip is produced.
pub fn retarget_animation(
    source: &Skeleton,
    target: &Skeleton,
    clip: &AnimationClip,
    map: Option<&BoneMap>,
    options: &RetargetOptions,
) -> Result<RetargetResult, RetargetError> {
    source.validate()?;
    target.validate()?;
    clip.validate()?;

    let options = options.effective();
    let mut warnings = Vec::new();

    let mut source = source.clone();
    let mut target = target.clone();
    if options.source_root.is_some() {
        source.root_override = options.source_root.clone();
    }
    if options.target_root.is_some() {
        target.root_override = options.target_root.clone();
    }
    let target_roots = root_names(&target);

    // ─── Canonical frame ───
    let mut clips = [clip.clone()];
    let ((source_canonical, target_canonical), (source_frame, target_frame)) =
        if options.canonicalize {
            let canonicalizer = Canonicalizer::default();
            let (source_report, source_frame) = canonicalizer.canonicalize(&mut source, &mut clips);
            let (target_report, target_frame) = canonicalizer.canonicalize(&mut target, &mut []);
            (
                (Some(source_report), Some(target_report)),
                (source_frame, target_frame),
            )
        } else {
            ((None, None), (CanonicalFrame::identity(), CanonicalFrame::identity()))
        };
    let [clip] = clips;

    // ─── Reference pose ───
    if options.apply_t_pose {
        for skeleton in [&mut source, &mut target] {
            let mut normalizer = PoseNormalizer::new();
            normalizer.apply_reference_pose(skeleton, options.reference_pose, None);
            warnings.extend(normalizer.into_warnings().iter().map(ToString::to_string));
        }
    }

    // ─── Bone map ───
    let (mut map, confidence, source_rig, target_rig) = match map {
        Some(map) => (
            map.clone(),
            mapping_confidence(map, &source, &target),
            detect_rig_type(&source.lowercase_names()),
            detect_rig_type(&target.lowercase_names()),
        ),
        None => {
            let mapper = BoneMapper {
                include_fingers: options.include_fingers,
                ..BoneMapper::default()
            };
            let auto = mapper.auto_map(&source, &target);
            (auto.map, auto.confidence, auto.source_rig, auto.target_rig)
        }
    };
    if map.is_empty() {
        return Err(RetargetError::MappingEmpty);
    }
    if options.preserve_root_motion {
        ensure_root_mapping(&mut map, &source, &target);
    }
    let duplicated = duplicated_mapped_names(&map, &source);
    if !duplicated.is_empty() {
        warnings.push(format!(
            "mapped source bones with duplicated names resolve to their first occurrence: {}",
            duplicated.join(", ")
        ));
    }

    // ─── Bind poses and rewrite ───
    let source_bind = BindPoseSnapshot::capture(
        &source,
        options.source_pose_mode,
        options.embed_source_world,
    )?;
    let target_bind = BindPoseSnapshot::capture(
        &target,
        options.target_pose_mode,
        options.embed_target_world,
    )?;
    let context = RetargetContext::new(source_bind, target_bind, map.clone(), options.clone())?;
    if context.proportion_fallback() {
        warnings.push("proportion ratio fell back to 1.0".to_string());
    }

    let mut outcome = context.retarget_clip(&clip)?;
    target_frame.revert_clip(&mut outcome.clip, &target_roots);

    // Canonical lengths are rescaled on both sides; report the ratio in
    // authored units.
    let proportion_ratio = context.proportion_ratio() * source_frame.scale / target_frame.scale;

    let report = RetargetReport {
        source_rig,
        target_rig,
        confidence,
        mapped_bones: map.len(),
        proportion_ratio,
        emitted_tracks: outcome.emitted_tracks(),
        dropped_tracks: outcome.dropped,
        warnings,
        source_canonical,
        target_canonical,
    };
    info!(
        "retargeted '{}' -> '{}': {} tracks, {} dropped",
        clip.name,
        outcome.clip.name,
        report.emitted_tracks,
        report.dropped_tracks.len()
    );

    Ok(RetargetResult {
        clip: outcome.clip,
        map,
        report,
    })
}

/// Save a retarget report as pretty JSON.
pub fn write_report(path: &Path, report: &RetargetReport) -> Result<()> {
    let content =
        serde_json::to_string_pretty(report).context("failed to serialize retarget report")?;
    fs::write(path, content)
        .with_context(|| format!("failed to write retarget report: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{KeyframeTrack, TrackProperty};
    use crate::error::ErrorKind;
    use crate::math::{Transform, quaternion_distance, quaternion_from_xyzw};
    use crate::pose::tests::humanoid;
    use crate::skeleton::Bone;
    use nalgebra::{UnitQuaternion, Vector3};

    fn idle_clip(bone: &str) -> AnimationClip {
        AnimationClip::from_tracks(
            "idle",
            vec![KeyframeTrack::new(
                bone,
                TrackProperty::Rotation,
                vec![0.0, 1.0],
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            )],
        )
    }

    #[test]
    fn given_identical_humanoids_when_retargeting_then_rotations_pass_through() {
        let skeleton = humanoid("rig", 0.0, 1.0);
        let clip = AnimationClip::from_tracks(
            "wave",
            vec![KeyframeTrack::new(
                "LeftForeArm",
                TrackProperty::Rotation,
                vec![0.0, 1.0],
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.3826834, 0.9238795],
            )],
        );

        let result = retarget_animation(&skeleton, &skeleton, &clip, None, &RetargetOptions::default())
            .expect("retarget");

        assert_eq!(result.clip.tracks.len(), 1);
        assert_eq!(result.clip.tracks[0].bone, "LeftForeArm");
        for (output, input) in result.clip.tracks[0].values.iter().zip(&clip.tracks[0].values) {
            assert!((output - input).abs() < 1e-5);
        }
        assert_eq!(result.report.source_rig, RigType::Humanoid);
        assert!(result.report.confidence > 0.9);
    }

    #[test]
    fn given_no_shared_names_when_retargeting_then_mapping_empty_is_returned() {
        let source = Skeleton::new(
            "a",
            vec![Bone::new("alpha", Transform::identity(), None)],
        )
        .expect("valid");
        let target = Skeleton::new(
            "b",
            vec![Bone::new("omega", Transform::identity(), None)],
        )
        .expect("valid");

        let error = retarget_animation(&source, &target, &idle_clip("alpha"), None, &RetargetOptions::default())
            .expect_err("no map");
        assert_eq!(error.kind(), ErrorKind::MappingEmpty);
    }

    #[test]
    fn given_z_up_target_when_retargeting_then_root_rotation_is_reverted_into_target_frame() {
        let source = humanoid("src", 0.0, 1.0);
        let mut target = humanoid("trg", 0.0, 1.0);
        let z_up = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f32::consts::FRAC_PI_2);
        target.bones[0].local.rotation = z_up;

        let result =
            retarget_animation(&source, &target, &idle_clip("Hips"), None, &RetargetOptions::default())
                .expect("retarget");

        let hips = &result.clip.tracks[0];
        assert_eq!(hips.bone, "Hips");
        let q = UnitQuaternion::new_normalize(quaternion_from_xyzw(&hips.values[0..4]));
        assert!(quaternion_distance(&q, &z_up) < 1e-4);
    }

    /// Narrow enough to be detected as a humanoid and rescaled to 1.7 m.
    fn narrow_biped(name: &str, segment: f32) -> Skeleton {
        let t = |x: f32, y: f32| Transform::from_translation(Vector3::new(x, y, 0.0) * segment);
        Skeleton::new(
            name,
            vec![
                Bone::new("Hips", t(0.0, 1.0), None),
                Bone::new("Spine", t(0.0, 0.4), Some(0)),
                Bone::new("Head", t(0.0, 0.4), Some(1)),
                Bone::new("LeftUpLeg", t(0.2, -0.1), Some(0)),
                Bone::new("LeftFoot", t(0.0, -0.8), Some(3)),
                Bone::new("RightUpLeg", t(-0.2, -0.1), Some(0)),
                Bone::new("RightFoot", t(0.0, -0.8), Some(5)),
            ],
        )
        .expect("valid biped")
    }

    #[test]
    fn given_rescaled_humanoids_when_retargeting_root_motion_then_report_ratio_matches_clip() {
        let source = narrow_biped("small", 1.0);
        let target = narrow_biped("large", 2.0);
        let clip = AnimationClip::from_tracks(
            "walk",
            vec![KeyframeTrack::new(
                "Hips",
                TrackProperty::Translation,
                vec![0.0, 1.0],
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            )],
        );
        let options = RetargetOptions {
            preserve_root_motion: true,
            ..RetargetOptions::default()
        };

        let result = retarget_animation(&source, &target, &clip, None, &options).expect("retarget");

        let source_canonical = result.report.source_canonical.expect("source canonicalized");
        let target_canonical = result.report.target_canonical.expect("target canonicalized");
        assert!(source_canonical.humanoid && target_canonical.humanoid);
        assert!((target_canonical.scale_factor - 0.5).abs() < 1e-4);
        assert!((result.report.proportion_ratio - 2.0).abs() < 1e-4);

        let hips = &result.clip.tracks[0];
        assert_eq!(hips.target_path(), "Hips.translation");
        let expected = [0.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        for (actual, expected) in hips.values.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-4, "{:?}", hips.values);
        }
    }

    #[test]
    fn given_report_when_writing_then_json_uses_camel_case() {
        let skeleton = humanoid("rig", 0.0, 1.0);
        let result =
            retarget_animation(&skeleton, &skeleton, &idle_clip("Spine"), None, &RetargetOptions::default())
                .expect("retarget");
        let json = serde_json::to_string(&result.report).expect("serialize");
        assert!(json.contains("\"proportionRatio\""));
        assert!(json.contains("\"sourceRig\":\"humanoid\""));

        let path = std::env::temp_dir().join(format!("rigshift-report-{}.json", std::process::id()));
        write_report(&path, &result.report).expect("write report");
        assert!(path.exists());
        let _ = fs::remove_file(path);
    }
}
