use std::collections::{BTreeMap, HashSet};
use std::f32::consts::FRAC_PI_4;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use rigshift::error::ErrorKind;
use rigshift::mapping::{RigType, detect_rig_type};
use rigshift::math::{Transform, quaternion_from_xyzw, quaternion_to_xyzw};
use rigshift::pose::PoseNormalizer;
use rigshift::{
    AnimationClip, Bone, BoneMap, KeyframeTrack, RetargetOptions, Skeleton, TrackProperty,
    retarget_animation,
};

fn chain(names: [&str; 3], segment: f32) -> Skeleton {
    let offset = Transform::from_translation(Vector3::new(0.0, segment, 0.0));
    Skeleton::new(
        "chain",
        vec![
            Bone::new(names[0], Transform::identity(), None),
            Bone::new(names[1], offset, Some(0)),
            Bone::new(names[2], offset, Some(1)),
        ],
    )
    .expect("valid chain")
}

fn rest_identity_chain(names: [&str; 3]) -> Skeleton {
    Skeleton::new(
        "chain",
        vec![
            Bone::new(names[0], Transform::identity(), None),
            Bone::new(names[1], Transform::identity(), Some(0)),
            Bone::new(names[2], Transform::identity(), Some(1)),
        ],
    )
    .expect("valid chain")
}

fn names(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(source, target)| (source.to_string(), target.to_string()))
        .collect()
}

fn spine_turn() -> AnimationClip {
    let half = FRAC_PI_4;
    AnimationClip::from_tracks(
        "turn",
        vec![KeyframeTrack::new(
            "spine",
            TrackProperty::Rotation,
            vec![0.0, 1.0],
            vec![0.0, 0.0, 0.0, 1.0, 0.0, half.sin(), 0.0, half.cos()],
        )],
    )
}

fn assert_values(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() <= tolerance, "{actual:?} != {expected:?}");
    }
}

#[test]
fn given_identity_map_when_retargeting_spine_turn_then_keys_are_unchanged() {
    let skeleton = rest_identity_chain(["root", "spine", "head"]);
    let map = BoneMap::from_names(
        &names(&[("root", "root"), ("spine", "spine"), ("head", "head")]),
        &skeleton,
        &skeleton,
    )
    .expect("valid map");

    let result = retarget_animation(&skeleton, &skeleton, &spine_turn(), Some(&map), &RetargetOptions::default())
        .expect("retarget");

    assert_eq!(result.clip.tracks.len(), 1);
    let track = &result.clip.tracks[0];
    assert_eq!(track.target_path(), "spine.rotation");
    assert_eq!(track.key_count(), 2);
    let s = FRAC_PI_4.sin();
    let c = FRAC_PI_4.cos();
    assert_values(&track.values, &[0.0, 0.0, 0.0, 1.0, 0.0, s, 0.0, c], 1e-5);
}

#[test]
fn given_renamed_target_when_retargeting_then_tracks_follow_the_map() {
    let source = rest_identity_chain(["root", "spine", "head"]);
    let target = rest_identity_chain(["Hips", "Spine1", "Head1"]);
    let map = BoneMap::from_names(
        &names(&[("root", "Hips"), ("spine", "Spine1"), ("head", "Head1")]),
        &source,
        &target,
    )
    .expect("valid map");
    let clip = spine_turn();

    let result = retarget_animation(&source, &target, &clip, Some(&map), &RetargetOptions::default())
        .expect("retarget");

    assert_eq!(result.clip.tracks.len(), 1);
    assert_eq!(result.clip.tracks[0].bone, "Spine1");
    assert_values(&result.clip.tracks[0].values, &clip.tracks[0].values, 1e-5);
}

#[test]
fn given_double_size_target_when_retargeting_root_motion_then_translation_doubles() {
    let source = chain(["root", "spine", "head"], 0.5);
    let target = chain(["root", "spine", "head"], 1.0);
    let clip = AnimationClip::from_tracks(
        "walk",
        vec![KeyframeTrack::new(
            "root",
            TrackProperty::Translation,
            vec![0.0, 1.0],
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
        )],
    );
    let map = BoneMap::identity_by_name(&source, &target);

    let result = retarget_animation(&source, &target, &clip, Some(&map), &RetargetOptions::default())
        .expect("retarget");

    assert!((result.report.proportion_ratio - 2.0).abs() < 1e-4);
    let track = &result.clip.tracks[0];
    assert_eq!(track.target_path(), "root.translation");
    assert_values(&track.values, &[0.0, 0.0, 0.0, 2.0, 0.0, 0.0], 1e-4);
}

// ─── Reference pose harmonization ─────────────────────────────────────────────

/// Biped facing +Z; `arm_drop` lowers both arms from the horizontal.
fn biped(name: &str, arm_drop: f32) -> Skeleton {
    let t = |x: f32, y: f32, z: f32| Transform::from_translation(Vector3::new(x, y, z));
    let mut bones = vec![
        Bone::new("Hips", t(0.0, 1.0, 0.0), None),
        Bone::new("Spine", t(0.0, 0.1, 0.0), Some(0)),
        Bone::new("Chest", t(0.0, 0.2, 0.0), Some(1)),
        Bone::new("Neck", t(0.0, 0.2, 0.0), Some(2)),
        Bone::new("Head", t(0.0, 0.1, 0.0), Some(3)),
        Bone::new("LeftShoulder", t(0.05, 0.15, 0.0), Some(2)),
        Bone::new("LeftArm", t(0.1, 0.0, 0.0), Some(5)),
        Bone::new("LeftForeArm", t(0.25, 0.0, 0.0), Some(6)),
        Bone::new("LeftHand", t(0.25, 0.0, 0.0), Some(7)),
        Bone::new("RightShoulder", t(-0.05, 0.15, 0.0), Some(2)),
        Bone::new("RightArm", t(-0.1, 0.0, 0.0), Some(9)),
        Bone::new("RightForeArm", t(-0.25, 0.0, 0.0), Some(10)),
        Bone::new("RightHand", t(-0.25, 0.0, 0.0), Some(11)),
        Bone::new("LeftUpLeg", t(0.1, -0.05, 0.0), Some(0)),
        Bone::new("LeftLeg", t(0.0, -0.45, 0.0), Some(13)),
        Bone::new("LeftFoot", t(0.0, -0.45, 0.0), Some(14)),
        Bone::new("LeftToeBase", t(0.0, -0.05, 0.1), Some(15)),
        Bone::new("RightUpLeg", t(-0.1, -0.05, 0.0), Some(0)),
        Bone::new("RightLeg", t(0.0, -0.45, 0.0), Some(17)),
        Bone::new("RightFoot", t(0.0, -0.45, 0.0), Some(18)),
        Bone::new("RightToeBase", t(0.0, -0.05, 0.1), Some(19)),
    ];
    bones[6].local.rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -arm_drop);
    bones[10].local.rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), arm_drop);
    Skeleton::new(name, bones).expect("valid biped")
}

const ARM_BONES: [&str; 6] = [
    "LeftShoulder",
    "LeftArm",
    "LeftForeArm",
    "RightShoulder",
    "RightArm",
    "RightForeArm",
];

fn static_arm_clip(skeleton: &Skeleton) -> AnimationClip {
    let tracks = ARM_BONES
        .iter()
        .map(|name| {
            let index = skeleton.find_bone(name).expect("arm bone");
            let key = quaternion_to_xyzw(skeleton.bones[index].local.rotation.quaternion());
            KeyframeTrack::new(
                *name,
                TrackProperty::Rotation,
                vec![0.0, 0.5, 1.0],
                [key, key, key].concat(),
            )
        })
        .collect();
    AnimationClip::from_tracks("idle", tracks)
}

fn assert_rotation(key: &[f32], expected: &Quaternion<f32>) {
    let mut q: Quaternion<f32> = quaternion_from_xyzw(key);
    if q.dot(expected) < 0.0 {
        q = -q;
    }
    assert_values(&quaternion_to_xyzw(&q), &quaternion_to_xyzw(expected), 1e-3);
}

#[test]
fn given_a_pose_source_and_t_pose_target_when_normalizing_then_arms_stay_on_target_bind() {
    let source = biped("a_pose", FRAC_PI_4);
    let target = biped("t_pose", 0.0);

    // Arms held still in the source's reference pose for one second.
    let mut normalized = source.clone();
    PoseNormalizer::new().apply_t_pose(&mut normalized, None);
    let idle = static_arm_clip(&normalized);
    let options = RetargetOptions {
        apply_t_pose: true,
        ..RetargetOptions::default()
    };

    let result = retarget_animation(&source, &target, &idle, None, &options).expect("retarget");

    assert_eq!(result.clip.tracks.len(), ARM_BONES.len());
    for track in &result.clip.tracks {
        let index = target.find_bone(&track.bone).expect("mapped onto target");
        let bind = target.bones[index].local.rotation.quaternion();
        for key in track.values.chunks(4) {
            assert_rotation(key, bind);
        }
    }
}

#[test]
fn given_a_pose_rest_clip_when_normalizing_to_t_pose_then_arms_keep_their_drop_on_target() {
    let source = biped("a_pose", FRAC_PI_4);
    let target = biped("t_pose", 0.0);
    // Keys are the source's authored A rest, not its normalized locals.
    let idle = static_arm_clip(&source);
    let options = RetargetOptions {
        apply_t_pose: true,
        ..RetargetOptions::default()
    };

    let result = retarget_animation(&source, &target, &idle, None, &options).expect("retarget");

    // Both rigs share the T reference, so the A rest lands on the target's T
    // bind lowered by the same 45 degrees.
    assert_eq!(result.clip.tracks.len(), ARM_BONES.len());
    for track in &result.clip.tracks {
        let index = target.find_bone(&track.bone).expect("mapped onto target");
        let drop = match track.bone.as_str() {
            "LeftArm" => UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -FRAC_PI_4),
            "RightArm" => UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_4),
            _ => UnitQuaternion::identity(),
        };
        let expected = target.bones[index].local.rotation * drop;
        for key in track.values.chunks(4) {
            assert_rotation(key, expected.quaternion());
        }
    }
}

// ─── Rig detection and conflicts ──────────────────────────────────────────────

fn name_set(names: &[&str]) -> HashSet<String> {
    names.iter().map(|name| name.to_lowercase()).collect()
}

#[test]
fn given_known_naming_conventions_when_detecting_then_rig_type_matches() {
    let mixamo = name_set(&["mixamorig:Hips", "mixamorig:Spine", "mixamorig:LeftArm"]);
    let ue5 = name_set(&["pelvis", "spine_01", "clavicle_l", "upperarm_l"]);
    let generic = name_set(&["Hips", "Spine", "Head", "LeftArm", "RightArm", "LeftUpLeg", "RightUpLeg"]);

    assert_eq!(detect_rig_type(&mixamo), RigType::Mixamo);
    assert_eq!(detect_rig_type(&ue5), RigType::Ue5);
    assert_eq!(detect_rig_type(&generic), RigType::Humanoid);
    assert_eq!(detect_rig_type(&HashSet::new()), RigType::Custom);
}

#[test]
fn given_two_hands_sharing_one_target_when_building_map_then_conflict_names_target() {
    let source = Skeleton::new(
        "source",
        vec![
            Bone::new("Hips", Transform::identity(), None),
            Bone::new("LeftHand", Transform::identity(), Some(0)),
            Bone::new("RightHand", Transform::identity(), Some(0)),
        ],
    )
    .expect("valid source");
    let target = Skeleton::new(
        "target",
        vec![
            Bone::new("Hips", Transform::identity(), None),
            Bone::new("Hand", Transform::identity(), Some(0)),
        ],
    )
    .expect("valid target");

    let error = BoneMap::from_names(
        &names(&[("LeftHand", "Hand"), ("RightHand", "Hand")]),
        &source,
        &target,
    )
    .expect_err("duplicate target");

    assert_eq!(error.kind(), ErrorKind::MappingConflict);
    assert!(error.to_string().contains("'Hand'"));
}
