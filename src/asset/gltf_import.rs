use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result, anyhow, bail};
use gltf::animation::util::ReadOutputs;
use gltf::animation::Interpolation as GltfInterpolation;
use gltf::{Document, import_slice};
use log::{debug, warn};
use nalgebra::{Matrix4, Quaternion, UnitQuaternion, Vector3};

use crate::clip::{AnimationClip, Interpolation, KeyframeTrack, TrackProperty};
use crate::math::Transform;
use crate::skeleton::{Bone, Skeleton};

// ─── Node hierarchy helpers ───────────────────────────────────────────────────

/// Child to parent node index map.
fn collect_parent_index_map(document: &Document) -> HashMap<usize, usize> {
    let mut parents = HashMap::new();
    for node in document.nodes() {
        for child in node.children() {
            parents.insert(child.index(), node.index());
        }
    }
    parents
}

fn node_local_transform(node: &gltf::Node<'_>) -> Transform {
    let (translation, rotation, scale) = node.transform().decomposed();
    Transform::new(
        Vector3::from(translation),
        UnitQuaternion::new_normalize(Quaternion::new(
            rotation[3],
            rotation[0],
            rotation[1],
            rotation[2],
        )),
        Vector3::from(scale),
    )
}

fn node_name(node: &gltf::Node<'_>) -> String {
    node.name()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| format!("node_{}", node.index()))
}

/// Scene-space world matrices of every node.
fn compute_node_world_matrices(
    document: &Document,
    parents: &HashMap<usize, usize>,
) -> Vec<Matrix4<f32>> {
    let count = document.nodes().count();
    let locals: Vec<Matrix4<f32>> = document
        .nodes()
        .map(|node| node_local_transform(&node).to_matrix())
        .collect();

    // glTF does not order parents first, so resolve by depth.
    let depth = |mut index: usize| {
        let mut depth = 0usize;
        while let Some(&parent) = parents.get(&index) {
            index = parent;
            depth += 1;
            if depth > count {
                break;
            }
        }
        depth
    };
    let mut order: Vec<usize> = (0..count).collect();
    order.sort_by_key(|&index| depth(index));

    let mut worlds = vec![Matrix4::identity(); count];
    for index in order {
        worlds[index] = match parents.get(&index) {
            Some(&parent) => worlds[parent] * locals[index],
            None => locals[index],
        };
    }
    worlds
}

// ─── Skeleton ─────────────────────────────────────────────────────────────────

/// Reads the first skin of a glTF/GLB payload.
pub fn load_gltf_skeleton(bytes: &[u8]) -> Result<Skeleton> {
    let (document, buffers, _) = import_slice(bytes).context("failed to parse glTF payload")?;
    let skin = document
        .skins()
        .next()
        .ok_or_else(|| anyhow!("glTF payload has no skin"))?;

    let joint_nodes: Vec<usize> = skin.joints().map(|joint| joint.index()).collect();
    if joint_nodes.is_empty() {
        bail!("glTF skin has no joints");
    }
    let joint_set: HashSet<usize> = joint_nodes.iter().copied().collect();
    let parents = collect_parent_index_map(&document);
    let node_worlds = compute_node_world_matrices(&document, &parents);

    // Nearest ancestor that is itself a joint.
    let joint_parent = |node: usize| {
        let mut current = node;
        while let Some(&parent) = parents.get(&current) {
            if joint_set.contains(&parent) {
                return Some(parent);
            }
            current = parent;
        }
        None
    };
    let joint_depth = |node: usize| {
        let mut depth = 0usize;
        let mut current = node;
        while let Some(parent) = joint_parent(current) {
            depth += 1;
            current = parent;
        }
        depth
    };

    // Stable sort by depth puts every parent before its children.
    let mut order: Vec<usize> = (0..joint_nodes.len()).collect();
    order.sort_by_key(|&slot| joint_depth(joint_nodes[slot]));
    let bone_of_node: HashMap<usize, usize> = order
        .iter()
        .enumerate()
        .map(|(bone, &slot)| (joint_nodes[slot], bone))
        .collect();

    let first_root = joint_nodes[order[0]];
    let root_parent = parents.get(&first_root).copied();
    let parent_world = root_parent
        .map(|parent| node_worlds[parent])
        .unwrap_or_else(Matrix4::identity);
    let parent_world_inverse = parent_world
        .try_inverse()
        .ok_or_else(|| anyhow!("scene node above the root joint has a singular transform"))?;

    let nodes: Vec<gltf::Node<'_>> = document.nodes().collect();
    let mut bones = Vec::with_capacity(order.len());
    for &slot in &order {
        let node_index = joint_nodes[slot];
        let node = &nodes[node_index];
        let (parent_bone, local) = match joint_parent(node_index) {
            Some(parent) if parents.get(&node_index) == Some(&parent) => {
                (bone_of_node.get(&parent).copied(), node_local_transform(node))
            }
            Some(parent) => {
                let parent_inverse = node_worlds[parent]
                    .try_inverse()
                    .ok_or_else(|| anyhow!("joint '{}' has a singular transform", node_name(node)))?;
                (
                    bone_of_node.get(&parent).copied(),
                    Transform::from_matrix(&(parent_inverse * node_worlds[node_index])),
                )
            }
            None => (
                None,
                Transform::from_matrix(&(parent_world_inverse * node_worlds[node_index])),
            ),
        };
        bones.push(Bone::new(node_name(node), local, parent_bone));
    }

    let reader = skin.reader(|buffer| buffers.get(buffer.index()).map(|b| &b.0[..]));
    let inverse_bind_matrices = reader.read_inverse_bind_matrices().map(|matrices| {
        let by_slot: Vec<Matrix4<f32>> = matrices.map(Matrix4::from).collect();
        order
            .iter()
            .filter_map(|&slot| by_slot.get(slot))
            // Express the rest pose in the root's parent frame.
            .map(|inverse| inverse * parent_world)
            .collect::<Vec<_>>()
    });
    let inverse_bind_matrices = match inverse_bind_matrices {
        Some(matrices) if matrices.len() == bones.len() => Some(matrices),
        Some(matrices) => {
            warn!(
                "skin has {} inverse bind matrices for {} joints; ignoring them",
                matrices.len(),
                bones.len()
            );
            None
        }
        None => None,
    };

    let name = root_parent
        .and_then(|parent| nodes[parent].name().map(ToOwned::to_owned))
        .or_else(|| skin.name().map(ToOwned::to_owned))
        .or_else(|| {
            document
                .default_scene()
                .and_then(|scene| scene.name().map(ToOwned::to_owned))
        })
        .unwrap_or_else(|| "skeleton".to_string());

    let parent_transform = root_parent.map(|_| Transform::from_matrix(&parent_world));
    debug!(
        "glTF skin '{}': {} joints, inverse bind matrices: {}",
        name,
        bones.len(),
        inverse_bind_matrices.is_some()
    );

    let skeleton = Skeleton {
        name,
        bones,
        inverse_bind_matrices,
        parent_transform,
        root_override: None,
    };
    skeleton.validate()?;
    Ok(skeleton)
}

// ─── Animation ────────────────────────────────────────────────────────────────

/// Reads the named animation, or the first one when `name` is `None`.
pub fn load_gltf_clip(bytes: &[u8], name: Option<&str>) -> Result<AnimationClip> {
    let (document, buffers, _) = import_slice(bytes).context("failed to parse glTF payload")?;

    let animation = match name {
        Some(name) => document
            .animations()
            .find(|animation| animation.name() == Some(name))
            .ok_or_else(|| anyhow!("glTF payload has no animation named '{}'", name))?,
        None => document
            .animations()
            .next()
            .ok_or_else(|| anyhow!("glTF payload has no animations"))?,
    };
    let clip_name = animation
        .name()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| format!("animation_{}", animation.index()));

    let mut tracks = Vec::new();
    for channel in animation.channels() {
        let node = channel.target().node();
        let interpolation = match channel.sampler().interpolation() {
            GltfInterpolation::Step => Interpolation::Step,
            GltfInterpolation::Linear => Interpolation::Linear,
            GltfInterpolation::CubicSpline => Interpolation::Cubic,
        };

        let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(|b| &b.0[..]));
        let Some(inputs) = reader.read_inputs() else {
            warn!("channel on '{}' has no key times; skipped", node_name(&node));
            continue;
        };
        let times: Vec<f32> = inputs.collect();

        let (property, elements): (TrackProperty, Vec<Vec<f32>>) = match reader.read_outputs() {
            Some(ReadOutputs::Translations(values)) => (
                TrackProperty::Translation,
                values.map(|value| value.to_vec()).collect(),
            ),
            Some(ReadOutputs::Rotations(values)) => (
                TrackProperty::Rotation,
                values.into_f32().map(|value| value.to_vec()).collect(),
            ),
            Some(ReadOutputs::Scales(values)) => (
                TrackProperty::Scale,
                values.map(|value| value.to_vec()).collect(),
            ),
            Some(ReadOutputs::MorphTargetWeights(_)) => {
                debug!("morph target channel on '{}' skipped", node_name(&node));
                continue;
            }
            None => {
                warn!("channel on '{}' has no output values; skipped", node_name(&node));
                continue;
            }
        };

        // Cubic splines store (in-tangent, value, out-tangent) per key.
        let values: Vec<f32> = if interpolation == Interpolation::Cubic {
            elements
                .chunks(3)
                .filter_map(|triple| triple.get(1))
                .flatten()
                .copied()
                .collect()
        } else {
            elements.into_iter().flatten().collect()
        };

        tracks.push(
            KeyframeTrack::new(node_name(&node), property, times, values)
                .with_interpolation(interpolation),
        );
    }

    let clip = AnimationClip::from_tracks(clip_name, tracks);
    clip.validate()?;
    Ok(clip)
}

/// Names of all animations in a glTF/GLB payload.
pub fn list_gltf_animations(bytes: &[u8]) -> Result<Vec<String>> {
    let (document, _, _) = import_slice(bytes).context("failed to parse glTF payload")?;
    Ok(document
        .animations()
        .map(|animation| {
            animation
                .name()
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| format!("animation_{}", animation.index()))
        })
        .collect())
}
