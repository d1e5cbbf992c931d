//! Reading skeletons and clips from disk, writing retargeted clips back.

mod document;
mod gltf_import;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};

use crate::clip::AnimationClip;
use crate::skeleton::Skeleton;

pub use document::{
    BoneDocument, ClipDocument, ClipFile, SkeletonDocument, TrackDocument, TransformDocument,
};
pub use gltf_import::{list_gltf_animations, load_gltf_skeleton, load_gltf_clip};

/// Container format of an input asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    Json,
    Gltf,
}

impl AssetFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Ok(AssetFormat::Json),
            "gltf" | "glb" | "vrm" => Ok(AssetFormat::Gltf),
            _ => bail!("unsupported asset extension: {}", path.display()),
        }
    }
}

pub fn load_skeleton(bytes: &[u8], format: AssetFormat) -> Result<Skeleton> {
    match format {
        AssetFormat::Json => {
            let document: SkeletonDocument =
                serde_json::from_slice(bytes).context("failed to parse skeleton JSON")?;
            Ok(document.into_skeleton()?)
        }
        AssetFormat::Gltf => load_gltf_skeleton(bytes),
    }
}

/// Loads one clip. `name` selects a clip from a library or a glTF file;
/// without it the first clip is used.
pub fn load_clip(bytes: &[u8], format: AssetFormat, name: Option<&str>) -> Result<AnimationClip> {
    match format {
        AssetFormat::Json => {
            let file: ClipFile =
                serde_json::from_slice(bytes).context("failed to parse clip JSON")?;
            let mut clips = file.into_clips().into_iter();
            let document = match name {
                Some(name) => clips
                    .find(|clip| clip.name == name)
                    .ok_or_else(|| anyhow!("clip '{}' not found", name))?,
                None => clips.next().ok_or_else(|| anyhow!("clip file is empty"))?,
            };
            Ok(document.into_clip()?)
        }
        AssetFormat::Gltf => load_gltf_clip(bytes, name),
    }
}

pub fn load_skeleton_file(path: &Path) -> Result<Skeleton> {
    let format = AssetFormat::from_path(path)?;
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read skeleton: {}", path.display()))?;
    load_skeleton(&bytes, format)
        .with_context(|| format!("failed to load skeleton: {}", path.display()))
}

pub fn load_clip_file(path: &Path, name: Option<&str>) -> Result<AnimationClip> {
    let format = AssetFormat::from_path(path)?;
    let bytes =
        fs::read(path).with_context(|| format!("failed to read clip: {}", path.display()))?;
    load_clip(&bytes, format, name)
        .with_context(|| format!("failed to load clip: {}", path.display()))
}

/// Save a clip as pretty JSON.
pub fn save_clip(path: &Path, clip: &AnimationClip) -> Result<()> {
    let content = serde_json::to_string_pretty(&ClipDocument::from_clip(clip))
        .context("failed to serialize clip as JSON")?;
    fs::write(path, content)
        .with_context(|| format!("failed to write clip: {}", path.display()))?;
    Ok(())
}

/// Save a skeleton as pretty JSON.
pub fn save_skeleton(path: &Path, skeleton: &Skeleton) -> Result<()> {
    let content = serde_json::to_string_pretty(&SkeletonDocument::from_skeleton(skeleton))
        .context("failed to serialize skeleton as JSON")?;
    fs::write(path, content)
        .with_context(|| format!("failed to write skeleton: {}", path.display()))?;
    Ok(())
}
