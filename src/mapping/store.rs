use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jiff::Timestamp;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::rig::RigType;

/// Persisted bone map: `{source name -> target name}` plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedBoneMap {
    pub name: String,
    #[serde(default)]
    pub source_rig_type: RigType,
    #[serde(default)]
    pub target_rig_type: RigType,
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default = "Timestamp::now")]
    pub created_at: Timestamp,
}

impl SavedBoneMap {
    pub fn new(
        name: impl Into<String>,
        source_rig_type: RigType,
        target_rig_type: RigType,
        mapping: BTreeMap<String, String>,
        confidence: f32,
    ) -> Self {
        Self {
            name: name.into(),
            source_rig_type,
            target_rig_type,
            mapping,
            confidence: confidence.clamp(0.0, 1.0),
            created_at: Timestamp::now(),
        }
    }
}

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_map_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// Reads a single bone-map file.
pub fn load_bone_map_file(path: &Path) -> Result<SavedBoneMap> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read bone map: {}", path.display()))?;
    let map: SavedBoneMap = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse bone map JSON: {}", path.display()))?;
    Ok(map)
}

/// Directory of named bone maps, one JSON file per map.
#[derive(Debug, Clone)]
pub struct BoneMapStore {
    dir: PathBuf,
}

impl BoneMapStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_map_name(name)))
    }

    /// Sorted file stems of the stored maps. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list bone maps: {}", self.dir.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to read entry in {}", self.dir.display()))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn load(&self, name: &str) -> Result<SavedBoneMap> {
        load_bone_map_file(&self.path_for(name))
    }

    /// Writes the map to a temporary sibling and renames it into place.
    pub fn save(&self, map: &SavedBoneMap) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create bone map directory: {}", self.dir.display()))?;

        let path = self.path_for(&map.name);
        let temp = path.with_extension("json.tmp");
        let content =
            serde_json::to_string_pretty(map).context("failed to serialize bone map as JSON")?;
        fs::write(&temp, content)
            .with_context(|| format!("failed to write bone map: {}", temp.display()))?;
        fs::rename(&temp, &path)
            .with_context(|| format!("failed to move bone map into place: {}", path.display()))?;

        info!("saved bone map '{}' to {}", map.name, path.display());
        Ok(path)
    }

    /// Removes a stored map; returns `false` when it did not exist.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name);
        if !path.exists() {
            debug!("bone map '{}' not found at {}", name, path.display());
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("failed to delete bone map: {}", path.display()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(label: &str) -> BoneMapStore {
        let dir = std::env::temp_dir().join(format!(
            "rigshift-store-{}-{}-{}",
            label,
            std::process::id(),
            Timestamp::now().as_nanosecond()
        ));
        BoneMapStore::new(dir)
    }

    fn sample_map(name: &str) -> SavedBoneMap {
        let mapping = [
            ("mixamorig:Hips".to_string(), "pelvis".to_string()),
            ("mixamorig:Spine".to_string(), "spine_01".to_string()),
        ]
        .into_iter()
        .collect();
        SavedBoneMap::new(name, RigType::Mixamo, RigType::Ue5, mapping, 0.5)
    }

    #[test]
    fn given_unsafe_characters_when_sanitizing_then_they_become_underscores() {
        assert_eq!(sanitize_map_name("mixamo -> ue5"), "mixamo____ue5");
        assert_eq!(sanitize_map_name("../etc"), "___etc");
        assert_eq!(sanitize_map_name(""), "_");
    }

    #[test]
    fn given_saved_maps_when_listing_then_names_are_sorted_and_loadable() {
        let store = temp_store("list");
        store.save(&sample_map("walk_b")).expect("save b");
        store.save(&sample_map("walk_a")).expect("save a");

        assert_eq!(store.list().expect("list"), vec!["walk_a", "walk_b"]);

        let loaded = store.load("walk_a").expect("load");
        assert_eq!(loaded.mapping.get("mixamorig:Hips"), Some(&"pelvis".to_string()));
        assert_eq!(loaded.source_rig_type, RigType::Mixamo);

        assert!(store.delete("walk_a").expect("delete"));
        assert!(!store.delete("walk_a").expect("second delete"));
        assert_eq!(store.list().expect("list"), vec!["walk_b"]);

        let _ = fs::remove_dir_all(store.dir());
    }

    #[test]
    fn given_missing_directory_when_listing_then_result_is_empty() {
        let store = temp_store("missing");
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn given_unknown_fields_when_parsing_then_they_are_ignored() {
        let json = r##"{
            "name": "legacy",
            "sourceRigType": "mixamo",
            "targetRigType": "somethingNew",
            "mapping": {"Hips": "pelvis"},
            "confidence": 0.25,
            "createdAt": "2024-05-01T12:00:00Z",
            "editorColor": "#ff0000"
        }"##;
        let map: SavedBoneMap = serde_json::from_str(json).expect("parse legacy map");
        assert_eq!(map.target_rig_type, RigType::Custom);
        assert_eq!(map.mapping.len(), 1);
        assert_eq!(map.created_at.to_string(), "2024-05-01T12:00:00Z");
    }
}
