use serde::Serialize;
use thiserror::Error;

/// Category of a retargeting failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InputShape,
    MappingEmpty,
    MappingConflict,
    PoseDegenerate,
    Numeric,
    NoOutputTracks,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputShape => "input_shape",
            ErrorKind::MappingEmpty => "mapping_empty",
            ErrorKind::MappingConflict => "mapping_conflict",
            ErrorKind::PoseDegenerate => "pose_degenerate",
            ErrorKind::Numeric => "numeric",
            ErrorKind::NoOutputTracks => "no_output_tracks",
        }
    }
}

/// Where in the input an error was detected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    pub bone: Option<String>,
    pub track_index: Option<usize>,
    pub key_index: Option<usize>,
}

impl Location {
    pub fn bone(name: impl Into<String>) -> Self {
        Self {
            bone: Some(name.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
/// Error values returned by the retargeting core.
pub enum RetargetError {
    /// A skeleton, clip or bone list is missing or malformed.
    #[error("invalid input: {message}")]
    InputShape { message: String },

    /// The bone map holds no correspondences.
    #[error("bone map is empty: no source bone drives a target bone")]
    MappingEmpty,

    /// Two source bones share a target, or a name is absent from its skeleton.
    #[error("bone map conflict: {message}")]
    MappingConflict {
        message: String,
        source_bone: Option<String>,
        target_bone: Option<String>,
    },

    /// A quaternion or translation became non-finite or degenerate.
    #[error(
        "numeric failure on bone '{bone}' (track {track_index}, key {key_index}): {message}"
    )]
    Numeric {
        message: String,
        bone: String,
        track_index: usize,
        key_index: usize,
    },

    /// Every input track was dropped.
    #[error("no output tracks: all {dropped} input tracks referenced unmapped bones")]
    NoOutputTracks { dropped: usize },
}

impl RetargetError {
    pub fn input_shape(message: impl Into<String>) -> Self {
        RetargetError::InputShape {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RetargetError::InputShape { .. } => ErrorKind::InputShape,
            RetargetError::MappingEmpty => ErrorKind::MappingEmpty,
            RetargetError::MappingConflict { .. } => ErrorKind::MappingConflict,
            RetargetError::Numeric { .. } => ErrorKind::Numeric,
            RetargetError::NoOutputTracks { .. } => ErrorKind::NoOutputTracks,
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            RetargetError::MappingConflict {
                source_bone,
                target_bone,
                ..
            } => source_bone
                .clone()
                .or_else(|| target_bone.clone())
                .map(Location::bone),
            RetargetError::Numeric {
                bone,
                track_index,
                key_index,
                ..
            } => Some(Location {
                bone: Some(bone.clone()),
                track_index: Some(*track_index),
                key_index: Some(*key_index),
            }),
            _ => None,
        }
    }
}

/// Process exit code used by the command-line driver for a failure kind.
pub fn exit_code_for(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Numeric => 4,
        ErrorKind::PoseDegenerate => 0,
        ErrorKind::InputShape
        | ErrorKind::MappingEmpty
        | ErrorKind::MappingConflict
        | ErrorKind::NoOutputTracks => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_numeric_error_when_formatted_then_bone_and_key_are_included() {
        let error = RetargetError::Numeric {
            message: "quaternion norm below epsilon".to_string(),
            bone: "mixamorig:LeftArm".to_string(),
            track_index: 3,
            key_index: 17,
        };

        let message = error.to_string();
        assert!(message.contains("mixamorig:LeftArm"));
        assert!(message.contains("track 3"));
        assert!(message.contains("key 17"));

        let location = error.location().expect("numeric errors carry a location");
        assert_eq!(location.track_index, Some(3));
        assert_eq!(location.key_index, Some(17));
    }

    #[test]
    fn given_conflict_error_when_resolving_location_then_source_bone_is_reported() {
        let error = RetargetError::MappingConflict {
            message: "target 'Hand' already driven by 'LeftHand'".to_string(),
            source_bone: Some("RightHand".to_string()),
            target_bone: Some("Hand".to_string()),
        };
        assert_eq!(error.kind(), ErrorKind::MappingConflict);
        assert_eq!(
            error.location().and_then(|location| location.bone),
            Some("RightHand".to_string())
        );
    }

    #[test]
    fn given_error_kinds_when_mapping_exit_codes_then_refusals_and_numeric_differ() {
        assert_eq!(exit_code_for(ErrorKind::MappingEmpty), 3);
        assert_eq!(exit_code_for(ErrorKind::NoOutputTracks), 3);
        assert_eq!(exit_code_for(ErrorKind::InputShape), 3);
        assert_eq!(exit_code_for(ErrorKind::Numeric), 4);
    }
}
