use serde::{Deserialize, Serialize};

use crate::error::RetargetError;

/// Tolerance for `max(track.times) <= duration`.
pub const DURATION_EPSILON: f32 = 1e-4;

/// Animated bone property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackProperty {
    Rotation,
    Translation,
    Scale,
}

impl TrackProperty {
    /// Number of floats per keyframe.
    pub fn stride(&self) -> usize {
        match self {
            TrackProperty::Rotation => 4,
            TrackProperty::Translation | TrackProperty::Scale => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackProperty::Rotation => "rotation",
            TrackProperty::Translation => "translation",
            TrackProperty::Scale => "scale",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Step,
    #[default]
    Linear,
    Cubic,
}

/// Keyframes for one property of one bone. Rotations are `(x, y, z, w)`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeTrack {
    pub bone: String,
    pub property: TrackProperty,
    pub times: Vec<f32>,
    pub values: Vec<f32>,
    pub interpolation: Interpolation,
}

impl KeyframeTrack {
    pub fn new(
        bone: impl Into<String>,
        property: TrackProperty,
        times: Vec<f32>,
        values: Vec<f32>,
    ) -> Self {
        Self {
            bone: bone.into(),
            property,
            times,
            values,
            interpolation: Interpolation::Linear,
        }
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn key_count(&self) -> usize {
        self.times.len()
    }

    /// `"<bone>.<property>"`, the target path of the track.
    pub fn target_path(&self) -> String {
        format!("{}.{}", self.bone, self.property.as_str())
    }

    pub fn validate(&self) -> Result<(), RetargetError> {
        let stride = self.property.stride();
        if self.values.len() != self.times.len() * stride {
            return Err(RetargetError::input_shape(format!(
                "track '{}' has {} keys but {} values (stride {})",
                self.target_path(),
                self.times.len(),
                self.values.len(),
                stride
            )));
        }
        if let Some(first) = self.times.first()
            && !(*first >= 0.0)
        {
            return Err(RetargetError::input_shape(format!(
                "track '{}' starts at negative time {}",
                self.target_path(),
                first
            )));
        }
        if self
            .times
            .windows(2)
            .any(|pair| !(pair[1] > pair[0]))
        {
            return Err(RetargetError::input_shape(format!(
                "track '{}' has times that are not strictly increasing",
                self.target_path()
            )));
        }
        Ok(())
    }
}

/// A named, time-bounded set of tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub tracks: Vec<KeyframeTrack>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, duration: f32, tracks: Vec<KeyframeTrack>) -> Self {
        Self {
            name: name.into(),
            duration,
            tracks,
        }
    }

    /// Builds a clip whose duration is the last key time of its tracks.
    pub fn from_tracks(name: impl Into<String>, tracks: Vec<KeyframeTrack>) -> Self {
        let duration = tracks
            .iter()
            .filter_map(|track| track.times.last().copied())
            .fold(0.0f32, f32::max);
        Self::new(name, duration, tracks)
    }

    pub fn max_time(&self) -> f32 {
        self.tracks
            .iter()
            .filter_map(|track| track.times.last().copied())
            .fold(0.0f32, f32::max)
    }

    pub fn validate(&self) -> Result<(), RetargetError> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(RetargetError::input_shape(format!(
                "clip '{}' has invalid duration {}",
                self.name, self.duration
            )));
        }
        for track in &self.tracks {
            track.validate()?;
        }
        let max_time = self.max_time();
        if max_time > self.duration + DURATION_EPSILON {
            return Err(RetargetError::input_shape(format!(
                "clip '{}' has keys at {}s beyond its duration {}s",
                self.name, max_time, self.duration
            )));
        }
        Ok(())
    }
}
