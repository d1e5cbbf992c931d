pub mod asset;
pub mod bind;
pub mod canonical;
pub mod clip;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod math;
pub mod pipeline;
pub mod pose;
pub mod retarget;
pub mod settings;
pub mod skeleton;

pub use bind::{BindPoseSnapshot, PoseMode};
pub use clip::{AnimationClip, Interpolation, KeyframeTrack, TrackProperty};
pub use error::{ErrorKind, RetargetError, exit_code_for};
pub use mapping::{BoneMap, BoneMapper};
pub use pipeline::{RetargetReport, RetargetResult, retarget_animation};
pub use retarget::{RetargetContext, RetargetOptions};
pub use skeleton::{Bone, Skeleton};
