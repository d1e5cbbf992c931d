//! Rotation and root-motion rewriting from a source to a target skeleton.
//!
//! For source bone `i` driving target bone `j`, a source local rotation `q`
//! becomes `left(i) * q * right(i)` where
//!
//! ```text
//! left(i)  = W_trg_parent(j)^-1 * F_trg^-1 * F_src * W_src_parent(i)
//! right(i) = W_src(i)^-1 * F_src^-1 * F_trg * W_trg(j)
//! ```
//!
//! `W` are bind world rotations and `F` the optional embedded parent frames.

mod context;
mod rewrite;
mod types;

pub use context::RetargetContext;
pub use rewrite::{RETARGETED_SUFFIX, RetargetOutcome};
pub use types::{DropReason, DroppedTrack, RetargetOptions};
