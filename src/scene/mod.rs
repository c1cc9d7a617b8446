//! Scene Content
//!
//! Structured values carried by pages and the structural merge used to apply
//! partial updates to them.

mod merge;
mod value;

pub use merge::merge;
pub use value::{Scalar, SceneValue};
