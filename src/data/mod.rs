//! From continuous recording to model-ready rows.
//!
//! - event extraction from markers or a trigger channel (`events`)
//! - epoch segmentation, baseline correction and rejection (`epochs`)
//! - flattening epochs into observation rows (`table`)
//! - synthetic recordings with known ground truth (`synthetic`)

pub mod epochs;
pub mod events;
pub mod synthetic;
pub mod table;

pub use epochs::*;
pub use events::*;
pub use synthetic::{SyntheticRecording, SyntheticSpec};
pub use table::*;
