//! Core building blocks: identifiers, the clock seam, and the task surface.

pub mod clock;
pub mod task;
pub mod types;
