//! Shared types for the Coursegen streaming pipeline.

mod capture;
mod content;
mod modification;
mod section;
mod stream;
mod task;

pub use capture::*;
pub use content::*;
pub use modification::*;
pub use section::*;
pub use stream::*;
pub use task::*;
