//! HTTP handlers for table resources.

pub mod resource;
pub use resource::*;
