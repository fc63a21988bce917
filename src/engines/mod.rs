//! Search backend module
//!
//! Defines the Backend trait and provides a registry for the configured
//! search sources.

mod loader;
mod registry;
mod traits;

// Backend implementations
pub mod csearch;
pub mod filenames;
pub mod github;
pub mod gitlab;

pub use loader::BackendLoader;
pub use registry::BackendRegistry;
pub use traits::*;
