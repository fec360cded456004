//! pimsbuild native - builds the image-processing library from source
//!
//! Provides:
//! - Archive download (or local copy) with optional SHA-256 pinning
//! - A templated configure / compile / install recipe
//! - `NativeDependencyBuilder`, which runs the build as one unit and leaves
//!   no partial install behind on failure

pub mod archive;
pub mod builder;
pub mod error;
pub mod recipe;

// Re-export key types
pub use builder::{InstalledLibrary, NativeBuild, NativeBuildRequest, NativeDependencyBuilder};
pub use error::{BuildFailure, NativeStep};
pub use recipe::{BuildRecipe, RenderedRecipe};

/// Result type for native builds
pub type Result<T> = std::result::Result<T, BuildFailure>;
