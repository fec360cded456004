//! pimsbuild assembler - composes the image variants
//!
//! Provides:
//! - The per-variant state machine from `Init` to `Stamped`
//! - `ImageAssembler`, which drives the plugin phases, the native build, the
//!   package install and version stamping for each variant on its own task
//! - Outcomes, the invocation report and exit-code mapping

pub mod assembler;
pub mod error;
pub mod outcome;
pub mod package;
pub mod state;
pub mod variant;
pub mod workspace;

// Re-export key types
pub use assembler::{ImageAssembler, PreparedBuild, VariantTask};
pub use error::{AssemblyError, FailedStep};
pub use outcome::{AssemblyReport, BuildOutcome};
pub use package::{PackageInstall, PackageInstallRequest, PipPackageInstaller};
pub use state::{StateMachine, Transition, VariantState};
pub use variant::BuildVariant;
pub use workspace::{VariantWorkspace, ARTIFACT_FILE};
