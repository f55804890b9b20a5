pub mod bootstrap;
pub mod packager;
pub mod runner;

pub use bootstrap::{Bootstrapper, LaunchInstructions, REQUIREMENTS_MANIFEST};
pub use packager::{FunctionPackager, PackagedArchive};
pub use runner::{DryRunRunner, SystemCommandRunner};
