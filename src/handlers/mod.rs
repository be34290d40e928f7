pub mod archive;
pub mod deployment;
pub mod error;
pub mod package;
pub mod verification;

pub use deployment::DeploymentService;
pub use error::RegistryError;
pub use package::PackageService;
pub use verification::VerificationService;
