// Adapters layer: concrete implementations of the domain ports.

pub mod gcloud;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod runner;
pub mod secret_source;

pub use gcloud::GcloudPlatform;
#[cfg(any(test, feature = "testing"))]
pub use memory::InMemoryPlatform;
pub use runner::{CommandOutput, CommandRunner, TokioCommandRunner};
