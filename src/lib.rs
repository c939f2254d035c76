pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod schema;
pub mod utils;

pub use adapters::GcloudPlatform;
#[cfg(any(test, feature = "testing"))]
pub use adapters::InMemoryPlatform;
pub use app::steps::standard_steps;
pub use config::{DeployConfig, RawDeployConfig, SecretSourceSpec};
pub use crate::core::sequence::{ProvisionReport, Provisioner};
pub use utils::error::{ProvisionError, Result};
