pub mod reconcile;
pub mod sequence;

pub use crate::utils::error::Result;
pub use reconcile::{plan, plan_secret, Action, Reconcile};
pub use sequence::{ProvisionContext, ProvisionReport, ProvisionStep, Provisioner, StepOutcome};
