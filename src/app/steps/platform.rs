use crate::core::reconcile::{missing_members, Action};
use crate::core::sequence::{ProvisionContext, ProvisionStep, ResourceChange, StepOutcome};
use crate::domain::ports::CloudPlatform;
use crate::utils::error::Result;

use super::{EXPORT_SERVICE_ACCOUNT, STEP_ENABLE_APIS, STEP_RESOLVE_IDENTITY};

/// 啟用部署所需的 Google Cloud API
pub struct EnableApis;

#[async_trait::async_trait]
impl ProvisionStep for EnableApis {
    fn name(&self) -> &str {
        STEP_ENABLE_APIS
    }

    async fn run(&self, platform: &dyn CloudPlatform, context: &ProvisionContext) -> Result<StepOutcome> {
        let project = &context.config.project_id;
        let required = context.config.required_services();
        let enabled = platform.enabled_services(project).await?;
        let missing = missing_members(&enabled, &required);

        if !missing.is_empty() {
            if context.dry_run {
                tracing::info!("📝 Would enable {} API(s): {}", missing.len(), missing.join(", "));
            } else {
                tracing::info!("🔌 Enabling {} API(s): {}", missing.len(), missing.join(", "));
                platform.enable_services(project, &missing).await?;
            }
        }

        let mut outcome = StepOutcome::new();
        for service in &required {
            let action = if missing.contains(service) {
                Action::Create
            } else {
                Action::Unchanged
            };
            outcome.push(ResourceChange::new("service", service, action, context.dry_run));
        }
        Ok(outcome)
    }
}

/// Runtime identity used by the job, the secret grant and the scheduler.
///
/// An explicit `service_account` wins; otherwise the project's default
/// compute account is derived from the project number.
pub struct ResolveIdentity;

pub fn default_compute_account(project_number: &str) -> String {
    format!("{}-compute@developer.gserviceaccount.com", project_number)
}

#[async_trait::async_trait]
impl ProvisionStep for ResolveIdentity {
    fn name(&self) -> &str {
        STEP_RESOLVE_IDENTITY
    }

    async fn run(&self, platform: &dyn CloudPlatform, context: &ProvisionContext) -> Result<StepOutcome> {
        let account = match &context.config.service_account {
            Some(account) => account.clone(),
            None => {
                let number = platform.project_number(&context.config.project_id).await?;
                default_compute_account(&number)
            }
        };
        tracing::info!("🪪 Runtime identity: {}", account);
        Ok(StepOutcome::new().export(EXPORT_SERVICE_ACCOUNT, serde_json::Value::String(account)))
    }
}
