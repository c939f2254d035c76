use crate::core::reconcile::{plan, Action};
use crate::core::sequence::{ProvisionContext, ProvisionStep, ResourceChange, StepOutcome};
use crate::domain::ports::CloudPlatform;
use crate::utils::error::Result;

use super::{
    planned_create, runtime_identity, EXPORT_EXECUTION, STEP_ENSURE_JOB, STEP_ENSURE_SCHEDULE,
    STEP_EXECUTE_JOB,
};

/// 建立或更新 Cloud Run Job
///
/// Limits, env vars, the secret binding and the log mount all go out in a
/// single create/update call.
pub struct EnsureJob;

#[async_trait::async_trait]
impl ProvisionStep for EnsureJob {
    fn name(&self) -> &str {
        STEP_ENSURE_JOB
    }

    async fn run(&self, platform: &dyn CloudPlatform, context: &ProvisionContext) -> Result<StepOutcome> {
        let config = &context.config;
        let account = runtime_identity(context)?;
        let desired = config.job_definition(Some(account.as_str()));
        let current = platform
            .describe_job(&desired.project, &desired.region, &desired.name)
            .await?;
        let action = plan(current.as_ref(), &desired);

        if !context.dry_run {
            match &action {
                Action::Create => {
                    tracing::info!("🛠️ Creating job {} ({})", desired.name, desired.image);
                    platform.create_job(&desired).await?;
                }
                Action::Update { changed } => {
                    tracing::info!("🛠️ Updating job {} ({})", desired.name, changed.join(", "));
                    platform.update_job(&desired).await?;
                }
                Action::Unchanged => {}
            }
        }

        Ok(StepOutcome::new().with_change(ResourceChange::new(
            "job",
            &desired.name,
            action,
            context.dry_run,
        )))
    }
}

/// Cloud Scheduler trigger `<job>-trigger` that POSTs to the job's `:run` endpoint.
pub struct EnsureSchedule;

#[async_trait::async_trait]
impl ProvisionStep for EnsureSchedule {
    fn name(&self) -> &str {
        STEP_ENSURE_SCHEDULE
    }

    async fn run(&self, platform: &dyn CloudPlatform, context: &ProvisionContext) -> Result<StepOutcome> {
        let account = runtime_identity(context)?;
        let desired = context.config.schedule_definition(&account);
        let current = platform
            .describe_schedule(&desired.project, &desired.location, &desired.name)
            .await?;
        let action = plan(current.as_ref(), &desired);

        if !context.dry_run {
            match &action {
                Action::Create => {
                    tracing::info!("⏰ Creating trigger {} ({} {})", desired.name, desired.cron, desired.timezone);
                    platform.create_schedule(&desired).await?;
                }
                Action::Update { changed } => {
                    tracing::info!("⏰ Updating trigger {} ({})", desired.name, changed.join(", "));
                    platform.update_schedule(&desired).await?;
                }
                Action::Unchanged => {}
            }
        }

        Ok(StepOutcome::new().with_change(ResourceChange::new(
            "schedule",
            &desired.name,
            action,
            context.dry_run,
        )))
    }
}

/// 部署完成後執行一次
pub struct ExecuteJob;

#[async_trait::async_trait]
impl ProvisionStep for ExecuteJob {
    fn name(&self) -> &str {
        STEP_EXECUTE_JOB
    }

    fn should_execute(&self, context: &ProvisionContext) -> bool {
        context.config.execute
    }

    async fn run(&self, platform: &dyn CloudPlatform, context: &ProvisionContext) -> Result<StepOutcome> {
        let config = &context.config;
        if context.dry_run {
            let note = if planned_create(context, STEP_ENSURE_JOB) {
                " once it exists"
            } else {
                ""
            };
            tracing::info!("📝 Would execute job {}{}", config.job_name, note);
            return Ok(StepOutcome::new());
        }

        let execution = platform
            .execute_job(&config.project_id, &config.region, &config.job_name)
            .await?;
        tracing::info!("▶️ Started execution {}", execution);
        Ok(StepOutcome::new().export(EXPORT_EXECUTION, serde_json::Value::String(execution)))
    }
}
