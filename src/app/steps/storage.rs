use crate::core::reconcile::{missing_members, Action};
use crate::core::sequence::{ProvisionContext, ProvisionStep, ResourceChange, StepOutcome};
use crate::domain::model::{service_account_member, BUCKET_WRITER_ROLE};
use crate::domain::ports::CloudPlatform;
use crate::utils::error::Result;

use super::{runtime_identity, STEP_ENSURE_LOG_BUCKET};

/// 確保日誌 bucket 存在，並授予執行身分寫入權限
pub struct EnsureLogBucket;

#[async_trait::async_trait]
impl ProvisionStep for EnsureLogBucket {
    fn name(&self) -> &str {
        STEP_ENSURE_LOG_BUCKET
    }

    fn should_execute(&self, context: &ProvisionContext) -> bool {
        context.config.log_storage.is_some()
    }

    async fn run(&self, platform: &dyn CloudPlatform, context: &ProvisionContext) -> Result<StepOutcome> {
        let Some(bucket) = context.config.bucket_spec() else {
            return Ok(StepOutcome::new());
        };
        let member = service_account_member(&runtime_identity(context)?);

        let exists = platform.bucket_exists(&bucket).await?;
        let bucket_action = if exists { Action::Unchanged } else { Action::Create };
        if bucket_action.is_mutation() && !context.dry_run {
            tracing::info!("🪣 Creating bucket gs://{} in {}", bucket.name, bucket.location);
            platform.create_bucket(&bucket).await?;
        }

        let current = if !exists && context.dry_run {
            Default::default()
        } else {
            platform.bucket_members(&bucket, BUCKET_WRITER_ROLE).await?
        };
        let grant_action = if missing_members(&current, std::slice::from_ref(&member)).is_empty() {
            Action::Unchanged
        } else {
            Action::Create
        };
        if grant_action.is_mutation() && !context.dry_run {
            tracing::info!("🔑 Granting {} on gs://{} to {}", BUCKET_WRITER_ROLE, bucket.name, member);
            platform
                .grant_bucket_role(&bucket, BUCKET_WRITER_ROLE, &member)
                .await?;
        }

        Ok(StepOutcome::new()
            .with_change(ResourceChange::new("bucket", &bucket.name, bucket_action, context.dry_run))
            .with_change(ResourceChange::new(
                "iam_binding",
                format!("{} {} {}", bucket.name, BUCKET_WRITER_ROLE, member),
                grant_action,
                context.dry_run,
            )))
    }
}
