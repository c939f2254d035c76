use crate::core::reconcile::{missing_members, plan_secret, Action};
use crate::core::sequence::{ProvisionContext, ProvisionStep, ResourceChange, StepOutcome};
use crate::domain::model::{service_account_member, SecretValue, SECRET_ACCESSOR_ROLE};
use crate::domain::ports::CloudPlatform;
use crate::utils::error::Result;

use super::{planned_create, runtime_identity, STEP_ENSURE_SECRET, STEP_GRANT_SECRET_ACCESS};

/// 建立或輪替連線字串秘密
///
/// A differing payload adds a version; an identical one writes nothing.
pub struct EnsureSecret {
    payload: SecretValue,
}

impl EnsureSecret {
    pub fn new(payload: SecretValue) -> Self {
        Self { payload }
    }
}

#[async_trait::async_trait]
impl ProvisionStep for EnsureSecret {
    fn name(&self) -> &str {
        STEP_ENSURE_SECRET
    }

    async fn run(&self, platform: &dyn CloudPlatform, context: &ProvisionContext) -> Result<StepOutcome> {
        let secret = context.config.secret_spec();
        let current = platform.describe_secret(&secret).await?;
        let action = plan_secret(current.as_ref(), &self.payload);

        if !context.dry_run {
            match &action {
                Action::Create => {
                    tracing::info!("🔐 Creating secret {}", secret.name);
                    platform.create_secret(&secret, &self.payload).await?;
                }
                Action::Update { .. } => {
                    tracing::info!(
                        "🔐 Adding version {} to secret {}",
                        current.as_ref().map(|s| s.version_count + 1).unwrap_or(1),
                        secret.name
                    );
                    platform.add_secret_version(&secret, &self.payload).await?;
                }
                Action::Unchanged => {
                    tracing::debug!("🔐 Secret {} already holds this payload", secret.name);
                }
            }
        }

        Ok(StepOutcome::new().with_change(ResourceChange::new(
            "secret",
            &secret.name,
            action,
            context.dry_run,
        )))
    }
}

/// Grants the runtime identity read access to the secret.
pub struct GrantSecretAccess;

#[async_trait::async_trait]
impl ProvisionStep for GrantSecretAccess {
    fn name(&self) -> &str {
        STEP_GRANT_SECRET_ACCESS
    }

    async fn run(&self, platform: &dyn CloudPlatform, context: &ProvisionContext) -> Result<StepOutcome> {
        let secret = context.config.secret_spec();
        let member = service_account_member(&runtime_identity(context)?);

        // A secret that is only planned has no policy to probe yet.
        let current = if planned_create(context, STEP_ENSURE_SECRET) {
            Default::default()
        } else {
            platform.secret_members(&secret, SECRET_ACCESSOR_ROLE).await?
        };

        let action = if missing_members(&current, std::slice::from_ref(&member)).is_empty() {
            Action::Unchanged
        } else {
            Action::Create
        };

        if action.is_mutation() && !context.dry_run {
            tracing::info!("🔑 Granting {} on {} to {}", SECRET_ACCESSOR_ROLE, secret.name, member);
            platform
                .grant_secret_role(&secret, SECRET_ACCESSOR_ROLE, &member)
                .await?;
        }

        Ok(StepOutcome::new().with_change(ResourceChange::new(
            "iam_binding",
            format!("{} {} {}", secret.name, SECRET_ACCESSOR_ROLE, member),
            action,
            context.dry_run,
        )))
    }
}
