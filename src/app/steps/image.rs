use crate::core::reconcile::Action;
use crate::core::sequence::{ProvisionContext, ProvisionStep, ResourceChange, StepOutcome};
use crate::domain::ports::CloudPlatform;
use crate::utils::error::Result;

use super::{EXPORT_IMAGE, STEP_BUILD_IMAGE, STEP_ENSURE_REPOSITORY};

/// 確保 Artifact Registry Docker 倉庫存在
pub struct EnsureRepository;

#[async_trait::async_trait]
impl ProvisionStep for EnsureRepository {
    fn name(&self) -> &str {
        STEP_ENSURE_REPOSITORY
    }

    async fn run(&self, platform: &dyn CloudPlatform, context: &ProvisionContext) -> Result<StepOutcome> {
        let repo = context.config.repository_spec();
        let action = if platform.repository_exists(&repo).await? {
            Action::Unchanged
        } else {
            Action::Create
        };

        if action.is_mutation() && !context.dry_run {
            tracing::info!("📦 Creating repository {} in {}", repo.name, repo.location);
            platform.create_repository(&repo).await?;
        }

        Ok(StepOutcome::new().with_change(ResourceChange::new(
            "repository",
            &repo.name,
            action,
            context.dry_run,
        )))
    }
}

/// Builds and pushes the image through Cloud Build. The tag is fixed, so a
/// rebuild overwrites the previous push instead of adding a new resource.
pub struct BuildImage;

#[async_trait::async_trait]
impl ProvisionStep for BuildImage {
    fn name(&self) -> &str {
        STEP_BUILD_IMAGE
    }

    fn should_execute(&self, context: &ProvisionContext) -> bool {
        !context.config.skip_build
    }

    async fn run(&self, platform: &dyn CloudPlatform, context: &ProvisionContext) -> Result<StepOutcome> {
        let build = context.config.image_build();
        if context.dry_run {
            tracing::info!("📝 Would build {} from {}", build.image, build.context_dir.display());
        } else {
            tracing::info!("🏗️ Building {} from {}", build.image, build.context_dir.display());
            platform.build_image(&build).await?;
        }
        Ok(StepOutcome::new().export(EXPORT_IMAGE, serde_json::Value::String(build.image)))
    }
}
