//! Provisioning steps in their fixed run order.

pub mod image;
pub mod job;
pub mod platform;
pub mod secret;
pub mod storage;

use crate::core::sequence::{ProvisionContext, ProvisionStep};
use crate::domain::model::SecretValue;
use crate::utils::error::{ProvisionError, Result};

pub use image::{BuildImage, EnsureRepository};
pub use job::{EnsureJob, EnsureSchedule, ExecuteJob};
pub use platform::{default_compute_account, EnableApis, ResolveIdentity};
pub use secret::{EnsureSecret, GrantSecretAccess};
pub use storage::EnsureLogBucket;

pub const STEP_ENABLE_APIS: &str = "enable_apis";
pub const STEP_RESOLVE_IDENTITY: &str = "resolve_identity";
pub const STEP_ENSURE_REPOSITORY: &str = "ensure_repository";
pub const STEP_BUILD_IMAGE: &str = "build_image";
pub const STEP_ENSURE_SECRET: &str = "ensure_secret";
pub const STEP_GRANT_SECRET_ACCESS: &str = "grant_secret_access";
pub const STEP_ENSURE_LOG_BUCKET: &str = "ensure_log_bucket";
pub const STEP_ENSURE_JOB: &str = "ensure_job";
pub const STEP_ENSURE_SCHEDULE: &str = "ensure_schedule";
pub const STEP_EXECUTE_JOB: &str = "execute_job";

pub const EXPORT_SERVICE_ACCOUNT: &str = "service_account";
pub const EXPORT_IMAGE: &str = "image";
pub const EXPORT_EXECUTION: &str = "execution";

/// 標準部署順序
pub fn standard_steps(payload: SecretValue) -> Vec<Box<dyn ProvisionStep>> {
    vec![
        Box::new(EnableApis),
        Box::new(ResolveIdentity),
        Box::new(EnsureRepository),
        Box::new(BuildImage),
        Box::new(EnsureSecret::new(payload)),
        Box::new(GrantSecretAccess),
        Box::new(EnsureLogBucket),
        Box::new(EnsureJob),
        Box::new(EnsureSchedule),
        Box::new(ExecuteJob),
    ]
}

fn runtime_identity(context: &ProvisionContext) -> Result<String> {
    context
        .get_shared_str(EXPORT_SERVICE_ACCOUNT)
        .map(str::to_string)
        .ok_or_else(|| ProvisionError::StepFailed {
            step: STEP_RESOLVE_IDENTITY.to_string(),
            details: "runtime identity was not resolved before it was needed".to_string(),
        })
}

/// Whether an earlier step only planned the creation of its resource (dry run).
fn planned_create(context: &ProvisionContext, step: &str) -> bool {
    context.dry_run
        && context.get_result_by_name(step).is_some_and(|result| {
            result
                .changes
                .iter()
                .any(|change| change.action == crate::core::reconcile::Action::Create)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryPlatform;
    use crate::config::{DeployConfig, RawDeployConfig, SecretSourceSpec};
    use crate::core::reconcile::Action;
    use crate::core::sequence::Provisioner;
    use crate::domain::model::SECRET_ACCESSOR_ROLE;
    use std::sync::Arc;

    fn config(raw: RawDeployConfig) -> Arc<DeployConfig> {
        let base = RawDeployConfig {
            project_id: Some("biohack-agent".to_string()),
            secret_source: Some(SecretSourceSpec::Literal(SecretValue::new("mongodb://db"))),
            ..Default::default()
        };
        Arc::new(DeployConfig::from_raw(base.overlay(raw)).unwrap())
    }

    fn platform() -> InMemoryPlatform {
        InMemoryPlatform::new().with_project_number("biohack-agent", "123456789")
    }

    async fn deploy(platform: &InMemoryPlatform, config: Arc<DeployConfig>) -> crate::core::sequence::ProvisionReport {
        Provisioner::new("test".to_string())
            .with_steps(standard_steps(SecretValue::new("mongodb://db")))
            .execute_all(platform, config)
            .await
            .unwrap()
    }

    #[test]
    fn test_standard_step_order() {
        let provisioner = Provisioner::new("order".to_string()).with_steps(standard_steps(SecretValue::new("x")));
        assert_eq!(
            provisioner.step_names(),
            vec![
                STEP_ENABLE_APIS,
                STEP_RESOLVE_IDENTITY,
                STEP_ENSURE_REPOSITORY,
                STEP_BUILD_IMAGE,
                STEP_ENSURE_SECRET,
                STEP_GRANT_SECRET_ACCESS,
                STEP_ENSURE_LOG_BUCKET,
                STEP_ENSURE_JOB,
                STEP_ENSURE_SCHEDULE,
                STEP_EXECUTE_JOB,
            ]
        );
    }

    #[tokio::test]
    async fn test_default_identity_from_project_number() {
        let platform = platform();
        let report = deploy(&platform, config(RawDeployConfig::default())).await;

        let account = default_compute_account("123456789");
        assert_eq!(report.exports.get(EXPORT_SERVICE_ACCOUNT).unwrap(), account.as_str());
        assert!(platform
            .secret_role_members("biohack-agent", "mongo-connection", SECRET_ACCESSOR_ROLE)
            .contains(&format!("serviceAccount:{}", account)));
        let job = platform.job("biohack-agent", "us-central1", "episode-scraper").unwrap();
        assert_eq!(job.service_account.as_deref(), Some(account.as_str()));
    }

    #[tokio::test]
    async fn test_explicit_identity_skips_project_lookup() {
        // No project number registered: the lookup would fail if attempted.
        let platform = InMemoryPlatform::new();
        let report = deploy(
            &platform,
            config(RawDeployConfig {
                service_account: Some("runner@biohack-agent.iam.gserviceaccount.com".to_string()),
                ..Default::default()
            }),
        )
        .await;
        assert_eq!(
            report.exports.get(EXPORT_SERVICE_ACCOUNT).unwrap(),
            "runner@biohack-agent.iam.gserviceaccount.com"
        );
    }

    #[tokio::test]
    async fn test_optional_steps_follow_config() {
        let platform = platform();
        let report = deploy(
            &platform,
            config(RawDeployConfig {
                skip_build: Some(true),
                execute: Some(false),
                ..Default::default()
            }),
        )
        .await;

        let skipped: Vec<&str> = report
            .results
            .iter()
            .filter(|r| r.skipped)
            .map(|r| r.step_name.as_str())
            .collect();
        assert_eq!(skipped, vec![STEP_BUILD_IMAGE, STEP_ENSURE_LOG_BUCKET, STEP_EXECUTE_JOB]);
        assert!(platform.built_images().is_empty());
        assert!(platform.executions().is_empty());
        assert_eq!(platform.bucket_count(), 0);
    }

    #[tokio::test]
    async fn test_schedule_targets_job_run_endpoint() {
        let platform = platform();
        deploy(&platform, config(RawDeployConfig::default())).await;

        let schedule = platform
            .schedule("biohack-agent", "us-central1", "episode-scraper-trigger")
            .unwrap();
        assert!(schedule.target_uri.ends_with("/jobs/episode-scraper:run"));
        assert_eq!(schedule.cron, "0 */6 * * *");
    }

    #[tokio::test]
    async fn test_changed_limits_update_job() {
        let platform = platform();
        deploy(&platform, config(RawDeployConfig::default())).await;
        platform.clear_calls();

        let report = deploy(
            &platform,
            config(RawDeployConfig {
                memory: Some("1Gi".to_string()),
                ..Default::default()
            }),
        )
        .await;

        let job_change = report.changes().find(|c| c.kind == "job").unwrap();
        assert_eq!(job_change.action, Action::Update { changed: vec!["memory"] });
        assert!(platform.calls().contains(&"update_job:episode-scraper".to_string()));
    }
}
