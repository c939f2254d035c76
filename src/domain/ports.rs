use crate::domain::model::{
    BucketSpec, ImageBuild, JobDefinition, RepositorySpec, ScheduleDefinition, SecretSpec,
    SecretState, SecretValue,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Probe and mutate operations against the managed cloud platform.
///
/// Probes return `None`/`false` for absent resources and only fail on real
/// errors. Mutations are expected to be called only after a probe decided
/// they are needed.
#[async_trait]
pub trait CloudPlatform: Send + Sync {
    async fn project_number(&self, project: &str) -> Result<String>;

    async fn enabled_services(&self, project: &str) -> Result<BTreeSet<String>>;
    async fn enable_services(&self, project: &str, services: &[String]) -> Result<()>;

    async fn repository_exists(&self, repo: &RepositorySpec) -> Result<bool>;
    async fn create_repository(&self, repo: &RepositorySpec) -> Result<()>;

    async fn build_image(&self, build: &ImageBuild) -> Result<()>;

    async fn describe_secret(&self, secret: &SecretSpec) -> Result<Option<SecretState>>;
    async fn create_secret(&self, secret: &SecretSpec, payload: &SecretValue) -> Result<()>;
    async fn add_secret_version(&self, secret: &SecretSpec, payload: &SecretValue) -> Result<()>;
    async fn secret_members(&self, secret: &SecretSpec, role: &str) -> Result<BTreeSet<String>>;
    async fn grant_secret_role(&self, secret: &SecretSpec, role: &str, member: &str) -> Result<()>;

    async fn bucket_exists(&self, bucket: &BucketSpec) -> Result<bool>;
    async fn create_bucket(&self, bucket: &BucketSpec) -> Result<()>;
    async fn bucket_members(&self, bucket: &BucketSpec, role: &str) -> Result<BTreeSet<String>>;
    async fn grant_bucket_role(&self, bucket: &BucketSpec, role: &str, member: &str) -> Result<()>;

    async fn describe_job(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Option<JobDefinition>>;
    async fn create_job(&self, job: &JobDefinition) -> Result<()>;
    async fn update_job(&self, job: &JobDefinition) -> Result<()>;

    async fn describe_schedule(
        &self,
        project: &str,
        location: &str,
        name: &str,
    ) -> Result<Option<ScheduleDefinition>>;
    async fn create_schedule(&self, schedule: &ScheduleDefinition) -> Result<()>;
    async fn update_schedule(&self, schedule: &ScheduleDefinition) -> Result<()>;

    /// Starts one execution and returns its name.
    async fn execute_job(&self, project: &str, region: &str, name: &str) -> Result<String>;
}

/// Where the secret payload comes from.
#[async_trait]
pub trait SecretSource: Send + Sync {
    fn kind(&self) -> &str;
    async fn resolve(&self) -> Result<SecretValue>;
}
