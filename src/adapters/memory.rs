//! In-process [`CloudPlatform`] used by the test suites.
//!
//! Keeps the same observable state a real project would: secret versions
//! accumulate, IAM bindings are sets, job mounts are replaced on update.
//! Every mutating call is appended to a call log so tests can assert that a
//! repeated run made no changes.

use crate::domain::model::{
    BucketSpec, ImageBuild, JobDefinition, RepositorySpec, ScheduleDefinition, SecretSpec,
    SecretState, SecretValue,
};
use crate::domain::ports::CloudPlatform;
use crate::utils::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct PlatformState {
    project_numbers: BTreeMap<String, String>,
    enabled_services: BTreeMap<String, BTreeSet<String>>,
    repositories: BTreeSet<(String, String, String)>,
    images: Vec<String>,
    secrets: BTreeMap<(String, String), Vec<SecretValue>>,
    secret_iam: BTreeMap<(String, String, String), BTreeSet<String>>,
    buckets: BTreeSet<(String, String)>,
    bucket_iam: BTreeMap<(String, String, String), BTreeSet<String>>,
    jobs: BTreeMap<(String, String, String), JobDefinition>,
    schedules: BTreeMap<(String, String, String), ScheduleDefinition>,
    executions: Vec<String>,
    calls: Vec<String>,
    fail_on: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project_number(self, project: &str, number: &str) -> Self {
        self.lock()
            .project_numbers
            .insert(project.to_string(), number.to_string());
        self
    }

    /// Makes the named operation (e.g. `create_job`) fail with a command error.
    pub fn fail_on(&self, operation: &str) {
        self.lock().fail_on.insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().fail_on.clear();
    }

    /// Mutating operations in call order, e.g. `create_secret:mongo-connection`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn secret_versions(&self, project: &str, name: &str) -> usize {
        self.lock()
            .secrets
            .get(&(project.to_string(), name.to_string()))
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn latest_secret(&self, project: &str, name: &str) -> Option<SecretValue> {
        self.lock()
            .secrets
            .get(&(project.to_string(), name.to_string()))
            .and_then(|versions| versions.last().cloned())
    }

    pub fn secret_role_members(&self, project: &str, name: &str, role: &str) -> BTreeSet<String> {
        self.lock()
            .secret_iam
            .get(&(project.to_string(), name.to_string(), role.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn bucket_role_members(&self, bucket: &str, role: &str) -> BTreeSet<String> {
        let state = self.lock();
        state
            .bucket_iam
            .iter()
            .filter(|((_, name, r), _)| name == bucket && r == role)
            .flat_map(|(_, members)| members.iter().cloned())
            .collect()
    }

    pub fn job(&self, project: &str, region: &str, name: &str) -> Option<JobDefinition> {
        self.lock()
            .jobs
            .get(&(project.to_string(), region.to_string(), name.to_string()))
            .cloned()
    }

    pub fn insert_job(&self, job: JobDefinition) {
        self.lock().jobs.insert(
            (job.project.clone(), job.region.clone(), job.name.clone()),
            job,
        );
    }

    pub fn schedule(&self, project: &str, location: &str, name: &str) -> Option<ScheduleDefinition> {
        self.lock()
            .schedules
            .get(&(project.to_string(), location.to_string(), name.to_string()))
            .cloned()
    }

    pub fn job_count(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn repository_count(&self) -> usize {
        self.lock().repositories.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.lock().buckets.len()
    }

    pub fn enabled(&self, project: &str) -> BTreeSet<String> {
        self.lock()
            .enabled_services
            .get(project)
            .cloned()
            .unwrap_or_default()
    }

    pub fn built_images(&self) -> Vec<String> {
        self.lock().images.clone()
    }

    pub fn executions(&self) -> Vec<String> {
        self.lock().executions.clone()
    }

    fn lock(&self) -> MutexGuard<'_, PlatformState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a mutating call, failing first if it was marked with [`fail_on`](Self::fail_on).
    fn record(&self, state: &mut PlatformState, operation: &str, target: &str) -> Result<()> {
        if state.fail_on.contains(operation) {
            return Err(ProvisionError::CommandFailed {
                command: format!("{} {}", operation, target),
                status: Some(1),
                stderr: "injected failure".to_string(),
            });
        }
        state.calls.push(format!("{}:{}", operation, target));
        Ok(())
    }

    fn check_probe(&self, state: &PlatformState, operation: &str, target: &str) -> Result<()> {
        if state.fail_on.contains(operation) {
            return Err(ProvisionError::CommandFailed {
                command: format!("{} {}", operation, target),
                status: Some(1),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CloudPlatform for InMemoryPlatform {
    async fn project_number(&self, project: &str) -> Result<String> {
        let state = self.lock();
        self.check_probe(&state, "project_number", project)?;
        state
            .project_numbers
            .get(project)
            .cloned()
            .ok_or_else(|| ProvisionError::CommandFailed {
                command: format!("projects describe {}", project),
                status: Some(1),
                stderr: format!("NOT_FOUND: project {} does not exist", project),
            })
    }

    async fn enabled_services(&self, project: &str) -> Result<BTreeSet<String>> {
        let state = self.lock();
        self.check_probe(&state, "enabled_services", project)?;
        Ok(state
            .enabled_services
            .get(project)
            .cloned()
            .unwrap_or_default())
    }

    async fn enable_services(&self, project: &str, services: &[String]) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "enable_services", &services.join(","))?;
        state
            .enabled_services
            .entry(project.to_string())
            .or_default()
            .extend(services.iter().cloned());
        Ok(())
    }

    async fn repository_exists(&self, repo: &RepositorySpec) -> Result<bool> {
        let state = self.lock();
        self.check_probe(&state, "repository_exists", &repo.name)?;
        Ok(state.repositories.contains(&(
            repo.project.clone(),
            repo.location.clone(),
            repo.name.clone(),
        )))
    }

    async fn create_repository(&self, repo: &RepositorySpec) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "create_repository", &repo.name)?;
        let key = (repo.project.clone(), repo.location.clone(), repo.name.clone());
        if !state.repositories.insert(key) {
            return Err(ProvisionError::CommandFailed {
                command: format!("artifacts repositories create {}", repo.name),
                status: Some(1),
                stderr: "ALREADY_EXISTS".to_string(),
            });
        }
        Ok(())
    }

    async fn build_image(&self, build: &ImageBuild) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "build_image", &build.image)?;
        state.images.push(build.image.clone());
        Ok(())
    }

    async fn describe_secret(&self, secret: &SecretSpec) -> Result<Option<SecretState>> {
        let state = self.lock();
        self.check_probe(&state, "describe_secret", &secret.name)?;
        Ok(state
            .secrets
            .get(&(secret.project.clone(), secret.name.clone()))
            .map(|versions| SecretState {
                version_count: versions.len(),
                latest: versions.last().cloned(),
            }))
    }

    async fn create_secret(&self, secret: &SecretSpec, payload: &SecretValue) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "create_secret", &secret.name)?;
        let key = (secret.project.clone(), secret.name.clone());
        if state.secrets.contains_key(&key) {
            return Err(ProvisionError::CommandFailed {
                command: format!("secrets create {}", secret.name),
                status: Some(1),
                stderr: "ALREADY_EXISTS".to_string(),
            });
        }
        state.secrets.insert(key, vec![payload.clone()]);
        Ok(())
    }

    async fn add_secret_version(&self, secret: &SecretSpec, payload: &SecretValue) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "add_secret_version", &secret.name)?;
        match state
            .secrets
            .get_mut(&(secret.project.clone(), secret.name.clone()))
        {
            Some(versions) => {
                versions.push(payload.clone());
                Ok(())
            }
            None => Err(ProvisionError::CommandFailed {
                command: format!("secrets versions add {}", secret.name),
                status: Some(1),
                stderr: "NOT_FOUND".to_string(),
            }),
        }
    }

    async fn secret_members(&self, secret: &SecretSpec, role: &str) -> Result<BTreeSet<String>> {
        let state = self.lock();
        self.check_probe(&state, "secret_members", &secret.name)?;
        Ok(state
            .secret_iam
            .get(&(secret.project.clone(), secret.name.clone(), role.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn grant_secret_role(&self, secret: &SecretSpec, role: &str, member: &str) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "grant_secret_role", &format!("{}:{}", secret.name, member))?;
        state
            .secret_iam
            .entry((secret.project.clone(), secret.name.clone(), role.to_string()))
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &BucketSpec) -> Result<bool> {
        let state = self.lock();
        self.check_probe(&state, "bucket_exists", &bucket.name)?;
        Ok(state
            .buckets
            .contains(&(bucket.project.clone(), bucket.name.clone())))
    }

    async fn create_bucket(&self, bucket: &BucketSpec) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "create_bucket", &bucket.name)?;
        state
            .buckets
            .insert((bucket.project.clone(), bucket.name.clone()));
        Ok(())
    }

    async fn bucket_members(&self, bucket: &BucketSpec, role: &str) -> Result<BTreeSet<String>> {
        let state = self.lock();
        self.check_probe(&state, "bucket_members", &bucket.name)?;
        Ok(state
            .bucket_iam
            .get(&(bucket.project.clone(), bucket.name.clone(), role.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn grant_bucket_role(&self, bucket: &BucketSpec, role: &str, member: &str) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "grant_bucket_role", &format!("{}:{}", bucket.name, member))?;
        state
            .bucket_iam
            .entry((bucket.project.clone(), bucket.name.clone(), role.to_string()))
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn describe_job(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Option<JobDefinition>> {
        let state = self.lock();
        self.check_probe(&state, "describe_job", name)?;
        Ok(state
            .jobs
            .get(&(project.to_string(), region.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_job(&self, job: &JobDefinition) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "create_job", &job.name)?;
        let key = (job.project.clone(), job.region.clone(), job.name.clone());
        if state.jobs.contains_key(&key) {
            return Err(ProvisionError::CommandFailed {
                command: format!("run jobs create {}", job.name),
                status: Some(1),
                stderr: "ALREADY_EXISTS".to_string(),
            });
        }
        state.jobs.insert(key, job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &JobDefinition) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "update_job", &job.name)?;
        let key = (job.project.clone(), job.region.clone(), job.name.clone());
        match state.jobs.get_mut(&key) {
            Some(current) => {
                // Mounts and volumes are replaced as a whole, never merged.
                *current = job.clone();
                Ok(())
            }
            None => Err(ProvisionError::CommandFailed {
                command: format!("run jobs update {}", job.name),
                status: Some(1),
                stderr: "NOT_FOUND".to_string(),
            }),
        }
    }

    async fn describe_schedule(
        &self,
        project: &str,
        location: &str,
        name: &str,
    ) -> Result<Option<ScheduleDefinition>> {
        let state = self.lock();
        self.check_probe(&state, "describe_schedule", name)?;
        Ok(state
            .schedules
            .get(&(project.to_string(), location.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_schedule(&self, schedule: &ScheduleDefinition) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "create_schedule", &schedule.name)?;
        state.schedules.insert(
            (
                schedule.project.clone(),
                schedule.location.clone(),
                schedule.name.clone(),
            ),
            schedule.clone(),
        );
        Ok(())
    }

    async fn update_schedule(&self, schedule: &ScheduleDefinition) -> Result<()> {
        let mut state = self.lock();
        self.record(&mut state, "update_schedule", &schedule.name)?;
        state.schedules.insert(
            (
                schedule.project.clone(),
                schedule.location.clone(),
                schedule.name.clone(),
            ),
            schedule.clone(),
        );
        Ok(())
    }

    async fn execute_job(&self, project: &str, region: &str, name: &str) -> Result<String> {
        let mut state = self.lock();
        self.record(&mut state, "execute_job", name)?;
        if !state
            .jobs
            .contains_key(&(project.to_string(), region.to_string(), name.to_string()))
        {
            return Err(ProvisionError::CommandFailed {
                command: format!("run jobs execute {}", name),
                status: Some(1),
                stderr: "NOT_FOUND".to_string(),
            });
        }
        let execution = format!("{}-{:05}", name, state.executions.len() + 1);
        state.executions.push(execution.clone());
        Ok(execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretSpec {
        SecretSpec {
            project: "biohack-agent".to_string(),
            name: "mongo-connection".to_string(),
        }
    }

    #[tokio::test]
    async fn test_secret_versions_accumulate() {
        let platform = InMemoryPlatform::new();
        assert!(platform.describe_secret(&secret()).await.unwrap().is_none());

        platform
            .create_secret(&secret(), &SecretValue::new("v1"))
            .await
            .unwrap();
        platform
            .add_secret_version(&secret(), &SecretValue::new("v2"))
            .await
            .unwrap();

        let state = platform.describe_secret(&secret()).await.unwrap().unwrap();
        assert_eq!(state.version_count, 2);
        assert_eq!(state.latest, Some(SecretValue::new("v2")));
        assert_eq!(
            platform.calls(),
            vec![
                "create_secret:mongo-connection".to_string(),
                "add_secret_version:mongo-connection".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_iam_grants_are_sets() {
        let platform = InMemoryPlatform::new();
        let role = "roles/secretmanager.secretAccessor";
        let member = "serviceAccount:runner@x.iam.gserviceaccount.com";
        platform.grant_secret_role(&secret(), role, member).await.unwrap();
        platform.grant_secret_role(&secret(), role, member).await.unwrap();
        assert_eq!(
            platform
                .secret_role_members("biohack-agent", "mongo-connection", role)
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let platform = InMemoryPlatform::new();
        platform.fail_on("create_secret");
        let err = platform
            .create_secret(&secret(), &SecretValue::new("v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::CommandFailed { .. }));
        assert_eq!(platform.secret_versions("biohack-agent", "mongo-connection"), 0);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_execute_requires_job() {
        let platform = InMemoryPlatform::new();
        assert!(platform
            .execute_job("biohack-agent", "us-central1", "episode-scraper")
            .await
            .is_err());
    }
}
