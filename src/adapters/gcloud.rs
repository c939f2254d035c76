//! `gcloud`-backed implementation of [`CloudPlatform`].
//!
//! Probes use `describe`/`list` with machine-readable output. A NOT_FOUND
//! style failure on a probe means the resource is absent; every other
//! non-zero exit is surfaced as [`ProvisionError::CommandFailed`].

use crate::adapters::runner::{CommandOutput, CommandRunner, TokioCommandRunner};
use crate::domain::model::{
    BucketSpec, ImageBuild, JobDefinition, LogMount, RepositorySpec, ResourceLimits,
    ScheduleDefinition, SecretEnv, SecretSpec, SecretState, SecretValue,
};
use crate::domain::ports::CloudPlatform;
use crate::utils::error::{ProvisionError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

const GCLOUD: &str = "gcloud";
const GCS_FUSE_DRIVER: &str = "gcsfuse.run.googleapis.com";
const NOT_FOUND_MARKERS: &[&str] = &["NOT_FOUND", "not found", "does not exist", "404"];
const MAP_ARG_DELIMITERS: &[char] = &[',', '@', '|', '#', ';', '~'];

pub struct GcloudPlatform<R: CommandRunner = TokioCommandRunner> {
    runner: R,
}

impl GcloudPlatform<TokioCommandRunner> {
    pub fn new() -> Self {
        Self::with_runner(TokioCommandRunner)
    }
}

impl Default for GcloudPlatform<TokioCommandRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> GcloudPlatform<R> {
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", GCLOUD, args.join(" "))
    }

    async fn run(&self, args: Vec<String>, stdin: Option<&SecretValue>) -> Result<CommandOutput> {
        tracing::debug!("$ {}", self.command_line(&args));
        self.runner.run(GCLOUD, &args, stdin).await
    }

    /// Runs a mutating command; any non-zero exit is an error.
    async fn exec(&self, args: Vec<String>, stdin: Option<&SecretValue>) -> Result<String> {
        let command = self.command_line(&args);
        let output = self.run(args, stdin).await?;
        if !output.success() {
            return Err(ProvisionError::CommandFailed {
                command,
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Runs a read-only command; NOT_FOUND maps to `None`.
    async fn probe(&self, args: Vec<String>) -> Result<Option<String>> {
        let command = self.command_line(&args);
        let output = self.run(args, None).await?;
        if output.success() {
            return Ok(Some(output.stdout));
        }
        if is_not_found(&output.stderr) {
            return Ok(None);
        }
        Err(ProvisionError::CommandFailed {
            command,
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        })
    }

    async fn policy_members(&self, args: Vec<String>, resource: &str, role: &str) -> Result<BTreeSet<String>> {
        let stdout = self.exec(args, None).await?;
        parse_policy_members(&stdout, resource, role)
    }
}

fn is_not_found(stderr: &str) -> bool {
    NOT_FOUND_MARKERS.iter().any(|marker| stderr.contains(marker))
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn non_empty_lines(stdout: &str) -> impl Iterator<Item = &str> {
    stdout.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// Encodes `K=V` pairs for flags like `--set-env-vars`, switching to gcloud's
/// `^D^` alternate-delimiter syntax when a value contains a comma.
pub fn encode_map_arg<'a>(pairs: impl IntoIterator<Item = (&'a String, &'a String)>) -> String {
    let entries: Vec<String> = pairs.into_iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    let delimiter = MAP_ARG_DELIMITERS
        .iter()
        .copied()
        .find(|d| !entries.iter().any(|entry| entry.contains(*d)))
        .unwrap_or(',');
    if delimiter == ',' {
        entries.join(",")
    } else {
        format!("^{}^{}", delimiter, entries.join(&delimiter.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobVerb {
    Create,
    Update,
}

/// Full argument list for `run jobs create|update`. Limits, env vars and the
/// secret binding always travel together in one call.
fn job_args(verb: JobVerb, job: &JobDefinition) -> Vec<String> {
    let mut out = args([
        "run",
        "jobs",
        match verb {
            JobVerb::Create => "create",
            JobVerb::Update => "update",
        },
        &job.name,
        "--project",
        &job.project,
        "--region",
        &job.region,
    ]);
    out.push(format!("--image={}", job.image));
    out.push(format!("--cpu={}", job.limits.cpu));
    out.push(format!("--memory={}", job.limits.memory));
    out.push(format!("--max-retries={}", job.max_retries));
    out.push(format!("--task-timeout={}s", job.task_timeout_secs));
    if let Some(account) = &job.service_account {
        out.push(format!("--service-account={}", account));
    }

    if job.env.is_empty() {
        if verb == JobVerb::Update {
            out.push("--clear-env-vars".to_string());
        }
    } else {
        out.push(format!("--set-env-vars={}", encode_map_arg(&job.env)));
    }

    if !job.secret_env.is_empty() {
        let secrets: BTreeMap<String, String> = job
            .secret_env
            .iter()
            .map(|entry| (entry.env_var.clone(), format!("{}:{}", entry.secret, entry.version)))
            .collect();
        out.push(format!("--set-secrets={}", encode_map_arg(&secrets)));
    }

    // Mounts are replaced wholesale: drop whatever is configured, then add.
    if verb == JobVerb::Update {
        out.push("--clear-volume-mounts".to_string());
        out.push("--clear-volumes".to_string());
    }
    for mount in &job.mounts {
        out.push(format!(
            "--add-volume=name={},type=cloud-storage,bucket={}",
            mount.volume, mount.bucket
        ));
        out.push(format!(
            "--add-volume-mount=volume={},mount-path={}",
            mount.volume, mount.mount_path
        ));
    }
    out
}

fn schedule_args(verb: JobVerb, schedule: &ScheduleDefinition) -> Vec<String> {
    let mut out = args([
        "scheduler",
        "jobs",
        match verb {
            JobVerb::Create => "create",
            JobVerb::Update => "update",
        },
        "http",
        &schedule.name,
        "--project",
        &schedule.project,
        "--location",
        &schedule.location,
    ]);
    out.push(format!("--schedule={}", schedule.cron));
    out.push(format!("--time-zone={}", schedule.timezone));
    out.push(format!("--uri={}", schedule.target_uri));
    out.push("--http-method=POST".to_string());
    out.push(format!(
        "--oauth-service-account-email={}",
        schedule.service_account
    ));
    out
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IamPolicy {
    bindings: Vec<IamBinding>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IamBinding {
    role: String,
    members: Vec<String>,
}

fn parse_policy_members(json: &str, resource: &str, role: &str) -> Result<BTreeSet<String>> {
    if json.trim().is_empty() {
        return Ok(BTreeSet::new());
    }
    let policy: IamPolicy =
        serde_json::from_str(json).map_err(|e| ProvisionError::PlatformResponseError {
            resource: resource.to_string(),
            message: format!("invalid IAM policy JSON: {}", e),
        })?;
    Ok(policy
        .bindings
        .into_iter()
        .filter(|binding| binding.role == role)
        .flat_map(|binding| binding.members)
        .collect())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RunJob {
    spec: RunJobSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunJobSpec {
    template: ExecutionTemplate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExecutionTemplate {
    spec: ExecutionSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExecutionSpec {
    template: TaskTemplate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TaskTemplate {
    spec: TaskSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TaskSpec {
    containers: Vec<Container>,
    max_retries: Option<u32>,
    service_account_name: Option<String>,
    timeout_seconds: Option<serde_json::Value>,
    volumes: Vec<Volume>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Container {
    image: String,
    env: Vec<EnvVar>,
    resources: Resources,
    volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EnvVar {
    name: String,
    value: Option<String>,
    value_from: Option<EnvSource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EnvSource {
    secret_key_ref: Option<SecretKeyRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SecretKeyRef {
    name: String,
    key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Resources {
    limits: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VolumeMount {
    name: String,
    mount_path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Volume {
    name: String,
    csi: Option<CsiSource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CsiSource {
    driver: String,
    volume_attributes: BTreeMap<String, String>,
}

fn parse_timeout(value: Option<&serde_json::Value>) -> u64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim_end_matches('s').parse().unwrap_or(0),
        _ => 0,
    }
}

/// Maps `gcloud run jobs describe --format=json` onto a [`JobDefinition`].
fn parse_job_json(json: &str, project: &str, region: &str, name: &str) -> Result<JobDefinition> {
    let job: RunJob = serde_json::from_str(json).map_err(|e| ProvisionError::PlatformResponseError {
        resource: format!("job {}", name),
        message: e.to_string(),
    })?;
    let task = job.spec.template.spec.template.spec;
    let container = task.containers.into_iter().next().unwrap_or_default();

    let mut env = BTreeMap::new();
    let mut secret_env = Vec::new();
    for var in container.env {
        match (var.value, var.value_from.and_then(|from| from.secret_key_ref)) {
            (_, Some(secret)) => secret_env.push(SecretEnv {
                env_var: var.name,
                secret: secret.name,
                version: secret.key,
            }),
            (value, None) => {
                env.insert(var.name, value.unwrap_or_default());
            }
        }
    }

    let buckets: BTreeMap<String, String> = task
        .volumes
        .into_iter()
        .filter_map(|volume| {
            let csi = volume.csi?;
            if csi.driver != GCS_FUSE_DRIVER {
                return None;
            }
            let bucket = csi.volume_attributes.get("bucketName")?.clone();
            Some((volume.name, bucket))
        })
        .collect();

    let mounts = container
        .volume_mounts
        .into_iter()
        .filter_map(|mount| {
            buckets.get(&mount.name).map(|bucket| LogMount {
                volume: mount.name.clone(),
                bucket: bucket.clone(),
                mount_path: mount.mount_path,
            })
        })
        .collect();

    Ok(JobDefinition {
        project: project.to_string(),
        region: region.to_string(),
        name: name.to_string(),
        image: container.image,
        limits: ResourceLimits {
            cpu: container.resources.limits.get("cpu").cloned().unwrap_or_default(),
            memory: container
                .resources
                .limits
                .get("memory")
                .cloned()
                .unwrap_or_default(),
        },
        env,
        secret_env,
        service_account: task.service_account_name,
        max_retries: task.max_retries.unwrap_or(0),
        task_timeout_secs: parse_timeout(task.timeout_seconds.as_ref()),
        mounts,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SchedulerJob {
    schedule: String,
    time_zone: String,
    http_target: HttpTarget,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct HttpTarget {
    uri: String,
    oauth_token: OauthToken,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OauthToken {
    service_account_email: String,
}

fn parse_schedule_json(
    json: &str,
    project: &str,
    location: &str,
    name: &str,
) -> Result<ScheduleDefinition> {
    let job: SchedulerJob =
        serde_json::from_str(json).map_err(|e| ProvisionError::PlatformResponseError {
            resource: format!("scheduler job {}", name),
            message: e.to_string(),
        })?;
    Ok(ScheduleDefinition {
        project: project.to_string(),
        location: location.to_string(),
        name: name.to_string(),
        cron: job.schedule,
        timezone: job.time_zone,
        target_uri: job.http_target.uri,
        service_account: job.http_target.oauth_token.service_account_email,
    })
}

#[async_trait]
impl<R: CommandRunner> CloudPlatform for GcloudPlatform<R> {
    async fn project_number(&self, project: &str) -> Result<String> {
        let stdout = self
            .exec(
                args(["projects", "describe", project, "--format=value(projectNumber)"]),
                None,
            )
            .await?;
        let number = stdout.trim().to_string();
        if number.is_empty() {
            return Err(ProvisionError::PlatformResponseError {
                resource: format!("project {}", project),
                message: "empty project number".to_string(),
            });
        }
        Ok(number)
    }

    async fn enabled_services(&self, project: &str) -> Result<BTreeSet<String>> {
        let stdout = self
            .exec(
                args([
                    "services",
                    "list",
                    "--enabled",
                    "--project",
                    project,
                    "--format=value(config.name)",
                ]),
                None,
            )
            .await?;
        Ok(non_empty_lines(&stdout).map(str::to_string).collect())
    }

    async fn enable_services(&self, project: &str, services: &[String]) -> Result<()> {
        let mut command = args(["services", "enable"]);
        command.extend(services.iter().cloned());
        command.extend(args(["--project", project]));
        self.exec(command, None).await.map(|_| ())
    }

    async fn repository_exists(&self, repo: &RepositorySpec) -> Result<bool> {
        let found = self
            .probe(args([
                "artifacts",
                "repositories",
                "describe",
                &repo.name,
                "--project",
                &repo.project,
                "--location",
                &repo.location,
                "--format=value(name)",
            ]))
            .await?;
        Ok(found.is_some())
    }

    async fn create_repository(&self, repo: &RepositorySpec) -> Result<()> {
        self.exec(
            args([
                "artifacts",
                "repositories",
                "create",
                &repo.name,
                "--project",
                &repo.project,
                "--location",
                &repo.location,
                "--repository-format=docker",
            ]),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn build_image(&self, build: &ImageBuild) -> Result<()> {
        let context = build.context_dir.to_string_lossy().into_owned();
        self.exec(
            args([
                "builds",
                "submit",
                &context,
                "--project",
                &build.project,
                "--tag",
                &build.image,
            ]),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn describe_secret(&self, secret: &SecretSpec) -> Result<Option<SecretState>> {
        let exists = self
            .probe(args([
                "secrets",
                "describe",
                &secret.name,
                "--project",
                &secret.project,
                "--format=value(name)",
            ]))
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let versions = self
            .exec(
                args([
                    "secrets",
                    "versions",
                    "list",
                    &secret.name,
                    "--project",
                    &secret.project,
                    "--filter=state:ENABLED",
                    "--sort-by=~createTime",
                    "--format=value(name)",
                ]),
                None,
            )
            .await?;
        let enabled: Vec<&str> = non_empty_lines(&versions)
            .map(|name| name.rsplit('/').next().unwrap_or(name))
            .collect();
        let version_count = enabled.len();

        // `latest` fails when the newest version is disabled, so the newest
        // enabled version is read by id. The payload is never logged.
        let latest = match enabled.first() {
            None => None,
            Some(version) => self
                .probe(args([
                    "secrets",
                    "versions",
                    "access",
                    version,
                    "--secret",
                    &secret.name,
                    "--project",
                    &secret.project,
                ]))
                .await?
                .map(SecretValue::new),
        };

        Ok(Some(SecretState {
            version_count,
            latest,
        }))
    }

    async fn create_secret(&self, secret: &SecretSpec, payload: &SecretValue) -> Result<()> {
        self.exec(
            args([
                "secrets",
                "create",
                &secret.name,
                "--project",
                &secret.project,
                "--replication-policy=automatic",
                "--data-file=-",
            ]),
            Some(payload),
        )
        .await
        .map(|_| ())
    }

    async fn add_secret_version(&self, secret: &SecretSpec, payload: &SecretValue) -> Result<()> {
        self.exec(
            args([
                "secrets",
                "versions",
                "add",
                &secret.name,
                "--project",
                &secret.project,
                "--data-file=-",
            ]),
            Some(payload),
        )
        .await
        .map(|_| ())
    }

    async fn secret_members(&self, secret: &SecretSpec, role: &str) -> Result<BTreeSet<String>> {
        self.policy_members(
            args([
                "secrets",
                "get-iam-policy",
                &secret.name,
                "--project",
                &secret.project,
                "--format=json",
            ]),
            &format!("secret {}", secret.name),
            role,
        )
        .await
    }

    async fn grant_secret_role(&self, secret: &SecretSpec, role: &str, member: &str) -> Result<()> {
        self.exec(
            vec![
                "secrets".to_string(),
                "add-iam-policy-binding".to_string(),
                secret.name.clone(),
                "--project".to_string(),
                secret.project.clone(),
                format!("--member={}", member),
                format!("--role={}", role),
            ],
            None,
        )
        .await
        .map(|_| ())
    }

    async fn bucket_exists(&self, bucket: &BucketSpec) -> Result<bool> {
        let url = format!("gs://{}", bucket.name);
        let found = self
            .probe(args([
                "storage",
                "buckets",
                "describe",
                &url,
                "--project",
                &bucket.project,
                "--format=value(name)",
            ]))
            .await?;
        Ok(found.is_some())
    }

    async fn create_bucket(&self, bucket: &BucketSpec) -> Result<()> {
        let url = format!("gs://{}", bucket.name);
        self.exec(
            args([
                "storage",
                "buckets",
                "create",
                &url,
                "--project",
                &bucket.project,
                "--location",
                &bucket.location,
                "--uniform-bucket-level-access",
            ]),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn bucket_members(&self, bucket: &BucketSpec, role: &str) -> Result<BTreeSet<String>> {
        let url = format!("gs://{}", bucket.name);
        self.policy_members(
            args([
                "storage",
                "buckets",
                "get-iam-policy",
                &url,
                "--project",
                &bucket.project,
                "--format=json",
            ]),
            &format!("bucket {}", bucket.name),
            role,
        )
        .await
    }

    async fn grant_bucket_role(&self, bucket: &BucketSpec, role: &str, member: &str) -> Result<()> {
        self.exec(
            vec![
                "storage".to_string(),
                "buckets".to_string(),
                "add-iam-policy-binding".to_string(),
                format!("gs://{}", bucket.name),
                "--project".to_string(),
                bucket.project.clone(),
                format!("--member={}", member),
                format!("--role={}", role),
            ],
            None,
        )
        .await
        .map(|_| ())
    }

    async fn describe_job(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Option<JobDefinition>> {
        let json = self
            .probe(args([
                "run",
                "jobs",
                "describe",
                name,
                "--project",
                project,
                "--region",
                region,
                "--format=json",
            ]))
            .await?;
        json.map(|json| parse_job_json(&json, project, region, name))
            .transpose()
    }

    async fn create_job(&self, job: &JobDefinition) -> Result<()> {
        self.exec(job_args(JobVerb::Create, job), None).await.map(|_| ())
    }

    async fn update_job(&self, job: &JobDefinition) -> Result<()> {
        self.exec(job_args(JobVerb::Update, job), None).await.map(|_| ())
    }

    async fn describe_schedule(
        &self,
        project: &str,
        location: &str,
        name: &str,
    ) -> Result<Option<ScheduleDefinition>> {
        let json = self
            .probe(args([
                "scheduler",
                "jobs",
                "describe",
                name,
                "--project",
                project,
                "--location",
                location,
                "--format=json",
            ]))
            .await?;
        json.map(|json| parse_schedule_json(&json, project, location, name))
            .transpose()
    }

    async fn create_schedule(&self, schedule: &ScheduleDefinition) -> Result<()> {
        self.exec(schedule_args(JobVerb::Create, schedule), None)
            .await
            .map(|_| ())
    }

    async fn update_schedule(&self, schedule: &ScheduleDefinition) -> Result<()> {
        self.exec(schedule_args(JobVerb::Update, schedule), None)
            .await
            .map(|_| ())
    }

    async fn execute_job(&self, project: &str, region: &str, name: &str) -> Result<String> {
        let stdout = self
            .exec(
                args([
                    "run",
                    "jobs",
                    "execute",
                    name,
                    "--project",
                    project,
                    "--region",
                    region,
                    "--async",
                    "--format=value(metadata.name)",
                ]),
                None,
            )
            .await?;
        Ok(stdout.trim().to_string())
    }
}
