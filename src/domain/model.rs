use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Volume name used for the Cloud Storage log mount.
pub const LOG_VOLUME_NAME: &str = "logs";

pub const SECRET_ACCESSOR_ROLE: &str = "roles/secretmanager.secretAccessor";
pub const BUCKET_WRITER_ROLE: &str = "roles/storage.objectAdmin";

/// Secret payload. Has no `Display`; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

impl FromStr for SecretValue {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// IAM member string for a service account.
pub fn service_account_member(email: &str) -> String {
    format!("serviceAccount:{}", email)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySpec {
    pub project: String,
    pub location: String,
    pub name: String,
}

impl RepositorySpec {
    pub fn registry_host(&self) -> String {
        format!("{}-docker.pkg.dev", self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuild {
    pub project: String,
    pub context_dir: PathBuf,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSpec {
    pub project: String,
    pub name: String,
}

/// What a probe learns about an existing secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretState {
    pub version_count: usize,
    pub latest: Option<SecretValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub project: String,
    pub location: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMount {
    pub volume: String,
    pub bucket: String,
    pub mount_path: String,
}

/// Environment entry backed by a Secret Manager version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEnv {
    pub env_var: String,
    pub secret: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    pub cpu: String,
    pub memory: String,
}

/// Desired (or probed) Cloud Run job definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    pub project: String,
    pub region: String,
    pub name: String,
    pub image: String,
    pub limits: ResourceLimits,
    pub env: BTreeMap<String, String>,
    pub secret_env: Vec<SecretEnv>,
    pub service_account: Option<String>,
    pub max_retries: u32,
    pub task_timeout_secs: u64,
    pub mounts: Vec<LogMount>,
}

/// Cloud Scheduler trigger that runs the job on a cron.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleDefinition {
    pub project: String,
    pub location: String,
    pub name: String,
    pub cron: String,
    pub timezone: String,
    pub target_uri: String,
    pub service_account: String,
}

impl ScheduleDefinition {
    pub fn run_uri(project: &str, region: &str, job: &str) -> String {
        format!(
            "https://{}-run.googleapis.com/apis/run.googleapis.com/v1/namespaces/{}/jobs/{}:run",
            region, project, job
        )
    }
}
