#[cfg(feature = "cli")]
pub mod cli;
pub mod job_env;
pub mod toml_config;

use crate::config::job_env::{
    log_file_path, JobEnvironment, DEFAULT_COLLECTION, DEFAULT_DB_NAME, DEFAULT_LOG_LEVEL,
    ENV_CONNECTION_URI,
};
use crate::domain::model::{
    BucketSpec, ImageBuild, JobDefinition, LogMount, RepositorySpec, ResourceLimits,
    ScheduleDefinition, SecretEnv, SecretSpec, SecretValue, LOG_VOLUME_NAME,
};
use crate::utils::error::{ProvisionError, Result};
use crate::utils::validation::{self, Validate};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_JOB_NAME: &str = "episode-scraper";
pub const DEFAULT_REPO_NAME: &str = "scraper-images";
pub const DEFAULT_IMAGE_TAG: &str = "latest";
pub const DEFAULT_SECRET_NAME: &str = "mongo-connection";
pub const DEFAULT_CPU: &str = "1";
pub const DEFAULT_MEMORY: &str = "512Mi";
pub const DEFAULT_MAX_RETRIES: u32 = 1;
pub const DEFAULT_TASK_TIMEOUT: &str = "3600s";
pub const DEFAULT_SCHEDULE: &str = "0 */6 * * *";
pub const DEFAULT_TIMEZONE: &str = "Etc/UTC";
pub const DEFAULT_MOUNT_PATH: &str = "/mnt/logs";
pub const DEFAULT_LOG_PATH: &str = "scraper.log";

/// Cloud APIs the deployment touches.
pub const REQUIRED_SERVICES: &[&str] = &[
    "artifactregistry.googleapis.com",
    "cloudbuild.googleapis.com",
    "run.googleapis.com",
    "secretmanager.googleapis.com",
    "cloudscheduler.googleapis.com",
];
pub const STORAGE_SERVICE: &str = "storage.googleapis.com";

/// 秘密值的來源設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSourceSpec {
    Literal(SecretValue),
    Env(String),
    File(PathBuf),
    Prompt,
}

/// 未驗證的部署設定，由設定檔與命令列參數疊加而成
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDeployConfig {
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub job_name: Option<String>,
    pub repo_name: Option<String>,
    pub image_name: Option<String>,
    pub image_tag: Option<String>,
    pub build_context: Option<PathBuf>,
    pub secret_name: Option<String>,
    pub secret_env_var: Option<String>,
    pub secret_source: Option<SecretSourceSpec>,
    pub bucket_name: Option<String>,
    pub mount_path: Option<String>,
    pub log_path: Option<String>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub max_retries: Option<u32>,
    pub task_timeout: Option<String>,
    pub db_name: Option<String>,
    pub collection_name: Option<String>,
    pub log_level: Option<String>,
    pub env: BTreeMap<String, String>,
    pub schedule: Option<String>,
    pub timezone: Option<String>,
    pub service_account: Option<String>,
    pub execute: Option<bool>,
    pub skip_build: Option<bool>,
    pub dry_run: Option<bool>,
}

impl RawDeployConfig {
    /// 以 `other` 覆蓋目前設定；`other` 中有值的欄位優先
    pub fn overlay(mut self, other: RawDeployConfig) -> Self {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $( if other.$field.is_some() { self.$field = other.$field; } )*
            };
        }
        take!(
            project_id, region, job_name, repo_name, image_name, image_tag, build_context,
            secret_name, secret_env_var, secret_source, bucket_name, mount_path, log_path, cpu,
            memory, max_retries, task_timeout, db_name, collection_name, log_level, schedule,
            timezone, service_account, execute, skip_build, dry_run,
        );
        self.env.extend(other.env);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStorage {
    pub bucket: String,
    pub mount_path: String,
    pub log_path: String,
}

/// 已驗證的部署設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub project_id: String,
    pub region: String,
    pub job_name: String,
    pub repo_name: String,
    pub image_name: String,
    pub image_tag: String,
    pub build_context: PathBuf,
    pub secret_name: String,
    pub secret_env_var: String,
    pub secret_source: SecretSourceSpec,
    pub log_storage: Option<LogStorage>,
    pub limits: ResourceLimits,
    pub max_retries: u32,
    pub task_timeout_secs: u64,
    pub job_env: JobEnvironment,
    pub schedule: String,
    pub timezone: String,
    pub service_account: Option<String>,
    pub execute: bool,
    pub skip_build: bool,
    pub dry_run: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `600s`, `30m`, `1h` to seconds. Callers validate the format first.
pub fn parse_duration_secs(field_name: &str, value: &str) -> Result<u64> {
    validation::validate_duration(field_name, value)?;
    let (digits, unit) = value.split_at(value.len() - 1);
    let out_of_range = || ProvisionError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: "Duration is out of range".to_string(),
    };
    let amount: u64 = digits.parse().map_err(|_| out_of_range())?;
    let factor = match unit {
        "h" => 3600,
        "m" => 60,
        _ => 1,
    };
    amount.checked_mul(factor).ok_or_else(out_of_range)
}

impl DeployConfig {
    /// 從原始設定建立並驗證；任何錯誤都發生在呼叫外部服務之前
    pub fn from_raw(raw: RawDeployConfig) -> Result<Self> {
        let project_id = validation::validate_required_string("project_id", &raw.project_id)?.to_string();
        let secret_source = raw.secret_source.ok_or_else(|| ProvisionError::MissingConfigError {
            field: "secret_value".to_string(),
        })?;
        if let SecretSourceSpec::Literal(value) = &secret_source {
            if value.is_empty() {
                return Err(ProvisionError::MissingConfigError {
                    field: "secret_value".to_string(),
                });
            }
        }

        let job_name = non_blank(raw.job_name).unwrap_or_else(|| DEFAULT_JOB_NAME.to_string());
        let image_name = non_blank(raw.image_name).unwrap_or_else(|| job_name.clone());

        let log_storage = match non_blank(raw.bucket_name) {
            Some(bucket) => Some(LogStorage {
                bucket,
                mount_path: raw.mount_path.unwrap_or_else(|| DEFAULT_MOUNT_PATH.to_string()),
                log_path: raw.log_path.unwrap_or_else(|| DEFAULT_LOG_PATH.to_string()),
            }),
            None if raw.mount_path.is_some() || raw.log_path.is_some() => {
                return Err(ProvisionError::ConfigValidationError {
                    field: "bucket_name".to_string(),
                    message: "mount_path/log_path require a bucket_name".to_string(),
                });
            }
            None => None,
        };

        let task_timeout = raw.task_timeout.unwrap_or_else(|| DEFAULT_TASK_TIMEOUT.to_string());
        let task_timeout_secs = parse_duration_secs("task_timeout", &task_timeout)?;

        let job_env = JobEnvironment {
            db_name: non_blank(raw.db_name).unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
            collection: non_blank(raw.collection_name)
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            log_level: non_blank(raw.log_level).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_file: log_storage
                .as_ref()
                .map(|storage| log_file_path(&storage.mount_path, &storage.log_path)),
            extra: raw.env,
        };

        let config = Self {
            project_id,
            region: non_blank(raw.region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            job_name,
            repo_name: non_blank(raw.repo_name).unwrap_or_else(|| DEFAULT_REPO_NAME.to_string()),
            image_name,
            image_tag: non_blank(raw.image_tag).unwrap_or_else(|| DEFAULT_IMAGE_TAG.to_string()),
            build_context: raw.build_context.unwrap_or_else(|| PathBuf::from(".")),
            secret_name: non_blank(raw.secret_name)
                .unwrap_or_else(|| DEFAULT_SECRET_NAME.to_string()),
            secret_env_var: non_blank(raw.secret_env_var)
                .unwrap_or_else(|| ENV_CONNECTION_URI.to_string()),
            secret_source,
            log_storage,
            limits: ResourceLimits {
                cpu: non_blank(raw.cpu).unwrap_or_else(|| DEFAULT_CPU.to_string()),
                memory: non_blank(raw.memory).unwrap_or_else(|| DEFAULT_MEMORY.to_string()),
            },
            max_retries: raw.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            task_timeout_secs,
            job_env,
            schedule: non_blank(raw.schedule).unwrap_or_else(|| DEFAULT_SCHEDULE.to_string()),
            timezone: non_blank(raw.timezone).unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            service_account: non_blank(raw.service_account),
            execute: raw.execute.unwrap_or(true),
            skip_build: raw.skip_build.unwrap_or(false),
            dry_run: raw.dry_run.unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn repository_spec(&self) -> RepositorySpec {
        RepositorySpec {
            project: self.project_id.clone(),
            location: self.region.clone(),
            name: self.repo_name.clone(),
        }
    }

    /// `REGION-docker.pkg.dev/PROJECT/REPO/IMAGE:TAG`
    pub fn image_reference(&self) -> String {
        format!(
            "{}/{}/{}/{}:{}",
            self.repository_spec().registry_host(),
            self.project_id,
            self.repo_name,
            self.image_name,
            self.image_tag
        )
    }

    pub fn image_build(&self) -> ImageBuild {
        ImageBuild {
            project: self.project_id.clone(),
            context_dir: self.build_context.clone(),
            image: self.image_reference(),
        }
    }

    pub fn secret_spec(&self) -> SecretSpec {
        SecretSpec {
            project: self.project_id.clone(),
            name: self.secret_name.clone(),
        }
    }

    pub fn bucket_spec(&self) -> Option<BucketSpec> {
        self.log_storage.as_ref().map(|storage| BucketSpec {
            project: self.project_id.clone(),
            location: self.region.clone(),
            name: storage.bucket.clone(),
        })
    }

    pub fn required_services(&self) -> Vec<String> {
        let mut services: Vec<String> = REQUIRED_SERVICES.iter().map(|s| s.to_string()).collect();
        if self.log_storage.is_some() {
            services.push(STORAGE_SERVICE.to_string());
        }
        services
    }

    pub fn job_definition(&self, service_account: Option<&str>) -> JobDefinition {
        JobDefinition {
            project: self.project_id.clone(),
            region: self.region.clone(),
            name: self.job_name.clone(),
            image: self.image_reference(),
            limits: self.limits.clone(),
            env: self.job_env.to_env_map(),
            secret_env: vec![SecretEnv {
                env_var: self.secret_env_var.clone(),
                secret: self.secret_name.clone(),
                version: "latest".to_string(),
            }],
            service_account: service_account.map(str::to_string),
            max_retries: self.max_retries,
            task_timeout_secs: self.task_timeout_secs,
            mounts: self
                .log_storage
                .iter()
                .map(|storage| LogMount {
                    volume: LOG_VOLUME_NAME.to_string(),
                    bucket: storage.bucket.clone(),
                    mount_path: storage.mount_path.clone(),
                })
                .collect(),
        }
    }

    pub fn schedule_name(&self) -> String {
        format!("{}-trigger", self.job_name)
    }

    pub fn schedule_definition(&self, service_account: &str) -> ScheduleDefinition {
        ScheduleDefinition {
            project: self.project_id.clone(),
            location: self.region.clone(),
            name: self.schedule_name(),
            cron: self.schedule.clone(),
            timezone: self.timezone.clone(),
            target_uri: ScheduleDefinition::run_uri(&self.project_id, &self.region, &self.job_name),
            service_account: service_account.to_string(),
        }
    }
}

impl Validate for DeployConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_project_id("project_id", &self.project_id)?;
        validation::validate_non_empty_string("region", &self.region)?;
        validation::validate_resource_name("job_name", &self.job_name)?;
        validation::validate_resource_name("repo_name", &self.repo_name)?;
        validation::validate_resource_name("image_name", &self.image_name)?;
        validation::validate_non_empty_string("image_tag", &self.image_tag)?;
        validation::validate_secret_name("secret_name", &self.secret_name)?;
        validation::validate_env_key("secret_env_var", &self.secret_env_var)?;

        if let Some(storage) = &self.log_storage {
            validation::validate_bucket_name("bucket_name", &storage.bucket)?;
            validation::validate_absolute_path("mount_path", &storage.mount_path)?;
            validation::validate_relative_path("log_path", &storage.log_path)?;
        }

        validation::validate_cpu("cpu", &self.limits.cpu)?;
        validation::validate_memory("memory", &self.limits.memory)?;
        validation::validate_range("max_retries", self.max_retries, 0, 10)?;
        validation::validate_range("task_timeout", self.task_timeout_secs, 1, 7 * 24 * 3600)?;

        for key in self.job_env.extra.keys() {
            validation::validate_env_key("env", key)?;
            if key == &self.secret_env_var {
                return Err(ProvisionError::ConfigValidationError {
                    field: "env".to_string(),
                    message: format!("'{}' is reserved for the secret binding", key),
                });
            }
        }

        validation::validate_cron("schedule", &self.schedule)?;
        validation::validate_non_empty_string("timezone", &self.timezone)?;
        Ok(())
    }
}
