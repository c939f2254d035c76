use crate::config::{RawDeployConfig, SecretSourceSpec};
use crate::domain::model::SecretValue;
use crate::utils::error::{ProvisionError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const ENV_VAR_PATTERN: &str = r"\$\{([^}]+)\}";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlDeployConfig {
    pub project: Option<ProjectSection>,
    pub image: Option<ImageSection>,
    pub secret: Option<SecretSection>,
    pub storage: Option<StorageSection>,
    pub job: Option<JobSection>,
    pub schedule: Option<ScheduleSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    pub id: Option<String>,
    pub region: Option<String>,
    pub service_account: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageSection {
    pub repository: Option<String>,
    pub name: Option<String>,
    pub tag: Option<String>,
    pub build_context: Option<PathBuf>,
    pub skip_build: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretSection {
    pub name: Option<String>,
    pub env_var: Option<String>,
    pub value: Option<String>,
    pub from_env: Option<String>,
    pub from_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    pub bucket: Option<String>,
    pub mount_path: Option<String>,
    pub log_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSection {
    pub name: Option<String>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub max_retries: Option<u32>,
    pub task_timeout: Option<String>,
    pub db_name: Option<String>,
    pub collection_name: Option<String>,
    pub log_level: Option<String>,
    pub execute: Option<bool>,
    pub env: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleSection {
    pub cron: Option<String>,
    pub timezone: Option<String>,
}

impl TomlDeployConfig {
    /// 從 TOML 檔案載入部署設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ProvisionError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析部署設定
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ProvisionError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${GCP_PROJECT})；未設定的變數保留原文
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(ENV_VAR_PATTERN).map_err(|e| ProvisionError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    fn secret_source(secret: &SecretSection) -> Result<Option<SecretSourceSpec>> {
        let mut sources = Vec::new();
        if let Some(value) = &secret.value {
            // 未替換的 ${VAR} 絕不能當成秘密值部署
            if Regex::new(ENV_VAR_PATTERN)
                .map(|re| re.is_match(value))
                .unwrap_or(true)
            {
                return Err(ProvisionError::ConfigValidationError {
                    field: "secret.value".to_string(),
                    message: "references an environment variable that is not set".to_string(),
                });
            }
            sources.push(SecretSourceSpec::Literal(SecretValue::new(value.clone())));
        }
        if let Some(var) = &secret.from_env {
            sources.push(SecretSourceSpec::Env(var.clone()));
        }
        if let Some(path) = &secret.from_file {
            sources.push(SecretSourceSpec::File(path.clone()));
        }
        if sources.len() > 1 {
            return Err(ProvisionError::ConfigValidationError {
                field: "secret".to_string(),
                message: "set only one of value, from_env or from_file".to_string(),
            });
        }
        Ok(sources.pop())
    }

    /// 轉換為可與命令列參數疊加的原始設定
    pub fn into_raw(self) -> Result<RawDeployConfig> {
        let project = self.project.unwrap_or_default();
        let image = self.image.unwrap_or_default();
        let secret = self.secret.unwrap_or_default();
        let storage = self.storage.unwrap_or_default();
        let job = self.job.unwrap_or_default();
        let schedule = self.schedule.unwrap_or_default();

        Ok(RawDeployConfig {
            project_id: project.id,
            region: project.region,
            service_account: project.service_account,
            job_name: job.name,
            repo_name: image.repository,
            image_name: image.name,
            image_tag: image.tag,
            build_context: image.build_context,
            skip_build: image.skip_build,
            secret_source: Self::secret_source(&secret)?,
            secret_name: secret.name,
            secret_env_var: secret.env_var,
            bucket_name: storage.bucket,
            mount_path: storage.mount_path,
            log_path: storage.log_path,
            cpu: job.cpu,
            memory: job.memory,
            max_retries: job.max_retries,
            task_timeout: job.task_timeout,
            db_name: job.db_name,
            collection_name: job.collection_name,
            log_level: job.log_level,
            env: job.env.unwrap_or_default(),
            execute: job.execute,
            schedule: schedule.cron,
            timezone: schedule.timezone,
            dry_run: None,
        })
    }
}
