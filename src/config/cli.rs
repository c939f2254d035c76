use crate::config::{RawDeployConfig, SecretSourceSpec};
use crate::domain::model::SecretValue;
use crate::utils::error::{ProvisionError, Result};
use crate::utils::logger::LogFormat;
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "job-provisioner")]
#[command(about = "Provision and deploy the scraping job to Cloud Run Jobs, safely re-runnable")]
pub struct CliArgs {
    /// Optional TOML deploy file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, env = "GCP_PROJECT")]
    pub project_id: Option<String>,

    #[arg(long, env = "GCP_REGION")]
    pub region: Option<String>,

    #[arg(long)]
    pub job_name: Option<String>,

    /// Artifact Registry repository name
    #[arg(long)]
    pub repo_name: Option<String>,

    /// Image name inside the repository (defaults to the job name)
    #[arg(long)]
    pub image_name: Option<String>,

    #[arg(long)]
    pub image_tag: Option<String>,

    /// Docker build context directory
    #[arg(long)]
    pub build_context: Option<PathBuf>,

    #[arg(long)]
    pub secret_name: Option<String>,

    /// Env var on the job that receives the secret
    #[arg(long)]
    pub secret_env_var: Option<String>,

    /// Secret payload; prompted for on stdin when no secret source is given
    #[arg(long, conflicts_with_all = ["secret_env", "secret_file"])]
    pub secret_value: Option<SecretValue>,

    /// Read the secret payload from this environment variable
    #[arg(long, conflicts_with = "secret_file")]
    pub secret_env: Option<String>,

    /// Read the secret payload from this file
    #[arg(long)]
    pub secret_file: Option<PathBuf>,

    /// Cloud Storage bucket mounted for job logs
    #[arg(long)]
    pub bucket_name: Option<String>,

    /// Absolute mount path of the log bucket inside the container
    #[arg(long)]
    pub mount_path: Option<String>,

    /// Log file path relative to the mount path
    #[arg(long)]
    pub log_path: Option<String>,

    #[arg(long)]
    pub cpu: Option<String>,

    #[arg(long)]
    pub memory: Option<String>,

    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Per-task timeout, e.g. 3600s, 30m, 1h
    #[arg(long)]
    pub task_timeout: Option<String>,

    #[arg(long)]
    pub db_name: Option<String>,

    #[arg(long)]
    pub collection_name: Option<String>,

    #[arg(long)]
    pub log_level: Option<String>,

    /// Extra job environment entries (KEY=VALUE, repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Cron expression for the scheduler trigger
    #[arg(long)]
    pub schedule: Option<String>,

    #[arg(long)]
    pub timezone: Option<String>,

    /// Runtime service account (defaults to the project's compute account)
    #[arg(long)]
    pub service_account: Option<String>,

    /// Do not execute the job once after deploying
    #[arg(long)]
    pub no_execute: bool,

    /// Reuse the already pushed image instead of building
    #[arg(long)]
    pub skip_build: bool,

    /// Probe and plan only; make no changes
    #[arg(long)]
    pub dry_run: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

/// Splits `KEY=VALUE`; the value may itself contain `=`.
pub fn parse_env_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ProvisionError::InvalidConfigValueError {
                field: "env".to_string(),
                value: pair.clone(),
                reason: "Expected KEY=VALUE".to_string(),
            })?;
        env.insert(key.trim().to_string(), value.to_string());
    }
    Ok(env)
}

impl CliArgs {
    fn secret_source(&self) -> Option<SecretSourceSpec> {
        if let Some(value) = &self.secret_value {
            Some(SecretSourceSpec::Literal(value.clone()))
        } else if let Some(var) = &self.secret_env {
            Some(SecretSourceSpec::Env(var.clone()))
        } else {
            self.secret_file.clone().map(SecretSourceSpec::File)
        }
    }

    /// 命令列參數轉為原始設定；布林旗標僅在設定時覆蓋設定檔
    pub fn to_raw(&self) -> Result<RawDeployConfig> {
        Ok(RawDeployConfig {
            project_id: self.project_id.clone(),
            region: self.region.clone(),
            job_name: self.job_name.clone(),
            repo_name: self.repo_name.clone(),
            image_name: self.image_name.clone(),
            image_tag: self.image_tag.clone(),
            build_context: self.build_context.clone(),
            secret_name: self.secret_name.clone(),
            secret_env_var: self.secret_env_var.clone(),
            secret_source: self.secret_source(),
            bucket_name: self.bucket_name.clone(),
            mount_path: self.mount_path.clone(),
            log_path: self.log_path.clone(),
            cpu: self.cpu.clone(),
            memory: self.memory.clone(),
            max_retries: self.max_retries,
            task_timeout: self.task_timeout.clone(),
            db_name: self.db_name.clone(),
            collection_name: self.collection_name.clone(),
            log_level: self.log_level.clone(),
            env: parse_env_pairs(&self.env)?,
            schedule: self.schedule.clone(),
            timezone: self.timezone.clone(),
            service_account: self.service_account.clone(),
            execute: self.no_execute.then_some(false),
            skip_build: self.skip_build.then_some(true),
            dry_run: self.dry_run.then_some(true),
        })
    }
}
