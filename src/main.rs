use clap::Parser;
use job_provisioner::adapters::secret_source;
use job_provisioner::config::cli::CliArgs;
use job_provisioner::config::toml_config::TomlDeployConfig;
use job_provisioner::utils::error::{ProvisionError, Result};
use job_provisioner::utils::logger;
use job_provisioner::{
    standard_steps, DeployConfig, GcloudPlatform, ProvisionReport, Provisioner, RawDeployConfig,
    SecretSourceSpec,
};
use std::io::IsTerminal;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose, args.log_format);

    tracing::info!("🚀 Starting job-provisioner");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    match run(&args).await {
        Ok(report) => {
            let summary: serde_json::Map<String, serde_json::Value> = report.summary().into_iter().collect();
            if report.dry_run {
                println!("📝 Dry run complete, nothing was changed");
            } else if report.is_converged() {
                println!("✅ Deployment complete, everything was already up to date");
            } else {
                println!("✅ Deployment complete");
            }
            match serde_json::to_string_pretty(&serde_json::Value::Object(summary)) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!("⚠️ Could not render summary: {}", e),
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ Deployment failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            std::process::exit(e.exit_code());
        }
    }
}

/// 設定檔 < 命令列參數；全部驗證通過後才會呼叫外部服務
fn load_config(args: &CliArgs) -> Result<DeployConfig> {
    let file_raw = match &args.config {
        Some(path) => {
            tracing::info!("📁 Loading deploy config from: {}", path.display());
            TomlDeployConfig::from_file(path)
                .map_err(|e| match e {
                    ProvisionError::IoError(io) => ProvisionError::InvalidConfigValueError {
                        field: "config".to_string(),
                        value: path.display().to_string(),
                        reason: io.to_string(),
                    },
                    other => other,
                })?
                .into_raw()?
        }
        None => RawDeployConfig::default(),
    };

    let mut raw = file_raw.overlay(args.to_raw()?);
    if raw.secret_source.is_none() && std::io::stdin().is_terminal() {
        raw.secret_source = Some(SecretSourceSpec::Prompt);
    }

    DeployConfig::from_raw(raw)
}

async fn run(args: &CliArgs) -> Result<ProvisionReport> {
    let config = load_config(args)?;
    tracing::info!("✅ Configuration loaded and validated successfully");
    tracing::info!(
        "📋 project={} region={} job={} image={}",
        config.project_id,
        config.region,
        config.job_name,
        config.image_reference()
    );
    if config.dry_run {
        tracing::info!("🔍 DRY RUN MODE - probes only, no changes will be made");
    }

    let source = secret_source::from_spec(&config.secret_source);
    let payload = source.resolve().await?;
    tracing::debug!("🔐 Secret payload read from {} source", source.kind());

    let provisioner = Provisioner::new(Provisioner::generate_execution_id())
        .with_steps(standard_steps(payload));
    provisioner
        .execute_all(&GcloudPlatform::new(), Arc::new(config))
        .await
}
