use crate::config::DeployConfig;
use crate::core::reconcile::Action;
use crate::domain::ports::CloudPlatform;
use crate::utils::error::{ErrorCategory, ProvisionError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 單一資源的協調結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChange {
    pub kind: &'static str,
    pub name: String,
    pub action: Action,
    /// `true` when the action was only planned (dry run)
    pub planned: bool,
}

impl ResourceChange {
    pub fn new(kind: &'static str, name: impl Into<String>, action: Action, planned: bool) -> Self {
        Self {
            kind,
            name: name.into(),
            action,
            planned,
        }
    }

    fn describe(&self) -> String {
        match &self.action {
            Action::Update { changed } => {
                format!("{} {} ({}: {})", self.kind, self.name, self.action.label(), changed.join(", "))
            }
            action => format!("{} {} ({})", self.kind, self.name, action.label()),
        }
    }
}

/// 步驟執行結果，由 [`ProvisionStep::run`] 回傳
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub changes: Vec<ResourceChange>,
    /// 提供給後續步驟的值 (例如解析後的服務帳號)
    pub exports: HashMap<String, serde_json::Value>,
}

impl StepOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change(mut self, change: ResourceChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn push(&mut self, change: ResourceChange) {
        self.changes.push(change);
    }

    pub fn export(mut self, key: &str, value: serde_json::Value) -> Self {
        self.exports.insert(key.to_string(), value);
        self
    }
}

/// 步驟執行紀錄
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: String,
    pub changes: Vec<ResourceChange>,
    pub duration: Duration,
    pub skipped: bool,
}

/// 步驟間共享的執行上下文
#[derive(Debug, Clone)]
pub struct ProvisionContext {
    pub config: Arc<DeployConfig>,
    pub dry_run: bool,
    pub previous_results: Vec<StepResult>,
    pub shared_data: HashMap<String, serde_json::Value>,
    pub execution_id: String,
}

impl ProvisionContext {
    pub fn new(execution_id: String, config: Arc<DeployConfig>) -> Self {
        Self {
            dry_run: config.dry_run,
            config,
            previous_results: Vec::new(),
            shared_data: HashMap::new(),
            execution_id,
        }
    }

    /// 獲取指定名稱的步驟結果
    pub fn get_result_by_name(&self, name: &str) -> Option<&StepResult> {
        self.previous_results.iter().find(|r| r.step_name == name)
    }

    pub fn add_shared_data(&mut self, key: String, value: serde_json::Value) {
        self.shared_data.insert(key, value);
    }

    pub fn get_shared_str(&self, key: &str) -> Option<&str> {
        self.shared_data.get(key).and_then(|v| v.as_str())
    }

    fn add_result(&mut self, result: StepResult) {
        self.previous_results.push(result);
    }
}

/// 部署步驟介面：先探測、再決定、最後才變更
#[async_trait::async_trait]
pub trait ProvisionStep: Send + Sync {
    fn name(&self) -> &str;

    /// 根據上下文決定是否執行
    fn should_execute(&self, _context: &ProvisionContext) -> bool {
        true
    }

    async fn run(&self, platform: &dyn CloudPlatform, context: &ProvisionContext) -> Result<StepOutcome>;
}

/// 整體執行報告
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub execution_id: String,
    pub dry_run: bool,
    pub results: Vec<StepResult>,
    pub exports: HashMap<String, serde_json::Value>,
}

impl ProvisionReport {
    pub fn changes(&self) -> impl Iterator<Item = &ResourceChange> {
        self.results.iter().flat_map(|r| r.changes.iter())
    }

    pub fn count(&self, label: &str) -> usize {
        self.changes().filter(|c| c.action.label() == label).count()
    }

    /// No resource needed a create or update.
    pub fn is_converged(&self) -> bool {
        self.changes().all(|c| !c.action.is_mutation())
    }

    pub fn summary(&self) -> HashMap<String, serde_json::Value> {
        let mut summary = Provisioner::get_execution_summary(&self.results);
        summary.insert(
            "execution_id".to_string(),
            serde_json::Value::String(self.execution_id.clone()),
        );
        summary.insert("dry_run".to_string(), serde_json::Value::Bool(self.dry_run));
        summary
    }
}

/// 部署步驟序列，依序執行並在第一個失敗時中止
pub struct Provisioner {
    steps: Vec<Box<dyn ProvisionStep>>,
    execution_id: String,
}

impl Provisioner {
    pub fn new(execution_id: String) -> Self {
        Self {
            steps: Vec::new(),
            execution_id,
        }
    }

    /// 以時間戳產生執行 ID
    pub fn generate_execution_id() -> String {
        chrono::Utc::now().format("deploy_%Y%m%d_%H%M%S").to_string()
    }

    pub fn with_steps(mut self, steps: Vec<Box<dyn ProvisionStep>>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// 執行所有步驟
    pub async fn execute_all(
        &self,
        platform: &dyn CloudPlatform,
        config: Arc<DeployConfig>,
    ) -> Result<ProvisionReport> {
        let mut context = ProvisionContext::new(self.execution_id.clone(), config);

        tracing::info!(
            "🚀 Starting deployment {} ({} steps{})",
            self.execution_id,
            self.steps.len(),
            if context.dry_run { ", dry run" } else { "" }
        );

        for step in &self.steps {
            if !step.should_execute(&context) {
                tracing::info!("⏭️ Skipping step: {} (condition not met)", step.name());
                context.add_result(StepResult {
                    step_name: step.name().to_string(),
                    changes: Vec::new(),
                    duration: Duration::ZERO,
                    skipped: true,
                });
                continue;
            }

            let start_time = Instant::now();
            match step.run(platform, &context).await {
                Ok(outcome) => {
                    let result = StepResult {
                        step_name: step.name().to_string(),
                        changes: outcome.changes,
                        duration: start_time.elapsed(),
                        skipped: false,
                    };

                    for change in &result.changes {
                        tracing::debug!("🔎 {}: {}", result.step_name, change.describe());
                    }
                    tracing::info!(
                        "✅ Step completed: {} (changes: {}, duration: {:?})",
                        result.step_name,
                        result.changes.iter().filter(|c| c.action.is_mutation()).count(),
                        result.duration
                    );

                    for (key, value) in outcome.exports {
                        context.add_shared_data(key, value);
                    }
                    context.add_result(result);
                }
                Err(e) => {
                    tracing::error!("❌ Step failed: {}: {}", step.name(), e);
                    // Local problems keep their own category so the exit code stays accurate.
                    return Err(match e {
                        ProvisionError::IoError(source) => ProvisionError::StepIoError {
                            step: step.name().to_string(),
                            source,
                        },
                        e if e.category() == ErrorCategory::External => ProvisionError::StepFailed {
                            step: step.name().to_string(),
                            details: e.to_string(),
                        },
                        e => e,
                    });
                }
            }
        }

        let report = ProvisionReport {
            execution_id: self.execution_id.clone(),
            dry_run: context.dry_run,
            results: context.previous_results,
            exports: context.shared_data,
        };

        tracing::info!(
            "🏁 Deployment {} finished: {} created, {} updated, {} unchanged",
            report.execution_id,
            report.count("create"),
            report.count("update"),
            report.count("unchanged")
        );

        Ok(report)
    }

    /// 獲取執行摘要
    pub fn get_execution_summary(results: &[StepResult]) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();

        let executed: Vec<&StepResult> = results.iter().filter(|r| !r.skipped).collect();
        let skipped: Vec<serde_json::Value> = results
            .iter()
            .filter(|r| r.skipped)
            .map(|r| serde_json::Value::String(r.step_name.clone()))
            .collect();
        let total_duration: Duration = results.iter().map(|r| r.duration).sum();

        let count = |label: &str| {
            results
                .iter()
                .flat_map(|r| r.changes.iter())
                .filter(|c| c.action.label() == label)
                .count()
        };

        summary.insert("total_steps".to_string(), serde_json::Value::Number(results.len().into()));
        summary.insert("created".to_string(), serde_json::Value::Number(count("create").into()));
        summary.insert("updated".to_string(), serde_json::Value::Number(count("update").into()));
        summary.insert("unchanged".to_string(), serde_json::Value::Number(count("unchanged").into()));
        summary.insert(
            "total_duration_ms".to_string(),
            serde_json::Value::Number((total_duration.as_millis() as u64).into()),
        );
        summary.insert(
            "executed_steps".to_string(),
            serde_json::Value::Array(
                executed
                    .iter()
                    .map(|r| serde_json::Value::String(r.step_name.clone()))
                    .collect(),
            ),
        );
        summary.insert("skipped".to_string(), serde_json::Value::Number(skipped.len().into()));
        summary.insert("skipped_steps".to_string(), serde_json::Value::Array(skipped));
        summary.insert(
            "resources".to_string(),
            serde_json::Value::Array(
                results
                    .iter()
                    .flat_map(|r| r.changes.iter())
                    .map(|c| {
                        serde_json::json!({
                            "kind": c.kind,
                            "name": c.name,
                            "action": c.action.label(),
                            "planned": c.planned,
                        })
                    })
                    .collect(),
            ),
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryPlatform;
    use crate::config::{DeployConfig, RawDeployConfig, SecretSourceSpec};
    use crate::domain::model::SecretValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockStep {
        name: String,
        should_execute: bool,
        fail: bool,
        io_failure: bool,
        action: Action,
        runs: Arc<AtomicUsize>,
    }

    impl MockStep {
        fn new(name: &str, runs: Arc<AtomicUsize>) -> Self {
            Self {
                name: name.to_string(),
                should_execute: true,
                fail: false,
                io_failure: false,
                action: Action::Unchanged,
                runs,
            }
        }

        fn with_execution_condition(mut self, should_execute: bool) -> Self {
            self.should_execute = should_execute;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn failing_to_spawn(mut self) -> Self {
            self.io_failure = true;
            self
        }

        fn with_action(mut self, action: Action) -> Self {
            self.action = action;
            self
        }
    }

    #[async_trait::async_trait]
    impl ProvisionStep for MockStep {
        fn name(&self) -> &str {
            &self.name
        }

        fn should_execute(&self, _context: &ProvisionContext) -> bool {
            self.should_execute
        }

        async fn run(&self, _platform: &dyn CloudPlatform, context: &ProvisionContext) -> Result<StepOutcome> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.io_failure {
                return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory").into());
            }
            if self.fail {
                return Err(ProvisionError::CommandFailed {
                    command: "gcloud run jobs create".to_string(),
                    status: Some(1),
                    stderr: "PERMISSION_DENIED".to_string(),
                });
            }
            Ok(StepOutcome::new()
                .with_change(ResourceChange::new("mock", &self.name, self.action.clone(), context.dry_run))
                .export(&format!("{}_seen_steps", self.name), context.previous_results.len().into()))
        }
    }

    fn config() -> Arc<DeployConfig> {
        let raw = RawDeployConfig {
            project_id: Some("biohack-agent".to_string()),
            secret_source: Some(SecretSourceSpec::Literal(SecretValue::new("mongodb://db"))),
            ..Default::default()
        };
        Arc::new(DeployConfig::from_raw(raw).unwrap())
    }

    #[tokio::test]
    async fn test_steps_run_in_order_and_share_context() {
        let runs = Arc::new(AtomicUsize::new(0));
        let provisioner = Provisioner::new("test_execution".to_string()).with_steps(vec![
            Box::new(MockStep::new("first", runs.clone()).with_action(Action::Create)),
            Box::new(MockStep::new("second", runs.clone())),
        ]);

        let report = provisioner
            .execute_all(&InMemoryPlatform::new(), config())
            .await
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(report.results[0].step_name, "first");
        assert_eq!(report.results[1].step_name, "second");
        assert_eq!(report.exports.get("second_seen_steps").unwrap(), 1);
        assert_eq!(report.count("create"), 1);
        assert!(!report.is_converged());
    }

    #[tokio::test]
    async fn test_conditional_step_is_skipped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let provisioner = Provisioner::new("conditional".to_string()).with_steps(vec![
            Box::new(MockStep::new("first", runs.clone())),
            Box::new(MockStep::new("optional", runs.clone()).with_execution_condition(false)),
            Box::new(MockStep::new("third", runs.clone())),
        ]);

        let report = provisioner
            .execute_all(&InMemoryPlatform::new(), config())
            .await
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(report.results[1].skipped);
        let summary = report.summary();
        assert_eq!(summary.get("skipped").unwrap(), &serde_json::Value::Number(1.into()));
        assert_eq!(summary.get("total_steps").unwrap(), &serde_json::Value::Number(3.into()));
        assert!(report.is_converged());
    }

    #[tokio::test]
    async fn test_first_failure_aborts_sequence() {
        let runs = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        let provisioner = Provisioner::new("fail_fast".to_string()).with_steps(vec![
            Box::new(MockStep::new("ok", runs.clone())),
            Box::new(MockStep::new("broken", runs.clone()).failing()),
            Box::new(MockStep::new("never", after.clone())),
        ]);

        let err = provisioner
            .execute_all(&InMemoryPlatform::new(), config())
            .await
            .unwrap_err();

        match err {
            ProvisionError::StepFailed { step, details } => {
                assert_eq!(step, "broken");
                assert!(details.contains("PERMISSION_DENIED"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_local_io_failure_names_the_step() {
        let runs = Arc::new(AtomicUsize::new(0));
        let provisioner = Provisioner::new("spawn".to_string()).with_steps(vec![
            Box::new(MockStep::new("enable_apis", runs.clone()).failing_to_spawn()),
            Box::new(MockStep::new("never", runs.clone())),
        ]);

        let err = provisioner
            .execute_all(&InMemoryPlatform::new(), config())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::StepIoError { ref step, .. } if step == "enable_apis"));
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("enable_apis"));
        assert!(err.user_friendly_message().starts_with("System error"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_execution_summary() {
        let results = vec![
            StepResult {
                step_name: "secret".to_string(),
                changes: vec![ResourceChange::new("secret", "mongo-connection", Action::Create, false)],
                duration: Duration::from_millis(100),
                skipped: false,
            },
            StepResult {
                step_name: "job".to_string(),
                changes: vec![ResourceChange::new(
                    "job",
                    "episode-scraper",
                    Action::Update { changed: vec!["image"] },
                    false,
                )],
                duration: Duration::from_millis(200),
                skipped: false,
            },
        ];

        let summary = Provisioner::get_execution_summary(&results);

        assert_eq!(summary.get("total_steps").unwrap(), &serde_json::Value::Number(2.into()));
        assert_eq!(summary.get("created").unwrap(), &serde_json::Value::Number(1.into()));
        assert_eq!(summary.get("updated").unwrap(), &serde_json::Value::Number(1.into()));
        assert_eq!(summary.get("total_duration_ms").unwrap(), &serde_json::Value::Number(300.into()));
        let executed = summary.get("executed_steps").unwrap().as_array().unwrap();
        assert_eq!(executed[0], serde_json::Value::String("secret".to_string()));
    }

    #[test]
    fn test_execution_id_format() {
        let id = Provisioner::generate_execution_id();
        assert!(id.starts_with("deploy_"));
        assert_eq!(id.len(), "deploy_20240101_000000".len());
    }
}
