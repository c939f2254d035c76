use crate::config::SecretSourceSpec;
use crate::domain::model::SecretValue;
use crate::domain::ports::SecretSource;
use crate::utils::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn non_empty(kind: &str, value: String) -> Result<SecretValue> {
    let value = value.trim_end_matches(&['\r', '\n'][..]).to_string();
    if value.trim().is_empty() {
        return Err(ProvisionError::SecretSourceError {
            source_kind: kind.to_string(),
            message: "secret value is empty".to_string(),
        });
    }
    Ok(SecretValue::new(value))
}

pub struct LiteralSecretSource {
    value: SecretValue,
}

impl LiteralSecretSource {
    pub fn new(value: SecretValue) -> Self {
        Self { value }
    }
}

#[async_trait]
impl SecretSource for LiteralSecretSource {
    fn kind(&self) -> &str {
        "literal"
    }

    async fn resolve(&self) -> Result<SecretValue> {
        non_empty(self.kind(), self.value.expose().to_string())
    }
}

pub struct EnvSecretSource {
    var: String,
}

impl EnvSecretSource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl SecretSource for EnvSecretSource {
    fn kind(&self) -> &str {
        "env"
    }

    async fn resolve(&self) -> Result<SecretValue> {
        let value = std::env::var(&self.var).map_err(|_| ProvisionError::SecretSourceError {
            source_kind: self.kind().to_string(),
            message: format!("environment variable {} is not set", self.var),
        })?;
        non_empty(self.kind(), value)
    }
}

/// Reads the whole file; trailing newlines are dropped.
pub struct FileSecretSource {
    path: PathBuf,
}

impl FileSecretSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretSource for FileSecretSource {
    fn kind(&self) -> &str {
        "file"
    }

    async fn resolve(&self) -> Result<SecretValue> {
        let value = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ProvisionError::SecretSourceError {
                source_kind: self.kind().to_string(),
                message: format!("cannot read {}: {}", self.path.display(), e),
            }
        })?;
        non_empty(self.kind(), value)
    }
}

/// Asks on stderr and reads one line from stdin. The typed value is not echoed back.
pub struct PromptSecretSource {
    prompt: String,
}

impl PromptSecretSource {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl Default for PromptSecretSource {
    fn default() -> Self {
        Self::new("MongoDB connection string: ")
    }
}

#[async_trait]
impl SecretSource for PromptSecretSource {
    fn kind(&self) -> &str {
        "prompt"
    }

    async fn resolve(&self) -> Result<SecretValue> {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(self.prompt.as_bytes()).await?;
        stderr.flush().await?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;
        if read == 0 {
            return Err(ProvisionError::SecretSourceError {
                source_kind: self.kind().to_string(),
                message: "stdin closed before a value was entered".to_string(),
            });
        }
        non_empty(self.kind(), line)
    }
}

pub fn from_spec(spec: &SecretSourceSpec) -> Box<dyn SecretSource> {
    match spec {
        SecretSourceSpec::Literal(value) => Box::new(LiteralSecretSource::new(value.clone())),
        SecretSourceSpec::Env(var) => Box::new(EnvSecretSource::new(var.clone())),
        SecretSourceSpec::File(path) => Box::new(FileSecretSource::new(path.clone())),
        SecretSourceSpec::Prompt => Box::new(PromptSecretSource::default()),
    }
}
