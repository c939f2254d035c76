use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ('{value}'): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Secret source '{source_kind}' failed: {message}")]
    SecretSourceError {
        source_kind: String,
        message: String,
    },

    #[error("Command `{command}` failed (exit status: {status:?}): {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Unexpected response while reading {resource}: {message}")]
    PlatformResponseError { resource: String, message: String },

    #[error("Step '{step}' failed: {details}")]
    StepFailed { step: String, details: String },

    #[error("Step '{step}' could not run: {source}")]
    StepIoError {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid document for '{collection}': {message}")]
    DocumentError { collection: String, message: String },
}

/// 錯誤分類，用來決定退出碼與提示訊息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Usage,
    Validation,
    External,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl ProvisionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProvisionError::MissingConfigError { .. }
            | ProvisionError::SecretSourceError { .. } => ErrorCategory::Usage,
            ProvisionError::InvalidConfigValueError { .. }
            | ProvisionError::ConfigValidationError { .. }
            | ProvisionError::DocumentError { .. } => ErrorCategory::Validation,
            ProvisionError::CommandFailed { .. }
            | ProvisionError::PlatformResponseError { .. }
            | ProvisionError::SerializationError(_) => ErrorCategory::External,
            ProvisionError::IoError(_) | ProvisionError::StepIoError { .. } => ErrorCategory::System,
            ProvisionError::StepFailed { .. } => ErrorCategory::External,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Usage | ErrorCategory::Validation => ErrorSeverity::Medium,
            ErrorCategory::External => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 根據嚴重程度決定退出碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            ProvisionError::MissingConfigError { field } => {
                format!("Pass --{} or set it in the deploy config file", field.replace('_', "-"))
            }
            ProvisionError::InvalidConfigValueError { field, .. }
            | ProvisionError::ConfigValidationError { field, .. } => {
                format!("Fix the value of '{}' and run again", field)
            }
            ProvisionError::DocumentError { collection, .. } => {
                format!("Check the fields supplied for the '{}' collection", collection)
            }
            ProvisionError::SecretSourceError { .. } => {
                "Provide the secret with --secret-value, --secret-env or --secret-file".to_string()
            }
            ProvisionError::CommandFailed { .. } | ProvisionError::StepFailed { .. } => {
                "Fix the underlying cause and re-run the whole deployment; completed steps are skipped automatically"
                    .to_string()
            }
            ProvisionError::PlatformResponseError { .. } | ProvisionError::SerializationError(_) => {
                "Check that the installed gcloud CLI is up to date".to_string()
            }
            ProvisionError::IoError(_) | ProvisionError::StepIoError { .. } => {
                "Check file permissions and that gcloud is installed and on PATH".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Usage => format!("Missing input: {}", self),
            ErrorCategory::Validation => format!("Invalid configuration: {}", self),
            ErrorCategory::External => format!("Deployment failed: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
