use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Entry {id} not found in model '{model}'")]
    NotFound { model: String, id: String },

    #[error("Model '{model}' is not registered{}", namespace_suffix(.namespace))]
    ModelNotFound {
        model: String,
        namespace: Option<String>,
    },

    #[error("Query failed: {message}")]
    QueryError { message: String },

    #[error("Upload failed: {message}")]
    UploadError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

fn namespace_suffix(namespace: &Option<String>) -> String {
    match namespace {
        Some(name) => format!(" in source '{}'", name),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Storage,
    Upload,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ContentError {
    pub fn not_found(model: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            model: model.into(),
            id: id.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::NotFound { .. } | Self::ModelNotFound { .. } | Self::ValidationError { .. } => {
                ErrorCategory::Input
            }
            Self::QueryError { .. } | Self::SerializationError(_) => ErrorCategory::Storage,
            Self::UploadError { .. } => ErrorCategory::Upload,
            Self::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound { .. } => ErrorSeverity::Low,
            Self::ModelNotFound { .. } | Self::ValidationError { .. } => ErrorSeverity::Medium,
            Self::QueryError { .. }
            | Self::UploadError { .. }
            | Self::SerializationError(_)
            | Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorSeverity::High,
            Self::IoError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "Check the entry id, it may already have been deleted",
            Self::ModelNotFound { .. } => {
                "Declare the model under [[models]] in the configuration file, with the right source"
            }
            Self::ValidationError { .. } => "Fix the request payload and try again",
            Self::QueryError { .. } | Self::SerializationError(_) => {
                "Inspect the data file, it may be corrupted or hand-edited"
            }
            Self::UploadError { .. } => "Check the upload directory and the provider size limit",
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. } => "Review the TOML configuration file",
            Self::IoError(_) => "Check file permissions and available disk space",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Input => format!("Request rejected: {}", self),
            ErrorCategory::Storage => format!("Content store problem: {}", self),
            ErrorCategory::Upload => format!("File upload problem: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ContentError>;
