use crate::core::{ModelSchema, ProviderConfig};
use crate::utils::error::{ContentError, Result};
use crate::utils::logger::LogFormat;
use crate::utils::validation::{
    validate_not_empty, validate_path, validate_positive_number, validate_unique, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsConfig {
    pub project: ProjectConfig,
    pub storage: StorageConfig,
    pub upload: Option<UploadConfig>,
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub models: Vec<ModelSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_file: String,
}

fn default_provider() -> String {
    "local".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub enabled: bool,
    #[serde(default = "default_provider")]
    pub provider: String,
    pub upload_dir: String,
    pub public_path: Option<String>,
    pub size_limit: Option<u64>,
    /// Provider settings overridden per `project.environment`.
    #[serde(default)]
    pub environments: HashMap<String, ProviderOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOverride {
    pub provider: Option<String>,
    pub public_path: Option<String>,
    pub size_limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl CmsConfig {
    /// Loads the configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ContentError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parses a TOML document after environment substitution.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ContentError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value; undefined variables are kept as-is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ContentError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_not_empty("project.name", &self.project.name)?;
        validate_path("storage.data_file", &self.storage.data_file)?;

        if let Some(upload) = &self.upload {
            validate_not_empty("upload.provider", &upload.provider)?;
            validate_path("upload.upload_dir", &upload.upload_dir)?;
            if let Some(limit) = upload.size_limit {
                validate_positive_number("upload.size_limit", limit, 1)?;
            }
            for (env, scoped) in &upload.environments {
                if let Some(provider) = &scoped.provider {
                    validate_not_empty(&format!("upload.environments.{}.provider", env), provider)?;
                }
                if let Some(limit) = scoped.size_limit {
                    validate_positive_number(
                        &format!("upload.environments.{}.size_limit", env),
                        limit,
                        1,
                    )?;
                }
            }
        }

        if let Some(format) = self.logging.as_ref().and_then(|l| l.format.as_deref()) {
            if LogFormat::parse(format).is_none() {
                return Err(ContentError::InvalidConfigValueError {
                    field: "logging.format".to_string(),
                    value: format.to_string(),
                    reason: "Supported formats: compact, json".to_string(),
                });
            }
        }

        for model in &self.models {
            validate_not_empty("models.name", &model.name)?;
            validate_not_empty(
                &format!("models.{}.primary_key", model.name),
                &model.primary_key,
            )?;
            validate_unique(
                &format!("models.{}.associations", model.name),
                model.associations.iter().map(|a| a.alias.as_str()),
            )?;
        }

        let qualified: Vec<String> = self
            .models
            .iter()
            .map(|model| model.model_ref().to_string())
            .collect();
        validate_unique("models", qualified.iter().map(String::as_str))?;

        Ok(())
    }

    pub fn upload_enabled(&self) -> bool {
        self.upload.as_ref().map(|u| u.enabled).unwrap_or(false)
    }

    /// Upload provider settings for the configured environment.
    pub fn provider_config(&self) -> Option<ProviderConfig> {
        let upload = self.upload.as_ref().filter(|upload| upload.enabled)?;
        let mut config = ProviderConfig {
            provider: upload.provider.clone(),
            size_limit: upload.size_limit,
            public_path: upload.public_path.clone(),
        };

        let scoped = self
            .project
            .environment
            .as_deref()
            .and_then(|env| upload.environments.get(env));
        if let Some(scoped) = scoped {
            if let Some(provider) = &scoped.provider {
                config.provider = provider.clone();
            }
            if scoped.size_limit.is_some() {
                config.size_limit = scoped.size_limit;
            }
            if scoped.public_path.is_some() {
                config.public_path = scoped.public_path.clone();
            }
        }
        Some(config)
    }

    /// Declared models, plus the file model when uploads are enabled.
    pub fn schemas(&self) -> Vec<ModelSchema> {
        let mut schemas = self.models.clone();
        let files = ModelSchema::upload_files();
        let declared = schemas
            .iter()
            .any(|schema| schema.model_ref() == files.model_ref());
        if self.upload_enabled() && !declared {
            schemas.push(files);
        }
        schemas
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.level.as_deref())
    }

    pub fn log_format(&self) -> LogFormat {
        self.logging
            .as_ref()
            .and_then(|l| l.format.as_deref())
            .and_then(LogFormat::parse)
            .unwrap_or_default()
    }
}

impl Validate for CmsConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
