use crate::core::{EditPayload, FileInput, FindParams, ModelRef, MultipartPayload, Record, Sort};
use crate::utils::error::{ContentError, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "content-manager")]
#[command(about = "Admin-panel CRUD operations over a content store")]
pub struct CliConfig {
    #[arg(long, default_value = "content-manager.toml")]
    pub config: PathBuf,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct Target {
    /// Model name
    pub model: String,

    /// Source namespace of the model (e.g. a plugin name)
    #[arg(long)]
    pub source: Option<String>,
}

impl Target {
    pub fn model_ref(&self) -> ModelRef {
        let target = ModelRef::new(&self.model);
        match &self.source {
            Some(source) => target.with_source(source),
            None => target,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List entries
    List {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "0")]
        skip: usize,
        /// `field`, `-field`, `field:asc` or `field:desc`
        #[arg(long, allow_hyphen_values = true)]
        sort: Option<String>,
        /// Free-text filter
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        query_attribute: Option<String>,
    },
    /// Count entries
    Count {
        #[command(flatten)]
        target: Target,
    },
    /// Show one entry
    Get {
        #[command(flatten)]
        target: Target,
        id: String,
    },
    /// Create an entry from a JSON object
    Create {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        data: String,
    },
    /// Update an entry, either from a JSON object or as a multipart form
    Update {
        #[command(flatten)]
        target: Target,
        id: String,
        #[arg(long, conflicts_with_all = ["fields", "files"])]
        data: Option<String>,
        /// Form field `name=value`; values are decoded as JSON when possible
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        /// File attachment `attribute=path`
        #[arg(long = "file", value_parser = parse_key_value)]
        files: Vec<(String, String)>,
    },
    /// Delete an entry, clearing its relations first
    Delete {
        #[command(flatten)]
        target: Target,
        id: String,
    },
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

fn parse_record(data: &str) -> Result<Record> {
    let value: Value = serde_json::from_str(data).map_err(|e| ContentError::ValidationError {
        message: format!("--data is not valid JSON: {}", e),
    })?;
    Record::try_from(value)
}

impl Command {
    pub fn target(&self) -> ModelRef {
        match self {
            Self::List { target, .. }
            | Self::Count { target }
            | Self::Get { target, .. }
            | Self::Create { target, .. }
            | Self::Update { target, .. }
            | Self::Delete { target, .. } => target.model_ref(),
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create { .. } | Self::Update { .. } | Self::Delete { .. }
        )
    }

    pub fn find_params(&self) -> Result<FindParams> {
        let Self::List {
            limit,
            skip,
            sort,
            query,
            query_attribute,
            ..
        } = self
        else {
            return Ok(FindParams::default());
        };

        Ok(FindParams {
            limit: *limit,
            skip: *skip,
            sort: sort.as_deref().map(str::parse::<Sort>).transpose()?,
            query: query.clone(),
            query_attribute: query_attribute.clone(),
        })
    }

    pub fn create_values(&self) -> Result<Record> {
        match self {
            Self::Create { data, .. } => parse_record(data),
            _ => Err(ContentError::ValidationError {
                message: "only `create` carries entry values".to_string(),
            }),
        }
    }

    /// `--data` gives a plain update; `--field`/`--file` build a multipart form.
    pub fn edit_payload(&self) -> Result<EditPayload> {
        let Self::Update {
            data,
            fields,
            files,
            ..
        } = self
        else {
            return Err(ContentError::ValidationError {
                message: "only `update` carries an edit payload".to_string(),
            });
        };

        if let Some(data) = data {
            return Ok(EditPayload::Values(parse_record(data)?));
        }
        if fields.is_empty() && files.is_empty() {
            return Err(ContentError::ValidationError {
                message: "update needs --data, --field or --file".to_string(),
            });
        }

        let fields = fields
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect();

        let mut grouped: BTreeMap<String, Vec<FileInput>> = BTreeMap::new();
        for (attribute, path) in files {
            let path = PathBuf::from(path);
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("upload")
                .to_string();
            grouped.entry(attribute.clone()).or_default().push(FileInput {
                name,
                path,
                mime: None,
                size: None,
            });
        }

        Ok(EditPayload::Multipart(MultipartPayload {
            fields,
            files: grouped,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(args: &[&str]) -> CliConfig {
        CliConfig::try_parse_from(std::iter::once("content-manager").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_list_arguments() {
        let cli = parse(&[
            "list", "article", "--limit", "5", "--skip", "10", "--sort", "-title", "--query", "rust",
        ]);
        let params = cli.command.find_params().unwrap();

        assert_eq!(cli.command.target(), ModelRef::new("article"));
        assert_eq!(params.limit, Some(5));
        assert_eq!(params.skip, 10);
        assert_eq!(params.sort.unwrap().field, "title");
        assert_eq!(params.query.as_deref(), Some("rust"));
        assert!(!cli.command.is_mutation());
    }

    #[test]
    fn test_source_flag() {
        let cli = parse(&["count", "user", "--source", "users-permissions"]);
        assert_eq!(
            cli.command.target(),
            ModelRef::new("user").with_source("users-permissions")
        );
    }

    #[test]
    fn test_update_with_data_is_plain() {
        let cli = parse(&["update", "article", "3", "--data", r#"{"title": "New"}"#]);
        assert!(cli.command.is_mutation());
        assert!(matches!(&cli.command, Command::Update { id, .. } if id == "3"));

        match cli.command.edit_payload().unwrap() {
            EditPayload::Values(values) => assert_eq!(values.get("title"), Some(&json!("New"))),
            other => panic!("expected plain payload, got {:?}", other),
        }
    }

    #[test]
    fn test_update_with_fields_and_files_is_multipart() {
        let cli = parse(&[
            "update",
            "article",
            "3",
            "--field",
            "title=\"New\"",
            "--field",
            "gallery=[1,3]",
            "--file",
            "gallery=/tmp/a.png",
            "--file",
            "gallery=/tmp/b.png",
        ]);

        match cli.command.edit_payload().unwrap() {
            EditPayload::Multipart(payload) => {
                assert_eq!(payload.fields.get("title"), Some(&json!("\"New\"")));
                assert_eq!(payload.fields.get("gallery"), Some(&json!("[1,3]")));
                let names: Vec<&str> = payload.files["gallery"]
                    .iter()
                    .map(|f| f.name.as_str())
                    .collect();
                assert_eq!(names, vec!["a.png", "b.png"]);
            }
            other => panic!("expected multipart payload, got {:?}", other),
        }
    }

    #[test]
    fn test_update_rejects_data_with_fields() {
        let result = CliConfig::try_parse_from([
            "content-manager",
            "update",
            "article",
            "3",
            "--data",
            "{}",
            "--field",
            "a=1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_update_without_payload_fails() {
        let cli = parse(&["update", "article", "3"]);
        assert!(cli.command.edit_payload().is_err());
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(CliConfig::try_parse_from(["content-manager", "update", "a", "1", "--field", "novalue"]).is_err());

        let cli = parse(&["create", "article", "--data", "[1]"]);
        assert!(cli.command.create_values().is_err());

        let cli = parse(&["list", "article", "--sort", "title:up"]);
        assert!(cli.command.find_params().is_err());
    }
}
