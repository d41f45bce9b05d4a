use crate::utils::error::{ContentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Source name the admin panel sends for models of the default namespace.
pub const DEFAULT_SOURCE: &str = "content-manager";
/// Namespace owning uploaded file entries.
pub const UPLOAD_SOURCE: &str = "upload";
pub const FILE_MODEL: &str = "file";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub data: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.data.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.data.remove(field)
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Identifier stored under `primary_key`, if any.
    pub fn id(&self, primary_key: &str) -> Option<EntryId> {
        self.get(primary_key).and_then(EntryId::from_value)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

impl TryFrom<Value> for Record {
    type Error = ContentError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(data) => Ok(Self { data }),
            other => Err(ContentError::ValidationError {
                message: format!("expected a JSON object, got {}", json_type_name(&other)),
            }),
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Primary key value in string form. Numbers and strings that print the same
/// are the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, value: &Value) -> bool {
        EntryId::from_value(value).is_some_and(|other| other == *self)
    }

    /// JSON form used when writing the id back into a record.
    pub fn to_value(&self) -> Value {
        match self.0.parse::<i64>() {
            Ok(n) => Value::Number(n.into()),
            Err(_) => Value::String(self.0.clone()),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for EntryId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Target of a request: model name plus the optional source namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef {
    pub model: String,
    pub source: Option<String>,
}

impl ModelRef {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Source with the admin panel's own name folded into the default namespace.
    pub fn namespace(&self) -> Option<&str> {
        normalize_source(self.source.as_deref())
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace() {
            Some(source) => write!(f, "{}::{}", source, self.model),
            None => f.write_str(&self.model),
        }
    }
}

pub fn normalize_source(source: Option<&str>) -> Option<&str> {
    match source {
        None | Some("") | Some(DEFAULT_SOURCE) => None,
        Some(other) => Some(other),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl FromStr for Sort {
    type Err = ContentError;

    /// Accepts `field`, `-field`, `field:asc` and `field:desc`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |reason: &str| ContentError::ValidationError {
            message: format!("invalid sort '{}': {}", s, reason),
        };

        let (field, order) = if let Some(field) = s.strip_prefix('-') {
            (field, SortOrder::Desc)
        } else if let Some((field, order)) = s.split_once(':') {
            let order = match order.to_ascii_lowercase().as_str() {
                "asc" => SortOrder::Asc,
                "desc" => SortOrder::Desc,
                _ => return Err(invalid("order must be asc or desc")),
            };
            (field, order)
        } else {
            (s, SortOrder::Asc)
        };

        if field.is_empty() {
            return Err(invalid("missing field name"));
        }

        Ok(Self {
            field: field.to_string(),
            order,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindParams {
    pub limit: Option<usize>,
    #[serde(default)]
    pub skip: usize,
    pub sort: Option<Sort>,
    /// Free-text filter.
    pub query: Option<String>,
    /// Attribute the free-text filter applies to; all scalar fields when unset.
    pub query_attribute: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// File attachment, owned by the file side through its `related` list.
    Related,
    #[default]
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub alias: String,
    #[serde(default)]
    pub relation: RelationKind,
}

impl Association {
    pub fn related(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            relation: RelationKind::Related,
        }
    }

    pub fn reference(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            relation: RelationKind::Reference,
        }
    }

    pub fn is_file_relation(&self) -> bool {
        self.relation == RelationKind::Related
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub associations: Vec<Association>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            primary_key: default_primary_key(),
            associations: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    pub fn model_ref(&self) -> ModelRef {
        ModelRef {
            model: self.name.clone(),
            source: self.source.clone(),
        }
    }

    /// Schema of the entries created by the upload subsystem.
    pub fn upload_files() -> Self {
        Self::new(FILE_MODEL).with_source(UPLOAD_SOURCE)
    }
}

/// Raw upload as received by a multipart request: a temporary file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInput {
    pub name: String,
    pub path: PathBuf,
    #[serde(default, rename = "type")]
    pub mime: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Back-reference from a file entry to the record and field it is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedRef {
    #[serde(rename = "refId")]
    pub ref_id: EntryId,
    #[serde(rename = "ref")]
    pub ref_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub field: String,
}

impl RelatedRef {
    pub fn points_to(&self, target: &ModelRef, id: &EntryId, field: &str) -> bool {
        self.ref_model == target.model
            && &self.ref_id == id
            && self.field == field
            && normalize_source(self.source.as_deref()) == target.namespace()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePatch {
    pub related: Vec<RelatedRef>,
}

impl FilePatch {
    /// Patch clearing every back-reference of a file.
    pub fn detached() -> Self {
        Self::default()
    }
}

/// A buffered upload ready to be handed to the storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFile {
    pub name: String,
    pub hash: String,
    pub ext: String,
    pub mime: String,
    pub size: u64,
    #[serde(skip)]
    pub buffer: Vec<u8>,
    #[serde(default)]
    pub related: Vec<RelatedRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: String,
    #[serde(default)]
    pub size_limit: Option<u64>,
    #[serde(default)]
    pub public_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultipartPayload {
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub files: BTreeMap<String, Vec<FileInput>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditPayload {
    Values(Record),
    Multipart(MultipartPayload),
}

impl EditPayload {
    /// Interprets a request body. Bodies carrying both `fields` and `files`
    /// are multipart submissions, anything else is a plain value map.
    pub fn from_json(body: Value) -> Result<Self> {
        let record = Record::try_from(body)?;
        if record.contains_key("fields") && record.contains_key("files") {
            let payload: MultipartPayload = serde_json::from_value(record.into_value())?;
            Ok(Self::Multipart(payload))
        } else {
            Ok(Self::Values(record))
        }
    }
}

impl From<Record> for EditPayload {
    fn from(values: Record) -> Self {
        Self::Values(values)
    }
}

impl From<MultipartPayload> for EditPayload {
    fn from(payload: MultipartPayload) -> Self {
        Self::Multipart(payload)
    }
}
