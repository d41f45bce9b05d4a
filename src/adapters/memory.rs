use crate::core::{
    EntryId, FindParams, ModelRef, ModelSchema, QueryProvider, QueryRegistry, Record, RelatedRef,
    SortOrder, Storage,
};
use crate::core::relations::{is_unset, relation_ids};
use crate::domain::model::{normalize_source, Association, FILE_MODEL, UPLOAD_SOURCE};
use crate::utils::error::{ContentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type CollectionKey = (Option<String>, String);

/// Submitted file ids per attachment field.
type Attachments = Vec<(String, Vec<EntryId>)>;

fn collection_key(target: &ModelRef) -> CollectionKey {
    (target.namespace().map(str::to_string), target.model.clone())
}

fn files_key() -> CollectionKey {
    (Some(UPLOAD_SOURCE.to_string()), FILE_MODEL.to_string())
}

#[derive(Debug, Default)]
struct Collection {
    last_id: i64,
    records: Vec<Record>,
}

#[derive(Debug, Default)]
struct StoreState {
    collections: HashMap<CollectionKey, Collection>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    collections: Vec<SnapshotCollection>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotCollection {
    model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    last_id: i64,
    records: Vec<Record>,
}

/// In-process content store for the models declared in the configuration.
///
/// File attachments are not stored on the owning entry: fields of `related`
/// associations are resolved on read from the upload namespace's file entries.
#[derive(Clone)]
pub struct MemoryStore {
    schemas: Arc<HashMap<CollectionKey, Arc<ModelSchema>>>,
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    pub fn new(schemas: impl IntoIterator<Item = ModelSchema>) -> Self {
        let schemas = schemas
            .into_iter()
            .map(|schema| (collection_key(&schema.model_ref()), Arc::new(schema)))
            .collect();

        Self {
            schemas: Arc::new(schemas),
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    pub fn schemas(&self) -> impl Iterator<Item = &ModelSchema> {
        self.schemas.values().map(|schema| schema.as_ref())
    }

    /// Restores entries saved by `save_snapshot`. A missing snapshot leaves the store empty.
    pub async fn load_snapshot<S: Storage>(&self, storage: &S, path: &str) -> Result<usize> {
        let data = match storage.read_file(path).await {
            Ok(data) => data,
            Err(ContentError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No snapshot at '{}', starting empty", path);
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let snapshot: Snapshot = serde_json::from_slice(&data)?;
        let mut state = self.state.write().await;
        let mut loaded = 0;

        for collection in snapshot.collections {
            let key = (
                normalize_source(collection.source.as_deref()).map(str::to_string),
                collection.model,
            );
            if !self.schemas.contains_key(&key) {
                tracing::warn!(
                    "Skipping snapshot collection '{}' ({:?}): model is not declared",
                    key.1,
                    key.0
                );
                continue;
            }
            loaded += collection.records.len();
            state.collections.insert(
                key,
                Collection {
                    last_id: collection.last_id,
                    records: collection.records,
                },
            );
        }

        tracing::debug!("Loaded {} entries from '{}'", loaded, path);
        Ok(loaded)
    }

    pub async fn save_snapshot<S: Storage>(&self, storage: &S, path: &str) -> Result<()> {
        let state = self.state.read().await;
        let mut collections: Vec<SnapshotCollection> = state
            .collections
            .iter()
            .map(|((source, model), collection)| SnapshotCollection {
                model: model.clone(),
                source: source.clone(),
                last_id: collection.last_id,
                records: collection.records.clone(),
            })
            .collect();
        collections.sort_by(|a, b| (&a.source, &a.model).cmp(&(&b.source, &b.model)));

        let data = serde_json::to_vec_pretty(&Snapshot { collections })?;
        storage.write_file(path, &data).await
    }
}

impl QueryRegistry for MemoryStore {
    fn query(&self, target: &ModelRef) -> Result<Arc<dyn QueryProvider>> {
        let key = collection_key(target);
        let schema = self
            .schemas
            .get(&key)
            .cloned()
            .ok_or_else(|| ContentError::ModelNotFound {
                model: target.model.clone(),
                namespace: target.namespace().map(str::to_string),
            })?;

        let file_key = self
            .schemas
            .get(&files_key())
            .map(|files| files.primary_key.clone())
            .unwrap_or_else(|| "id".to_string());

        Ok(Arc::new(MemoryQuery {
            schema,
            key,
            file_key,
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct MemoryQuery {
    schema: Arc<ModelSchema>,
    key: CollectionKey,
    file_key: String,
    state: Arc<RwLock<StoreState>>,
}

impl MemoryQuery {
    fn target(&self) -> ModelRef {
        self.schema.model_ref()
    }

    fn file_aliases(&self) -> impl Iterator<Item = &Association> {
        self.schema
            .associations
            .iter()
            .filter(|association| association.is_file_relation())
    }

    fn not_found(&self, id: &EntryId) -> ContentError {
        ContentError::not_found(&self.schema.name, id)
    }

    /// Takes attachment fields out of `values` and, unless allowed, the primary key.
    /// Blank form values leave an attachment untouched, `null` clears it.
    fn split_attachments(&self, mut values: Record, keep_primary_key: bool) -> (Record, Attachments) {
        let mut attachments = Vec::new();
        for association in self.file_aliases() {
            let Some(value) = values.remove(&association.alias) else {
                continue;
            };
            if is_unset(&value) && !value.is_null() {
                continue;
            }
            attachments.push((association.alias.clone(), relation_ids(&value, &self.file_key)));
        }
        if !keep_primary_key {
            values.remove(&self.schema.primary_key);
        }
        (values, attachments)
    }

    /// Rewrites the back-references of file entries so that exactly the
    /// submitted files point at `owner` for each attachment field.
    fn relink(&self, state: &mut StoreState, owner: &EntryId, attachments: &Attachments) -> Result<()> {
        if attachments.is_empty() {
            return Ok(());
        }
        let Some(files) = state.collections.get_mut(&files_key()) else {
            return Ok(());
        };
        let target = self.target();

        for file in files.records.iter_mut() {
            let Some(file_id) = file.id(&self.file_key) else {
                continue;
            };
            let mut related = match file.get("related") {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            let mut changed = false;

            for (field, ids) in attachments {
                let submitted = ids.contains(&file_id);
                let linked = related
                    .iter()
                    .any(|entry| points_at(entry, &target, owner, field));

                if linked && !submitted {
                    related.retain(|entry| !points_at(entry, &target, owner, field));
                    changed = true;
                } else if submitted && !linked {
                    related.push(serde_json::to_value(RelatedRef {
                        ref_id: owner.clone(),
                        ref_model: target.model.clone(),
                        source: target.source.clone(),
                        field: field.clone(),
                    })?);
                    changed = true;
                }
            }

            if changed {
                tracing::debug!("Relinked file {} to {} entry {}", file_id, target, owner);
                file.insert("related", Value::Array(related));
            }
        }
        Ok(())
    }

    /// Every attachment field of this model, emptied.
    fn detach_all(&self) -> Attachments {
        self.file_aliases()
            .map(|association| (association.alias.clone(), Vec::new()))
            .collect()
    }

    fn position(&self, collection: &Collection, id: &EntryId) -> Option<usize> {
        let pk = &self.schema.primary_key;
        collection
            .records
            .iter()
            .position(|record| record.get(pk).is_some_and(|value| id.matches(value)))
    }

    /// Fills attachment fields from the file entries pointing at `record`.
    fn populate(&self, state: &StoreState, mut record: Record) -> Record {
        let Some(id) = record.id(&self.schema.primary_key) else {
            return record;
        };
        let files = state.collections.get(&files_key());
        let target = self.target();

        for association in self.file_aliases() {
            let attached: Vec<Value> = files
                .map(|files| {
                    files
                        .records
                        .iter()
                        .filter(|file| references(file, &target, &id, &association.alias))
                        .map(|file| file.clone().into_value())
                        .collect()
                })
                .unwrap_or_default();
            record.insert(association.alias.clone(), Value::Array(attached));
        }
        record
    }
}

fn points_at(entry: &Value, target: &ModelRef, id: &EntryId, field: &str) -> bool {
    serde_json::from_value::<RelatedRef>(entry.clone())
        .map(|related| related.points_to(target, id, field))
        .unwrap_or(false)
}

fn references(file: &Record, target: &ModelRef, id: &EntryId, field: &str) -> bool {
    let Some(Value::Array(related)) = file.get("related") else {
        return false;
    };
    related.iter().any(|entry| points_at(entry, target, id, field))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn matches_query(record: &Record, query: &str, attribute: Option<&str>) -> bool {
    let needle = query.to_lowercase();
    let hit = |value: &Value| {
        scalar_text(value).is_some_and(|text| text.to_lowercase().contains(&needle))
    };

    match attribute {
        Some(attribute) => record.get(attribute).is_some_and(hit),
        None => record.data.values().any(hit),
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(_) => 4,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[async_trait]
impl QueryProvider for MemoryQuery {
    fn primary_key(&self) -> &str {
        &self.schema.primary_key
    }

    fn associations(&self) -> &[Association] {
        &self.schema.associations
    }

    async fn find(&self, params: &FindParams) -> Result<Vec<Record>> {
        let state = self.state.read().await;
        let Some(collection) = state.collections.get(&self.key) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<&Record> = match params.query.as_deref() {
            Some(query) if !query.is_empty() => collection
                .records
                .iter()
                .filter(|record| matches_query(record, query, params.query_attribute.as_deref()))
                .collect(),
            _ => collection.records.iter().collect(),
        };

        if let Some(sort) = &params.sort {
            matched.sort_by(|a, b| {
                let ordering = compare_values(a.get(&sort.field), b.get(&sort.field));
                match sort.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        let limit = params.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(params.skip)
            .take(limit)
            .map(|record| self.populate(&state, record.clone()))
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(&self.key)
            .map(|collection| collection.records.len() as u64)
            .unwrap_or(0))
    }

    async fn find_one(&self, id: &EntryId) -> Result<Record> {
        let state = self.state.read().await;
        let record = state
            .collections
            .get(&self.key)
            .and_then(|collection| {
                self.position(collection, id)
                    .map(|index| collection.records[index].clone())
            })
            .ok_or_else(|| self.not_found(id))?;
        Ok(self.populate(&state, record))
    }

    async fn create(&self, values: Record) -> Result<Record> {
        let (mut record, attachments) = self.split_attachments(values, true);
        let pk = self.schema.primary_key.clone();

        let mut state = self.state.write().await;
        let collection = state.collections.entry(self.key.clone()).or_default();

        match record.id(&pk) {
            Some(id) => {
                if self.position(collection, &id).is_some() {
                    return Err(ContentError::ValidationError {
                        message: format!("{} entry {} already exists", self.schema.name, id),
                    });
                }
                if let Ok(numeric) = id.as_str().parse::<i64>() {
                    collection.last_id = collection.last_id.max(numeric);
                }
            }
            None => {
                let next = collection.last_id.checked_add(1).ok_or_else(|| {
                    ContentError::ValidationError {
                        message: format!(
                            "{} has no identifier left after {}",
                            self.schema.name, collection.last_id
                        ),
                    }
                })?;
                collection.last_id = next;
                record.insert(pk.clone(), EntryId::from(next).to_value());
            }
        }

        collection.records.push(record.clone());
        if let Some(owner) = record.id(&pk) {
            self.relink(&mut state, &owner, &attachments)?;
        }
        Ok(self.populate(&state, record))
    }

    async fn update(&self, id: &EntryId, values: Record) -> Result<Record> {
        let (patch, attachments) = self.split_attachments(values, false);

        let mut state = self.state.write().await;
        let collection = state
            .collections
            .get_mut(&self.key)
            .ok_or_else(|| self.not_found(id))?;
        let index = self
            .position(collection, id)
            .ok_or_else(|| self.not_found(id))?;

        let record = &mut collection.records[index];
        for (field, value) in patch.data {
            record.insert(field, value);
        }
        let record = record.clone();

        let owner = record.id(&self.schema.primary_key).unwrap_or_else(|| id.clone());
        self.relink(&mut state, &owner, &attachments)?;
        Ok(self.populate(&state, record))
    }

    async fn delete(&self, id: &EntryId) -> Result<Record> {
        let mut state = self.state.write().await;
        let collection = state
            .collections
            .get_mut(&self.key)
            .ok_or_else(|| self.not_found(id))?;
        let index = self
            .position(collection, id)
            .ok_or_else(|| self.not_found(id))?;

        let record = collection.records.remove(index);
        let record = self.populate(&state, record);

        // no file may keep pointing at a removed entry
        let owner = record.id(&self.schema.primary_key).unwrap_or_else(|| id.clone());
        self.relink(&mut state, &owner, &self.detach_all())?;
        Ok(record)
    }
}
