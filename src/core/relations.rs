use crate::domain::model::{Association, EntryId, Record};
use serde_json::{Map, Value};

/// Identifiers held by a relation value. Objects contribute their primary key,
/// scalars are identifiers themselves, `null` holds nothing.
pub fn relation_ids(value: &Value, primary_key: &str) -> Vec<EntryId> {
    let id_of = |item: &Value| match item {
        Value::Object(obj) => obj.get(primary_key).and_then(EntryId::from_value),
        other => EntryId::from_value(other),
    };

    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter_map(id_of).collect(),
        other => id_of(other).into_iter().collect(),
    }
}

/// Whether a submitted relation value leaves the relation untouched:
/// `null`, an empty string, `false` or zero, as sent by a blank form field.
pub fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Stored identifiers missing from the submitted ones, in stored order.
pub fn removed_ids(stored: &[EntryId], submitted: &[EntryId]) -> Vec<EntryId> {
    stored
        .iter()
        .filter(|id| !submitted.contains(id))
        .cloned()
        .collect()
}

/// Files detached by a submission, per file-attachment association.
/// Associations absent from the submission or submitted unset are left alone.
pub fn detached_files(
    associations: &[Association],
    stored: &Record,
    submitted: &Map<String, Value>,
    primary_key: &str,
) -> Vec<EntryId> {
    associations
        .iter()
        .filter(|association| association.is_file_relation())
        .filter_map(|association| {
            let current = submitted
                .get(&association.alias)
                .filter(|value| !is_unset(value))?;

            let current = relation_ids(current, primary_key);
            let previous = stored
                .get(&association.alias)
                .map(|value| relation_ids(value, primary_key))
                .unwrap_or_default();

            Some(removed_ids(&previous, &current))
        })
        .flatten()
        .collect()
}

/// Patch emptying every association field present on `record`:
/// arrays become `[]`, anything else `null`.
pub fn clearing_patch(associations: &[Association], record: &Record) -> Record {
    let mut patch = Record::new();
    for (field, value) in &record.data {
        if associations.iter().any(|a| &a.alias == field) {
            let cleared = if value.is_array() {
                Value::Array(Vec::new())
            } else {
                Value::Null
            };
            patch.insert(field.clone(), cleared);
        }
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(values: &[&str]) -> Vec<EntryId> {
        values.iter().map(|v| EntryId::from(*v)).collect()
    }

    #[test]
    fn test_relation_ids_from_objects_and_scalars() {
        let value = json!([{"id": 1, "name": "a.png"}, 2, "3", {"name": "no-id"}]);
        assert_eq!(relation_ids(&value, "id"), ids(&["1", "2", "3"]));

        assert_eq!(relation_ids(&json!({"_id": "abc"}), "_id"), ids(&["abc"]));
        assert!(relation_ids(&json!(null), "id").is_empty());
    }

    #[test]
    fn test_removed_ids_keeps_stored_order() {
        let stored = ids(&["1", "2", "3", "4"]);
        let submitted = ids(&["4", "1"]);
        assert_eq!(removed_ids(&stored, &submitted), ids(&["2", "3"]));
    }

    #[test]
    fn test_detached_files_only_for_file_relations() {
        let associations = vec![Association::related("gallery"), Association::reference("tags")];
        let stored: Record = json!({
            "id": 9,
            "gallery": [{"id": 1}, {"id": 2}, {"id": 3}],
            "tags": [{"id": 10}, {"id": 11}]
        })
        .try_into()
        .unwrap();

        let submitted = json!({"gallery": [{"id": 1}, 3], "tags": [10]});
        let submitted = submitted.as_object().unwrap();

        assert_eq!(
            detached_files(&associations, &stored, submitted, "id"),
            ids(&["2"])
        );
    }

    #[test]
    fn test_detached_files_skips_absent_or_null_fields() {
        let associations = vec![Association::related("gallery")];
        let stored: Record = json!({"gallery": [1, 2]}).try_into().unwrap();

        let absent = Map::new();
        assert!(detached_files(&associations, &stored, &absent, "id").is_empty());

        let null = json!({"gallery": null});
        assert!(detached_files(&associations, &stored, null.as_object().unwrap(), "id").is_empty());

        let emptied = json!({"gallery": []});
        assert_eq!(
            detached_files(&associations, &stored, emptied.as_object().unwrap(), "id"),
            ids(&["1", "2"])
        );
    }

    #[test]
    fn test_detached_files_skips_blank_form_values() {
        let associations = vec![Association::related("gallery")];
        let stored: Record = json!({"gallery": [1, 2, 3]}).try_into().unwrap();

        for blank in [json!(""), json!(false), json!(0)] {
            let mut submitted = Map::new();
            submitted.insert("gallery".to_string(), blank);
            assert!(detached_files(&associations, &stored, &submitted, "id").is_empty());
        }

        let single = json!({"gallery": "2"});
        assert_eq!(
            detached_files(&associations, &stored, single.as_object().unwrap(), "id"),
            ids(&["1", "3"])
        );
    }

    #[test]
    fn test_is_unset() {
        assert!(is_unset(&json!(null)));
        assert!(is_unset(&json!("")));
        assert!(is_unset(&json!(0)));
        assert!(!is_unset(&json!([])));
        assert!(!is_unset(&json!("0")));
        assert!(!is_unset(&json!(7)));
    }

    #[test]
    fn test_clearing_patch() {
        let associations = vec![Association::related("cover"), Association::reference("author")];
        let record: Record = json!({
            "id": 1,
            "title": "Hello",
            "cover": [{"id": 4}],
            "author": {"id": 2}
        })
        .try_into()
        .unwrap();

        let patch = clearing_patch(&associations, &record);
        assert_eq!(patch.into_value(), json!({"cover": [], "author": null}));

        let plain: Record = json!({"id": 1, "title": "Hello"}).try_into().unwrap();
        assert!(clearing_patch(&associations, &plain).is_empty());
    }
}
