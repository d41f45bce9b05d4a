use serde_json::{Map, Value};

/// Outcome of decoding a multipart field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// The value decoded as JSON (or already was JSON).
    Json(Value),
    /// Not valid JSON; the submitted string is kept as-is.
    Raw(String),
}

impl FieldValue {
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Raw(raw) => Value::String(raw),
        }
    }
}

/// Decodes a submitted field. Strings are parsed as JSON; arrays, whether
/// submitted or produced by decoding, get the same treatment element-wise.
pub fn parse_field(value: &Value) -> FieldValue {
    match value {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(decoded) => FieldValue::Json(parse_elements(decoded)),
            Err(_) => FieldValue::Raw(raw.clone()),
        },
        other => FieldValue::Json(parse_elements(other.clone())),
    }
}

fn parse_elements(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| parse_field(item).into_value())
                .collect(),
        ),
        other => other,
    }
}

/// Decodes every field of a multipart submission.
pub fn parse_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| {
            let parsed = parse_field(value);
            if parsed.is_raw() {
                tracing::trace!("Field '{}' is not JSON, keeping raw string", name);
            }
            (name.clone(), parsed.into_value())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quoted_string_is_unescaped() {
        assert_eq!(
            parse_field(&json!("\"Alice\"")),
            FieldValue::Json(json!("Alice"))
        );
    }

    #[test]
    fn test_invalid_json_keeps_raw_string() {
        assert_eq!(
            parse_field(&json!("not-json")),
            FieldValue::Raw("not-json".to_string())
        );
        assert_eq!(parse_field(&json!("not-json")).into_value(), json!("not-json"));
    }

    #[test]
    fn test_scalars_and_objects_decode() {
        assert_eq!(parse_field(&json!("42")), FieldValue::Json(json!(42)));
        assert_eq!(parse_field(&json!("true")), FieldValue::Json(json!(true)));
        assert_eq!(parse_field(&json!("null")), FieldValue::Json(json!(null)));
        assert_eq!(
            parse_field(&json!("{\"id\": 1}")),
            FieldValue::Json(json!({"id": 1}))
        );
    }

    #[test]
    fn test_non_string_values_pass_through() {
        assert_eq!(parse_field(&json!(3)), FieldValue::Json(json!(3)));
        assert_eq!(
            parse_field(&json!({"nested": "\"x\""})),
            FieldValue::Json(json!({"nested": "\"x\""}))
        );
    }

    #[test]
    fn test_array_elements_are_decoded_recursively() {
        // "[\"1\", \"[2]\", \"plain\"]" decodes to ["1", "[2]", "plain"], each element decoded again
        let parsed = parse_field(&json!("[\"1\", \"[2]\", \"plain\"]"));
        assert_eq!(parsed, FieldValue::Json(json!([1, [2], "plain"])));

        let parsed = parse_field(&json!(["{\"id\":1}", "oops"]));
        assert_eq!(parsed, FieldValue::Json(json!([{"id": 1}, "oops"])));
    }

    #[test]
    fn test_parse_fields_decodes_every_field() {
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!("\"Alice\""));
        fields.insert("slug".to_string(), json!("not-json"));
        fields.insert("cover".to_string(), json!("[1,3]"));

        let parsed = parse_fields(&fields);
        assert_eq!(parsed["name"], json!("Alice"));
        assert_eq!(parsed["slug"], json!("not-json"));
        assert_eq!(parsed["cover"], json!([1, 3]));
    }
}
