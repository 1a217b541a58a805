use serde_json::Value;
use tracing::{debug, warn};

use super::{ContentDict, FieldValue, EXPECTED_KEYS};

/// Minimum number of expected keys for a dictionary to be usable.
const MIN_PRESENT_KEYS: usize = 3;

/// Parse a classifier payload into a dictionary.
///
/// The payload is tried as-is first. If that fails, surrounding markdown
/// code fences are stripped and the parse is retried once. Returns `None`
/// when neither attempt yields a JSON object.
pub fn parse_structured_content(raw: &str) -> Option<ContentDict> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => return content_from_value(value),
        Err(e) => warn!(error = %e, payload = raw, "Structured content is not valid JSON, stripping fences"),
    }

    match serde_json::from_str::<Value>(strip_fences(raw)) {
        Ok(value) => content_from_value(value),
        Err(e) => {
            warn!(error = %e, payload = raw, "Structured content still invalid after cleanup");
            None
        }
    }
}

/// Accept a payload that is either an object or JSON text holding one.
pub fn content_from_value(value: Value) -> Option<ContentDict> {
    match value {
        Value::Object(map) => Some(
            map.into_iter()
                .map(|(key, v)| (key, FieldValue::from(v)))
                .collect(),
        ),
        Value::String(text) => parse_structured_content(&text),
        other => {
            warn!(payload = %other, "Structured content is not an object");
            None
        }
    }
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    body.strip_suffix("```").unwrap_or(body)
}

/// True when at least three of the expected keys are present.
pub fn validate_content(content: &ContentDict) -> bool {
    let missing: Vec<&str> = EXPECTED_KEYS
        .iter()
        .copied()
        .filter(|key| !content.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        debug!(?missing, "Classified content has missing keys");
    }
    EXPECTED_KEYS.len() - missing.len() >= MIN_PRESENT_KEYS
}

/// Fill every absent expected key with an explicit null.
pub fn add_default_values(content: &mut ContentDict) {
    for key in EXPECTED_KEYS {
        content.entry(key.to_string()).or_insert(FieldValue::Null);
    }
}

/// Parse, validate and complete a payload in one step.
pub fn repair_payload(raw: &str) -> Option<ContentDict> {
    let mut content = parse_structured_content(raw)?;
    if !validate_content(&content) {
        warn!(payload = raw, "Structured content has too few expected keys");
        return None;
    }
    add_default_values(&mut content);
    Some(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(keys: &[&str]) -> ContentDict {
        keys.iter()
            .map(|k| (k.to_string(), FieldValue::from("x")))
            .collect()
    }

    #[test]
    fn fenced_payload_matches_plain() {
        let fenced = parse_structured_content("```json\n{\"Metier\":\"x\"}\n```");
        let plain = parse_structured_content("{\"Metier\":\"x\"}");
        assert!(plain.is_some());
        assert_eq!(fenced, plain);
    }

    #[test]
    fn bare_fence_and_padding() {
        let parsed = parse_structured_content("  ```\n{\"Age\": 42}\n```  \n").unwrap();
        assert_eq!(parsed.get("Age"), Some(&FieldValue::Text("42".into())));
    }

    #[test]
    fn unrecoverable_payload() {
        assert!(parse_structured_content("Le salarié est tombé.").is_none());
        assert!(parse_structured_content("```json\n{\"Metier\": \n```").is_none());
    }

    #[test]
    fn non_object_rejected() {
        assert!(parse_structured_content("[1, 2, 3]").is_none());
        assert!(parse_structured_content("null").is_none());
    }

    #[test]
    fn value_types_map_to_variants() {
        let parsed = parse_structured_content(
            r#"{"Metier": ["maçon", "couvreur"], "Deces": true, "Cause": null, "Sexe": "F"}"#,
        )
        .unwrap();
        assert_eq!(
            parsed["Metier"],
            FieldValue::List(vec!["maçon".into(), "couvreur".into()])
        );
        assert_eq!(parsed["Deces"], FieldValue::Bool(true));
        assert_eq!(parsed["Cause"], FieldValue::Null);
        assert_eq!(parsed["Sexe"], FieldValue::from("F"));
    }

    #[test]
    fn object_value_accepted_directly() {
        let value = serde_json::json!({"Metier": "x", "Age": "30"});
        let parsed = content_from_value(value).unwrap();
        assert_eq!(parsed.len(), 2);

        let text = Value::String("{\"Metier\":\"x\"}".into());
        assert!(content_from_value(text).is_some());
    }

    #[test]
    fn three_keys_is_enough() {
        assert!(validate_content(&dict(&["Metier", "Sexe", "Age"])));
        assert!(validate_content(&dict(&["Cause", "Machine", "Suicide"])));
        assert!(!validate_content(&dict(&["Metier"])));
        assert!(!validate_content(&dict(&["Metier", "Zone", "Autre"])));
    }

    #[test]
    fn defaults_fill_without_overwrite() {
        let mut content = dict(&["Metier", "Age"]);
        add_default_values(&mut content);
        assert_eq!(content.len(), EXPECTED_KEYS.len());
        assert_eq!(content["Metier"], FieldValue::from("x"));
        assert_eq!(content["Age"], FieldValue::from("x"));
        for key in EXPECTED_KEYS.iter().filter(|k| !["Metier", "Age"].contains(*k)) {
            assert_eq!(content[*key], FieldValue::Null, "{key} should default to null");
        }
    }

    #[test]
    fn repair_rejects_sparse_payload() {
        assert!(repair_payload(r#"{"Metier": "x"}"#).is_none());
        let repaired = repair_payload(r#"{"Metier": "x", "Sexe": "M", "Age": "40"}"#).unwrap();
        assert_eq!(repaired["Cause"], FieldValue::Null);
    }
}
