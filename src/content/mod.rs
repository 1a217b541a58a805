pub mod normalize;
pub mod repair;

use std::collections::BTreeMap;

use serde_json::Value;

/// Keys a classified narrative is expected to carry.
pub const EXPECTED_KEYS: [&str; 11] = [
    "Metier",
    "Sexe",
    "Age",
    "Type_accident",
    "Blessure",
    "Deces",
    "Circulation",
    "Malaise",
    "Suicide",
    "Machine",
    "Cause",
];

/// Optional body-zone key, normalized but never defaulted.
pub const ZONE_KEY: &str = "Zone";

pub const NOT_SPECIFIED: &str = "Non spécifié";
pub const YES: &str = "Oui";
pub const NO: &str = "Non";

/// Plain-text spellings of null and booleans when a value is stringified
/// rather than mapped to a sentinel.
pub const NULL_TEXT: &str = "None";

pub fn bool_text(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

/// One value of a classified dictionary before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Bool(bool),
    Null,
}

/// Raw dictionary as produced by the classifier.
pub type ContentDict = BTreeMap<String, FieldValue>;

/// Dictionary after normalization. Only `Sexe` may hold `None`.
pub type NormalizedDict = BTreeMap<String, Option<String>>;

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => FieldValue::List(items.into_iter().map(scalar_text).collect()),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

fn scalar_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => NULL_TEXT.to_string(),
        Value::Bool(b) => bool_text(b).to_string(),
        other => other.to_string(),
    }
}
