use super::{bool_text, ContentDict, FieldValue, NormalizedDict, NOT_SPECIFIED, NO, NULL_TEXT, YES};

const MALE: &[&str] = &["homme", "masculin", "male", "m"];
const FEMALE: &[&str] = &["femme", "feminin", "female", "f"];

/// Canonical body zones, checked in order. `epaule` resolves to `dos`.
const ZONES: &[(&str, &[&str])] = &[
    ("tete", &["crane", "visage", "cou", "cerveau"]),
    ("torse", &["poitrine", "torse", "poumon"]),
    ("ventre", &["ventre", "estomac"]),
    ("dos", &["dos", "epaule"]),
    ("bras", &["bras", "coude", "epaule"]),
    ("main", &["main", "doigt", "poignet"]),
    ("jambe", &["genou", "cuisse", "mollet", "tibia"]),
    ("pied", &["pied", "cheville"]),
    ("posterieur", &["fesses"]),
    ("coeur", &["coeur"]),
];

pub const UNKNOWN_ZONE: &str = "NA";

/// Lists are joined, anything else is stringified. A null profession is
/// kept as `None` text, not the sentinel.
pub fn profession(value: &FieldValue) -> String {
    match value {
        FieldValue::List(items) => items.join(", "),
        FieldValue::Text(text) => text.clone(),
        FieldValue::Bool(b) => bool_text(*b).to_string(),
        FieldValue::Null => NULL_TEXT.to_string(),
    }
}

/// Map free-text sex to `Homme`/`Femme`, or `None` when unrecognised.
/// Only text can match; lists, booleans and null never do.
pub fn sex(value: &FieldValue) -> Option<&'static str> {
    let FieldValue::Text(raw) = value else {
        return None;
    };
    let key = raw
        .to_lowercase()
        .replace(',', "")
        .replace('é', "e")
        .replace("ou", "")
        .replace("or", "")
        .replace(' ', "");

    if MALE.contains(&key.as_str()) {
        Some("Homme")
    } else if FEMALE.contains(&key.as_str()) {
        Some("Femme")
    } else {
        None
    }
}

pub fn zone(value: &FieldValue) -> &'static str {
    let FieldValue::Text(text) = value else {
        return UNKNOWN_ZONE;
    };
    let key = text.to_lowercase();
    ZONES
        .iter()
        .find(|(name, keywords)| *name == key || keywords.contains(&key.as_str()))
        .map(|(name, _)| *name)
        .unwrap_or(UNKNOWN_ZONE)
}

/// Rule for every key without a dedicated normalizer.
pub fn generic(value: &FieldValue) -> String {
    match value {
        FieldValue::List(items) => items.join(", "),
        FieldValue::Null => NOT_SPECIFIED.to_string(),
        FieldValue::Bool(true) => YES.to_string(),
        FieldValue::Bool(false) => NO.to_string(),
        FieldValue::Text(text) => text.clone(),
    }
}

/// Normalize every entry of a classified dictionary.
pub fn standardize(content: &ContentDict) -> NormalizedDict {
    content
        .iter()
        .map(|(key, value)| {
            let normalized = match key.as_str() {
                "Sexe" => sex(value).map(str::to_string),
                "Metier" => Some(profession(value)),
                "Zone" => Some(zone(value).to_string()),
                _ => Some(generic(value)),
            };
            (key.clone(), normalized)
        })
        .collect()
}
