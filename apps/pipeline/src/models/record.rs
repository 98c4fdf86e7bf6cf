//! Record: a loosely-typed job posting as returned by the search provider.
//!
//! No fixed schema: unknown fields are kept untouched. A handful of fields
//! are required by convention and get default values when absent.

use serde_json::{Map, Value};

pub type Record = Map<String, Value>;

pub const DEFAULT_TITLE: &str = "Unknown Title";
pub const DEFAULT_COMPANY: &str = "Unknown Company";
pub const DEFAULT_LOCATION: &str = "Unknown Location";
pub const DEFAULT_DESCRIPTION: &str = "No description available";
pub const DEFAULT_TYPE: &str = "Not specified";

const REQUIRED_FIELDS: [(&str, &str); 5] = [
    ("title", DEFAULT_TITLE),
    ("company_name", DEFAULT_COMPANY),
    ("location", DEFAULT_LOCATION),
    ("description", DEFAULT_DESCRIPTION),
    ("type", DEFAULT_TYPE),
];

/// Turns a raw search result into a `Record` with the conventional fields
/// filled in. A bare string is treated as a description. Anything else
/// (numbers, lists) is not a posting and yields `None`.
pub fn normalize(raw: Value) -> Option<Record> {
    let mut record = match raw {
        Value::Object(map) => map,
        Value::String(text) => {
            let mut map = Map::new();
            map.insert("description".to_string(), Value::String(text));
            map
        }
        _ => return None,
    };

    for (field, default) in REQUIRED_FIELDS {
        let missing = match record.get(field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if missing {
            record.insert(field.to_string(), Value::String(default.to_string()));
        }
    }
    Some(record)
}

/// String view of a field; non-string values render as compact JSON.
pub fn text_field(record: &Record, field: &str) -> String {
    match record.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Identity used to drop duplicate postings across searches.
pub fn dedup_key(record: &Record) -> String {
    format!(
        "{}|{}|{}",
        text_field(record, "company_name"),
        text_field(record, "title"),
        text_field(record, "location")
    )
}

/// Flattened text used for retrieval indexing.
pub fn document_text(record: &Record) -> String {
    let salary = match record.get("salary") {
        None | Some(Value::Null) => DEFAULT_TYPE.to_string(),
        Some(_) => text_field(record, "salary"),
    };
    format!(
        "Title: {}\nCompany: {}\nLocation: {}\nSalary: {}\nDescription: {}",
        text_field(record, "title"),
        text_field(record, "company_name"),
        text_field(record, "location"),
        salary,
        text_field(record, "description"),
    )
}

/// Numeric salary, if the posting carries one as a number.
pub fn salary(record: &Record) -> Option<f64> {
    record
        .get("salary")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite() && *s > 0.0)
}

/// First `max_chars` characters of `text`, with "..." appended when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

const AI_TERMS: [&str; 7] = ["ai", "ml", "llm", "nlp", "genai", "mlops", "gpt"];
const AI_PHRASES: [&str; 5] = [
    "artificial intelligence",
    "machine learning",
    "deep learning",
    "computer vision",
    "data scientist",
];

/// True when the title names an AI/ML role.
pub fn is_ai_role(record: &Record) -> bool {
    let title = text_field(record, "title").to_lowercase();
    if AI_PHRASES.iter().any(|p| title.contains(p)) {
        return true;
    }
    title
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| AI_TERMS.contains(&word))
}

/// True when the posting advertises remote work.
pub fn is_remote(record: &Record) -> bool {
    let wfh = record
        .get("detected_extensions")
        .and_then(|ext| ext.get("work_from_home"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if wfh {
        return true;
    }
    let location = text_field(record, "location").to_lowercase();
    location.contains("remote") || location.contains("anywhere")
}
