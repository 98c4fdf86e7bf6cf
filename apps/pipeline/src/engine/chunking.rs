#![allow(dead_code)]

//! Chunk Planner: splits a list or keyed mapping into size-bounded chunks
//! for submission to a size-limited text-generation service.
//!
//! Sizes are compact-JSON byte lengths and include brackets, separators and
//! (for mappings) the keys themselves, so a non-oversized chunk serialises to
//! at most `max_size` bytes.
//!
//! Items too large to fit even alone are never split across chunks with
//! other items. They are emitted on their own and shrunk on a best-effort
//! basis, and the chunk is flagged `oversized`:
//! - list item that is an object: string fields truncated to `max_size / 2`
//! - any other list item: its text truncated to `max_size`
//! - mapping value that is a list: packed into sub-lists that fit the budget
//!   together with their key, so at least ⌈size / max_size⌉ of them
//! - mapping value that is an object: planned recursively, each piece
//!   re-wrapped under its key
//! - mapping value that is an empty list or object under a key too long to
//!   fit: emitted whole
//! - mapping value that is a string or scalar: text truncated to `max_size`

use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkPayload {
    Items(Vec<Value>),
    Fragment(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    payload: ChunkPayload,
    size: usize,
    oversized: bool,
}

impl Chunk {
    fn items(items: Vec<Value>, oversized: bool) -> Self {
        let payload = ChunkPayload::Items(items);
        let size = payload_size(&payload);
        Self {
            payload,
            size,
            oversized,
        }
    }

    fn fragment(map: Map<String, Value>, oversized: bool) -> Self {
        let payload = ChunkPayload::Fragment(map);
        let size = payload_size(&payload);
        Self {
            payload,
            size,
            oversized,
        }
    }

    pub fn payload(&self) -> &ChunkPayload {
        &self.payload
    }

    /// Serialised size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// True when the chunk holds a single item that could not fit the budget.
    pub fn is_oversized(&self) -> bool {
        self.oversized
    }

    pub fn len(&self) -> usize {
        match &self.payload {
            ChunkPayload::Items(items) => items.len(),
            ChunkPayload::Fragment(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_value(&self) -> Value {
        match &self.payload {
            ChunkPayload::Items(items) => Value::Array(items.clone()),
            ChunkPayload::Fragment(map) => Value::Object(map.clone()),
        }
    }
}

/// Compact JSON length of a value.
pub fn serialized_size(value: &Value) -> usize {
    // Serialising a `Value` cannot fail: keys are always strings.
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}

/// Splits `collection` into chunks bounded by `max_size` bytes.
///
/// Arrays are packed item by item, objects entry by entry, both greedily and
/// in input order. `null` is an empty collection; any other scalar is treated
/// as a one-item list.
pub fn plan(collection: &Value, max_size: usize) -> Vec<Chunk> {
    let max_size = max_size.max(1);
    match collection {
        Value::Null => Vec::new(),
        Value::Array(items) => plan_list(items, max_size),
        Value::Object(map) => plan_mapping(map, max_size),
        scalar => plan_list(std::slice::from_ref(scalar), max_size),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// List input
// ────────────────────────────────────────────────────────────────────────────

fn plan_list(items: &[Value], max_size: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<Value> = Vec::new();
    // "[]": two bytes of brackets before any item is added.
    let mut current_size = 2;

    for (position, item) in items.iter().enumerate() {
        let item_size = serialized_size(item);

        if 2 + item_size > max_size {
            flush_items(&mut chunks, &mut current, &mut current_size);
            warn!(
                "List item {} is {} bytes (budget {}), truncating into its own chunk",
                position, item_size, max_size
            );
            chunks.push(Chunk::items(vec![shrink_list_item(item, max_size)], true));
            continue;
        }

        let separator = usize::from(!current.is_empty());
        if current_size + separator + item_size > max_size {
            flush_items(&mut chunks, &mut current, &mut current_size);
            current.push(item.clone());
            current_size += item_size;
        } else {
            current.push(item.clone());
            current_size += separator + item_size;
        }
    }

    flush_items(&mut chunks, &mut current, &mut current_size);
    chunks
}

fn flush_items(chunks: &mut Vec<Chunk>, current: &mut Vec<Value>, current_size: &mut usize) {
    if !current.is_empty() {
        chunks.push(Chunk::items(std::mem::take(current), false));
    }
    *current_size = 2;
}

fn shrink_list_item(item: &Value, max_size: usize) -> Value {
    match item {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => Value::String(truncate_str(s, max_size / 2).to_string()),
                        other => other.clone(),
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        other => Value::String(truncate_str(&value_text(other), max_size).to_string()),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Keyed-mapping input
// ────────────────────────────────────────────────────────────────────────────

fn plan_mapping(map: &Map<String, Value>, max_size: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Map<String, Value> = Map::new();
    let mut current_size = 2;

    for (key, value) in map {
        let entry_size = entry_size(key, value);

        if 2 + entry_size > max_size {
            flush_fragment(&mut chunks, &mut current, &mut current_size);
            warn!(
                "Value under '{}' is {} bytes (budget {}), splitting",
                key, entry_size, max_size
            );
            chunks.extend(split_oversized_value(key, value, max_size));
            continue;
        }

        let separator = usize::from(!current.is_empty());
        if current_size + separator + entry_size > max_size {
            flush_fragment(&mut chunks, &mut current, &mut current_size);
            current.insert(key.clone(), value.clone());
            current_size += entry_size;
        } else {
            current.insert(key.clone(), value.clone());
            current_size += separator + entry_size;
        }
    }

    flush_fragment(&mut chunks, &mut current, &mut current_size);
    chunks
}

fn flush_fragment(
    chunks: &mut Vec<Chunk>,
    current: &mut Map<String, Value>,
    current_size: &mut usize,
) {
    if !current.is_empty() {
        chunks.push(Chunk::fragment(std::mem::take(current), false));
    }
    *current_size = 2;
}

fn split_oversized_value(key: &str, value: &Value, max_size: usize) -> Vec<Chunk> {
    // Pieces are planned against what is left once wrapped as `{"key":...}`.
    let overhead = 3 + serialized_size(&Value::String(key.to_string()));
    let budget = max_size.saturating_sub(overhead);

    let pieces = match value {
        Value::Array(items) if budget > 2 => plan_list(items, budget),
        Value::Object(inner) if budget > 2 => plan_mapping(inner, budget),
        Value::Array(_) | Value::Object(_) => Vec::new(),
        other => {
            let text = value_text(other);
            let fragment = single_entry(key, Value::String(truncate_str(&text, max_size).to_string()));
            return vec![Chunk::fragment(fragment, true)];
        }
    };

    // Empty collections and keys that leave no room are emitted whole.
    if pieces.is_empty() {
        return vec![Chunk::fragment(single_entry(key, value.clone()), true)];
    }

    pieces
        .into_iter()
        .map(|piece| {
            let single = piece.len() == 1;
            let wrapped = single_entry(key, piece.to_value());
            let oversized = piece.oversized || (single && payload_size_of_map(&wrapped) > max_size);
            Chunk::fragment(wrapped, oversized)
        })
        .collect()
}

fn single_entry(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}

// ────────────────────────────────────────────────────────────────────────────
// Size helpers
// ────────────────────────────────────────────────────────────────────────────

/// Bytes an entry adds to an object: `"key":value`.
fn entry_size(key: &str, value: &Value) -> usize {
    serialized_size(&Value::String(key.to_string())) + 1 + serialized_size(value)
}

fn payload_size(payload: &ChunkPayload) -> usize {
    match payload {
        ChunkPayload::Items(items) => {
            2 + items.iter().map(serialized_size).sum::<usize>() + items.len().saturating_sub(1)
        }
        ChunkPayload::Fragment(map) => payload_size_of_map(map),
    }
}

fn payload_size_of_map(map: &Map<String, Value>) -> usize {
    2 + map.iter().map(|(k, v)| entry_size(k, v)).sum::<usize>() + map.len().saturating_sub(1)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Longest prefix of `s` that is at most `max_bytes` long and ends on a char boundary.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn posting(i: usize, description_len: usize) -> Value {
        json!({
            "title": format!("Engineer {i}"),
            "description": "x".repeat(description_len),
        })
    }

    #[test]
    fn test_empty_collections_produce_no_chunks() {
        assert!(plan(&json!([]), 100).is_empty());
        assert!(plan(&json!({}), 100).is_empty());
        assert!(plan(&Value::Null, 100).is_empty());
    }

    #[test]
    fn test_list_chunks_respect_budget_and_order() {
        let items: Vec<Value> = (0..40).map(|i| posting(i, 50)).collect();
        let chunks = plan(&Value::Array(items.clone()), 400);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_oversized());
            assert!(chunk.size() <= 400, "chunk of {} bytes", chunk.size());
            assert_eq!(chunk.size(), serialized_size(&chunk.to_value()));
        }

        let flattened: Vec<Value> = chunks
            .iter()
            .flat_map(|c| match c.to_value() {
                Value::Array(items) => items,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(flattened, items);
    }

    #[test]
    fn test_oversized_list_item_gets_own_truncated_chunk() {
        let items = vec![posting(0, 10), posting(1, 1000), posting(2, 10)];
        let chunks = plan(&Value::Array(items), 200);

        assert_eq!(chunks.len(), 3);
        assert!(!chunks[0].is_oversized());
        assert!(chunks[1].is_oversized());
        assert!(!chunks[2].is_oversized());

        let ChunkPayload::Items(big) = chunks[1].payload() else {
            panic!("expected list chunk");
        };
        let description = big[0]["description"].as_str().unwrap();
        assert_eq!(description.len(), 100);
        assert_eq!(big[0]["title"], "Engineer 1");
    }

    #[test]
    fn test_oversized_scalar_list_item_is_truncated_to_budget() {
        let chunks = plan(&json!(["y".repeat(500)]), 100);
        assert_eq!(chunks.len(), 1);
        let ChunkPayload::Items(items) = chunks[0].payload() else {
            panic!("expected list chunk");
        };
        assert_eq!(items[0].as_str().unwrap().len(), 100);
    }

    #[test]
    fn test_mapping_chunks_respect_budget() {
        let mut map = Map::new();
        for i in 0..20 {
            map.insert(format!("aspect_{i}"), json!("insight ".repeat(5)));
        }
        let chunks = plan(&Value::Object(map.clone()), 200);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.size() <= 200);
            assert_eq!(chunk.size(), serialized_size(&chunk.to_value()));
        }
        let total: usize = chunks.iter().map(Chunk::len).sum();
        assert_eq!(total, map.len());
    }

    #[test]
    fn test_oversized_list_value_is_subdivided() {
        let items: Vec<Value> = (0..30).map(|i| json!(format!("skill-number-{i:03}"))).collect();
        let value = json!({ "skills": items });
        let value_size = serialized_size(&value["skills"]);
        let chunks = plan(&value, 200);

        assert!(chunks.len() >= value_size.div_ceil(200));
        for chunk in &chunks {
            let pieces = chunk.to_value()["skills"].as_array().unwrap().len();
            assert!(pieces > 1);
            assert!(!chunk.is_oversized());
            assert!(chunk.size() <= 200, "chunk of {} bytes", chunk.size());
            assert_eq!(chunk.size(), serialized_size(&chunk.to_value()));
        }

        let rebuilt: Vec<Value> = chunks
            .iter()
            .flat_map(|c| match c.to_value() {
                Value::Object(map) => map["skills"].as_array().unwrap().clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(rebuilt.len(), 30);
        assert_eq!(rebuilt[0], "skill-number-000");
        assert_eq!(rebuilt[29], "skill-number-029");
    }

    #[test]
    fn test_empty_value_under_long_key_is_kept() {
        let long_key = "k".repeat(300);
        let mut map = Map::new();
        map.insert(long_key.clone(), json!([]));
        map.insert("nested".repeat(30), json!({}));
        map.insert("x".to_string(), json!(1));

        let chunks = plan(&Value::Object(map), 100);

        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].is_oversized());
        assert_eq!(chunks[0].to_value()[&long_key], json!([]));
        assert!(chunks[1].is_oversized());
        assert_eq!(chunks[1].to_value()["nested".repeat(30)], json!({}));
        assert_eq!(chunks[2].to_value(), json!({"x": 1}));
    }

    #[test]
    fn test_oversized_string_value_is_truncated() {
        let value = json!({ "summary": "z".repeat(1000) });
        let chunks = plan(&value, 100);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_oversized());
        let ChunkPayload::Fragment(map) = chunks[0].payload() else {
            panic!("expected mapping chunk");
        };
        assert_eq!(map["summary"].as_str().unwrap().len(), 100);
    }

    #[test]
    fn test_oversized_nested_mapping_is_planned_recursively() {
        let mut inner = Map::new();
        for i in 0..10 {
            inner.insert(format!("k{i}"), json!("v".repeat(30)));
        }
        let value = json!({ "before": 1, "insights": inner, "after": 2 });
        let chunks = plan(&value, 150);

        // Order is preserved: "before" flushed first, "after" last.
        assert_eq!(chunks.first().unwrap().to_value(), json!({"before": 1}));
        assert_eq!(chunks.last().unwrap().to_value(), json!({"after": 2}));

        let inner_keys: usize = chunks[1..chunks.len() - 1]
            .iter()
            .map(|c| c.to_value()["insights"].as_object().unwrap().len())
            .sum();
        assert_eq!(inner_keys, 10);
        for chunk in &chunks {
            assert!(chunk.is_oversized() || chunk.size() <= 150);
        }
    }

    #[test]
    fn test_truncate_str_respects_char_boundaries() {
        let s = "héllo";
        assert_eq!(truncate_str(s, 2), "h");
        assert_eq!(truncate_str(s, 3), "hé");
        assert_eq!(truncate_str(s, 100), s);
    }
}
