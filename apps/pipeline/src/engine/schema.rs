#![allow(dead_code)]

//! Response schemas: the declared shape of a stage's structured LLM output.
//!
//! Every batch response is validated here exactly once. Missing or `null`
//! categories default to empty values; a category that is present with the
//! wrong shape is a `ParseError`, which drops that batch.

use serde_json::Value;

use crate::engine::reduce::{Category, Counter, PartialResult};
use crate::errors::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum CategoryKind {
    Counter,
    Set,
    Nested(Schema),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    categories: Vec<(String, CategoryKind)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(mut self, name: &str) -> Self {
        self.categories.push((name.to_string(), CategoryKind::Counter));
        self
    }

    pub fn set(mut self, name: &str) -> Self {
        self.categories.push((name.to_string(), CategoryKind::Set));
        self
    }

    pub fn nested(mut self, name: &str, schema: Schema) -> Self {
        self.categories
            .push((name.to_string(), CategoryKind::Nested(schema)));
        self
    }

    /// Every declared category with an empty value. Seeding a reduction with
    /// this keeps the aggregate's shape stable even when all batches are empty.
    pub fn empty(&self) -> PartialResult {
        let mut result = PartialResult::new();
        for (name, kind) in &self.categories {
            result.insert(name.clone(), empty_category(kind));
        }
        result
    }

    /// Validates a JSON value against this schema.
    pub fn parse(&self, value: &Value) -> Result<PartialResult, ParseError> {
        self.parse_at(value, "")
    }

    pub fn parse_str(&self, text: &str) -> Result<PartialResult, ParseError> {
        let value: Value = serde_json::from_str(text)?;
        self.parse(&value)
    }

    fn parse_at(&self, value: &Value, path: &str) -> Result<PartialResult, ParseError> {
        let Some(object) = value.as_object() else {
            return Err(ParseError::NotAnObject {
                path: if path.is_empty() { "$".to_string() } else { path.to_string() },
                found: type_name(value),
            });
        };

        let mut result = PartialResult::new();
        for (name, kind) in &self.categories {
            let child_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{path}.{name}")
            };
            let category = match object.get(name) {
                None | Some(Value::Null) => empty_category(kind),
                Some(raw) => parse_category(kind, raw, &child_path)?,
            };
            result.insert(name.clone(), category);
        }
        Ok(result)
    }
}

fn empty_category(kind: &CategoryKind) -> Category {
    match kind {
        CategoryKind::Counter => Category::Counter(Counter::default()),
        CategoryKind::Set => Category::Set(Vec::new()),
        CategoryKind::Nested(schema) => Category::Nested(schema.empty()),
    }
}

fn parse_category(kind: &CategoryKind, raw: &Value, path: &str) -> Result<Category, ParseError> {
    match kind {
        CategoryKind::Counter => {
            let object = raw.as_object().ok_or_else(|| ParseError::WrongShape {
                path: path.to_string(),
                expected: "an object of counts",
                found: type_name(raw),
            })?;
            Ok(Category::Counter(Counter::from_pairs(
                object.iter().map(|(k, v)| (k.as_str(), coerce_count(v))),
            )))
        }
        CategoryKind::Set => {
            let items = raw.as_array().ok_or_else(|| ParseError::WrongShape {
                path: path.to_string(),
                expected: "a list of strings",
                found: type_name(raw),
            })?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => out.push(s.clone()),
                    Value::Number(n) => out.push(n.to_string()),
                    Value::Bool(b) => out.push(b.to_string()),
                    Value::Null => {}
                    other => {
                        return Err(ParseError::WrongShape {
                            path: path.to_string(),
                            expected: "a list of strings",
                            found: type_name(other),
                        })
                    }
                }
            }
            Ok(Category::Set(out))
        }
        CategoryKind::Nested(schema) => Ok(Category::Nested(schema.parse_at(raw, path)?)),
    }
}

/// Non-numeric counts coerce to zero instead of failing the batch.
fn coerce_count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
