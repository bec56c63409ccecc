//! In-memory document store. Reference backend for tests and the demo
//! server; evaluates the same filter grammar an external document database
//! would, behind the [`DocumentStore`] seam.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::store::{DocumentStore, FindOptions};

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    /// Per-collection fields enforced unique on insert/update.
    unique_fields: HashMap<String, Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare unique fields for a collection (builder style, at setup).
    pub fn with_unique(mut self, collection: &str, fields: &[&str]) -> Self {
        self.unique_fields
            .insert(collection.to_string(), fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Seed a collection directly, bypassing hooks. Test/demo helper.
    pub async fn seed(&self, collection: &str, docs: Vec<Value>) {
        let mut guard = self.collections.write().await;
        guard.entry(collection.to_string()).or_default().extend(docs);
    }

    fn check_unique(
        &self,
        collection: &str,
        docs: &[Value],
        candidate: &Map<String, Value>,
        skip_index: Option<usize>,
    ) -> Result<(), AppError> {
        let Some(fields) = self.unique_fields.get(collection) else {
            return Ok(());
        };
        for field in fields {
            let Some(value) = candidate.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            for (i, existing) in docs.iter().enumerate() {
                if Some(i) == skip_index {
                    continue;
                }
                if existing.get(field).map(|v| value_eq(v, value)).unwrap_or(false) {
                    return Err(AppError::Duplicate(field.clone()));
                }
            }
        }
        Ok(())
    }
}

/// 24-hex primary id, generated when a document arrives without one.
pub fn new_object_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    hex[..24].to_string()
}

fn resolve_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match (x, y) {
            (Value::Number(_), Value::Number(_)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(s), Value::String(t)) => s.cmp(t),
            (Value::Bool(s), Value::Bool(t)) => s.cmp(t),
            _ => rank(x).cmp(&rank(y)),
        },
    }
}

fn is_operator_clause(obj: &Map<String, Value>) -> bool {
    obj.keys().any(|k| k.starts_with('$'))
}

fn regex_matches(actual: Option<&Value>, pattern: &Value, options: Option<&Value>) -> bool {
    let Some(Value::String(actual)) = actual else {
        return false;
    };
    let Some(pattern) = pattern.as_str() else {
        return false;
    };
    let insensitive = options
        .and_then(Value::as_str)
        .map(|o| o.contains('i'))
        .unwrap_or(false);
    let full = if insensitive {
        format!("(?i){}", pattern)
    } else {
        pattern.to_string()
    };
    Regex::new(&full).map(|re| re.is_match(actual)).unwrap_or(false)
}

fn operators_match(actual: Option<&Value>, clause: &Map<String, Value>) -> bool {
    for (op, expected) in clause {
        let ok = match op.as_str() {
            "$gte" => actual.map(|a| compare(Some(a), Some(expected)) != Ordering::Less).unwrap_or(false),
            "$lte" => actual.map(|a| compare(Some(a), Some(expected)) != Ordering::Greater).unwrap_or(false),
            "$gt" => actual.map(|a| compare(Some(a), Some(expected)) == Ordering::Greater).unwrap_or(false),
            "$lt" => actual.map(|a| compare(Some(a), Some(expected)) == Ordering::Less).unwrap_or(false),
            "$ne" => actual.map(|a| !value_eq(a, expected)).unwrap_or(true),
            "$in" => expected
                .as_array()
                .map(|set| actual.map(|a| set.iter().any(|v| value_eq(a, v))).unwrap_or(false))
                .unwrap_or(false),
            "$nin" => expected
                .as_array()
                .map(|set| actual.map(|a| !set.iter().any(|v| value_eq(a, v))).unwrap_or(true))
                .unwrap_or(false),
            "$regex" => regex_matches(actual, expected, clause.get("$options")),
            "$options" => true,
            _ => false,
        };
        if !ok {
            return false;
        }
    }
    true
}

fn matches(doc: &Value, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, expected)| {
        if key == "$or" {
            return expected
                .as_array()
                .map(|clauses| {
                    clauses.iter().any(|c| {
                        c.as_object().map(|o| matches(doc, o)).unwrap_or(false)
                    })
                })
                .unwrap_or(false);
        }
        let actual = resolve_path(doc, key);
        match expected {
            Value::Object(obj) if is_operator_clause(obj) => operators_match(actual, obj),
            Value::Object(obj) => actual
                .map(|a| a.is_object() && matches(a, obj))
                .unwrap_or(false),
            other => actual.map(|a| value_eq(a, other)).unwrap_or(false),
        }
    })
}

fn project(doc: &Value, select: &[String]) -> Value {
    let Some(obj) = doc.as_object() else {
        return doc.clone();
    };
    let mut out = Map::new();
    if let Some(id) = obj.get("_id") {
        out.insert("_id".into(), id.clone());
    }
    for field in select {
        if let Some(v) = obj.get(field) {
            out.insert(field.clone(), v.clone());
        }
    }
    Value::Object(out)
}

/// Collection a reference field points at: `product_id` -> `product`.
fn referenced_collection(field: &str) -> &str {
    field.strip_suffix("_id").unwrap_or(field)
}

impl MemoryStore {
    fn apply_options(
        all: &HashMap<String, Vec<Value>>,
        mut rows: Vec<Value>,
        options: &FindOptions,
    ) -> Vec<Value> {
        if let Some(sort) = &options.sort {
            rows.sort_by(|a, b| {
                let ord = compare(resolve_path(a, &sort.field), resolve_path(b, &sort.field));
                if sort.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        let skip = options.skip.unwrap_or(0) as usize;
        let rows: Vec<Value> = rows
            .into_iter()
            .skip(skip)
            .take(options.limit.map(|l| l as usize).unwrap_or(usize::MAX))
            .collect();
        let mut rows: Vec<Value> = match &options.select {
            Some(select) => rows.iter().map(|d| project(d, select)).collect(),
            None => rows,
        };
        if let Some(populate) = &options.populate {
            for row in &mut rows {
                for field in populate {
                    let Some(reference) = row.get(field).cloned() else {
                        continue;
                    };
                    let target = referenced_collection(field);
                    let resolved = all.get(target).and_then(|docs| {
                        docs.iter()
                            .find(|d| d.get("_id").map(|id| value_eq(id, &reference)).unwrap_or(false))
                            .cloned()
                    });
                    if let (Some(obj), Some(resolved)) = (row.as_object_mut(), resolved) {
                        obj.insert(field.clone(), resolved);
                    }
                }
            }
        }
        rows
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        options: &FindOptions,
    ) -> Result<Vec<Value>, AppError> {
        let guard = self.collections.read().await;
        let rows: Vec<Value> = guard
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, filter)).cloned().collect())
            .unwrap_or_default();
        tracing::debug!(collection, matched = rows.len(), "find");
        Ok(Self::apply_options(&guard, rows, options))
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        options: &FindOptions,
    ) -> Result<Option<Value>, AppError> {
        let mut options = options.clone();
        options.limit = Some(1);
        options.skip = None;
        Ok(self.find(collection, filter, &options).await?.into_iter().next())
    }

    async fn count(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<u64, AppError> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn insert_one(
        &self,
        collection: &str,
        mut document: Map<String, Value>,
    ) -> Result<Value, AppError> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();
        self.check_unique(collection, docs, &document, None)?;
        document
            .entry("_id".to_string())
            .or_insert_with(|| Value::String(new_object_id()));
        let stored = Value::Object(document);
        docs.push(stored.clone());
        tracing::debug!(collection, "insert");
        Ok(stored)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        changes: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let mut guard = self.collections.write().await;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(None);
        };
        let Some(index) = docs.iter().position(|d| matches(d, filter)) else {
            return Ok(None);
        };
        let mut merged = docs[index]
            .as_object()
            .cloned()
            .unwrap_or_default();
        for (k, v) in changes {
            if k == "_id" {
                continue;
            }
            merged.insert(k.clone(), v.clone());
        }
        // split borrow: uniqueness check needs the full slice
        let snapshot: Vec<Value> = docs.clone();
        self.check_unique(collection, &snapshot, &merged, Some(index))?;
        docs[index] = Value::Object(merged);
        tracing::debug!(collection, "update");
        Ok(Some(docs[index].clone()))
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let mut guard = self.collections.write().await;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(None);
        };
        let Some(index) = docs.iter().position(|d| matches(d, filter)) else {
            return Ok(None);
        };
        tracing::debug!(collection, "delete");
        Ok(Some(docs.remove(index)))
    }
}
