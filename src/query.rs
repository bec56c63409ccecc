//! Query-string translation: flat key/value pairs into a structured filter,
//! pagination, sort, and projection specification.
//!
//! Non-reserved keys become filter fields. Operator suffixes map to the
//! store's comparison operators; values go through [`parse_value`] so query
//! strings can carry numbers, booleans, and small JSON literals without
//! special client-side encoding.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Keys that shape the query instead of filtering content. Never become
/// filter fields.
pub const RESERVED_KEYS: &[&str] = &[
    "page", "limit", "sort", "search", "id", "fields", "populate", "select", "skip", "offset",
];

#[derive(Clone, Debug, PartialEq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    pub fn skip(&self) -> u64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl SortSpec {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix('-') {
            Some(field) if !field.is_empty() => SortSpec {
                field: field.into(),
                descending: true,
            },
            _ if !raw.is_empty() => SortSpec {
                field: raw.into(),
                descending: false,
            },
            _ => SortSpec::default(),
        }
    }
}

/// Fully translated query: filter plus the reserved-key directives.
#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    pub filter: Map<String, Value>,
    pub pagination: Option<PageRequest>,
    pub sort: SortSpec,
    pub search: Option<String>,
    pub id: Option<String>,
    pub select: Option<Vec<String>>,
    pub populate: Option<Vec<String>>,
}

impl Default for SortSpec {
    fn default() -> Self {
        SortSpec {
            field: "createdAt".into(),
            descending: true,
        }
    }
}

/// Coerce a raw query value: numeric strings become numbers, `true`/`false`
/// (any case) become booleans, anything else is tried as JSON and falls back
/// to the raw string.
pub fn parse_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn object_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[0-9a-fA-F]{24}$").expect("static pattern"))
}

/// Build a filter for an id value: 24-hex strings address the primary `_id`,
/// numeric strings the secondary integer `id`, anything else the generic
/// string `id`.
pub fn id_filter(raw: &str) -> Map<String, Value> {
    let mut out = Map::new();
    if object_id_pattern().is_match(raw) {
        out.insert("_id".into(), Value::String(raw.to_string()));
    } else if let Ok(n) = raw.parse::<i64>() {
        out.insert("id".into(), Value::Number(n.into()));
    } else {
        out.insert("id".into(), Value::String(raw.to_string()));
    }
    out
}

fn comparison_suffix(key: &str) -> Option<(&str, &'static str)> {
    for (suffix, op) in [
        ("__gte", "$gte"),
        ("__lte", "$lte"),
        ("__gt", "$gt"),
        ("__lt", "$lt"),
        ("__ne", "$ne"),
    ] {
        if let Some(field) = key.strip_suffix(suffix) {
            if !field.is_empty() {
                return Some((field, op));
            }
        }
    }
    None
}

fn membership_suffix(key: &str) -> Option<(&str, &'static str)> {
    for (suffix, op) in [("__in", "$in"), ("__nin", "$nin")] {
        if let Some(field) = key.strip_suffix(suffix) {
            if !field.is_empty() {
                return Some((field, op));
            }
        }
    }
    None
}

/// Merge an operator clause into the filter, combining with any operator
/// object already present for the field (so `a__gte=1&a__lte=5` forms a
/// closed range).
fn insert_operator(filter: &mut Map<String, Value>, field: &str, op: &str, value: Value) {
    match filter.get_mut(field) {
        Some(Value::Object(existing)) => {
            existing.insert(op.to_string(), value);
        }
        _ => {
            let mut clause = Map::new();
            clause.insert(op.to_string(), value);
            filter.insert(field.to_string(), Value::Object(clause));
        }
    }
}

/// Build a nested object path for a dotted key, merging into existing
/// intermediate objects.
fn insert_nested(filter: &mut Map<String, Value>, path: &str, value: Value) {
    let mut parts = path.split('.').peekable();
    let mut current = filter;
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            current.insert(part.to_string(), value);
            return;
        }
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry.as_object_mut().expect("just ensured object");
    }
}

fn parse_positive(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().filter(|n| *n >= 1)
}

fn csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Translate the full set of query parameters for a collection with the
/// given searchable text fields. `id` takes precedence over `search`: a
/// direct lookup disables substring search entirely.
///
/// Operator suffixes for one field merge into a single clause; a plain
/// equality key for the same field is applied afterwards and wins,
/// regardless of parameter order.
pub fn translate(params: &HashMap<String, String>, searchable_fields: &[String]) -> ListQuery {
    let mut query = ListQuery::default();
    let mut filter = Map::new();
    let mut equalities: Vec<(&String, &String)> = Vec::new();

    for (key, raw) in params {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some((field, op)) = comparison_suffix(key) {
            insert_operator(&mut filter, field, op, parse_value(raw));
        } else if let Some((field, op)) = membership_suffix(key) {
            let values: Vec<Value> = raw.split(',').map(|v| parse_value(v.trim())).collect();
            insert_operator(&mut filter, field, op, Value::Array(values));
        } else if let Some(field) = key.strip_suffix("__regex") {
            if !field.is_empty() {
                insert_operator(&mut filter, field, "$regex", Value::String(raw.clone()));
                insert_operator(&mut filter, field, "$options", Value::String("i".into()));
            }
        } else {
            equalities.push((key, raw));
        }
    }
    for (key, raw) in equalities {
        if key.contains('.') {
            insert_nested(&mut filter, key, parse_value(raw));
        } else {
            filter.insert(key.clone(), parse_value(raw));
        }
    }

    query.id = params.get("id").cloned().filter(|s| !s.is_empty());
    if let Some(id) = &query.id {
        for (k, v) in id_filter(id) {
            filter.insert(k, v);
        }
    }

    query.search = params.get("search").cloned().filter(|s| !s.is_empty());
    if query.id.is_none() {
        if let Some(term) = &query.search {
            if !searchable_fields.is_empty() {
                let clauses: Vec<Value> = searchable_fields
                    .iter()
                    .map(|f| json!({ f: { "$regex": term, "$options": "i" } }))
                    .collect();
                filter.insert("$or".into(), Value::Array(clauses));
            }
        }
    }

    let page = params.get("page").and_then(|v| parse_positive(v));
    let limit = params.get("limit").and_then(|v| parse_positive(v));
    if let (Some(page), Some(limit)) = (page, limit) {
        query.pagination = Some(PageRequest { page, limit });
    }

    if let Some(raw) = params.get("sort").filter(|s| !s.is_empty()) {
        query.sort = SortSpec::parse(raw);
    }

    query.select = params
        .get("select")
        .or_else(|| params.get("fields"))
        .map(|raw| csv_list(raw))
        .filter(|v| !v.is_empty());
    query.populate = params
        .get("populate")
        .map(|raw| csv_list(raw))
        .filter(|v| !v.is_empty());

    query.filter = filter;
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn coerces_numbers_booleans_and_json() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("4.5"), json!(4.5));
        assert_eq!(parse_value("TRUE"), json!(true));
        assert_eq!(parse_value("false"), json!(false));
        assert_eq!(parse_value("[1,2]"), json!([1, 2]));
        assert_eq!(parse_value("plain"), json!("plain"));
    }

    #[test]
    fn range_suffixes_merge_into_closed_range() {
        let q = translate(&params(&[("price__gte", "10"), ("price__lte", "50")]), &[]);
        assert_eq!(q.filter["price"], json!({"$gte": 10, "$lte": 50}));
    }

    #[test]
    fn membership_suffix_splits_and_coerces() {
        let q = translate(&params(&[("category__in", "a,b"), ("n__nin", "1,2")]), &[]);
        assert_eq!(q.filter["category"], json!({"$in": ["a", "b"]}));
        assert_eq!(q.filter["n"], json!({"$nin": [1, 2]}));
    }

    #[test]
    fn plain_equality_wins_over_operator_clauses() {
        // map iteration order must not decide the outcome
        for _ in 0..16 {
            let q = translate(&params(&[("price", "5"), ("price__gte", "1")]), &[]);
            assert_eq!(q.filter["price"], json!(5));
        }
    }

    #[test]
    fn regex_suffix_is_case_insensitive() {
        let q = translate(&params(&[("name__regex", "phone")]), &[]);
        assert_eq!(q.filter["name"], json!({"$regex": "phone", "$options": "i"}));
    }

    #[test]
    fn dotted_keys_build_nested_paths() {
        let q = translate(&params(&[("profile.city", "Pune")]), &[]);
        assert_eq!(q.filter["profile"], json!({"city": "Pune"}));
    }

    #[test]
    fn reserved_keys_never_become_filters() {
        let q = translate(
            &params(&[("page", "1"), ("limit", "5"), ("skip", "9"), ("offset", "3")]),
            &[],
        );
        assert!(q.filter.is_empty());
        assert_eq!(q.pagination, Some(PageRequest { page: 1, limit: 5 }));
    }

    #[test]
    fn pagination_requires_both_fields_at_least_one() {
        assert!(translate(&params(&[("page", "2")]), &[]).pagination.is_none());
        assert!(translate(&params(&[("page", "0"), ("limit", "10")]), &[])
            .pagination
            .is_none());
        assert!(translate(&params(&[("page", "x"), ("limit", "10")]), &[])
            .pagination
            .is_none());
        let q = translate(&params(&[("page", "3"), ("limit", "10")]), &[]);
        assert_eq!(q.pagination.as_ref().unwrap().skip(), 20);
    }

    #[test]
    fn id_forms() {
        let hex = "64f1a2b3c4d5e6f708192a3b";
        assert_eq!(id_filter(hex)["_id"], json!(hex));
        assert_eq!(id_filter("17")["id"], json!(17));
        assert_eq!(id_filter("U1")["id"], json!("U1"));
    }

    #[test]
    fn id_takes_precedence_over_search() {
        let searchable = vec!["name".to_string(), "description".to_string()];
        let q = translate(
            &params(&[("id", "64f1a2b3c4d5e6f708192a3b"), ("search", "phone")]),
            &searchable,
        );
        assert!(q.filter.get("$or").is_none());
        assert_eq!(q.filter["_id"], json!("64f1a2b3c4d5e6f708192a3b"));
    }

    #[test]
    fn search_expands_over_searchable_fields() {
        let searchable = vec!["name".to_string(), "description".to_string()];
        let q = translate(&params(&[("search", "phone")]), &searchable);
        let or = q.filter["$or"].as_array().unwrap();
        assert_eq!(or.len(), 2);
        assert_eq!(or[0]["name"]["$regex"], json!("phone"));
    }

    #[test]
    fn search_without_searchable_fields_is_dropped() {
        let q = translate(&params(&[("search", "phone")]), &[]);
        assert!(q.filter.get("$or").is_none());
        assert_eq!(q.search.as_deref(), Some("phone"));
    }

    #[test]
    fn sort_prefix_controls_direction() {
        let q = translate(&params(&[("sort", "-price")]), &[]);
        assert!(q.sort.descending);
        assert_eq!(q.sort.field, "price");
        let q = translate(&params(&[("sort", "name")]), &[]);
        assert!(!q.sort.descending);
        let q = translate(&params(&[]), &[]);
        assert_eq!(q.sort, SortSpec::default());
    }

    #[test]
    fn select_and_populate_are_split() {
        let q = translate(
            &params(&[("select", "name,price"), ("populate", "product_id")]),
            &[],
        );
        assert_eq!(q.select.as_deref(), Some(&["name".to_string(), "price".to_string()][..]));
        assert_eq!(q.populate.as_deref(), Some(&["product_id".to_string()][..]));
    }
}
