// Query shapes shared by every backend, evaluated in one place so the
// memory and SQLite stores can never disagree about what matches.

use serde_json::Value;
use std::cmp::Ordering;

/// Conjunction of field equalities, optionally AND-ed with a disjunctive
/// group of case-insensitive substring matches (the search box query).
#[derive(Debug, Clone, Default)]
pub struct Filter {
    eq: Vec<(String, Value)>,
    contains_any: Option<(Vec<String>, String)>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.eq.push((field.to_string(), value.into()));
        self
    }

    /// Matches when any of `fields` contains `needle`, ignoring case.
    pub fn contains_any(mut self, fields: &[&str], needle: &str) -> Self {
        self.contains_any = Some((
            fields.iter().map(|f| f.to_string()).collect(),
            needle.to_string(),
        ));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.eq.is_empty() && self.contains_any.is_none()
    }

    pub fn eq_conditions(&self) -> &[(String, Value)] {
        &self.eq
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub field: String,
    pub descending: bool,
}

impl Order {
    pub fn asc(field: &str) -> Self {
        Order { field: field.to_string(), descending: false }
    }

    pub fn desc(field: &str) -> Self {
        Order { field: field.to_string(), descending: true }
    }
}

impl Default for Order {
    fn default() -> Self {
        Order::asc("created_at")
    }
}

pub fn matches(document: &Value, filter: &Filter) -> bool {
    for (field, expected) in &filter.eq {
        let actual = document.get(field).unwrap_or(&Value::Null);
        if !values_eq(actual, expected) {
            return false;
        }
    }
    if let Some((fields, needle)) = &filter.contains_any {
        let needle = needle.to_lowercase();
        let hit = fields.iter().any(|field| {
            document
                .get(field)
                .and_then(Value::as_str)
                .map(|s| s.to_lowercase().contains(&needle))
                .unwrap_or(false)
        });
        if !hit {
            return false;
        }
    }
    true
}

/// Field equality with an absent field reading as null and numbers compared
/// by value rather than representation.
pub fn values_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Total order over documents: the requested field first, ties broken by id
/// ascending regardless of direction, so equal keys still sort the same way
/// on every call.
pub fn compare(a: &Value, b: &Value, order: &Order) -> Ordering {
    let field_a = a.get(&order.field).unwrap_or(&Value::Null);
    let field_b = b.get(&order.field).unwrap_or(&Value::Null);
    let mut by_field = compare_values(field_a, field_b);
    if order.descending {
        by_field = by_field.reverse();
    }
    by_field.then_with(|| {
        let id_a = a.get("id").and_then(Value::as_str).unwrap_or("");
        let id_b = b.get("id").and_then(Value::as_str).unwrap_or("");
        id_a.cmp(id_b)
    })
}

/// Null sorts first, then booleans, numbers, strings, everything else.
/// Timestamps are stored in a fixed-width RFC 3339 form, so their string
/// comparison is chronological.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

pub fn sort(documents: &mut [Value], order: &Order) {
    documents.sort_by(|a, b| compare(a, b, order));
}

/// Shallow merge of `patch` into `document`. `id` and `created_at` never
/// change; an explicit null in the patch clears the field.
pub fn merge_shallow(document: &mut Value, patch: &Value) {
    let (Some(target), Some(source)) = (document.as_object_mut(), patch.as_object()) else {
        return;
    };
    for (key, value) in source {
        if key == "id" || key == "created_at" {
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_matches_and_misses() {
        let doc = json!({"id": "a", "user_id": "u1", "is_read": false});
        assert!(matches(&doc, &Filter::new().eq("user_id", "u1")));
        assert!(matches(&doc, &Filter::new().eq("user_id", "u1").eq("is_read", false)));
        assert!(!matches(&doc, &Filter::new().eq("user_id", "u2")));
    }

    #[test]
    fn missing_field_reads_as_null() {
        let doc = json!({"id": "a"});
        assert!(matches(&doc, &Filter::new().eq("parent_id", Value::Null)));
        let explicit = json!({"id": "a", "parent_id": null});
        assert!(matches(&explicit, &Filter::new().eq("parent_id", Value::Null)));
    }

    #[test]
    fn contains_any_ignores_case_and_requires_one_hit() {
        let doc = json!({"id": "a", "item_name": "iPhone 13", "issue_description": "Cracked screen"});
        let filter = Filter::new().contains_any(&["item_name", "issue_description"], "CRACK");
        assert!(matches(&doc, &filter));
        let miss = Filter::new().contains_any(&["item_name", "issue_description"], "battery");
        assert!(!matches(&doc, &miss));
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(values_eq(&json!(3), &json!(3.0)));
        assert!(!values_eq(&json!(3), &json!(4)));
    }

    #[test]
    fn sort_is_total_with_id_tie_break() {
        let mut docs = vec![
            json!({"id": "b", "created_at": "2024-01-01T00:00:00.000000+00:00"}),
            json!({"id": "a", "created_at": "2024-01-01T00:00:00.000000+00:00"}),
            json!({"id": "c", "created_at": "2023-12-31T00:00:00.000000+00:00"}),
        ];
        sort(&mut docs, &Order::asc("created_at"));
        let ids: Vec<_> = docs.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        // Descending keeps the ascending id tie-break
        sort(&mut docs, &Order::desc("created_at"));
        let ids: Vec<_> = docs.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn merge_keeps_id_and_created_at() {
        let mut doc = json!({"id": "a", "created_at": "t0", "bio": "old", "extra": 1});
        merge_shallow(
            &mut doc,
            &json!({"id": "hacked", "created_at": "t9", "bio": "new", "avatar_url": null}),
        );
        assert_eq!(doc["id"], "a");
        assert_eq!(doc["created_at"], "t0");
        assert_eq!(doc["bio"], "new");
        assert_eq!(doc["extra"], 1);
        assert!(doc["avatar_url"].is_null());
    }
}
