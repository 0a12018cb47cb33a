//! Semantic store expressions: filters, partial updates, and projections.
//!
//! These are plain data. Store adapters compile them to their native query
//! language (the Postgres adapter emits JSONB SQL); the in-memory adapter uses
//! [`Filter::matches`], [`Update::apply`] and [`Projection::apply`] directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::time::timestamp_from_json;

/// Dotted path into a nested document (`wrappedSkuOrder.envelope.skuOrderEnvelope.orderId`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// `prefix` + `.` + `field`.
    pub fn nested(prefix: &str, field: &str) -> Self {
        if prefix.is_empty() {
            Self(field.to_string())
        } else {
            Self(format!("{prefix}.{field}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Resolve the path inside `doc`.
    pub fn lookup<'a>(&self, doc: &'a JsonValue) -> Option<&'a JsonValue> {
        self.segments().try_fold(doc, |cur, seg| cur.as_object()?.get(seg))
    }
}

impl core::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bounds on a timestamp field. `gte` is inclusive, `lt` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn is_unbounded(&self) -> bool {
        self.gte.is_none() && self.lt.is_none()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.gte.is_none_or(|from| at >= from) && self.lt.is_none_or(|to| at < to)
    }
}

/// Document filter expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Exact match of the JSON value at `field`.
    Eq { field: FieldPath, value: JsonValue },
    /// Timestamp at `field` falls inside `range`.
    Range { field: FieldPath, range: TimeRange },
    /// Every clause must match. An empty conjunction matches everything.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: FieldPath, value: impl Into<JsonValue>) -> Self {
        Self::Eq {
            field,
            value: value.into(),
        }
    }

    pub fn range(field: FieldPath, range: TimeRange) -> Self {
        Self::Range { field, range }
    }

    /// Conjunction of `clauses`, flattening nested `And`s.
    ///
    /// A single clause is returned as-is.
    pub fn and(clauses: impl IntoIterator<Item = Filter>) -> Self {
        let mut flat = Vec::new();
        for clause in clauses {
            match clause {
                Filter::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Filter::And(flat)
        }
    }

    /// Evaluate against a JSON document.
    ///
    /// A missing field never matches, and neither does a range over a value
    /// that is not a readable timestamp.
    pub fn matches(&self, doc: &JsonValue) -> bool {
        match self {
            Filter::Eq { field, value } => field.lookup(doc) == Some(value),
            Filter::Range { field, range } => field
                .lookup(doc)
                .and_then(timestamp_from_json)
                .is_some_and(|at| range.contains(at)),
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
        }
    }

    /// Every leaf clause, depth first.
    pub fn clauses(&self) -> Vec<&Filter> {
        match self {
            Filter::And(inner) => inner.iter().flat_map(|c| c.clauses()).collect(),
            leaf => vec![leaf],
        }
    }
}

/// Partial-document update: `$set` of each path to its value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Update {
    set: Vec<(FieldPath, JsonValue)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field` to `value`; a later set of the same field replaces the earlier one.
    pub fn set(mut self, field: FieldPath, value: impl Into<JsonValue>) -> Self {
        let value = value.into();
        match self.set.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = value,
            None => self.set.push((field, value)),
        }
        self
    }

    pub fn fields(&self) -> &[(FieldPath, JsonValue)] {
        &self.set
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Apply to `doc`, creating intermediate objects as needed.
    ///
    /// Returns whether anything changed.
    pub fn apply(&self, doc: &mut JsonValue) -> bool {
        let mut modified = false;
        for (field, value) in &self.set {
            let segments: Vec<&str> = field.segments().collect();
            let Some((last, parents)) = segments.split_last() else {
                continue;
            };

            let mut cur = &mut *doc;
            for seg in parents {
                if !cur.is_object() {
                    *cur = JsonValue::Object(Map::new());
                }
                cur = &mut cur[*seg];
            }

            if !cur.is_object() {
                *cur = JsonValue::Object(Map::new());
            }
            let slot = &mut cur[*last];
            if *slot != *value {
                *slot = value.clone();
                modified = true;
            }
        }
        modified
    }
}

/// Inclusion projection. Empty means "whole document".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Projection {
    include: Vec<FieldPath>,
}

impl Projection {
    pub fn include(fields: impl IntoIterator<Item = FieldPath>) -> Self {
        Self {
            include: fields.into_iter().collect(),
        }
    }

    pub fn fields(&self) -> &[FieldPath] {
        &self.include
    }

    /// Copy only the included paths out of `doc`.
    pub fn apply(&self, doc: &JsonValue) -> JsonValue {
        if self.include.is_empty() {
            return doc.clone();
        }

        let mut out = JsonValue::Object(Map::new());
        for field in &self.include {
            if let Some(value) = field.lookup(doc) {
                Update::new().set(field.clone(), value.clone()).apply(&mut out);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> FieldPath {
        FieldPath::new(p)
    }

    #[test]
    fn lookup_walks_nested_objects() {
        let doc = json!({"a": {"b": {"c": 7}}});
        assert_eq!(path("a.b.c").lookup(&doc), Some(&json!(7)));
        assert_eq!(path("a.x.c").lookup(&doc), None);
        assert_eq!(path("a.b.c.d").lookup(&doc), None);
    }

    #[test]
    fn and_flattens_and_unwraps_single_clause() {
        let a = Filter::eq(path("a"), 1);
        let b = Filter::eq(path("b"), 2);
        let c = Filter::eq(path("c"), 3);

        assert_eq!(Filter::and([a.clone()]), a);
        assert_eq!(
            Filter::and([Filter::and([a.clone(), b.clone()]), c.clone()]),
            Filter::And(vec![a, b, c])
        );
    }

    #[test]
    fn eq_and_range_matching() {
        let doc = json!({"env": {"status": "FAILED", "at": "2024-03-01T10:00:00Z"}});
        let at = path("env.at");
        let from = crate::time::parse_timestamp("2024-03-01").unwrap();
        let to = crate::time::parse_timestamp("2024-03-02").unwrap();

        assert!(Filter::eq(path("env.status"), "FAILED").matches(&doc));
        assert!(!Filter::eq(path("env.status"), "RETRY").matches(&doc));
        assert!(Filter::range(at.clone(), TimeRange { gte: Some(from), lt: Some(to) }).matches(&doc));
        assert!(!Filter::range(at.clone(), TimeRange { gte: Some(to), lt: None }).matches(&doc));
        // Upper bound is exclusive.
        let exact = crate::time::parse_timestamp("2024-03-01T10:00:00Z").unwrap();
        assert!(!Filter::range(at.clone(), TimeRange { gte: None, lt: Some(exact) }).matches(&doc));
        assert!(!Filter::range(path("env.missing"), TimeRange::default()).matches(&doc));
        assert!(Filter::And(vec![]).matches(&doc));
    }

    #[test]
    fn update_sets_nested_fields_and_reports_modification() {
        let mut doc = json!({"w": {"env": {"status": "A", "retryCount": 1, "keep": true}}});
        let update = Update::new()
            .set(path("w.env.status"), "B")
            .set(path("w.env.retryCount"), 2);

        assert!(update.apply(&mut doc));
        assert_eq!(doc, json!({"w": {"env": {"status": "B", "retryCount": 2, "keep": true}}}));
        assert!(!update.apply(&mut doc));

        let mut empty = json!({});
        Update::new().set(path("x.y"), "z").apply(&mut empty);
        assert_eq!(empty, json!({"x": {"y": "z"}}));
    }

    #[test]
    fn update_replaces_scalar_parents_with_objects() {
        let mut doc = json!({"w": {"env": 7}, "top": "scalar"});
        let update = Update::new()
            .set(path("w.env.status"), "B")
            .set(path("top.a.b"), true);

        assert!(update.apply(&mut doc));
        assert_eq!(doc, json!({"w": {"env": {"status": "B"}}, "top": {"a": {"b": true}}}));
    }

    #[test]
    fn update_set_replaces_same_field() {
        let update = Update::new().set(path("a"), 1).set(path("a"), 2);
        assert_eq!(update.fields().len(), 1);
        assert_eq!(update.fields()[0].1, json!(2));
    }

    #[test]
    fn projection_keeps_included_paths_only() {
        let doc = json!({"_id": "x", "wrapped": {"a": 1}, "other": 2});
        let projected = Projection::include([path("wrapped")]).apply(&doc);
        assert_eq!(projected, json!({"wrapped": {"a": 1}}));
        assert_eq!(Projection::default().apply(&doc), doc);
    }
}
