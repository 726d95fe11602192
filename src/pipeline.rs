//! Aggregation pipelines over JSON documents.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. Each stage consumes the
//! documents produced by the previous one, so a read model is expressed as a
//! declarative chain (match, lookup, unwind, group, reshape, sort) instead of
//! hand-written loops. Joins pull the documents of other collections through a
//! [`CollectionSource`], which the store implements over SQLite and the tests
//! implement over plain vectors.
//!
//! Field paths use dots to descend into objects. When a path crosses an
//! array, the remaining path is applied to every element and the results are
//! collected, so `subscribers.subscriber` yields the subscriber id of every
//! joined subscription.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::Collection;

/// Supplies the documents of a collection joined by a lookup stage.
pub trait CollectionSource {
    fn load(&self, collection: Collection) -> Result<Rc<[Value]>>;

    /// `collection` indexed on `foreign_field`. Sources serving many lookups
    /// should cache the index instead of rebuilding it per stage.
    fn join_index(&self, collection: Collection, foreign_field: &str) -> Result<Rc<JoinIndex>> {
        Ok(Rc::new(JoinIndex::build(self.load(collection)?, foreign_field)))
    }
}

/// Foreign documents keyed by the JSON text of every value found at the
/// foreign path, so each join is a hash probe instead of a scan.
#[derive(Debug)]
pub struct JoinIndex {
    docs: Rc<[Value]>,
    positions: HashMap<String, Vec<usize>>,
}

impl JoinIndex {
    pub fn build(docs: Rc<[Value]>, foreign_field: &str) -> Self {
        let mut positions: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, doc) in docs.iter().enumerate() {
            let (values, _) = resolve(doc, foreign_field);
            let mut keys = HashSet::new();
            for value in values {
                match value {
                    Value::Array(items) => keys.extend(items.iter().map(Value::to_string)),
                    other => {
                        keys.insert(other.to_string());
                    }
                }
            }
            for key in keys {
                positions.entry(key).or_default().push(position);
            }
        }
        Self { docs, positions }
    }

    /// Documents matching any of `locals`, in the order of `locals`, each at
    /// most once.
    fn joined(&self, locals: &[Value]) -> Vec<Value> {
        let mut seen = HashSet::new();
        let mut joined = Vec::new();
        for local in locals {
            if let Some(positions) = self.positions.get(&local.to_string()) {
                for &position in positions {
                    if seen.insert(position) {
                        joined.push(self.docs[position].clone());
                    }
                }
            }
        }
        joined
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the value, or contains it when the field is an array.
    /// A missing field equals `null`.
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    /// Case-insensitive substring match on a string field.
    Contains(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(path.to_string(), value.into())
    }

    pub fn ne(path: &str, value: impl Into<Value>) -> Self {
        Filter::Ne(path.to_string(), value.into())
    }

    pub fn contains(path: &str, needle: &str) -> Self {
        Filter::Contains(path.to_string(), needle.to_string())
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::Eq(path, expected) => field_equals(doc, path, expected),
            Filter::Ne(path, expected) => !field_equals(doc, path, expected),
            Filter::In(path, options) => options.iter().any(|option| field_equals(doc, path, option)),
            Filter::Contains(path, needle) => {
                let needle = needle.to_lowercase();
                resolve(doc, path).0.iter().any(|value| {
                    value
                        .as_str()
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
                })
            }
            Filter::And(filters) => filters.iter().all(|filter| filter.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|filter| filter.matches(doc)),
        }
    }
}

/// Expressions computed by [`Stage::AddFields`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Field(String),
    Literal(Value),
    /// Length of an array field, 0 when missing.
    Size(String),
    /// First element of an array field, `null` when empty.
    First(String),
    /// Whether `value` occurs in the values at `path`.
    Contains { path: String, value: Value },
}

impl Expr {
    fn eval(&self, doc: &Value) -> Value {
        match self {
            Expr::Field(path) => get_value(doc, path),
            Expr::Literal(value) => value.clone(),
            Expr::Size(path) => match get_value(doc, path) {
                Value::Array(items) => Value::from(items.len()),
                _ => Value::from(0),
            },
            Expr::First(path) => match get_value(doc, path) {
                Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
                other => other,
            },
            Expr::Contains { path, value } => Value::Bool(match get_value(doc, path) {
                Value::Array(items) => items.contains(value),
                other => other == *value,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Count,
    Sum(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub from: Collection,
    pub local_field: String,
    pub foreign_field: String,
    pub as_field: String,
    /// Runs over the joined documents of each input document.
    pub pipeline: Pipeline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    /// Joins `from` on `local_field == foreign_field`. When the local value
    /// is an array, joined documents follow the order of that array.
    Lookup(Lookup),
    /// One document per element of a top-level array field. Documents where
    /// the field is missing, null or empty are dropped.
    Unwind(String),
    /// Groups by a field path (or everything, when `None`). Output documents
    /// are `{_id: <key>, <accumulators>...}` in order of first occurrence.
    Group {
        key: Option<String>,
        accumulators: Vec<(String, Accumulator)>,
    },
    AddFields(Vec<(String, Expr)>),
    /// Keeps `_id` and the listed top-level fields.
    Project(Vec<String>),
    Unset(Vec<String>),
    /// Stable sort on the listed paths.
    Sort(Vec<(String, SortOrder)>),
    Skip(usize),
    Limit(usize),
    /// Replaces the stream with a single `{<name>: <count>}` document.
    Count(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn push(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends every stage of `other`.
    pub fn then(mut self, other: Pipeline) -> Self {
        self.stages.extend(other.stages);
        self
    }

    pub fn matching(self, filter: Filter) -> Self {
        self.push(Stage::Match(filter))
    }

    pub fn lookup(self, from: Collection, local_field: &str, foreign_field: &str, as_field: &str) -> Self {
        self.lookup_with(from, local_field, foreign_field, as_field, Pipeline::new())
    }

    pub fn lookup_with(
        self,
        from: Collection,
        local_field: &str,
        foreign_field: &str,
        as_field: &str,
        pipeline: Pipeline,
    ) -> Self {
        self.push(Stage::Lookup(Lookup {
            from,
            local_field: local_field.to_string(),
            foreign_field: foreign_field.to_string(),
            as_field: as_field.to_string(),
            pipeline,
        }))
    }

    pub fn unwind(self, field: &str) -> Self {
        self.push(Stage::Unwind(field.to_string()))
    }

    pub fn group(self, key: Option<&str>, accumulators: Vec<(&str, Accumulator)>) -> Self {
        self.push(Stage::Group {
            key: key.map(str::to_string),
            accumulators: accumulators
                .into_iter()
                .map(|(name, acc)| (name.to_string(), acc))
                .collect(),
        })
    }

    pub fn add_fields(self, fields: Vec<(&str, Expr)>) -> Self {
        self.push(Stage::AddFields(
            fields
                .into_iter()
                .map(|(name, expr)| (name.to_string(), expr))
                .collect(),
        ))
    }

    pub fn project(self, fields: &[&str]) -> Self {
        self.push(Stage::Project(fields.iter().map(|f| f.to_string()).collect()))
    }

    pub fn unset(self, fields: &[&str]) -> Self {
        self.push(Stage::Unset(fields.iter().map(|f| f.to_string()).collect()))
    }

    pub fn sort(self, keys: &[(&str, SortOrder)]) -> Self {
        self.push(Stage::Sort(
            keys.iter().map(|(path, order)| (path.to_string(), *order)).collect(),
        ))
    }

    /// Descending on `path`, then on `_id` so equal timestamps still come
    /// out most recent first.
    pub fn newest_first(self, path: &str) -> Self {
        self.sort(&[(path, SortOrder::Desc), ("_id", SortOrder::Desc)])
    }

    pub fn skip(self, count: usize) -> Self {
        self.push(Stage::Skip(count))
    }

    pub fn limit(self, count: usize) -> Self {
        self.push(Stage::Limit(count))
    }

    pub fn count(self, name: &str) -> Self {
        self.push(Stage::Count(name.to_string()))
    }

    /// Runs every stage over `docs`.
    pub fn run(&self, docs: Vec<Value>, source: &dyn CollectionSource) -> Result<Vec<Value>> {
        let mut docs = docs;
        for stage in &self.stages {
            docs = apply(stage, docs, source)?;
        }
        Ok(docs)
    }
}

fn apply(stage: &Stage, docs: Vec<Value>, source: &dyn CollectionSource) -> Result<Vec<Value>> {
    let out = match stage {
        Stage::Match(filter) => docs.into_iter().filter(|doc| filter.matches(doc)).collect(),
        Stage::Lookup(lookup) => run_lookup(lookup, docs, source)?,
        Stage::Unwind(field) => unwind(field, docs),
        Stage::Group { key, accumulators } => group(key.as_deref(), accumulators, docs),
        Stage::AddFields(fields) => docs
            .into_iter()
            .map(|mut doc| {
                let computed: Vec<(String, Value)> = fields
                    .iter()
                    .map(|(name, expr)| (name.clone(), expr.eval(&doc)))
                    .collect();
                for (name, value) in computed {
                    set_field(&mut doc, &name, value);
                }
                doc
            })
            .collect(),
        Stage::Project(fields) => docs
            .into_iter()
            .map(|doc| {
                let mut projected = Map::new();
                if let Value::Object(mut map) = doc {
                    if let Some(id) = map.remove("_id") {
                        projected.insert("_id".to_string(), id);
                    }
                    for field in fields {
                        if let Some(value) = map.remove(field) {
                            projected.insert(field.clone(), value);
                        }
                    }
                }
                Value::Object(projected)
            })
            .collect(),
        Stage::Unset(fields) => docs
            .into_iter()
            .map(|mut doc| {
                if let Value::Object(map) = &mut doc {
                    for field in fields {
                        map.remove(field);
                    }
                }
                doc
            })
            .collect(),
        Stage::Sort(keys) => sort(keys, docs),
        Stage::Skip(count) => docs.into_iter().skip(*count).collect(),
        Stage::Limit(count) => docs.into_iter().take(*count).collect(),
        Stage::Count(name) => {
            let mut map = Map::new();
            map.insert(name.clone(), Value::from(docs.len()));
            vec![Value::Object(map)]
        }
    };
    Ok(out)
}

fn run_lookup(lookup: &Lookup, docs: Vec<Value>, source: &dyn CollectionSource) -> Result<Vec<Value>> {
    let index = source.join_index(lookup.from, &lookup.foreign_field)?;

    let mut out = Vec::with_capacity(docs.len());
    for mut doc in docs {
        let locals = match get_value(&doc, &lookup.local_field) {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        let joined = lookup.pipeline.run(index.joined(&locals), source)?;
        set_field(&mut doc, &lookup.as_field, Value::Array(joined));
        out.push(doc);
    }
    Ok(out)
}

fn unwind(field: &str, docs: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        let items = match doc.get(field) {
            Some(Value::Array(items)) => items.clone(),
            None | Some(Value::Null) => continue,
            Some(_) => {
                out.push(doc);
                continue;
            }
        };
        for item in items {
            let mut copy = doc.clone();
            set_field(&mut copy, field, item);
            out.push(copy);
        }
    }
    out
}

enum Running {
    Count(u64),
    Sum { int: i64, float: f64, is_float: bool },
}

impl Running {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Count => Running::Count(0),
            Accumulator::Sum(_) => Running::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
            },
        }
    }

    fn add(&mut self, acc: &Accumulator, doc: &Value) {
        match (self, acc) {
            (Running::Count(n), Accumulator::Count) => *n += 1,
            (Running::Sum { int, float, is_float }, Accumulator::Sum(path)) => {
                if let Value::Number(number) = get_value(doc, path) {
                    if let Some(value) = number.as_i64() {
                        *int = int.saturating_add(value);
                    } else if let Some(value) = number.as_f64() {
                        *float += value;
                        *is_float = true;
                    }
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            Running::Count(n) => Value::from(n),
            Running::Sum { int, float, is_float } => {
                if is_float {
                    Value::from(int as f64 + float)
                } else {
                    Value::from(int)
                }
            }
        }
    }
}

fn group(key: Option<&str>, accumulators: &[(String, Accumulator)], docs: Vec<Value>) -> Vec<Value> {
    let mut order: Vec<(Value, Vec<Running>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for doc in &docs {
        let group_key = key.map(|path| get_value(doc, path)).unwrap_or(Value::Null);
        let position = *positions.entry(group_key.to_string()).or_insert_with(|| {
            order.push((
                group_key.clone(),
                accumulators.iter().map(|(_, acc)| Running::new(acc)).collect(),
            ));
            order.len() - 1
        });
        let (_, running) = &mut order[position];
        for (state, (_, acc)) in running.iter_mut().zip(accumulators) {
            state.add(acc, doc);
        }
    }

    order
        .into_iter()
        .map(|(group_key, running)| {
            let mut map = Map::new();
            map.insert("_id".to_string(), group_key);
            for (state, (name, _)) in running.into_iter().zip(accumulators) {
                map.insert(name.clone(), state.finish());
            }
            Value::Object(map)
        })
        .collect()
}

fn sort(keys: &[(String, SortOrder)], docs: Vec<Value>) -> Vec<Value> {
    let mut decorated: Vec<(Vec<Value>, Value)> = docs
        .into_iter()
        .map(|doc| {
            let sort_keys = keys.iter().map(|(path, _)| get_value(&doc, path)).collect();
            (sort_keys, doc)
        })
        .collect();

    decorated.sort_by(|(a, _), (b, _)| {
        for ((left, right), (_, order)) in a.iter().zip(b).zip(keys) {
            let ordering = match order {
                SortOrder::Asc => compare_values(left, right),
                SortOrder::Desc => compare_values(right, left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    decorated.into_iter().map(|(_, doc)| doc).collect()
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order across JSON values: null < numbers < strings < objects <
/// arrays < booleans.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(0.0)
                .partial_cmp(&y.as_f64().unwrap_or(0.0))
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y) {
                let ordering = compare_values(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Values found at `path`, plus whether an array was crossed on the way.
fn resolve<'a>(doc: &'a Value, path: &str) -> (Vec<&'a Value>, bool) {
    let mut current = vec![doc];
    let mut crossed_array = false;
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => next.extend(map.get(segment)),
                Value::Array(items) => {
                    crossed_array = true;
                    next.extend(items.iter().filter_map(|item| item.get(segment)));
                }
                _ => {}
            }
        }
        current = next;
    }
    (current, crossed_array)
}

/// The value at `path`: `null` when missing, an array when the path crossed
/// one.
pub fn get_value(doc: &Value, path: &str) -> Value {
    let (values, crossed_array) = resolve(doc, path);
    if crossed_array {
        Value::Array(values.into_iter().cloned().collect())
    } else {
        values.first().map(|value| (*value).clone()).unwrap_or(Value::Null)
    }
}

fn field_equals(doc: &Value, path: &str, expected: &Value) -> bool {
    let (values, _) = resolve(doc, path);
    if values.is_empty() {
        return expected.is_null();
    }
    values.iter().any(|value| {
        *value == expected || matches!(value, Value::Array(items) if items.contains(expected))
    })
}

fn set_field(doc: &mut Value, name: &str, value: Value) {
    if let Value::Object(map) = doc {
        map.insert(name.to_string(), value);
    }
}

/// In-memory source, handy for tests and for running pipelines over
/// documents that are already loaded.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    collections: HashMap<Collection, Vec<Value>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, collection: Collection, docs: Vec<Value>) -> Self {
        self.collections.insert(collection, docs);
        self
    }
}

impl CollectionSource for MemorySource {
    fn load(&self, collection: Collection) -> Result<Rc<[Value]>> {
        Ok(self
            .collections
            .get(&collection)
            .map(|docs| Rc::from(docs.as_slice()))
            .unwrap_or_else(|| Rc::from(Vec::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(docs: &[Value]) -> Vec<&str> {
        docs.iter().map(|doc| doc["_id"].as_str().unwrap()).collect()
    }

    #[test]
    fn newest_first_orders_descending() {
        let docs = vec![
            json!({"_id": "a", "createdAt": "2024-01-01T00:00:01.000000Z"}),
            json!({"_id": "c", "createdAt": "2024-01-01T00:00:03.000000Z"}),
            json!({"_id": "b", "createdAt": "2024-01-01T00:00:02.000000Z"}),
        ];
        let out = Pipeline::new()
            .newest_first("createdAt")
            .run(docs, &MemorySource::new())
            .unwrap();
        assert_eq!(ids(&out), ["c", "b", "a"]);
    }

    #[test]
    fn equal_timestamps_fall_back_to_id() {
        let docs = vec![
            json!({"_id": "01", "createdAt": "2024-01-01T00:00:00.000000Z"}),
            json!({"_id": "02", "createdAt": "2024-01-01T00:00:00.000000Z"}),
        ];
        let out = Pipeline::new()
            .newest_first("createdAt")
            .run(docs, &MemorySource::new())
            .unwrap();
        assert_eq!(ids(&out), ["02", "01"]);
    }

    #[test]
    fn grouping_on_missing_field_forms_null_group() {
        let likes = vec![
            json!({"_id": "l1", "target": {"video": "v1"}}),
            json!({"_id": "l2", "target": {"tweet": "t1"}}),
            json!({"_id": "l3", "target": {"video": "v1"}}),
        ];
        let out = Pipeline::new()
            .group(Some("target.video"), vec![("likes", Accumulator::Count)])
            .run(likes.clone(), &MemorySource::new())
            .unwrap();
        assert_eq!(out, vec![json!({"_id": "v1", "likes": 2}), json!({"_id": null, "likes": 1})]);

        let without_null = Pipeline::new()
            .group(Some("target.video"), vec![("likes", Accumulator::Count)])
            .matching(Filter::ne("_id", Value::Null))
            .run(likes, &MemorySource::new())
            .unwrap();
        assert_eq!(without_null.len(), 1);
    }

    #[test]
    fn sum_keeps_integers_exact() {
        let docs = vec![json!({"views": 3}), json!({"views": 5}), json!({"views": 0})];
        let out = Pipeline::new()
            .group(None, vec![("total", Accumulator::Sum("views".into())), ("n", Accumulator::Count)])
            .run(docs, &MemorySource::new())
            .unwrap();
        assert_eq!(out, vec![json!({"_id": null, "total": 8, "n": 3})]);
    }

    #[test]
    fn lookup_follows_local_array_order_and_skips_dangling_ids() {
        let source = MemorySource::new().with(
            Collection::Videos,
            vec![
                json!({"_id": "v1", "title": "one"}),
                json!({"_id": "v2", "title": "two"}),
                json!({"_id": "v3", "title": "three"}),
            ],
        );
        let playlist = vec![json!({"_id": "p1", "videos": ["v3", "gone", "v1"]})];
        let out = Pipeline::new()
            .lookup(Collection::Videos, "videos", "_id", "videos")
            .run(playlist, &source)
            .unwrap();
        let titles: Vec<&str> = out[0]["videos"]
            .as_array()
            .unwrap()
            .iter()
            .map(|video| video["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, ["three", "one"]);
    }

    #[test]
    fn nested_lookup_pipeline_shapes_joined_documents() {
        let source = MemorySource::new().with(
            Collection::Users,
            vec![json!({"_id": "u1", "username": "ana", "password": "secret"})],
        );
        let videos = vec![json!({"_id": "v1", "owner": "u1"})];
        let out = Pipeline::new()
            .lookup_with(
                Collection::Users,
                "owner",
                "_id",
                "owner",
                Pipeline::new().project(&["username"]),
            )
            .add_fields(vec![("owner", Expr::First("owner".into()))])
            .run(videos, &source)
            .unwrap();
        assert_eq!(out[0]["owner"], json!({"_id": "u1", "username": "ana"}));
    }

    #[test]
    fn membership_expression_reads_through_arrays() {
        let doc = json!({
            "_id": "u1",
            "subscribers": [{"subscriber": "a"}, {"subscriber": "b"}],
            "subscribedTo": []
        });
        let out = Pipeline::new()
            .add_fields(vec![
                ("isSubscribed", Expr::Contains { path: "subscribers.subscriber".into(), value: json!("b") }),
                ("subscribersCount", Expr::Size("subscribers".into())),
                ("subscribedToCount", Expr::Size("subscribedTo".into())),
            ])
            .run(vec![doc], &MemorySource::new())
            .unwrap();
        assert_eq!(out[0]["isSubscribed"], json!(true));
        assert_eq!(out[0]["subscribersCount"], json!(2));
        assert_eq!(out[0]["subscribedToCount"], json!(0));
    }

    #[test]
    fn unwind_drops_empty_and_missing_arrays() {
        let docs = vec![
            json!({"_id": "a", "video": [{"_id": "v1"}]}),
            json!({"_id": "b", "video": []}),
            json!({"_id": "c"}),
        ];
        let out = Pipeline::new().unwind("video").run(docs, &MemorySource::new()).unwrap();
        assert_eq!(out, vec![json!({"_id": "a", "video": {"_id": "v1"}})]);
    }

    #[test]
    fn count_reports_zero_for_empty_input() {
        let out = Pipeline::new()
            .matching(Filter::eq("channel", "nobody"))
            .count("subscribers")
            .run(vec![json!({"channel": "someone"})], &MemorySource::new())
            .unwrap();
        assert_eq!(out, vec![json!({"subscribers": 0})]);
    }

    #[test]
    fn filters_cover_arrays_missing_fields_and_search() {
        let doc = json!({"_id": "p", "videos": ["v1", "v2"], "title": "Rust Streams"});
        assert!(Filter::eq("videos", "v2").matches(&doc));
        assert!(Filter::eq("missing", Value::Null).matches(&doc));
        assert!(Filter::ne("missing", "x").matches(&doc));
        assert!(Filter::contains("title", "stream").matches(&doc));
        assert!(!Filter::and(vec![Filter::eq("_id", "p"), Filter::eq("videos", "v9")]).matches(&doc));
        assert!(Filter::In("_id".into(), vec![json!("q"), json!("p")]).matches(&doc));
        assert!(Filter::or(vec![Filter::eq("_id", "q"), Filter::eq("videos", "v1")]).matches(&doc));
        assert!(!Filter::or(vec![Filter::eq("_id", "q"), Filter::eq("videos", "v9")]).matches(&doc));
        assert!(!Filter::or(Vec::new()).matches(&doc));
    }

    #[test]
    fn project_and_skip_limit_reshape_pages() {
        let docs: Vec<Value> = (0..5)
            .map(|n| json!({"_id": n, "title": format!("t{n}"), "secret": true}))
            .collect();
        let out = Pipeline::new()
            .project(&["title"])
            .skip(1)
            .limit(2)
            .run(docs, &MemorySource::new())
            .unwrap();
        assert_eq!(out, vec![json!({"_id": 1, "title": "t1"}), json!({"_id": 2, "title": "t2"})]);
    }

    #[test]
    fn mixed_types_compare_by_rank() {
        assert_eq!(compare_values(&Value::Null, &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(1.5), &json!(1)), Ordering::Greater);
        assert_eq!(compare_values(&json!("b"), &json!(true)), Ordering::Less);
    }
}
