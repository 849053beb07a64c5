use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::cursor::StartKey;
use super::keys;

/// Attribute map of a stored record, excluding its primary key.
pub type Attributes = Map<String, Value>;

/// Two-part primary key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub pk: String,
    pub sk: String,
}

impl RecordKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

/// A single item of the table.
///
/// Attribute values are JSON shaped. Nested map fields are addressed with
/// dotted paths such as `Data.category`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub key: RecordKey,
    pub attributes: Attributes,
}

impl Default for RecordKey {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Record {
    /// Creates a record with no attributes.
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            attributes: Map::new(),
        }
    }

    /// Sets a top-level attribute.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Sets the index key attributes.
    pub fn with_index_key(self, index_key: &RecordKey) -> Self {
        self.with(keys::GSI1PK, index_key.pk.clone())
            .with(keys::GSI1SK, index_key.sk.clone())
    }

    /// Resolves a dotted attribute path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.attributes, path)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(Value::as_i64)
    }

    /// Reads a counter attribute, treating absent or negative values as zero.
    pub fn get_count(&self, path: &str) -> u64 {
        self.get_i64(path).map(|n| n.max(0) as u64).unwrap_or(0)
    }

    /// Returns the secondary index key when the record is projected into the index.
    pub fn index_key(&self) -> Option<RecordKey> {
        Some(RecordKey::new(
            self.get_str(keys::GSI1PK)?,
            self.get_str(keys::GSI1SK)?,
        ))
    }

    /// Expiry as epoch seconds, if the record is time-boxed.
    pub fn expires_at(&self) -> Option<i64> {
        self.get_i64(keys::EXPIRES_AT)
    }

    /// True when the record carries an expiry at or before `now_epoch`.
    pub fn is_expired(&self, now_epoch: i64) -> bool {
        self.expires_at().is_some_and(|at| at <= now_epoch)
    }
}

/// Resolves a dotted path inside an attribute map.
pub fn lookup<'a>(attributes: &'a Attributes, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = attributes.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Orders two attribute values of the same scalar type.
///
/// Returns `None` for mismatched or non-scalar types.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Number(l), Value::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => l.as_f64()?.partial_cmp(&r.as_f64()?),
        },
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Predicate evaluated against the current stored state of a record.
///
/// Comparisons against a missing attribute evaluate to false.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The record exists.
    Exists,
    /// The record does not exist.
    NotExists,
    Equals(String, Value),
    NotEquals(String, Value),
    LessThan(String, Value),
    GreaterThan(String, Value),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Equals(path.into(), value.into())
    }

    pub fn not_equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::NotEquals(path.into(), value.into())
    }

    pub fn less_than(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::LessThan(path.into(), value.into())
    }

    pub fn greater_than(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::GreaterThan(path.into(), value.into())
    }

    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::And(mut all) => {
                all.push(other);
                Condition::And(all)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Or(mut any) => {
                any.push(other);
                Condition::Or(any)
            }
            first => Condition::Or(vec![first, other]),
        }
    }

    /// Evaluates the condition against the current state (`None` when absent).
    pub fn evaluate(&self, current: Option<&Attributes>) -> bool {
        let compare = |path: &str, value: &Value| {
            current
                .and_then(|attrs| lookup(attrs, path))
                .and_then(|stored| compare_values(stored, value))
        };

        match self {
            Condition::Exists => current.is_some(),
            Condition::NotExists => current.is_none(),
            Condition::Equals(path, value) => current
                .and_then(|attrs| lookup(attrs, path))
                .is_some_and(|stored| stored == value),
            Condition::NotEquals(path, value) => current
                .and_then(|attrs| lookup(attrs, path))
                .is_some_and(|stored| stored != value),
            Condition::LessThan(path, value) => compare(path, value) == Some(Ordering::Less),
            Condition::GreaterThan(path, value) => {
                compare(path, value) == Some(Ordering::Greater)
            }
            Condition::And(all) => all.iter().all(|c| c.evaluate(current)),
            Condition::Or(any) => any.iter().any(|c| c.evaluate(current)),
        }
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// A single update action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Overwrite the attribute.
    Set(String, Value),
    /// Write the attribute only if it is not present yet.
    SetIfAbsent(String, Value),
    /// Numeric add, treating a missing attribute as zero.
    Add(String, i64),
    Remove(String),
}

/// Ordered list of update actions applied atomically to one record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mutation {
    actions: Vec<Action>,
}

impl Mutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.actions.push(Action::Set(path.into(), value.into()));
        self
    }

    pub fn set_if_absent(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.actions
            .push(Action::SetIfAbsent(path.into(), value.into()));
        self
    }

    pub fn add(mut self, path: impl Into<String>, by: i64) -> Self {
        self.actions.push(Action::Add(path.into(), by));
        self
    }

    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.actions.push(Action::Remove(path.into()));
        self
    }

    /// Appends an already built action.
    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Applies every action to `attributes`.
    ///
    /// Nested paths require their parent map to exist; an invalid path or a
    /// numeric add on a non-number is reported as an error message.
    pub fn apply(&self, attributes: &mut Attributes) -> Result<(), String> {
        for action in &self.actions {
            match action {
                Action::Set(path, value) => {
                    let (parent, leaf) = parent_map(attributes, path)?;
                    parent.insert(leaf.to_string(), value.clone());
                }
                Action::SetIfAbsent(path, value) => {
                    let (parent, leaf) = parent_map(attributes, path)?;
                    parent
                        .entry(leaf.to_string())
                        .or_insert_with(|| value.clone());
                }
                Action::Add(path, by) => {
                    let (parent, leaf) = parent_map(attributes, path)?;
                    let current = match parent.get(leaf) {
                        None => 0,
                        Some(value) => value
                            .as_i64()
                            .ok_or_else(|| format!("cannot add to non-numeric attribute {path}"))?,
                    };
                    parent.insert(leaf.to_string(), Value::from(current + by));
                }
                Action::Remove(path) => {
                    if let Ok((parent, leaf)) = parent_map(attributes, path) {
                        parent.remove(leaf);
                    }
                }
            }
        }
        Ok(())
    }
}

fn parent_map<'a, 'p>(
    attributes: &'a mut Attributes,
    path: &'p str,
) -> Result<(&'a mut Attributes, &'p str), String> {
    match path.rsplit_once('.') {
        None => Ok((attributes, path)),
        Some((parent_path, leaf)) => {
            let mut current = attributes;
            for segment in parent_path.split('.') {
                current = current
                    .get_mut(segment)
                    .and_then(Value::as_object_mut)
                    .ok_or_else(|| format!("invalid document path {path}"))?;
            }
            Ok((current, leaf))
        }
    }
}

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The mutation was applied; carries the record as stored afterwards.
    Updated(Record),
    /// The condition evaluated false against an existing record.
    Rejected,
    /// The condition evaluated false and no record exists.
    Missing,
}

impl UpdateOutcome {
    pub fn into_record(self) -> Option<Record> {
        match self {
            UpdateOutcome::Updated(record) => Some(record),
            UpdateOutcome::Rejected | UpdateOutcome::Missing => None,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated(_))
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Which key space a query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The primary table (`PK` / `SK`).
    Table,
    /// The secondary index (`GSI1PK` / `GSI1SK`).
    Index,
}

impl Target {
    pub fn partition_attribute(&self) -> &'static str {
        match self {
            Target::Table => keys::PK,
            Target::Index => keys::GSI1PK,
        }
    }

    pub fn sort_attribute(&self) -> &'static str {
        match self {
            Target::Table => keys::SK,
            Target::Index => keys::GSI1SK,
        }
    }
}

/// Condition on the partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCondition {
    Equals(String),
    /// Prefix match. Backends that require an exact partition fall back to a
    /// filtered scan.
    BeginsWith(String),
}

/// Condition on the sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortCondition {
    Equals(String),
    BeginsWith(String),
    /// Inclusive range.
    Between(String, String),
}

impl SortCondition {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            SortCondition::Equals(expected) => value == expected,
            SortCondition::BeginsWith(prefix) => value.starts_with(prefix.as_str()),
            SortCondition::Between(low, high) => low.as_str() <= value && value <= high.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// A key-scoped read with optional filter and pagination.
///
/// `limit` bounds the number of records evaluated; the filter is applied
/// afterwards, so a page may hold fewer matches while still carrying a
/// continuation key.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub target: Target,
    pub partition: KeyCondition,
    pub sort: Option<SortCondition>,
    pub filter: Option<Condition>,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub start: Option<StartKey>,
}

impl Query {
    /// Query against the primary table.
    pub fn table(partition: KeyCondition) -> Self {
        Self::new(Target::Table, partition)
    }

    /// Query against the secondary index.
    pub fn index(partition: KeyCondition) -> Self {
        Self::new(Target::Index, partition)
    }

    fn new(target: Target, partition: KeyCondition) -> Self {
        Self {
            target,
            partition,
            sort: None,
            filter: None,
            order: SortOrder::default(),
            limit: None,
            start: None,
        }
    }

    pub fn sort(mut self, sort: SortCondition) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn filter(mut self, filter: Option<Condition>) -> Self {
        self.filter = filter;
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start(mut self, start: Option<StartKey>) -> Self {
        self.start = start;
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub records: Vec<Record>,
    /// Position to resume from; `None` once the key range is exhausted.
    pub next: Option<StartKey>,
}
