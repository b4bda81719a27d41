#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::record::instant_value;
use crate::models::Document;
use crate::query::merge::{intersect, merge};

/// Inclusive/exclusive bounds on a single field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Range {
    pub gt: Option<Value>,
    pub gte: Option<Value>,
    pub lt: Option<Value>,
    pub lte: Option<Value>,
}

impl Range {
    pub fn gt(value: impl Into<Value>) -> Self {
        Self {
            gt: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        Self {
            gte: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Self {
            lt: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn lte(value: impl Into<Value>) -> Self {
        Self {
            lte: Some(value.into()),
            ..Self::default()
        }
    }

    /// The same bounds as literals for `field`. `None` when a bound can't be a
    /// value of that field's type.
    fn typed(&self, field: &str) -> Option<Range> {
        let bound = |b: &Option<Value>| match b {
            None => Some(None),
            Some(v) => typed_literal(field, v).map(Some),
        };
        Some(Range {
            gt: bound(&self.gt)?,
            gte: bound(&self.gte)?,
            lt: bound(&self.lt)?,
            lte: bound(&self.lte)?,
        })
    }

    pub fn contains(&self, value: &Value) -> bool {
        let above = |bound: &Option<Value>, strict: bool| match bound {
            None => true,
            Some(b) => matches!(
                (compare_values(value, b), strict),
                (Some(Ordering::Greater), _) | (Some(Ordering::Equal), false)
            ),
        };
        let below = |bound: &Option<Value>, strict: bool| match bound {
            None => true,
            Some(b) => matches!(
                (compare_values(value, b), strict),
                (Some(Ordering::Less), _) | (Some(Ordering::Equal), false)
            ),
        };
        above(&self.gt, true)
            && above(&self.gte, false)
            && below(&self.lt, true)
            && below(&self.lte, false)
    }
}

/// A test on one field's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    In(Vec<Value>),
    Range(Range),
}

impl Condition {
    /// Evaluates against the value of `field` (`None` when the field is absent).
    ///
    /// Absent fields only match `Eq(null)` or an `In` containing null. An array-valued
    /// field matches if any element does.
    pub fn matches(&self, field: &str, value: Option<&Value>) -> bool {
        let value = match value {
            None | Some(Value::Null) => {
                return match self {
                    Condition::Eq(v) => v.is_null(),
                    Condition::In(vs) => vs.iter().any(Value::is_null),
                    Condition::Range(_) => false,
                }
            }
            Some(v) => v,
        };
        if let Value::Array(items) = value {
            if self.matches_scalar(field, value) {
                return true;
            }
            return items.iter().any(|item| self.matches_scalar(field, item));
        }
        self.matches_scalar(field, value)
    }

    fn matches_scalar(&self, field: &str, value: &Value) -> bool {
        match self {
            Condition::Eq(v) => typed_literal(field, v).is_some_and(|v| values_equal(value, &v)),
            Condition::In(vs) => vs
                .iter()
                .filter_map(|v| typed_literal(field, v))
                .any(|v| values_equal(value, &v)),
            Condition::Range(range) => range.typed(field).is_some_and(|r| r.contains(value)),
        }
    }
}

/// One literal of a disjunctive clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub condition: Condition,
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            condition: Condition::Eq(value.into()),
        }
    }

    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            field: field.into(),
            condition: Condition::In(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.condition
            .matches(&self.field, doc.field(&self.field).as_ref())
    }
}

/// A conjunctive filter over document fields.
///
/// Unit clauses are kept per field in `fields`; clauses with more than one literal
/// live in `any_of`. A filter can also be the match-nothing filter, which is what
/// every conflicting combination collapses to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub(crate) fields: BTreeMap<String, Condition>,
    pub(crate) any_of: Vec<Vec<Predicate>>,
    pub(crate) nothing: bool,
}

impl Filter {
    /// Matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches no document.
    pub fn none() -> Self {
        Self {
            nothing: true,
            ..Self::default()
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, Condition::Eq(value.into()))
    }

    /// Membership. An empty set matches nothing.
    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Self::none();
        }
        Self::field(field, Condition::In(values))
    }

    pub fn range(field: impl Into<String>, range: Range) -> Self {
        Self::field(field, Condition::Range(range))
    }

    pub fn by_id(id: Uuid) -> Self {
        Self::eq("id", id.to_string())
    }

    /// A single clause satisfied when any predicate holds. Empty matches nothing.
    pub fn any_of(mut predicates: Vec<Predicate>) -> Self {
        match predicates.len() {
            0 => Self::none(),
            1 => {
                let p = predicates.remove(0);
                Self::field(p.field, p.condition)
            }
            _ => Self {
                any_of: vec![predicates],
                ..Self::default()
            },
        }
    }

    fn field(field: impl Into<String>, condition: Condition) -> Self {
        if let Condition::In(values) = &condition {
            if values.is_empty() {
                return Self::none();
            }
        }
        let mut fields = BTreeMap::new();
        fields.insert(field.into(), condition);
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Intersection with `other`. See [`merge`].
    pub fn and(&self, other: &Filter) -> Filter {
        merge(self, other)
    }

    pub fn is_nothing(&self) -> bool {
        self.nothing
    }

    pub fn is_all(&self) -> bool {
        !self.nothing && self.fields.is_empty() && self.any_of.is_empty()
    }

    pub fn condition(&self, field: &str) -> Option<&Condition> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn clauses(&self) -> &[Vec<Predicate>] {
        &self.any_of
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if self.nothing {
            return false;
        }
        self.fields
            .iter()
            .all(|(field, cond)| cond.matches(field, doc.field(field).as_ref()))
            && self
                .any_of
                .iter()
                .all(|clause| clause.iter().any(|p| p.matches(doc)))
    }

    /// Drops disjunct literals that contradict a unit clause on the same field and
    /// folds clauses that shrink to one literal into `fields`. Runs until stable.
    pub(crate) fn normalize(mut self) -> Filter {
        loop {
            if self.nothing {
                return Filter::none();
            }
            let mut changed = false;
            let mut kept = Vec::with_capacity(self.any_of.len());
            for clause in std::mem::take(&mut self.any_of) {
                let before = clause.len();
                let mut clause: Vec<Predicate> = clause
                    .into_iter()
                    .filter(|p| match self.fields.get(&p.field) {
                        Some(unit) => intersect(unit, &p.condition).is_some(),
                        None => true,
                    })
                    .collect();
                changed |= clause.len() != before;
                match clause.len() {
                    0 => return Filter::none(),
                    1 => {
                        let p = clause.remove(0);
                        let folded = match self.fields.get(&p.field) {
                            Some(unit) => intersect(unit, &p.condition),
                            None => Some(p.condition),
                        };
                        match folded {
                            Some(cond) => {
                                self.fields.insert(p.field, cond);
                            }
                            None => return Filter::none(),
                        }
                        changed = true;
                    }
                    _ => {
                        if !kept.contains(&clause) {
                            kept.push(clause);
                        }
                    }
                }
            }
            self.any_of = kept;
            if !changed {
                return self;
            }
        }
    }
}

/// Equality across JSON values, treating `1` and `1.0` as equal. Strings compare
/// exactly.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ord) => ord == Ordering::Equal,
        None => a == b,
    }
}

/// Orders two scalar JSON values of the same kind. `None` when the kinds differ or
/// the values are composite.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// A filter literal in the form [`Document::field`] reports `field` in.
///
/// Metadata fields are typed: any spelling of a UUID or an RFC 3339 instant is the
/// same value, and a literal of the wrong type is `None` and matches nothing. Body
/// fields compare as stored JSON.
fn typed_literal(field: &str, value: &Value) -> Option<Value> {
    match field {
        "id" | "_id" | "created_by" | "deleted_by" => value
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(|id| Value::String(id.to_string())),
        "created_at" | "updated_at" | "deleted_at" => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|at| instant_value(at.with_timezone(&Utc))),
        "deleted" => value.is_boolean().then(|| value.clone()),
        "revision" => value.as_i64().map(Value::from),
        _ => Some(value.clone()),
    }
}
