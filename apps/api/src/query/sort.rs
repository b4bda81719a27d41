#![allow(dead_code)]

use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;

use crate::models::Document;
use crate::query::filter::compare_values;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid sort field '{0}'")]
pub struct SortError(pub String);

/// Ordered sort keys. Ties always fall back to insertion order so that paging is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort {
    keys: Vec<(String, Direction)>,
}

impl Sort {
    pub fn by(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            keys: vec![(field.into(), direction)],
        }
    }

    pub fn then(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.keys.push((field.into(), direction));
        self
    }

    /// Parses `"-created_at,name"`: comma separated fields, `-` for descending.
    pub fn parse(raw: &str) -> Result<Self, SortError> {
        let mut keys = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (field, direction) = match part.strip_prefix('-') {
                Some(rest) => (rest, Direction::Desc),
                None => (part.strip_prefix('+').unwrap_or(part), Direction::Asc),
            };
            if !is_valid_field(field) {
                return Err(SortError(part.to_string()));
            }
            keys.push((field.to_string(), direction));
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[(String, Direction)] {
        &self.keys
    }

    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (field, direction) in &self.keys {
            let ord = sort_order(a.field(field).as_ref(), b.field(field).as_ref());
            let ord = match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.meta.seq.cmp(&b.meta.seq)
    }
}

/// Field names are plain identifiers; they end up in SQL as bound parameters or
/// column names from a fixed list, never spliced.
pub fn is_valid_field(field: &str) -> bool {
    let mut chars = field.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Total order for sorting: missing/null, numbers, strings, objects, arrays, bools.
fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }
    match rank(a).cmp(&rank(b)) {
        Ordering::Equal => match (a, b) {
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        other => other,
    }
}
