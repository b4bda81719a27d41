//! Filter intersection.
//!
//! `merge(a, b)` selects exactly the documents both `a` and `b` select. Clauses on
//! distinct fields pass through; clauses on the same field are intersected here.
//! Any contradiction collapses the result to the match-nothing filter instead of
//! raising: a scope conflict must never widen what a caller sees, and must not tell
//! the caller that anything exists outside its scope.

use std::cmp::Ordering;

use serde_json::Value;

use crate::query::filter::{compare_values, values_equal, Condition, Filter, Range};

/// Intersects two filters. Never fails; conflicts yield [`Filter::none`].
pub fn merge(base: &Filter, scope: &Filter) -> Filter {
    if base.nothing || scope.nothing {
        return Filter::none();
    }

    let mut merged = base.clone();
    for (field, condition) in &scope.fields {
        let next = match merged.fields.get(field) {
            None => Some(condition.clone()),
            Some(existing) => intersect(existing, condition),
        };
        match next {
            Some(c) => {
                merged.fields.insert(field.clone(), c);
            }
            None => return Filter::none(),
        }
    }
    for clause in &scope.any_of {
        if !merged.any_of.contains(clause) {
            merged.any_of.push(clause.clone());
        }
    }
    merged.normalize()
}

/// The condition matching exactly what both `a` and `b` match on one field, or
/// `None` when nothing can.
///
/// Two different equalities are a conflict even though an array-valued field could
/// hold both values; the stricter reading is the safe one here.
pub(crate) fn intersect(a: &Condition, b: &Condition) -> Option<Condition> {
    match (a, b) {
        (Condition::Eq(x), Condition::Eq(y)) => values_equal(x, y).then(|| a.clone()),
        (Condition::Eq(x), Condition::In(set)) | (Condition::In(set), Condition::Eq(x)) => set
            .iter()
            .any(|v| values_equal(x, v))
            .then(|| Condition::Eq(x.clone())),
        (Condition::In(left), Condition::In(right)) => {
            let common: Vec<Value> = left
                .iter()
                .filter(|v| right.iter().any(|w| values_equal(v, w)))
                .cloned()
                .collect();
            (!common.is_empty()).then_some(Condition::In(common))
        }
        (Condition::Eq(x), Condition::Range(r)) | (Condition::Range(r), Condition::Eq(x)) => {
            r.contains(x).then(|| Condition::Eq(x.clone()))
        }
        (Condition::In(set), Condition::Range(r)) | (Condition::Range(r), Condition::In(set)) => {
            let inside: Vec<Value> = set.iter().filter(|v| r.contains(v)).cloned().collect();
            (!inside.is_empty()).then_some(Condition::In(inside))
        }
        (Condition::Range(x), Condition::Range(y)) => tighten(x, y).map(Condition::Range),
    }
}

/// Narrowest range inside both. `None` if empty or if bounds are of different kinds.
fn tighten(a: &Range, b: &Range) -> Option<Range> {
    let (gt, gte) = pick_bound(
        (a.gt.as_ref(), a.gte.as_ref()),
        (b.gt.as_ref(), b.gte.as_ref()),
        Ordering::Greater,
    )?;
    let (lt, lte) = pick_bound(
        (a.lt.as_ref(), a.lte.as_ref()),
        (b.lt.as_ref(), b.lte.as_ref()),
        Ordering::Less,
    )?;
    let range = Range { gt, gte, lt, lte };

    let lower = range.gt.as_ref().map(|v| (v, true)).or(range.gte.as_ref().map(|v| (v, false)));
    let upper = range.lt.as_ref().map(|v| (v, true)).or(range.lte.as_ref().map(|v| (v, false)));
    if let (Some((lo, lo_strict)), Some((hi, hi_strict))) = (lower, upper) {
        match compare_values(lo, hi)? {
            Ordering::Greater => return None,
            Ordering::Equal if lo_strict || hi_strict => return None,
            _ => {}
        }
    }
    Some(range)
}

type Bound = (Option<Value>, Option<Value>);

/// Collapses up to four bounds on one side into the single most restrictive one,
/// returned as `(strict, inclusive)` with at most one set. `tighter` is the
/// ordering that makes a bound more restrictive on this side.
fn pick_bound(
    a: (Option<&Value>, Option<&Value>),
    b: (Option<&Value>, Option<&Value>),
    tighter: Ordering,
) -> Option<Bound> {
    let candidates = [(a.0, true), (a.1, false), (b.0, true), (b.1, false)];
    let mut best: Option<(&Value, bool)> = None;
    for (value, strict) in candidates {
        let Some(value) = value else { continue };
        best = match best {
            None => Some((value, strict)),
            Some((current, current_strict)) => match compare_values(value, current)? {
                ord if ord == tighter => Some((value, strict)),
                Ordering::Equal => Some((current, current_strict || strict)),
                _ => Some((current, current_strict)),
            },
        };
    }
    Some(match best {
        None => (None, None),
        Some((v, true)) => (Some(v.clone()), None),
        Some((v, false)) => (None, Some(v.clone())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::query::filter::Predicate;
    use serde_json::{json, Map};

    fn doc(body: Value) -> Document {
        Document::new(None, body.as_object().cloned().unwrap_or_else(Map::new))
    }

    #[test]
    fn test_conflicting_equality_matches_nothing() {
        let merged = merge(&Filter::eq("a", 1), &Filter::eq("a", 2));
        assert!(merged.is_nothing());
        assert!(!merged.matches(&doc(json!({"a": 1}))));
        assert!(!merged.matches(&doc(json!({"a": 2}))));
    }

    #[test]
    fn test_equal_equality_is_kept() {
        let merged = merge(&Filter::eq("a", 1), &Filter::eq("a", 1.0));
        assert_eq!(merged.condition("a"), Some(&Condition::Eq(json!(1))));
    }

    #[test]
    fn test_disjoint_fields_pass_through() {
        let merged = merge(&Filter::eq("id", "r1"), &Filter::is_in("company_id", ["c1", "c2"]));
        // a document with another id is excluded even inside the company set
        assert!(!merged.matches(&doc(json!({"company_id": "c2"}))));
        assert_eq!(merged.condition("id"), Some(&Condition::Eq(json!("r1"))));
        assert_eq!(
            merged.condition("company_id"),
            Some(&Condition::In(vec![json!("c1"), json!("c2")]))
        );
    }

    #[test]
    fn test_equality_inside_membership_keeps_equality() {
        let merged = merge(&Filter::eq("company_id", "c1"), &Filter::is_in("company_id", ["c1", "c2"]));
        assert_eq!(merged.condition("company_id"), Some(&Condition::Eq(json!("c1"))));
    }

    #[test]
    fn test_equality_outside_membership_matches_nothing() {
        let merged = merge(&Filter::is_in("company_id", ["c1", "c2"]), &Filter::eq("company_id", "c9"));
        assert!(merged.is_nothing());
    }

    #[test]
    fn test_membership_intersection() {
        let merged = merge(&Filter::is_in("s", ["a", "b", "c"]), &Filter::is_in("s", ["c", "b", "z"]));
        assert_eq!(merged.condition("s"), Some(&Condition::In(vec![json!("b"), json!("c")])));
        assert!(merge(&Filter::is_in("s", ["a"]), &Filter::is_in("s", ["b"])).is_nothing());
    }

    #[test]
    fn test_range_tightening() {
        let merged = merge(
            &Filter::range("n", Range::gte(10)),
            &Filter::range("n", Range::gt(10)),
        );
        assert_eq!(merged.condition("n"), Some(&Condition::Range(Range::gt(10))));

        let merged = merge(&Filter::range("n", Range::gte(5)), &Filter::range("n", Range::lt(20)));
        assert!(merged.matches(&doc(json!({"n": 5}))));
        assert!(!merged.matches(&doc(json!({"n": 20}))));

        assert!(merge(&Filter::range("n", Range::gt(5)), &Filter::range("n", Range::lt(5))).is_nothing());
        assert!(merge(&Filter::range("n", Range::gt(5)), &Filter::range("n", Range::lte(5))).is_nothing());
        assert!(!merge(&Filter::range("n", Range::gte(5)), &Filter::range("n", Range::lte(5))).is_nothing());
    }

    #[test]
    fn test_equality_against_range() {
        assert!(merge(&Filter::eq("n", 3), &Filter::range("n", Range::gt(5))).is_nothing());
        let merged = merge(&Filter::eq("n", 7), &Filter::range("n", Range::gt(5)));
        assert_eq!(merged.condition("n"), Some(&Condition::Eq(json!(7))));
    }

    #[test]
    fn test_nothing_absorbs() {
        assert!(merge(&Filter::none(), &Filter::all()).is_nothing());
        assert!(merge(&Filter::eq("a", 1), &Filter::none()).is_nothing());
    }

    #[test]
    fn test_all_is_identity() {
        let f = Filter::eq("a", 1);
        assert_eq!(merge(&f, &Filter::all()), f);
        assert_eq!(merge(&Filter::all(), &f), f);
    }

    #[test]
    fn test_merge_is_commutative_on_match_sets() {
        let a = Filter::is_in("company_id", ["c1", "c2"]);
        let b = Filter::any_of(vec![
            Predicate::eq("company_id", "c2"),
            Predicate::eq("created_by", "u1"),
        ]);
        let samples = [
            json!({"company_id": "c1"}),
            json!({"company_id": "c2"}),
            json!({"company_id": "c3"}),
        ];
        for s in samples {
            let d = doc(s);
            assert_eq!(merge(&a, &b).matches(&d), merge(&b, &a).matches(&d));
            assert_eq!(merge(&a, &b).matches(&d), a.matches(&d) && b.matches(&d));
        }
    }

    #[test]
    fn test_disjunct_pruned_by_unit_clause() {
        // endpoint pins company c3; scope allows c1 or the caller's own records
        let scope = Filter::any_of(vec![
            Predicate::is_in("company_id", ["c1"]),
            Predicate::eq("created_by", "u1"),
        ]);
        let merged = merge(&Filter::eq("company_id", "c3"), &scope);
        assert!(merged.clauses().is_empty());
        assert_eq!(merged.condition("created_by"), Some(&Condition::Eq(json!("u1"))));

        let pinned = merge(
            &Filter::eq("company_id", "c3").and(&Filter::eq("created_by", "u2")),
            &scope,
        );
        assert!(pinned.is_nothing());
    }
}
