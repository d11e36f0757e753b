//! Metadata filter evaluation.
//!
//! A chunk matches a filter iff every clause holds against its own metadata
//! or, where a key is absent there, its parent document's metadata.

use std::cmp::Ordering;

use crate::entity::{Metadata, MetadataValue};
use crate::filter_types::{Filter, FilterClause, Predicate};

/// Check a chunk (with its parent document's metadata) against a filter.
/// Chunk-map keys shadow document-map keys.
pub fn chunk_matches(chunk_meta: &Metadata, doc_meta: &Metadata, filter: &Filter) -> bool {
    filter.clauses.iter().all(|clause| {
        let value = chunk_meta
            .get(&clause.field)
            .or_else(|| doc_meta.get(&clause.field));
        evaluate_clause(value, clause)
    })
}

fn evaluate_clause(value: Option<&MetadataValue>, clause: &FilterClause) -> bool {
    let Some(value) = value else {
        return clause.allow_missing;
    };
    match &clause.predicate {
        Predicate::Eq { value: expected } => scalar_eq(value, expected),
        Predicate::In { values } => values.iter().any(|v| scalar_eq(value, v)),
        Predicate::Range { gte, lte } => {
            if let Some(lo) = gte {
                match scalar_cmp(value, lo) {
                    Some(Ordering::Less) | None => return false,
                    _ => {}
                }
            }
            if let Some(hi) = lte {
                match scalar_cmp(value, hi) {
                    Some(Ordering::Greater) | None => return false,
                    _ => {}
                }
            }
            true
        }
    }
}

/// Equality across scalar types. Int and Float compare numerically so that
/// `7 == 7.0`; all other cross-type comparisons are unequal.
fn scalar_eq(a: &MetadataValue, b: &MetadataValue) -> bool {
    match (a, b) {
        (MetadataValue::Str(x), MetadataValue::Str(y)) => x == y,
        (MetadataValue::Bool(x), MetadataValue::Bool(y)) => x == y,
        (MetadataValue::Int(x), MetadataValue::Int(y)) => x == y,
        (MetadataValue::Float(x), MetadataValue::Float(y)) => x == y,
        (MetadataValue::Int(x), MetadataValue::Float(y))
        | (MetadataValue::Float(y), MetadataValue::Int(x)) => *x as f64 == *y,
        _ => false,
    }
}

/// Ordering across scalars: numbers compare as f64, strings lexically.
/// Booleans and mixed string/number pairs are unordered.
fn scalar_cmp(a: &MetadataValue, b: &MetadataValue) -> Option<Ordering> {
    match (a, b) {
        (MetadataValue::Str(x), MetadataValue::Str(y)) => Some(x.cmp(y)),
        _ => {
            let x = numeric(a)?;
            let y = numeric(b)?;
            x.partial_cmp(&y)
        }
    }
}

fn numeric(v: &MetadataValue) -> Option<f64> {
    match v {
        MetadataValue::Int(i) => Some(*i as f64),
        MetadataValue::Float(f) => Some(*f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, MetadataValue)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn filter(json: &str) -> Filter {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn eq_string_match_and_mismatch() {
        let f = filter(r#"{"clauses": [{"field": "section", "op": "eq", "value": "intro"}]}"#);
        let m = meta(&[("section", MetadataValue::Str("intro".into()))]);
        assert!(chunk_matches(&m, &Metadata::new(), &f));
        let m = meta(&[("section", MetadataValue::Str("body".into()))]);
        assert!(!chunk_matches(&m, &Metadata::new(), &f));
    }

    #[test]
    fn in_membership() {
        let f = filter(r#"{"clauses": [{"field": "lang", "op": "in", "values": ["en", "it"]}]}"#);
        let m = meta(&[("lang", MetadataValue::Str("it".into()))]);
        assert!(chunk_matches(&m, &Metadata::new(), &f));
        let m = meta(&[("lang", MetadataValue::Str("de".into()))]);
        assert!(!chunk_matches(&m, &Metadata::new(), &f));
    }

    #[test]
    fn range_inclusive_bounds() {
        let f = filter(r#"{"clauses": [{"field": "year", "op": "range", "gte": 2020, "lte": 2022}]}"#);
        for (y, expect) in [(2019, false), (2020, true), (2021, true), (2022, true), (2023, false)] {
            let m = meta(&[("year", MetadataValue::Int(y))]);
            assert_eq!(chunk_matches(&m, &Metadata::new(), &f), expect, "year {y}");
        }
    }

    #[test]
    fn range_open_side() {
        let f = filter(r#"{"clauses": [{"field": "score", "op": "range", "gte": 0.5}]}"#);
        let m = meta(&[("score", MetadataValue::Float(0.9))]);
        assert!(chunk_matches(&m, &Metadata::new(), &f));
        let m = meta(&[("score", MetadataValue::Float(0.1))]);
        assert!(!chunk_matches(&m, &Metadata::new(), &f));
    }

    #[test]
    fn int_float_numeric_equality() {
        let f = filter(r#"{"clauses": [{"field": "n", "op": "eq", "value": 7.0}]}"#);
        let m = meta(&[("n", MetadataValue::Int(7))]);
        assert!(chunk_matches(&m, &Metadata::new(), &f));
    }

    #[test]
    fn string_range_is_lexicographic() {
        let f = filter(r#"{"clauses": [{"field": "name", "op": "range", "gte": "b", "lte": "d"}]}"#);
        let m = meta(&[("name", MetadataValue::Str("c".into()))]);
        assert!(chunk_matches(&m, &Metadata::new(), &f));
        let m = meta(&[("name", MetadataValue::Str("e".into()))]);
        assert!(!chunk_matches(&m, &Metadata::new(), &f));
    }

    #[test]
    fn missing_field_fails_unless_allowed() {
        let f = filter(r#"{"clauses": [{"field": "gone", "op": "eq", "value": 1}]}"#);
        assert!(!chunk_matches(&Metadata::new(), &Metadata::new(), &f));

        let f = filter(
            r#"{"clauses": [{"field": "gone", "op": "eq", "value": 1, "allow_missing": true}]}"#,
        );
        assert!(chunk_matches(&Metadata::new(), &Metadata::new(), &f));
    }

    #[test]
    fn document_metadata_is_consulted() {
        let f = filter(r#"{"clauses": [{"field": "author", "op": "eq", "value": "ada"}]}"#);
        let doc = meta(&[("author", MetadataValue::Str("ada".into()))]);
        assert!(chunk_matches(&Metadata::new(), &doc, &f));
    }

    #[test]
    fn chunk_metadata_shadows_document() {
        let f = filter(r#"{"clauses": [{"field": "author", "op": "eq", "value": "ada"}]}"#);
        let chunk = meta(&[("author", MetadataValue::Str("bob".into()))]);
        let doc = meta(&[("author", MetadataValue::Str("ada".into()))]);
        assert!(!chunk_matches(&chunk, &doc, &f));
    }

    #[test]
    fn all_clauses_must_hold() {
        let f = filter(
            r#"{"clauses": [
                {"field": "section", "op": "eq", "value": "intro"},
                {"field": "year", "op": "range", "gte": 2021}
            ]}"#,
        );
        let m = meta(&[
            ("section", MetadataValue::Str("intro".into())),
            ("year", MetadataValue::Int(2020)),
        ]);
        assert!(!chunk_matches(&m, &Metadata::new(), &f));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = Filter::default();
        assert!(chunk_matches(&Metadata::new(), &Metadata::new(), &f));
    }

    #[test]
    fn type_mismatch_is_not_equal() {
        let f = filter(r#"{"clauses": [{"field": "x", "op": "eq", "value": "7"}]}"#);
        let m = meta(&[("x", MetadataValue::Int(7))]);
        assert!(!chunk_matches(&m, &Metadata::new(), &f));
    }

    #[test]
    fn bool_is_unordered_in_range() {
        let f = filter(r#"{"clauses": [{"field": "x", "op": "range", "gte": 1}]}"#);
        let m = meta(&[("x", MetadataValue::Bool(true))]);
        assert!(!chunk_matches(&m, &Metadata::new(), &f));
    }
}
