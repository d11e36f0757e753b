//! Metadata filter types for search queries.
//!
//! A filter is a conjunction of clauses; each clause names a field and one
//! predicate form. Predicates are a closed tagged variant rather than
//! stringly-typed comparisons.

use serde::{Deserialize, Serialize};

use crate::entity::MetadataValue;
use crate::error::{CoreError, Result};

/// A conjunction of metadata predicates applied on top of similarity ranking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub clauses: Vec<FilterClause>,
}

/// A single predicate on one metadata field.
///
/// The field is looked up on the chunk's own metadata first, then on its
/// parent document's (chunk keys shadow document keys). A missing field
/// fails the clause unless `allow_missing` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    #[serde(flatten)]
    pub predicate: Predicate,
    #[serde(default)]
    pub allow_missing: bool,
}

/// Predicate forms covering the observed query surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Predicate {
    /// Field equals the scalar.
    Eq { value: MetadataValue },
    /// Field is one of the scalars.
    In { values: Vec<MetadataValue> },
    /// Field lies in `[gte, lte]`, bounds inclusive; omitting a bound makes
    /// the range open on that side.
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gte: Option<MetadataValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lte: Option<MetadataValue>,
    },
}

impl Filter {
    /// Rejects filter forms the evaluator cannot honor: empty `in` sets,
    /// ranges with no bound, and range bounds over booleans.
    pub fn validate(&self) -> Result<()> {
        for clause in &self.clauses {
            match &clause.predicate {
                Predicate::Eq { .. } => {}
                Predicate::In { values } => {
                    if values.is_empty() {
                        return Err(CoreError::Invalid(format!(
                            "filter on '{}': 'in' requires at least one value",
                            clause.field
                        )));
                    }
                }
                Predicate::Range { gte, lte } => {
                    if gte.is_none() && lte.is_none() {
                        return Err(CoreError::Invalid(format!(
                            "filter on '{}': range requires at least one bound",
                            clause.field
                        )));
                    }
                    for bound in [gte, lte].into_iter().flatten() {
                        if matches!(bound, MetadataValue::Bool(_)) {
                            return Err(CoreError::Invalid(format!(
                                "filter on '{}': booleans are not ordered",
                                clause.field
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
