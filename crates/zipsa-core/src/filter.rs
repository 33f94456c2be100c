//! Metadata filter expressions.
//!
//! Filters are built once per request and compiled by each backend into its
//! own predicate form (tantivy queries, LanceDB SQL). `matches` evaluates the
//! same expression against an in-memory [`Document`].
//!
//! Numeric traits use 0 for "unset", and an unset trait never satisfies a
//! positive constraint: a range without a lower bound gets an implicit lower
//! bound of 1 unless its upper bound is itself 0.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, RetrievalError};
use crate::types::Document;

/// The metadata field a clause constrains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Specialists,
    Categories,
    Trait(String),
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Specialists => f.write_str("specialists"),
            Field::Categories => f.write_str("categories"),
            Field::Trait(name) => write!(f, "numeric_traits.{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Equals(Field, Value),
    Range { field: Field, min: Option<i64>, max: Option<i64> },
    And(Vec<Filter>),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::And(Vec::new())
    }
}

impl Filter {
    pub fn equals_text(field: Field, value: impl Into<String>) -> Self {
        Filter::Equals(field, Value::Text(value.into()))
    }

    pub fn trait_eq(name: impl Into<String>, value: i64) -> Self {
        Filter::Equals(Field::Trait(name.into()), Value::Int(value))
    }

    pub fn trait_range(name: impl Into<String>, min: Option<i64>, max: Option<i64>) -> Self {
        Filter::Range { field: Field::Trait(name.into()), min, max }
    }

    /// True when the expression places no constraint at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Filter::And(children) => children.iter().all(Filter::is_empty),
            _ => false,
        }
    }

    /// Leaf clauses in declaration order, with nested `And`s flattened.
    pub fn leaves(&self) -> Vec<&Filter> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Filter>) {
        match self {
            Filter::And(children) => children.iter().for_each(|c| c.collect_leaves(out)),
            leaf => out.push(leaf),
        }
    }

    /// Flatten nested conjunctions; a single clause is returned bare.
    pub fn simplify(self) -> Filter {
        match self {
            Filter::And(children) => {
                let mut flat: Vec<Filter> = Vec::new();
                for child in children {
                    match child.simplify() {
                        Filter::And(inner) => flat.extend(inner),
                        leaf => flat.push(leaf),
                    }
                }
                if flat.len() == 1 { flat.remove(0) } else { Filter::And(flat) }
            }
            leaf => leaf,
        }
    }

    /// Names of all numeric traits referenced by the expression.
    pub fn trait_names(&self) -> Vec<&str> {
        self.leaves()
            .into_iter()
            .filter_map(|leaf| match leaf {
                Filter::Equals(Field::Trait(name), _) | Filter::Range { field: Field::Trait(name), .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Reject shapes no backend can compile.
    pub fn validate(&self) -> Result<()> {
        for leaf in self.leaves() {
            match leaf {
                Filter::Equals(Field::Trait(name), value) => {
                    check_trait_name(name)?;
                    if !matches!(value, Value::Int(_)) {
                        return Err(RetrievalError::InvalidFilter(format!("trait '{name}' compares against integers only")));
                    }
                }
                Filter::Equals(field, value) => match value {
                    Value::Text(tag) if tag.trim().is_empty() => {
                        return Err(RetrievalError::InvalidFilter(format!("empty tag for {field}")));
                    }
                    Value::Text(_) => {}
                    Value::Int(_) => {
                        return Err(RetrievalError::InvalidFilter(format!("{field} compares against text tags only")));
                    }
                },
                Filter::Range { field: Field::Trait(name), min, max } => {
                    check_trait_name(name)?;
                    match (min, max) {
                        (None, None) => {
                            return Err(RetrievalError::InvalidFilter(format!("range on '{name}' has no bounds")));
                        }
                        (Some(lo), Some(hi)) if lo > hi => {
                            return Err(RetrievalError::InvalidFilter(format!("range on '{name}' has gte {lo} > lte {hi}")));
                        }
                        _ => {}
                    }
                }
                Filter::Range { field, .. } => {
                    return Err(RetrievalError::InvalidFilter(format!("range constraints apply to numeric traits, not {field}")));
                }
                Filter::And(_) => {}
            }
        }
        Ok(())
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|c| c.matches(doc)),
            Filter::Equals(Field::Specialists, Value::Text(tag)) => doc.specialists.contains(tag),
            Filter::Equals(Field::Categories, Value::Text(tag)) => doc.categories.contains(tag),
            Filter::Equals(Field::Trait(name), Value::Int(v)) => doc.trait_value(name) == *v,
            Filter::Range { field: Field::Trait(name), min, max } => {
                let (lo, hi) = effective_bounds(*min, *max);
                let value = doc.trait_value(name);
                value >= lo && hi.map_or(true, |hi| value <= hi)
            }
            _ => false,
        }
    }
}

/// Inclusive bounds a range clause compiles to, after applying the unset rule.
pub fn effective_bounds(min: Option<i64>, max: Option<i64>) -> (i64, Option<i64>) {
    let lo = match (min, max) {
        (Some(lo), _) => lo,
        (None, Some(hi)) => hi.min(1),
        (None, None) => 1,
    };
    (lo, max)
}

fn check_trait_name(name: &str) -> Result<()> {
    let ok = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok { Ok(()) } else { Err(RetrievalError::InvalidFilter(format!("invalid trait name '{name}'"))) }
}

/// Wire form of one numeric constraint: `{"eq": 1}`, `{"gte": 3}`, `{"lte": 2}`
/// or a combination of `gte` and `lte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumericConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<i64>,
}

impl NumericConstraint {
    pub fn eq(value: i64) -> Self {
        Self { eq: Some(value), ..Self::default() }
    }

    pub fn gte(value: i64) -> Self {
        Self { gte: Some(value), ..Self::default() }
    }

    pub fn lte(value: i64) -> Self {
        Self { lte: Some(value), ..Self::default() }
    }

    pub fn between(min: i64, max: i64) -> Self {
        Self { eq: None, gte: Some(min), lte: Some(max) }
    }

    pub fn to_filter(&self, name: &str) -> Result<Filter> {
        let mut clauses = Vec::new();
        if let Some(v) = self.eq {
            clauses.push(Filter::trait_eq(name, v));
        }
        if self.gte.is_some() || self.lte.is_some() {
            clauses.push(Filter::trait_range(name, self.gte, self.lte));
        }
        if clauses.is_empty() {
            return Err(RetrievalError::InvalidFilter(format!("constraint on '{name}' needs one of eq, gte, lte")));
        }
        Ok(Filter::And(clauses).simplify())
    }
}

impl std::str::FromStr for NumericConstraint {
    type Err = RetrievalError;

    /// Parse the CLI shorthand `eq:1`, `gte:3`, `lte:2` or `3..5`.
    fn from_str(s: &str) -> Result<Self> {
        let bad = || RetrievalError::InvalidFilter(format!("cannot parse numeric constraint '{s}'"));
        if let Some((lo, hi)) = s.split_once("..") {
            let lo = lo.trim().parse().map_err(|_| bad())?;
            let hi = hi.trim().parse().map_err(|_| bad())?;
            return Ok(Self::between(lo, hi));
        }
        let (op, value) = s.split_once(':').ok_or_else(bad)?;
        let value: i64 = value.trim().parse().map_err(|_| bad())?;
        match op.trim() {
            "eq" => Ok(Self::eq(value)),
            "gte" => Ok(Self::gte(value)),
            "lte" => Ok(Self::lte(value)),
            _ => Err(bad()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: &str) -> Document {
        Document::new(id, "text")
    }

    #[test]
    fn unset_trait_fails_positive_constraints() {
        let unset = cat("a");
        let low = cat("b").with_trait("shedding_level", 2);
        assert!(!Filter::trait_range("shedding_level", None, Some(3)).matches(&unset));
        assert!(Filter::trait_range("shedding_level", None, Some(3)).matches(&low));
        assert!(!Filter::trait_range("shedding_level", Some(3), None).matches(&low));
        assert!(Filter::trait_eq("shedding_level", 0).matches(&unset));
        assert!(Filter::trait_range("shedding_level", Some(0), Some(3)).matches(&unset));
    }

    #[test]
    fn tags_match_by_membership() {
        let doc = cat("a").with_specialist("Physician").with_category("Health");
        assert!(Filter::equals_text(Field::Specialists, "Physician").matches(&doc));
        assert!(!Filter::equals_text(Field::Specialists, "Liaison").matches(&doc));
        assert!(Filter::equals_text(Field::Categories, "Health").matches(&doc));
        assert!(Filter::default().matches(&doc));
    }

    #[test]
    fn simplify_flattens_nested_conjunctions() {
        let f = Filter::And(vec![
            Filter::And(vec![Filter::trait_eq("lap", 1)]),
            Filter::And(vec![Filter::trait_eq("indoor", 1), Filter::And(vec![])]),
        ]);
        let simple = f.simplify();
        assert_eq!(simple, Filter::And(vec![Filter::trait_eq("lap", 1), Filter::trait_eq("indoor", 1)]));
        assert_eq!(Filter::And(vec![Filter::trait_eq("lap", 1)]).simplify(), Filter::trait_eq("lap", 1));
    }

    #[test]
    fn invalid_shapes_are_rejected() {
        assert!(Filter::trait_range("energy_level", Some(4), Some(2)).validate().is_err());
        assert!(Filter::trait_range("energy_level", None, None).validate().is_err());
        assert!(Filter::trait_eq("", 1).validate().is_err());
        assert!(Filter::trait_eq("bad name'", 1).validate().is_err());
        assert!(Filter::Equals(Field::Specialists, Value::Int(1)).validate().is_err());
        assert!(Filter::Range { field: Field::Categories, min: Some(1), max: None }.validate().is_err());
        assert!(NumericConstraint::default().to_filter("lap").is_err());
    }

    #[test]
    fn constraint_combines_operators() {
        let f = NumericConstraint { eq: Some(3), gte: Some(2), lte: Some(4) }.to_filter("grooming").expect("filter");
        assert_eq!(f.leaves().len(), 2);
        assert_eq!(f.trait_names(), vec!["grooming", "grooming"]);
    }

    #[test]
    fn constraint_shorthand_parses() {
        assert_eq!("eq:1".parse::<NumericConstraint>().expect("eq"), NumericConstraint::eq(1));
        assert_eq!("lte: 2".parse::<NumericConstraint>().expect("lte"), NumericConstraint::lte(2));
        assert_eq!("2..4".parse::<NumericConstraint>().expect("range"), NumericConstraint::between(2, 4));
        assert!("near:3".parse::<NumericConstraint>().is_err());
    }

    #[test]
    fn constraint_rejects_unknown_operators_on_the_wire() {
        assert!(serde_json::from_str::<NumericConstraint>(r#"{"gt": 1}"#).is_err());
    }
}
