//! Compile metadata filters into the SQL predicate LanceDB evaluates as a
//! pre-filter.

use zipsa_core::filter::{effective_bounds, Field, Filter, Value};
use zipsa_core::{Result, RetrievalError};

use crate::schema::{reserved_char, trait_column, TAG_DELIMITER};

/// `None` when the filter places no constraint.
pub fn to_sql(filter: &Filter, known_traits: &[String]) -> Result<Option<String>> {
	let mut clauses = Vec::new();
	for leaf in filter.leaves() {
		clauses.push(compile_leaf(leaf, known_traits)?);
	}
	if clauses.is_empty() {
		return Ok(None);
	}
	Ok(Some(clauses.iter().map(|c| format!("({c})")).collect::<Vec<_>>().join(" AND ")))
}

fn compile_leaf(leaf: &Filter, known_traits: &[String]) -> Result<String> {
	match leaf {
		Filter::Equals(field @ (Field::Specialists | Field::Categories), Value::Text(tag)) => {
			if let Some(c) = reserved_char(tag) {
				return Err(RetrievalError::InvalidFilter(format!("tag '{tag}' contains '{c}'")));
			}
			let column = if matches!(field, Field::Specialists) { "specialists" } else { "categories" };
			Ok(format!("{column} LIKE '%{TAG_DELIMITER}{}{TAG_DELIMITER}%'", escape(tag)))
		}
		Filter::Equals(Field::Trait(name), Value::Int(v)) => Ok(format!("{} = {v}", column_for(name, known_traits)?)),
		Filter::Range { field: Field::Trait(name), min, max } => {
			let column = column_for(name, known_traits)?;
			let (lo, hi) = effective_bounds(*min, *max);
			Ok(match hi {
				Some(hi) => format!("{column} >= {lo} AND {column} <= {hi}"),
				None => format!("{column} >= {lo}"),
			})
		}
		other => Err(RetrievalError::InvalidFilter(format!("dense index cannot evaluate {other:?}"))),
	}
}

fn column_for(name: &str, known_traits: &[String]) -> Result<String> {
	if known_traits.iter().any(|t| t == name) {
		Ok(trait_column(name))
	} else {
		Err(RetrievalError::InvalidFilter(format!("unknown numeric trait '{name}'")))
	}
}

fn escape(s: &str) -> String {
	s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn traits() -> Vec<String> {
		vec!["hypoallergenic".to_string(), "shedding_level".to_string()]
	}

	#[test]
	fn empty_filter_compiles_to_nothing() {
		assert_eq!(to_sql(&Filter::default(), &traits()).expect("sql"), None);
	}

	#[test]
	fn clauses_are_conjoined() {
		let filter = Filter::And(vec![
			Filter::equals_text(Field::Specialists, "Matchmaker"),
			Filter::trait_eq("hypoallergenic", 1),
			Filter::trait_range("shedding_level", None, Some(2)),
		]);
		let sql = to_sql(&filter, &traits()).expect("sql").expect("some");
		assert_eq!(
			sql,
			"(specialists LIKE '%|Matchmaker|%') AND (trait_hypoallergenic = 1) AND (trait_shedding_level >= 1 AND trait_shedding_level <= 2)"
		);
	}

	#[test]
	fn quotes_are_escaped() {
		let sql = to_sql(&Filter::equals_text(Field::Categories, "Owner's Guide"), &traits()).expect("sql").expect("some");
		assert_eq!(sql, "(categories LIKE '%|Owner''s Guide|%')");
	}

	#[test]
	fn unknown_traits_and_delimiters_are_rejected() {
		assert!(matches!(to_sql(&Filter::trait_eq("wingspan", 1), &traits()), Err(RetrievalError::InvalidFilter(_))));
		assert!(to_sql(&Filter::equals_text(Field::Specialists, "a|b"), &traits()).is_err());
	}

	#[test]
	fn like_wildcards_in_tags_are_rejected() {
		for tag in ["100%", "Cat_Care"] {
			let err = to_sql(&Filter::equals_text(Field::Categories, tag), &traits());
			assert!(matches!(err, Err(RetrievalError::InvalidFilter(_))), "{tag}");
		}
	}
}
