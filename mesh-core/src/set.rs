//! A small sorted-string-set helper used wherever the data model wants
//! deduplicated, lexicographically sorted string collections (route hosts,
//! in particular). Rust's `BTreeSet` already gives us the original
//! hand-rolled Go set for free, so this module is just the glue that turns
//! one into a plain sorted `Vec<String>` for serialization.

use std::collections::BTreeSet;

/// Deduplicates and sorts `items` lexicographically.
pub fn sorted_dedup<I, S>(items: I) -> Vec<String>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	items.into_iter().map(Into::into).collect::<BTreeSet<_>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dedups_and_sorts() {
		let got = sorted_dedup(["b", "a", "b", "c"]);
		assert_eq!(got, vec!["a", "b", "c"]);
	}

	#[test]
	fn empty_stays_empty() {
		let got: Vec<String> = sorted_dedup(Vec::<String>::new());
		assert!(got.is_empty());
	}
}
