//! Metadata filter construction.
//!
//! A filter is an AND over dimension subclauses, each an OR over values.
//! Filters prune candidates but never influence ranking, so the final
//! clause is wrapped in a zero-score constant query. Constructed clauses
//! are cached by filter shape; entries are immutable once built.

use std::hash::{Hash, Hasher};

use ahash::AHasher;
use common::{SearchFilters, error::SearchError};
use dashmap::DashMap;
use tantivy::query::{
    BooleanQuery, ConstScoreQuery, Occur, Query, QueryClone, RegexQuery, TermQuery,
};
use tantivy::schema::{IndexRecordOption, Term};

use crate::schema::IndexFields;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDimension {
    Languages,
    Repositories,
    FilePaths,
    EntityTypes,
}

/// Drop one dimension from a filter set. Facet counting uses this so a
/// selected value does not zero out its own facet.
pub fn without_dimension(filters: &SearchFilters, dimension: FilterDimension) -> SearchFilters {
    let mut reduced = filters.clone();
    match dimension {
        FilterDimension::Languages => reduced.languages.clear(),
        FilterDimension::Repositories => reduced.repositories.clear(),
        FilterDimension::FilePaths => reduced.file_paths.clear(),
        FilterDimension::EntityTypes => reduced.entity_types.clear(),
    }
    reduced
}

#[derive(Default)]
pub struct FilterEngine {
    cache: DashMap<u64, Box<dyn Query>>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build (or fetch from cache) the filter clause for a filter set.
    /// Returns `None` when no dimension is constrained.
    pub fn build(
        &self,
        fields: &IndexFields,
        filters: &SearchFilters,
    ) -> Result<Option<Box<dyn Query>>, SearchError> {
        filters.validate()?;
        if filters.is_empty() {
            return Ok(None);
        }
        let key = shape_hash(filters);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(shape = key, "filter clause served from cache");
            return Ok(Some(cached.value().box_clone()));
        }
        let query = build_filter_query(fields, filters)?;
        self.cache.insert(key, query.box_clone());
        Ok(Some(query))
    }

    #[cfg(test)]
    fn cached_shapes(&self) -> usize {
        self.cache.len()
    }
}

fn shape_hash(filters: &SearchFilters) -> u64 {
    let mut hasher = AHasher::default();
    filters.hash(&mut hasher);
    hasher.finish()
}

fn build_filter_query(
    fields: &IndexFields,
    filters: &SearchFilters,
) -> Result<Box<dyn Query>, SearchError> {
    let mut dimensions: Vec<(Occur, Box<dyn Query>)> = Vec::new();

    for (field, values) in [
        (fields.language, &filters.languages),
        (fields.repository, &filters.repositories),
        (fields.entity_type, &filters.entity_types),
    ] {
        if values.is_empty() {
            continue;
        }
        let terms: Vec<(Occur, Box<dyn Query>)> = values
            .iter()
            .map(|value| {
                let term = Term::from_field_text(field, value);
                (
                    Occur::Should,
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>,
                )
            })
            .collect();
        dimensions.push((Occur::Must, Box::new(BooleanQuery::new(terms))));
    }

    if !filters.file_paths.is_empty() {
        let prefixes: Vec<(Occur, Box<dyn Query>)> = filters
            .file_paths
            .iter()
            .map(|prefix| {
                let pattern = format!("{}.*", escape_regex(prefix));
                RegexQuery::from_pattern(&pattern, fields.file_path)
                    .map(|query| (Occur::Should, Box::new(query) as Box<dyn Query>))
                    .map_err(SearchError::keyword)
            })
            .collect::<Result<_, _>>()?;
        dimensions.push((Occur::Must, Box::new(BooleanQuery::new(prefixes))));
    }

    let combined = BooleanQuery::new(dimensions);
    Ok(Box::new(ConstScoreQuery::new(Box::new(combined), 0.0)))
}

/// Escape a literal string for use inside a term-level regular expression.
pub fn escape_regex(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if matches!(
            ch,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
        ) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use common::SearchFilters;

    use super::{FilterDimension, FilterEngine, escape_regex, shape_hash, without_dimension};
    use crate::schema::{IndexFields, build_schema};

    fn filters() -> SearchFilters {
        SearchFilters {
            languages: vec!["java".to_string(), "python".to_string()],
            repositories: vec!["r1".to_string()],
            file_paths: vec!["src/auth/".to_string()],
            entity_types: Vec::new(),
        }
    }

    #[test]
    fn shape_hash_is_stable_and_value_sensitive() {
        assert_eq!(shape_hash(&filters()), shape_hash(&filters()));
        let mut other = filters();
        other.languages.pop();
        assert_ne!(shape_hash(&filters()), shape_hash(&other));
    }

    #[test]
    fn cache_reuses_constructed_clauses() {
        let schema = build_schema();
        let fields = IndexFields::resolve(&schema).expect("fields");
        let engine = FilterEngine::new();

        let first = engine.build(&fields, &filters()).expect("build");
        assert!(first.is_some());
        let second = engine.build(&fields, &filters()).expect("build");
        assert!(second.is_some());
        assert_eq!(engine.cached_shapes(), 1);
    }

    #[test]
    fn empty_filters_build_nothing() {
        let schema = build_schema();
        let fields = IndexFields::resolve(&schema).expect("fields");
        let engine = FilterEngine::new();
        let clause = engine
            .build(&fields, &SearchFilters::default())
            .expect("build");
        assert!(clause.is_none());
    }

    #[test]
    fn blank_values_are_rejected() {
        let schema = build_schema();
        let fields = IndexFields::resolve(&schema).expect("fields");
        let engine = FilterEngine::new();
        let bad = SearchFilters {
            repositories: vec![String::new()],
            ..SearchFilters::default()
        };
        engine.build(&fields, &bad).expect_err("blank value");
    }

    #[test]
    fn without_dimension_clears_only_that_dimension() {
        let reduced = without_dimension(&filters(), FilterDimension::Languages);
        assert!(reduced.languages.is_empty());
        assert_eq!(reduced.repositories, vec!["r1"]);
        assert_eq!(reduced.file_paths, vec!["src/auth/"]);
    }

    #[test]
    fn regex_escaping_protects_metacharacters() {
        assert_eq!(escape_regex("src/v1.2/*"), "src/v1\\.2/\\*");
        assert_eq!(escape_regex("plain"), "plain");
    }
}
