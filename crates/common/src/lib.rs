pub mod catalog;
pub mod config;
pub mod error;
pub mod repository;
pub mod structural;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Sentinel repository name used when extraction from the source path fails.
pub const UNKNOWN_REPOSITORY: &str = "unknown";

/// Attribute key promoted to a searchable text field.
pub const DOC_SUMMARY_ATTRIBUTE: &str = "doc_summary";

/// A single code entity slice produced by a language parser.
///
/// The chunk is the indexable unit: one logical entity (class, method,
/// function, field) with its byte and line extent inside a source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub language: String,
    pub entity_type: String,
    pub entity_name: String,
    pub source_file: String,
    pub repository: String,
    pub start_line: u64,
    pub end_line: u64,
    pub start_byte: u64,
    pub end_byte: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Chunk {
    /// Stable identity of the chunk, unique per logical entity slice.
    pub fn chunk_id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.source_file, self.entity_name, self.start_line, self.end_line
        )
    }

    /// Identity of the chunk's row in the vector store.
    pub fn vector_id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.source_file, self.start_line, self.start_byte, self.end_byte
        )
    }

    pub fn doc_summary(&self) -> Option<&str> {
        self.attributes.get(DOC_SUMMARY_ATTRIBUTE).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchMode {
    #[default]
    Hybrid,
    Keyword,
    Vector,
}

/// Metadata constraints applied to a search.
///
/// Values within a dimension combine with OR, the dimensions combine with
/// AND. `file_paths` entries match by prefix, the other dimensions exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SearchFilters {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub file_paths: Vec<String>,
    #[serde(default)]
    pub entity_types: Vec<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
            && self.repositories.is_empty()
            && self.file_paths.is_empty()
            && self.entity_types.is_empty()
    }

    /// Every non-empty dimension must carry at least one non-blank value.
    pub fn validate(&self) -> Result<(), SearchError> {
        for (dimension, values) in [
            ("language", &self.languages),
            ("repository", &self.repositories),
            ("file_path", &self.file_paths),
            ("entity_type", &self.entity_types),
        ] {
            if values.iter().any(|value| value.trim().is_empty()) {
                return Err(SearchError::Validation(format!(
                    "blank value in `{dimension}` filter"
                )));
            }
        }
        Ok(())
    }
}

fn default_limit() -> usize {
    10
}

fn default_depth() -> u32 {
    5
}

fn default_facet_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit", alias = "topK")]
    pub limit: usize,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default)]
    pub transitive: bool,
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default, alias = "language")]
    pub languages: Vec<String>,
    #[serde(default, alias = "repository")]
    pub repositories: Vec<String>,
    #[serde(default, alias = "filePath")]
    pub file_paths: Vec<String>,
    #[serde(default, alias = "entityType")]
    pub entity_types: Vec<String>,
    #[serde(default, alias = "includeFieldMatch")]
    pub include_field_match: bool,
    #[serde(default = "default_facet_limit", alias = "facetLimit")]
    pub facet_limit: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: default_limit(),
            mode: SearchMode::default(),
            transitive: false,
            depth: default_depth(),
            languages: Vec::new(),
            repositories: Vec::new(),
            file_paths: Vec::new(),
            entity_types: Vec::new(),
            include_field_match: false,
            facet_limit: default_facet_limit(),
        }
    }

    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            languages: self.languages.clone(),
            repositories: self.repositories.clone(),
            file_paths: self.file_paths.clone(),
            entity_types: self.entity_types.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineRange {
    pub start: u64,
    pub end: u64,
}

/// Per-field contribution recorded when the caller asks for explanations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldMatch {
    pub matched_fields: Vec<String>,
    pub scores: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResultItem {
    pub chunk_id: String,
    pub content: String,
    pub entity_name: String,
    pub entity_type: String,
    pub source_file: String,
    pub language: String,
    pub repository: String,
    pub score: f32,
    pub line_range: LineRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_summary: Option<String>,
    pub is_transitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_match: Option<FieldMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacetValue {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub total: usize,
    pub facets: BTreeMap<String, Vec<FacetValue>>,
}
