//! Tantivy-backed keyword index.
//!
//! One writer, many readers: mutations serialize behind a mutex while
//! searches run against snapshot readers of the last commit. A commit is
//! the only point where readers move between states.

use std::collections::BTreeMap;
use std::path::Path;

use ahash::AHashMap;
use common::error::SearchError;
use common::{Chunk, FacetValue, FieldMatch, SearchFilters};
use parking_lot::Mutex;
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, QueryClone, TermQuery};
use tantivy::schema::{IndexRecordOption, Term, Value};
use tantivy::{DocAddress, Index, IndexReader, IndexWriter, TantivyDocument};

use common::config::BoostConfig;

use crate::filter::{FilterDimension, FilterEngine, without_dimension};
use crate::query::{PlannedQuery, QueryPlanner};
use crate::schema::{IndexFields, StoredDoc, build_schema, chunk_to_document, document_to_stored};
use crate::tokenizer::register_code_tokenizer;

const WRITER_HEAP_SIZE: usize = 50_000_000;

/// Facet fields with their filter dimensions, in response order.
const FACET_FIELDS: &[(&str, FilterDimension)] = &[
    ("language", FilterDimension::Languages),
    ("repository", FilterDimension::Repositories),
    ("entity_type", FilterDimension::EntityTypes),
];

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub doc: StoredDoc,
    pub score: f32,
    pub field_match: Option<FieldMatch>,
}

pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: IndexFields,
    planner: QueryPlanner,
    filters: FilterEngine,
}

impl KeywordIndex {
    pub fn new_in_memory(boosts: BoostConfig) -> Result<Self, SearchError> {
        boosts.validate()?;
        let schema = build_schema();
        let index = Index::create_in_ram(schema);
        Self::from_index(index, boosts)
    }

    pub fn open_or_create(dir: &Path, boosts: BoostConfig) -> Result<Self, SearchError> {
        boosts.validate()?;
        std::fs::create_dir_all(dir).map_err(SearchError::keyword)?;
        let schema = build_schema();
        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir).map_err(SearchError::keyword)?
        } else {
            Index::create_in_dir(dir, schema).map_err(SearchError::keyword)?
        };
        Self::from_index(index, boosts)
    }

    fn from_index(index: Index, boosts: BoostConfig) -> Result<Self, SearchError> {
        register_code_tokenizer(&index);
        let fields = IndexFields::resolve(&index.schema()).map_err(SearchError::keyword)?;
        let writer = index.writer(WRITER_HEAP_SIZE).map_err(SearchError::keyword)?;
        let reader = index.reader().map_err(SearchError::keyword)?;
        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
            planner: QueryPlanner::new(boosts),
            filters: FilterEngine::new(),
        })
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Batch upsert. Each chunk replaces any previous document with the
    /// same identity; the batch becomes visible atomically at commit.
    pub fn add_chunks(&self, chunks: &[Chunk]) -> Result<(), SearchError> {
        let mut writer = self.writer.lock();
        for chunk in chunks {
            let id_term = Term::from_field_text(self.fields.document_id, &chunk.chunk_id());
            writer.delete_term(id_term);
            writer
                .add_document(chunk_to_document(&self.fields, chunk))
                .map_err(SearchError::keyword)?;
        }
        writer.commit().map_err(SearchError::keyword)?;
        drop(writer);
        self.reader.reload().map_err(SearchError::keyword)?;
        Ok(())
    }

    /// Delete every chunk of a file. Returns how many documents went away.
    pub fn remove_by_file(&self, path: &str) -> Result<usize, SearchError> {
        let term = Term::from_field_text(self.fields.file_path, path);
        let query = TermQuery::new(term.clone(), IndexRecordOption::Basic);
        let count = self
            .reader
            .searcher()
            .search(&query, &Count)
            .map_err(SearchError::keyword)?;

        let mut writer = self.writer.lock();
        writer.delete_term(term);
        writer.commit().map_err(SearchError::keyword)?;
        drop(writer);
        self.reader.reload().map_err(SearchError::keyword)?;
        Ok(count)
    }

    /// Whole-file replace: drop the file's documents, then index the new
    /// chunk set, in one commit.
    pub fn update_file(&self, path: &str, chunks: &[Chunk]) -> Result<(), SearchError> {
        let mut writer = self.writer.lock();
        writer.delete_term(Term::from_field_text(self.fields.file_path, path));
        for chunk in chunks {
            let id_term = Term::from_field_text(self.fields.document_id, &chunk.chunk_id());
            writer.delete_term(id_term);
            writer
                .add_document(chunk_to_document(&self.fields, chunk))
                .map_err(SearchError::keyword)?;
        }
        writer.commit().map_err(SearchError::keyword)?;
        drop(writer);
        self.reader.reload().map_err(SearchError::keyword)?;
        Ok(())
    }

    pub fn is_valid_query(&self, query: &str) -> bool {
        self.planner.is_valid(&self.index, &self.fields, query)
    }

    /// Ranked search with filters and optional per-field explanations.
    pub fn search_with_scores(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
        include_field_match: bool,
    ) -> Result<Vec<KeywordHit>, SearchError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let planned = self.planner.plan(&self.index, &self.fields, query)?;
        let filter = self.filters.build(&self.fields, filters)?;
        let searchable = with_filter(planned.query.box_clone(), filter.as_ref());

        let searcher = self.reader.searcher();
        let top = searcher
            .search(&searchable, &TopDocs::with_limit(limit))
            .map_err(SearchError::keyword)?;

        let explanations = if include_field_match {
            Some(self.field_contributions(&searcher, &planned, limit)?)
        } else {
            None
        };

        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher.doc(address).map_err(SearchError::keyword)?;
            let field_match = explanations
                .as_ref()
                .and_then(|contributions| field_match_for(contributions, address));
            hits.push(KeywordHit {
                doc: document_to_stored(&self.fields, &doc),
                score,
                field_match,
            });
        }
        Ok(hits)
    }

    /// Resolve graph-sourced entity names to documents, exact on the raw
    /// entity-name field, with filters applied.
    pub fn lookup_by_entity_names(
        &self,
        names: &[String],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<KeywordHit>, SearchError> {
        if names.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let clauses: Vec<(Occur, Box<dyn Query>)> = names
            .iter()
            .map(|name| {
                let term = Term::from_field_text(self.fields.entity_name_keyword, name);
                (
                    Occur::Should,
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>,
                )
            })
            .collect();
        let filter = self.filters.build(&self.fields, filters)?;
        let query = with_filter(Box::new(BooleanQuery::new(clauses)), filter.as_ref());

        let searcher = self.reader.searcher();
        let top = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(SearchError::keyword)?;
        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher.doc(address).map_err(SearchError::keyword)?;
            hits.push(KeywordHit {
                doc: document_to_stored(&self.fields, &doc),
                score,
                field_match: None,
            });
        }
        Ok(hits)
    }

    /// Top facet values with counts for the current query. Each facet is
    /// counted under the filter minus its own dimension.
    pub fn compute_facets(
        &self,
        query: &str,
        filters: &SearchFilters,
        facet_limit: usize,
    ) -> Result<BTreeMap<String, Vec<FacetValue>>, SearchError> {
        let mut facets = BTreeMap::new();
        if facet_limit == 0 {
            return Ok(facets);
        }
        let planned = self.planner.plan(&self.index, &self.fields, query)?;
        let searcher = self.reader.searcher();

        for (facet_name, dimension) in FACET_FIELDS {
            let reduced = without_dimension(filters, *dimension);
            let filter = self.filters.build(&self.fields, &reduced)?;
            let query = with_filter(planned.query.box_clone(), filter.as_ref());
            let matching = searcher
                .search(&query, &DocSetCollector)
                .map_err(SearchError::keyword)?;

            let field = match *facet_name {
                "language" => self.fields.language,
                "repository" => self.fields.repository,
                _ => self.fields.entity_type,
            };
            let mut counts: AHashMap<String, u64> = AHashMap::new();
            for address in matching {
                let doc: TantivyDocument =
                    searcher.doc(address).map_err(SearchError::keyword)?;
                if let Some(value) = doc
                    .get_first(field)
                    .and_then(|value| value.as_value().as_str())
                {
                    *counts.entry(value.to_string()).or_insert(0) += 1;
                }
            }

            let mut values: Vec<FacetValue> = counts
                .into_iter()
                .map(|(value, count)| FacetValue { value, count })
                .collect();
            values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
            values.truncate(facet_limit);
            facets.insert((*facet_name).to_string(), values);
        }
        Ok(facets)
    }

    /// Score each default field's probe over the candidate window so the
    /// top hits can report which fields matched and how strongly.
    fn field_contributions(
        &self,
        searcher: &tantivy::Searcher,
        planned: &PlannedQuery,
        limit: usize,
    ) -> Result<Vec<(&'static str, AHashMap<DocAddress, f32>)>, SearchError> {
        let window = limit.saturating_mul(4).max(32);
        let mut contributions = Vec::with_capacity(planned.field_probes.len());
        for (name, probe) in &planned.field_probes {
            let top = searcher
                .search(probe, &TopDocs::with_limit(window))
                .map_err(SearchError::keyword)?;
            let scores: AHashMap<DocAddress, f32> = top
                .into_iter()
                .map(|(score, address)| (address, score))
                .collect();
            contributions.push((*name, scores));
        }
        Ok(contributions)
    }
}

fn field_match_for(
    contributions: &[(&'static str, AHashMap<DocAddress, f32>)],
    address: DocAddress,
) -> Option<FieldMatch> {
    let mut matched_fields = Vec::new();
    let mut scores = BTreeMap::new();
    for (name, field_scores) in contributions {
        if let Some(score) = field_scores.get(&address) {
            matched_fields.push((*name).to_string());
            scores.insert((*name).to_string(), *score);
        }
    }
    (!matched_fields.is_empty()).then_some(FieldMatch {
        matched_fields,
        scores,
    })
}

fn with_filter(query: Box<dyn Query>, filter: Option<&Box<dyn Query>>) -> Box<dyn Query> {
    match filter {
        None => query,
        Some(clause) => Box::new(BooleanQuery::new(vec![
            (Occur::Must, query),
            (Occur::Must, clause.box_clone()),
        ])),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use common::config::BoostConfig;
    use common::{Chunk, SearchFilters};

    use super::KeywordIndex;

    fn chunk(file: &str, entity: &str, language: &str, content: &str) -> Chunk {
        Chunk {
            content: content.to_string(),
            language: language.to_string(),
            entity_type: "method".to_string(),
            entity_name: entity.to_string(),
            source_file: file.to_string(),
            repository: "acme/widget".to_string(),
            start_line: 1,
            end_line: 20,
            start_byte: 0,
            end_byte: content.len() as u64,
            attributes: BTreeMap::new(),
        }
    }

    fn index_with(chunks: &[Chunk]) -> KeywordIndex {
        let index = KeywordIndex::new_in_memory(BoostConfig::default()).expect("index");
        index.add_chunks(chunks).expect("add");
        index
    }

    #[test]
    fn entity_name_match_outranks_content_match() {
        let index = index_with(&[
            chunk(
                "src/A.java",
                "parseJsonResponse",
                "java",
                "void run() {}",
            ),
            chunk(
                "src/B.java",
                "processData",
                "java",
                "// parse JSON response from upstream",
            ),
        ]);

        let hits = index
            .search_with_scores("parseJsonResponse", 10, &SearchFilters::default(), false)
            .expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc.entity_name, "parseJsonResponse");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn identifier_parts_reach_compound_entities() {
        let index = index_with(&[chunk(
            "src/XmlParser.java",
            "XMLParser",
            "java",
            "class body",
        )]);
        let hits = index
            .search_with_scores("parser", 10, &SearchFilters::default(), false)
            .expect("search");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn empty_query_matches_all_up_to_limit() {
        let index = index_with(&[
            chunk("src/a.rs", "a", "rust", "fn a() {}"),
            chunk("src/b.rs", "b", "rust", "fn b() {}"),
            chunk("src/c.rs", "c", "rust", "fn c() {}"),
        ]);
        let hits = index
            .search_with_scores("", 2, &SearchFilters::default(), false)
            .expect("search");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn filters_are_anded_across_dimensions_and_ored_within() {
        let mut chunks = vec![
            chunk("r1/src/a.java", "alpha", "java", "alpha body"),
            chunk("r1/src/b.py", "beta", "python", "beta body"),
            chunk("r2/src/c.java", "gamma", "java", "gamma body"),
        ];
        chunks[0].repository = "r1".to_string();
        chunks[1].repository = "r1".to_string();
        chunks[2].repository = "r2".to_string();
        let index = index_with(&chunks);

        let filters = SearchFilters {
            languages: vec!["java".to_string(), "python".to_string()],
            repositories: vec!["r1".to_string()],
            ..SearchFilters::default()
        };
        let hits = index
            .search_with_scores("body", 10, &filters, false)
            .expect("search");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.doc.repository == "r1"));
    }

    #[test]
    fn file_path_filter_matches_by_prefix() {
        let index = index_with(&[
            chunk("src/auth/login.rs", "login", "rust", "fn login() {}"),
            chunk("src/billing/pay.rs", "pay", "rust", "fn pay() {}"),
        ]);
        let filters = SearchFilters {
            file_paths: vec!["src/auth/".to_string()],
            ..SearchFilters::default()
        };
        let hits = index
            .search_with_scores("login pay", 10, &filters, false)
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert!(hits[0].doc.source_file.starts_with("src/auth/"));
    }

    #[test]
    fn remove_by_file_reports_count_and_unindexes() {
        let index = index_with(&[
            chunk("src/x.rs", "one", "rust", "alpha"),
            chunk("src/x.rs", "two", "rust", "alpha"),
            chunk("src/y.rs", "three", "rust", "alpha"),
        ]);
        let removed = index.remove_by_file("src/x.rs").expect("remove");
        assert_eq!(removed, 2);

        let hits = index
            .search_with_scores("alpha", 10, &SearchFilters::default(), false)
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc.source_file, "src/y.rs");
    }

    #[test]
    fn update_file_replaces_previous_chunks() {
        let index = index_with(&[chunk("src/x.rs", "old_name", "rust", "original body")]);
        index
            .update_file(
                "src/x.rs",
                &[chunk("src/x.rs", "new_name", "rust", "replacement body")],
            )
            .expect("update");

        let stale = index
            .search_with_scores("original", 10, &SearchFilters::default(), false)
            .expect("search");
        assert!(stale.is_empty());
        let fresh = index
            .search_with_scores("replacement", 10, &SearchFilters::default(), false)
            .expect("search");
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].doc.entity_name, "new_name");
    }

    #[test]
    fn upsert_by_chunk_id_never_duplicates() {
        let one = chunk("src/x.rs", "same", "rust", "first body");
        let index = index_with(&[one.clone()]);
        index.add_chunks(&[one]).expect("re-add");
        assert_eq!(index.num_docs(), 1);
    }

    #[test]
    fn lookup_by_entity_names_is_exact() {
        let index = index_with(&[
            chunk("src/a.rs", "AuthService", "rust", "a"),
            chunk("src/b.rs", "AuthServiceImpl", "rust", "b"),
        ]);
        let hits = index
            .lookup_by_entity_names(
                &["AuthService".to_string()],
                10,
                &SearchFilters::default(),
            )
            .expect("lookup");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc.entity_name, "AuthService");
    }

    #[test]
    fn facets_count_under_reduced_filters() {
        let mut chunks = vec![
            chunk("r1/src/a.java", "alpha", "java", "shared term"),
            chunk("r1/src/b.py", "beta", "python", "shared term"),
            chunk("r2/src/c.java", "gamma", "java", "shared term"),
        ];
        for (i, repo) in ["r1", "r1", "r2"].iter().enumerate() {
            chunks[i].repository = (*repo).to_string();
        }
        let index = index_with(&chunks);

        let filters = SearchFilters {
            languages: vec!["java".to_string()],
            ..SearchFilters::default()
        };
        let facets = index
            .compute_facets("shared", &filters, 10)
            .expect("facets");

        // The language facet ignores the language filter itself, so the
        // python value stays visible while other facets remain filtered.
        let languages = &facets["language"];
        assert!(languages.iter().any(|f| f.value == "python" && f.count == 1));
        assert!(languages.iter().any(|f| f.value == "java" && f.count == 2));

        let repositories = &facets["repository"];
        assert!(repositories.iter().any(|f| f.value == "r1" && f.count == 1));
        assert!(repositories.iter().any(|f| f.value == "r2" && f.count == 1));
    }

    #[test]
    fn field_match_reports_contributing_fields() {
        let index = index_with(&[chunk(
            "src/A.java",
            "parseJsonResponse",
            "java",
            "void run() {}",
        )]);
        let hits = index
            .search_with_scores("parseJsonResponse", 10, &SearchFilters::default(), true)
            .expect("search");
        let explanation = hits[0].field_match.as_ref().expect("field match");
        assert!(
            explanation
                .matched_fields
                .contains(&"entity_name".to_string())
        );
        assert!(explanation.scores["entity_name"] > 0.0);
    }
}
