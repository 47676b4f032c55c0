//! Query planning.
//!
//! A raw query string is classified into one of the supported shapes and
//! compiled to a tantivy query against the default searchable fields. A
//! failed parse never reaches the caller: the fallback cascade always
//! terminates in a term-OR that cannot fail.

use common::config::BoostConfig;
use common::error::SearchError;
use tantivy::Index;
use tantivy::query::{
    AllQuery, BooleanQuery, BoostQuery, Occur, PhraseQuery, Query, QueryParser, RegexQuery,
    TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption, Term};

use crate::filter::escape_regex;
use crate::schema::IndexFields;
use crate::tokenizer::{primary_token_texts, token_texts};

/// Characters with query-syntax meaning, escaped by the second fallback.
pub const RESERVED_QUERY_CHARS: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
];

/// A compiled query plus per-field probe queries used for match
/// explanations.
pub struct PlannedQuery {
    pub query: Box<dyn Query>,
    pub field_probes: Vec<(&'static str, Box<dyn Query>)>,
}

#[derive(Debug, Clone)]
pub struct QueryPlanner {
    boosts: BoostConfig,
}

impl QueryPlanner {
    pub fn new(boosts: BoostConfig) -> Self {
        Self { boosts }
    }

    /// True exactly when the primary parse for this query succeeds.
    pub fn is_valid(&self, index: &Index, fields: &IndexFields, raw: &str) -> bool {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return true;
        }
        if trimmed.contains(['*', '?']) && !trimmed.contains(':') {
            return true;
        }
        if is_quoted(trimmed) && !trimmed.contains(':') {
            return true;
        }
        self.parser(index, fields).parse_query(trimmed).is_ok()
    }

    /// Classify and compile a query. Never fails on malformed input; the
    /// cascade bottoms out in a term-OR.
    pub fn plan(
        &self,
        index: &Index,
        fields: &IndexFields,
        raw: &str,
    ) -> Result<PlannedQuery, SearchError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Ok(PlannedQuery {
                query: Box::new(AllQuery),
                field_probes: Vec::new(),
            });
        }

        let primary: Option<Box<dyn Query>> = if trimmed.contains(':') {
            self.parser(index, fields).parse_query(trimmed).ok()
        } else if trimmed.contains(['*', '?']) {
            self.wildcard_query(fields, trimmed)
        } else if is_quoted(trimmed) {
            self.phrase_query(fields, &trimmed[1..trimmed.len() - 1])
        } else {
            // Plain terms: OR across the default fields. Hand-built so a
            // compound identifier ORs its split parts instead of turning
            // into an implicit phrase.
            Some(self.term_or_query(fields, trimmed))
        };

        let query = match primary {
            Some(query) => query,
            None => self.fallback(index, fields, trimmed),
        };

        Ok(PlannedQuery {
            field_probes: self.field_probes(fields, trimmed),
            query,
        })
    }

    /// Multi-field parser over the default searchable fields, OR by
    /// default, with configured boosts applied.
    fn parser(&self, index: &Index, fields: &IndexFields) -> QueryParser {
        let defaults: Vec<Field> = fields.searchable().iter().map(|(_, field)| *field).collect();
        let mut parser = QueryParser::for_index(index, defaults);
        parser.set_field_boost(fields.content, self.boosts.content);
        parser.set_field_boost(fields.entity_name, self.boosts.entity_name);
        parser.set_field_boost(fields.doc_summary, self.boosts.doc_summary);
        parser
    }

    fn boost_for(&self, name: &str) -> f32 {
        match name {
            "entity_name" => self.boosts.entity_name,
            "doc_summary" => self.boosts.doc_summary,
            _ => self.boosts.content,
        }
    }

    /// Wildcard syntax compiled to anchored term regexes, OR across the
    /// default fields.
    fn wildcard_query(&self, fields: &IndexFields, pattern: &str) -> Option<Box<dyn Query>> {
        let lowered = pattern.to_lowercase();
        let mut regex = String::with_capacity(lowered.len() + 8);
        for ch in lowered.chars() {
            match ch {
                '*' => regex.push_str(".*"),
                '?' => regex.push('.'),
                other => regex.push_str(&escape_regex(&other.to_string())),
            }
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (name, field) in fields.searchable() {
            let Ok(query) = RegexQuery::from_pattern(&regex, field) else {
                return None;
            };
            clauses.push((
                Occur::Should,
                Box::new(BoostQuery::new(Box::new(query), self.boost_for(name))),
            ));
        }
        Some(Box::new(BooleanQuery::new(clauses)))
    }

    /// Phrase across the default fields; fields whose analysis yields no
    /// tokens are skipped. One token degrades to a term query.
    fn phrase_query(&self, fields: &IndexFields, inner: &str) -> Option<Box<dyn Query>> {
        let tokens = primary_token_texts(inner);
        if tokens.is_empty() {
            return None;
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (name, field) in fields.searchable() {
            let terms: Vec<Term> = tokens
                .iter()
                .map(|token| Term::from_field_text(field, token))
                .collect();
            let query: Box<dyn Query> = if let [term] = terms.as_slice() {
                Box::new(TermQuery::new(
                    term.clone(),
                    IndexRecordOption::WithFreqsAndPositions,
                ))
            } else {
                Box::new(PhraseQuery::new(terms))
            };
            clauses.push((
                Occur::Should,
                Box::new(BoostQuery::new(query, self.boost_for(name))),
            ));
        }
        Some(Box::new(BooleanQuery::new(clauses)))
    }

    /// Recovery cascade for queries the primary parse rejects: phrase
    /// wrap, reserved-character escape, separator split, then term-OR.
    fn fallback(&self, index: &Index, fields: &IndexFields, raw: &str) -> Box<dyn Query> {
        if let Some(query) = self.phrase_query(fields, raw) {
            return query;
        }

        let escaped = escape_reserved(raw);
        if let Ok(query) = self.parser(index, fields).parse_query(&escaped) {
            return query;
        }

        if raw.contains([',', ';']) {
            let parts: Vec<(Occur, Box<dyn Query>)> = raw
                .split([',', ';'])
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .filter_map(|part| self.parser(index, fields).parse_query(part).ok())
                .map(|query| (Occur::Should, query))
                .collect();
            if !parts.is_empty() {
                return Box::new(BooleanQuery::new(parts));
            }
        }

        self.term_or_query(fields, raw)
    }

    /// Final fallback: OR of every analyzed token over every default
    /// field, boosts preserved. An input with no tokens matches nothing.
    fn term_or_query(&self, fields: &IndexFields, raw: &str) -> Box<dyn Query> {
        let tokens = token_texts(raw);
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (name, field) in fields.searchable() {
            for token in &tokens {
                let term = Term::from_field_text(field, token);
                clauses.push((
                    Occur::Should,
                    Box::new(BoostQuery::new(
                        Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
                        self.boost_for(name),
                    )),
                ));
            }
        }
        Box::new(BooleanQuery::new(clauses))
    }

    /// Per-field probes for match explanation: each scores one default
    /// field in isolation with its boost applied.
    fn field_probes(
        &self,
        fields: &IndexFields,
        raw: &str,
    ) -> Vec<(&'static str, Box<dyn Query>)> {
        let tokens = token_texts(raw);
        if tokens.is_empty() {
            return Vec::new();
        }
        fields
            .searchable()
            .iter()
            .map(|(name, field)| {
                let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
                    .iter()
                    .map(|token| {
                        let term = Term::from_field_text(*field, token);
                        (
                            Occur::Should,
                            Box::new(TermQuery::new(term, IndexRecordOption::Basic))
                                as Box<dyn Query>,
                        )
                    })
                    .collect();
                let probe: Box<dyn Query> = Box::new(BoostQuery::new(
                    Box::new(BooleanQuery::new(clauses)),
                    self.boost_for(name),
                ));
                (*name, probe)
            })
            .collect()
    }
}

fn is_quoted(query: &str) -> bool {
    query.len() >= 2 && query.starts_with('"') && query.ends_with('"')
}

fn escape_reserved(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if RESERVED_QUERY_CHARS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
