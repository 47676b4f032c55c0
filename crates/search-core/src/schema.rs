//! Index schema and the chunk-to-document mapping.
//!
//! Field policy: `content`, `entity_name` and `doc_summary` are tokenized
//! with the code tokenizer and carry positions; the keyword fields are raw
//! terms; line and byte ranges are stored only. Chunk attributes other
//! than `doc_summary` land under the `meta` JSON field as raw terms.

use std::collections::BTreeMap;

use common::{Chunk, DOC_SUMMARY_ATTRIBUTE, repository::repository_from_path};
use tantivy::TantivyDocument;
use tantivy::schema::{
    Field, IndexRecordOption, OwnedValue, STORED, STRING, Schema, TextFieldIndexing, TextOptions,
    Value,
};

use crate::tokenizer::CODE_TOKENIZER;

#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
    pub document_id: Field,
    pub content: Field,
    pub entity_name: Field,
    pub doc_summary: Field,
    pub entity_name_keyword: Field,
    pub language: Field,
    pub entity_type: Field,
    pub file_path: Field,
    pub repository: Field,
    pub meta: Field,
    pub start_line: Field,
    pub end_line: Field,
    pub start_byte: Field,
    pub end_byte: Field,
}

impl IndexFields {
    pub fn resolve(schema: &Schema) -> tantivy::Result<Self> {
        Ok(Self {
            document_id: schema.get_field("document_id")?,
            content: schema.get_field("content")?,
            entity_name: schema.get_field("entity_name")?,
            doc_summary: schema.get_field("doc_summary")?,
            entity_name_keyword: schema.get_field("entity_name_keyword")?,
            language: schema.get_field("language")?,
            entity_type: schema.get_field("entity_type")?,
            file_path: schema.get_field("file_path")?,
            repository: schema.get_field("repository")?,
            meta: schema.get_field("meta")?,
            start_line: schema.get_field("start_line")?,
            end_line: schema.get_field("end_line")?,
            start_byte: schema.get_field("start_byte")?,
            end_byte: schema.get_field("end_byte")?,
        })
    }

    /// Tokenized fields searched by default, with their names.
    pub fn searchable(&self) -> [(&'static str, Field); 3] {
        [
            ("content", self.content),
            ("entity_name", self.entity_name),
            ("doc_summary", self.doc_summary),
        ]
    }
}

pub fn build_schema() -> Schema {
    let code_text = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(CODE_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();

    let mut builder = Schema::builder();
    let _ = builder.add_text_field("document_id", STRING | STORED);
    let _ = builder.add_text_field("content", code_text.clone());
    let _ = builder.add_text_field("entity_name", code_text.clone());
    let _ = builder.add_text_field("doc_summary", code_text);
    let _ = builder.add_text_field("entity_name_keyword", STRING | STORED);
    let _ = builder.add_text_field("language", STRING | STORED);
    let _ = builder.add_text_field("entity_type", STRING | STORED);
    let _ = builder.add_text_field("file_path", STRING | STORED);
    let _ = builder.add_text_field("repository", STRING | STORED);
    let _ = builder.add_json_field("meta", STRING | STORED);
    let _ = builder.add_u64_field("start_line", STORED);
    let _ = builder.add_u64_field("end_line", STORED);
    let _ = builder.add_u64_field("start_byte", STORED);
    let _ = builder.add_u64_field("end_byte", STORED);
    builder.build()
}

/// Deterministically map a chunk to its index document.
pub fn chunk_to_document(fields: &IndexFields, chunk: &Chunk) -> TantivyDocument {
    let mut doc = TantivyDocument::default();
    doc.add_text(fields.document_id, chunk.chunk_id());
    doc.add_text(fields.content, &chunk.content);
    doc.add_text(fields.entity_name, &chunk.entity_name);
    if let Some(summary) = chunk.doc_summary() {
        doc.add_text(fields.doc_summary, summary);
    }
    doc.add_text(fields.entity_name_keyword, &chunk.entity_name);
    doc.add_text(fields.language, &chunk.language);
    doc.add_text(fields.entity_type, &chunk.entity_type);
    doc.add_text(fields.file_path, &chunk.source_file);

    let repository = if chunk.repository.trim().is_empty() {
        repository_from_path(&chunk.source_file)
    } else {
        chunk.repository.clone()
    };
    doc.add_text(fields.repository, repository);

    let meta: BTreeMap<String, OwnedValue> = chunk
        .attributes
        .iter()
        .filter(|(key, _)| key.as_str() != Some(DOC_SUMMARY_ATTRIBUTE))
        .map(|(key, value)| (key.clone(), OwnedValue::Str(value.clone())))
        .collect();
    if !meta.is_empty() {
        doc.add_object(fields.meta, meta);
    }

    doc.add_u64(fields.start_line, chunk.start_line);
    doc.add_u64(fields.end_line, chunk.end_line);
    doc.add_u64(fields.start_byte, chunk.start_byte);
    doc.add_u64(fields.end_byte, chunk.end_byte);
    doc
}

/// Stored view of an indexed chunk, read back from a search hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredDoc {
    pub document_id: String,
    pub content: String,
    pub entity_name: String,
    pub entity_type: String,
    pub source_file: String,
    pub language: String,
    pub repository: String,
    pub doc_summary: Option<String>,
    pub start_line: u64,
    pub end_line: u64,
    pub start_byte: u64,
    pub end_byte: u64,
}

pub fn document_to_stored(fields: &IndexFields, doc: &TantivyDocument) -> StoredDoc {
    StoredDoc {
        document_id: stored_text(doc, fields.document_id),
        content: stored_text(doc, fields.content),
        entity_name: stored_text(doc, fields.entity_name),
        entity_type: stored_text(doc, fields.entity_type),
        source_file: stored_text(doc, fields.file_path),
        language: stored_text(doc, fields.language),
        repository: stored_text(doc, fields.repository),
        doc_summary: {
            let summary = stored_text(doc, fields.doc_summary);
            (!summary.is_empty()).then_some(summary)
        },
        start_line: stored_u64(doc, fields.start_line),
        end_line: stored_u64(doc, fields.end_line),
        start_byte: stored_u64(doc, fields.start_byte),
        end_byte: stored_u64(doc, fields.end_byte),
    }
}

fn stored_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|value| value.as_value().as_str())
        .unwrap_or_default()
        .to_string()
}

fn stored_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field)
        .and_then(|value| value.as_value().as_u64())
        .unwrap_or_default()
}
