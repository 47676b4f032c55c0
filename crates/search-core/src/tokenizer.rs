//! Code-aware tokenization for the keyword index.
//!
//! Identifiers are split along snake_case and camelCase boundaries so that
//! searching "parser" finds both `XMLParser` and `xml_parser`. The original
//! compound is kept and the synthesized parts are emitted at the same
//! position, which keeps phrase queries meaningful.

use std::collections::HashSet;
use std::sync::LazyLock;

use tantivy::Index;
use tantivy::tokenizer::{TextAnalyzer, Token, TokenStream, Tokenizer};

/// Name under which the tokenizer is registered on every index.
pub const CODE_TOKENIZER: &str = "code";

/// English stop words plus keyword noise common across the indexed
/// languages. Filtering happens after lowercase folding.
static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // English
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "in", "into",
        "is", "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then",
        "there", "these", "they", "this", "to", "was", "will", "with",
        // shared keyword noise
        "abstract", "boolean", "break", "case", "catch", "class", "const", "continue", "def",
        "default", "do", "double", "else", "enum", "extends", "false", "final", "finally",
        "float", "fn", "function", "if", "implements", "import", "int", "interface", "let",
        "long", "mut", "new", "null", "package", "private", "protected", "pub", "public",
        "return", "self", "static", "string", "struct", "super", "switch", "throw", "throws",
        "true", "try", "var", "void", "while",
    ]
    .into_iter()
    .collect()
});

#[derive(Clone, Default)]
pub struct CodeTokenizer;

pub struct CodeTokenStream {
    tokens: Vec<Token>,
    index: usize,
}

impl Tokenizer for CodeTokenizer {
    type TokenStream<'a> = CodeTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> CodeTokenStream {
        CodeTokenStream {
            tokens: tokenize(text),
            index: 0,
        }
    }
}

impl TokenStream for CodeTokenStream {
    fn advance(&mut self) -> bool {
        if self.index < self.tokens.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.index - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.index - 1]
    }
}

/// Register the code tokenizer on an index. Must run before any document
/// is added or any query is parsed against the tokenized fields.
pub fn register_code_tokenizer(index: &Index) {
    index.tokenizers().register(
        CODE_TOKENIZER,
        TextAnalyzer::builder(CodeTokenizer).build(),
    );
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut position = 0usize;

    for (offset, word) in words(text) {
        let mut emitted: Vec<String> = Vec::new();
        let lower = word.to_lowercase();
        if lower.len() > 1 && !STOP_WORDS.contains(lower.as_str()) {
            emitted.push(lower);
        }
        for part in split_identifier(word) {
            if part.len() > 1
                && !STOP_WORDS.contains(part.as_str())
                && !emitted.contains(&part)
            {
                emitted.push(part);
            }
        }

        for text in emitted {
            tokens.push(Token {
                offset_from: offset,
                offset_to: offset + word.len(),
                position,
                text,
                position_length: 1,
            });
        }
        position += 1;
    }
    tokens
}

/// Runs of identifier characters, with their starting byte offset.
fn words(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_alphanumeric() || ch == '_' {
            if start.is_none() {
                start = Some(idx);
            }
        } else if let Some(word_start) = start.take() {
            out.push((word_start, &text[word_start..idx]));
        }
    }
    if let Some(word_start) = start {
        out.push((word_start, &text[word_start..]));
    }
    out
}

/// Split one identifier into lowercase parts along `_`, case-change, and
/// letter/digit boundaries. All-uppercase runs stay together, so
/// `XMLParser` yields `xml` and `parser`.
fn split_identifier(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for segment in word.split('_') {
        split_camel(segment, &mut parts);
    }
    parts
}

fn split_camel(segment: &str, out: &mut Vec<String>) {
    let chars: Vec<(usize, char)> = segment.char_indices().collect();
    if chars.is_empty() {
        return;
    }
    let mut start = 0;
    for i in 1..chars.len() {
        let prev = chars[i - 1].1;
        let cur = chars[i].1;
        let next_is_lower = chars.get(i + 1).is_some_and(|(_, c)| c.is_lowercase());
        let boundary = (prev.is_lowercase() && cur.is_uppercase())
            || (prev.is_alphabetic() && cur.is_numeric())
            || (prev.is_numeric() && cur.is_alphabetic())
            || (prev.is_uppercase() && cur.is_uppercase() && next_is_lower);
        if boundary {
            out.push(segment[chars[start].0..chars[i].0].to_lowercase());
            start = i;
        }
    }
    out.push(segment[chars[start].0..].to_lowercase());
}

/// Token texts in emission order, for query-side analysis.
pub fn token_texts(text: &str) -> Vec<String> {
    tokenize(text).into_iter().map(|token| token.text).collect()
}

/// One token per word position: the first emission only, compounds kept.
/// Phrase queries are built from these so positions stay consecutive.
pub fn primary_token_texts(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut last_position = usize::MAX;
    for token in tokenize(text) {
        if token.position != last_position {
            last_position = token.position;
            out.push(token.text);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{primary_token_texts, token_texts, tokenize};

    #[test]
    fn pascal_case_emits_parts_and_original() {
        let tokens = token_texts("XMLParser");
        assert_eq!(tokens, vec!["xmlparser", "xml", "parser"]);
    }

    #[test]
    fn snake_case_emits_parts() {
        let tokens = token_texts("get_user_name");
        assert!(tokens.contains(&"get".to_string()));
        assert!(tokens.contains(&"user".to_string()));
        assert!(tokens.contains(&"name".to_string()));
    }

    #[test]
    fn camel_case_and_digits_split() {
        assert_eq!(token_texts("parseJson2"), vec!["parsejson2", "parse", "json"]);
    }

    #[test]
    fn all_uppercase_is_one_token() {
        assert_eq!(token_texts("HTTP"), vec!["http"]);
    }

    #[test]
    fn stop_words_and_single_chars_are_dropped() {
        assert_eq!(token_texts("public class Widget"), vec!["widget"]);
        assert_eq!(token_texts("for (int i = 0)"), Vec::<String>::new());
    }

    #[test]
    fn synthesized_parts_share_the_original_position() {
        let tokens = tokenize("XMLParser reads");
        let positions: Vec<(String, usize)> = tokens
            .into_iter()
            .map(|token| (token.text, token.position))
            .collect();
        assert_eq!(
            positions,
            vec![
                ("xmlparser".to_string(), 0),
                ("xml".to_string(), 0),
                ("parser".to_string(), 0),
                ("reads".to_string(), 1),
            ]
        );
    }

    #[test]
    fn tokenization_is_deterministic() {
        let input = "HttpServer dispatch_request XMLParser";
        assert_eq!(token_texts(input), token_texts(input));
    }

    #[test]
    fn primary_tokens_keep_compounds_only() {
        assert_eq!(
            primary_token_texts("XMLParser dispatch_request"),
            vec!["xmlparser", "dispatch_request"]
        );
    }
}
