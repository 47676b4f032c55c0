//! Structural query predicates.
//!
//! A query can carry at most one of `implements:<Name>`, `extends:<Name>`
//! or `usages:<Name>` at its start. The name is the first
//! whitespace-delimited token after the prefix; anything after it is
//! ignored for structural lookup.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralQuery {
    Implements(String),
    Extends(String),
    Usages(String),
}

impl StructuralQuery {
    pub fn entity_name(&self) -> &str {
        match self {
            Self::Implements(name) | Self::Extends(name) | Self::Usages(name) => name,
        }
    }
}

/// Classify a raw query. Returns `None` for plain text queries.
pub fn classify(query: &str) -> Option<StructuralQuery> {
    if let Some(name) = parse_implements(query) {
        return Some(StructuralQuery::Implements(name));
    }
    if let Some(name) = parse_extends(query) {
        return Some(StructuralQuery::Extends(name));
    }
    parse_usages(query).map(StructuralQuery::Usages)
}

pub fn parse_implements(query: &str) -> Option<String> {
    extract_name(query, "implements:")
}

pub fn parse_extends(query: &str) -> Option<String> {
    extract_name(query, "extends:")
}

pub fn parse_usages(query: &str) -> Option<String> {
    extract_name(query, "usages:")
}

fn extract_name(query: &str, prefix: &str) -> Option<String> {
    let rest = query.trim_start().strip_prefix(prefix)?;
    let name = rest.split_whitespace().next().unwrap_or_default();
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::{StructuralQuery, classify, parse_extends, parse_implements, parse_usages};

    #[test]
    fn extracts_first_token_after_prefix() {
        assert_eq!(
            parse_implements("implements:Serializable rest of query"),
            Some("Serializable".to_string())
        );
        assert_eq!(
            parse_extends("extends:BaseHandler rest"),
            Some("BaseHandler".to_string())
        );
        assert_eq!(parse_usages("usages:Widget"), Some("Widget".to_string()));
    }

    #[test]
    fn rejects_blank_names() {
        assert_eq!(parse_implements("implements:"), None);
        assert_eq!(parse_implements("implements:   "), None);
        assert_eq!(parse_usages("usages: Widget"), None);
    }

    #[test]
    fn rejects_queries_not_beginning_with_the_prefix() {
        assert_eq!(parse_implements("find implements:Foo"), None);
        assert_eq!(parse_extends("implements:Foo"), None);
        assert_eq!(classify("plain text query"), None);
    }

    #[test]
    fn classifies_at_most_one_predicate() {
        assert_eq!(
            classify("implements:Foo extends:Bar"),
            Some(StructuralQuery::Implements("Foo".to_string()))
        );
        assert_eq!(
            classify("usages:Widget"),
            Some(StructuralQuery::Usages("Widget".to_string()))
        );
    }
}
