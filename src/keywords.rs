use lazy_static::lazy_static;
use std::collections::HashSet;

/// Every keyword a processor recognises, framing keywords included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    Base,
    Container,
    Context,
    Default,
    Direction,
    Embed,
    Explicit,
    Graph,
    Id,
    Import,
    Included,
    Index,
    Json,
    Language,
    List,
    Nest,
    None,
    OmitDefault,
    Prefix,
    Propagate,
    Protected,
    RequireAll,
    Reverse,
    Set,
    Type,
    Value,
    Version,
    Vocab,
}

impl Keyword {
    pub fn parse(value: &str) -> Option<Keyword> {
        let keyword = match value {
            "@base" => Keyword::Base,
            "@container" => Keyword::Container,
            "@context" => Keyword::Context,
            "@default" => Keyword::Default,
            "@direction" => Keyword::Direction,
            "@embed" => Keyword::Embed,
            "@explicit" => Keyword::Explicit,
            "@graph" => Keyword::Graph,
            "@id" => Keyword::Id,
            "@import" => Keyword::Import,
            "@included" => Keyword::Included,
            "@index" => Keyword::Index,
            "@json" => Keyword::Json,
            "@language" => Keyword::Language,
            "@list" => Keyword::List,
            "@nest" => Keyword::Nest,
            "@none" => Keyword::None,
            "@omitDefault" => Keyword::OmitDefault,
            "@prefix" => Keyword::Prefix,
            "@propagate" => Keyword::Propagate,
            "@protected" => Keyword::Protected,
            "@requireAll" => Keyword::RequireAll,
            "@reverse" => Keyword::Reverse,
            "@set" => Keyword::Set,
            "@type" => Keyword::Type,
            "@value" => Keyword::Value,
            "@version" => Keyword::Version,
            "@vocab" => Keyword::Vocab,
            _ => return None,
        };

        Some(keyword)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Base => "@base",
            Keyword::Container => "@container",
            Keyword::Context => "@context",
            Keyword::Default => "@default",
            Keyword::Direction => "@direction",
            Keyword::Embed => "@embed",
            Keyword::Explicit => "@explicit",
            Keyword::Graph => "@graph",
            Keyword::Id => "@id",
            Keyword::Import => "@import",
            Keyword::Included => "@included",
            Keyword::Index => "@index",
            Keyword::Json => "@json",
            Keyword::Language => "@language",
            Keyword::List => "@list",
            Keyword::Nest => "@nest",
            Keyword::None => "@none",
            Keyword::OmitDefault => "@omitDefault",
            Keyword::Prefix => "@prefix",
            Keyword::Propagate => "@propagate",
            Keyword::Protected => "@protected",
            Keyword::RequireAll => "@requireAll",
            Keyword::Reverse => "@reverse",
            Keyword::Set => "@set",
            Keyword::Type => "@type",
            Keyword::Value => "@value",
            Keyword::Version => "@version",
            Keyword::Vocab => "@vocab",
        }
    }

    /// Keywords only meaningful to the framing algorithm.
    pub fn is_framing(self) -> bool {
        matches!(
            self,
            Keyword::Default
                | Keyword::Embed
                | Keyword::Explicit
                | Keyword::OmitDefault
                | Keyword::RequireAll
        )
    }
}

lazy_static! {
    /// Keys of a local context that are not term definitions.
    pub(crate) static ref CONTEXT_KEYWORDS: HashSet<&'static str> = vec![
        "@base",
        "@direction",
        "@import",
        "@language",
        "@propagate",
        "@protected",
        "@version",
        "@vocab",
    ]
    .into_iter()
    .collect();

    /// Entries allowed in an expanded term definition.
    pub(crate) static ref TERM_DEFINITION_KEYS: HashSet<&'static str> = vec![
        "@id",
        "@reverse",
        "@container",
        "@context",
        "@direction",
        "@index",
        "@language",
        "@nest",
        "@prefix",
        "@protected",
        "@type",
    ]
    .into_iter()
    .collect();

    pub(crate) static ref VALUE_OBJECT_KEYS: HashSet<&'static str> =
        vec!["@direction", "@index", "@language", "@type", "@value"]
            .into_iter()
            .collect();
}

pub fn is_keyword(value: &str) -> bool {
    Keyword::parse(value).is_some()
}

/// Matches `^@[a-zA-Z]+$`. Such strings are reserved for future keywords
/// and get ignored with a warning.
pub fn is_keyword_form(value: &str) -> bool {
    match value.strip_prefix('@') {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphabetic()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_round_trip() {
        for word in &["@context", "@omitDefault", "@included", "@none"] {
            let keyword = Keyword::parse(word).expect("a keyword");
            assert_eq!(keyword.as_str(), *word);
        }
        assert_eq!(Keyword::parse("@foo"), None);
        assert_eq!(Keyword::parse("context"), None);
    }

    #[test]
    fn keyword_form() {
        assert!(is_keyword_form("@ignoreMe"));
        assert!(is_keyword_form("@id"));
        assert!(!is_keyword_form("@"));
        assert!(!is_keyword_form("@foo.bar"));
        assert!(!is_keyword_form("@1"));
        assert!(!is_keyword_form("foo"));
    }

    #[test]
    fn framing_keywords() {
        assert!(Keyword::Embed.is_framing());
        assert!(!Keyword::Graph.is_framing());
    }
}
