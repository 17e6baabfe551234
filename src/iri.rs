use oxiri::Iri;

fn is_forbidden(c: char) -> bool {
    c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '\\' | '^' | '`')
}

fn has_scheme(value: &str) -> bool {
    match value.find(':') {
        Some(0) | None => false,
        Some(idx) => {
            let mut scheme = value[..idx].chars();
            scheme.next().map_or(false, |c| c.is_ascii_alphabetic())
                && scheme.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
    }
}

pub fn is_blank_node(value: &str) -> bool {
    value.starts_with("_:")
}

/// An IRI with a scheme. Compact IRIs whose prefix is unknown look like
/// absolute IRIs too, which is intended.
pub fn is_absolute_iri(value: &str) -> bool {
    has_scheme(value) && !value.chars().any(is_forbidden) && Iri::parse(value).is_ok()
}

pub fn is_relative_iri(value: &str) -> bool {
    !value.starts_with('@') && !value.chars().any(is_forbidden)
}

/// True for any string usable as an `@vocab` or `@base`: absolute,
/// relative, or a blank node identifier.
pub fn is_iri_or_blank(value: &str) -> bool {
    is_blank_node(value) || is_absolute_iri(value) || is_relative_iri(value)
}

pub fn ends_with_gen_delim(value: &str) -> bool {
    value
        .chars()
        .last()
        .map_or(false, |c| matches!(c, ':' | '/' | '?' | '#' | '[' | ']' | '@'))
}

/// Splits `prefix:suffix` at the first colon, provided it is not the first
/// character.
pub fn split_compact_iri(value: &str) -> Option<(&str, &str)> {
    match value.find(':') {
        Some(0) | None => None,
        Some(idx) => Some((&value[..idx], &value[idx + 1..])),
    }
}

/// BCP47 in the loose form JSON-LD asks for: alphabetic primary subtag,
/// then alphanumeric subtags, each one to eight characters.
pub fn is_well_formed_language_tag(tag: &str) -> bool {
    let mut subtags = tag.split('-');
    let primary = match subtags.next() {
        Some(p) => p,
        None => return false,
    };

    let sized = |s: &str| !s.is_empty() && s.len() <= 8;
    sized(primary)
        && primary.chars().all(|c| c.is_ascii_alphabetic())
        && subtags.all(|s| sized(s) && s.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Resolves `reference` against `base` with the RFC 3986 algorithm. Neither
/// side is normalized. A reference that is not a valid IRI reference is
/// returned as it is.
pub fn resolve(base: &Iri<String>, reference: &str) -> String {
    base.resolve(reference)
        .map(Iri::into_inner)
        .unwrap_or_else(|_| reference.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_iris() {
        assert!(is_absolute_iri("http://example.org/"));
        assert!(is_absolute_iri("urn:ex:1"));
        assert!(is_absolute_iri("ex:foo"));
        assert!(!is_absolute_iri("_:b0"));
        assert!(!is_absolute_iri("foo/bar"));
        assert!(!is_absolute_iri(":foo"));
        assert!(!is_absolute_iri("http://example.org/ space"));
    }

    #[test]
    fn relative_iris() {
        assert!(is_relative_iri("foo/bar"));
        assert!(is_relative_iri(""));
        assert!(!is_relative_iri("@vocab"));
        assert!(!is_relative_iri("a b"));
    }

    #[test]
    fn compact_iri_split() {
        assert_eq!(split_compact_iri("ex:name"), Some(("ex", "name")));
        assert_eq!(split_compact_iri("http://x/"), Some(("http", "//x/")));
        assert_eq!(split_compact_iri(":name"), None);
        assert_eq!(split_compact_iri("name"), None);
    }

    #[test]
    fn gen_delims() {
        assert!(ends_with_gen_delim("http://example.org/"));
        assert!(ends_with_gen_delim("http://example.org/#"));
        assert!(!ends_with_gen_delim("http://example.org/a"));
        assert!(!ends_with_gen_delim(""));
    }

    #[test]
    fn language_tags() {
        assert!(is_well_formed_language_tag("en"));
        assert!(is_well_formed_language_tag("en-US"));
        assert!(is_well_formed_language_tag("zh-Hant-TW"));
        assert!(!is_well_formed_language_tag("en_US"));
        assert!(!is_well_formed_language_tag("en-"));
        assert!(!is_well_formed_language_tag("123"));
    }

    fn base(iri: &str) -> Iri<String> {
        Iri::parse(iri.to_owned()).unwrap()
    }

    #[test]
    fn resolution() {
        let b = base("http://example.org/a/b");
        assert_eq!(resolve(&b, "c"), "http://example.org/a/c");
        assert_eq!(resolve(&b, "../d"), "http://example.org/d");
        assert_eq!(resolve(&b, "#frag"), "http://example.org/a/b#frag");
        assert_eq!(resolve(&b, "?q"), "http://example.org/a/b?q");
        assert_eq!(resolve(&b, "//other.org/x"), "http://other.org/x");
    }

    #[test]
    fn resolution_keeps_the_iri_as_written() {
        assert_eq!(resolve(&base("http://example.org/"), "ü"), "http://example.org/ü");
        assert_eq!(resolve(&base("http://example.org"), "#frag"), "http://example.org#frag");
        assert_eq!(resolve(&base("http://EXAMPLE.org/a/"), "b"), "http://EXAMPLE.org/a/b");
        assert_eq!(resolve(&base("urn:x:y"), "foo"), "urn:foo");
    }
}
