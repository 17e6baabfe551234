use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use oxiri::Iri;
use std::sync::{Arc, OnceLock};
use url::Url;

/// A single entry of a term's container mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Container {
    Graph,
    Id,
    Index,
    Language,
    List,
    Set,
    Type,
    /// An explicit `"@container": null`, only kept on reverse properties.
    Null,
}

impl Container {
    pub fn parse(value: &str) -> Option<Container> {
        match value {
            "@graph" => Some(Container::Graph),
            "@id" => Some(Container::Id),
            "@index" => Some(Container::Index),
            "@language" => Some(Container::Language),
            "@list" => Some(Container::List),
            "@set" => Some(Container::Set),
            "@type" => Some(Container::Type),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Container::Graph => "@graph",
            Container::Id => "@id",
            Container::Index => "@index",
            Container::Language => "@language",
            Container::List => "@list",
            Container::Set => "@set",
            Container::Type => "@type",
            Container::Null => "@null",
        }
    }
}

/// Base direction of a string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Ltr,
    Rtl,
}

impl Direction {
    pub fn parse(value: &str) -> Option<Direction> {
        match value {
            "ltr" => Some(Direction::Ltr),
            "rtl" => Some(Direction::Rtl),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Ltr => "ltr",
            Direction::Rtl => "rtl",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mapping that can be absent, explicitly null, or set. An explicit null
/// overrides the context default, absence falls back to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tristate<T> {
    Unset,
    Null,
    Value(T),
}

impl<T> Default for Tristate<T> {
    fn default() -> Self {
        Tristate::Unset
    }
}

impl<T> Tristate<T> {
    pub fn is_set(&self) -> bool {
        !matches!(self, Tristate::Unset)
    }

    /// Resolves against a fallback used when this mapping is unset.
    pub fn or<'a>(&'a self, fallback: Option<&'a T>) -> Option<&'a T> {
        match self {
            Tristate::Unset => fallback,
            Tristate::Null => None,
            Tristate::Value(v) => Some(v),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
pub enum ProcessingMode {
    #[serde(rename = "json-ld-1.0")]
    JsonLd10,
    #[default]
    #[serde(rename = "json-ld-1.1")]
    JsonLd11,
}

/// A resolved term definition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Term {
    pub iri_mapping: Option<String>,
    pub prefix: bool,
    pub protected: bool,
    pub reverse: bool,
    pub type_mapping: Option<String>,
    pub language_mapping: Tristate<String>,
    pub direction_mapping: Tristate<Direction>,
    pub container_mapping: BTreeSet<Container>,
    pub index_mapping: Option<String>,
    pub nest_value: Option<String>,
    /// Term-scoped context, processed whenever the term is used.
    pub local_context: Option<Value>,
    pub base_url: Option<Url>,
}

impl Term {
    pub fn has_container(&self, container: Container) -> bool {
        self.container_mapping.contains(&container)
    }

    /// Equality ignoring the protected flag.
    pub fn same_as(&self, other: &Term) -> bool {
        let unprotected = Term {
            protected: other.protected,
            ..self.clone()
        };

        unprotected == *other
    }
}

/// An active context.
///
/// Nested scopes share their term definitions and the previous-context chain
/// through `Arc`, so cloning a context is cheap.
#[derive(Debug)]
pub struct Context {
    pub(crate) base_iri: Option<Iri<String>>,
    pub(crate) original_base: Option<Iri<String>>,
    pub(crate) vocabulary_mapping: Option<String>,
    pub(crate) language: Option<String>,
    pub(crate) direction: Option<Direction>,
    pub(crate) terms: BTreeMap<String, Arc<Term>>,
    pub(crate) previous_context: Option<Arc<Context>>,
    inverse: OnceLock<InverseContext>,
}

impl Clone for Context {
    fn clone(&self) -> Self {
        Context {
            base_iri: self.base_iri.clone(),
            original_base: self.original_base.clone(),
            vocabulary_mapping: self.vocabulary_mapping.clone(),
            language: self.language.clone(),
            direction: self.direction,
            terms: self.terms.clone(),
            previous_context: self.previous_context.clone(),
            inverse: OnceLock::new(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new(None)
    }
}

impl Context {
    pub fn new(base_iri: Option<Iri<String>>) -> Context {
        Context {
            original_base: base_iri.clone(),
            base_iri,
            vocabulary_mapping: None,
            language: None,
            direction: None,
            terms: BTreeMap::new(),
            previous_context: None,
            inverse: OnceLock::new(),
        }
    }

    pub fn base_iri(&self) -> Option<&str> {
        self.base_iri.as_ref().map(|iri| iri.as_str())
    }

    pub fn vocabulary_mapping(&self) -> Option<&str> {
        self.vocabulary_mapping.as_deref()
    }

    pub fn default_language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn default_direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn term(&self, term: &str) -> Option<&Term> {
        self.terms.get(term).map(|t| t.as_ref())
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.terms.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// The context to revert to once a non-propagated scope is left.
    pub fn previous_context(&self) -> Option<&Context> {
        self.previous_context.as_deref()
    }

    pub fn has_protected_terms(&self) -> bool {
        self.terms.values().any(|t| t.protected)
    }

    /// The inverse of this context, computed on first use.
    pub fn inverse_context(&self) -> &InverseContext {
        self.inverse.get_or_init(|| InverseContext::build(self))
    }

    /// Picks the term best suited to compact `iri`, trying each container
    /// key and then each preferred value in order. `type_or_language` is
    /// `@type`, `@language` or `@any`.
    pub fn select_term(
        &self,
        iri: &str,
        containers: &[&str],
        type_or_language: &str,
        preferred_values: &[&str],
    ) -> Option<&str> {
        let container_map = self.inverse_context().entries.get(iri)?;

        for container in containers {
            let entry = match container_map.get(*container) {
                Some(entry) => entry,
                None => continue,
            };

            let values = match type_or_language {
                "@language" => &entry.language,
                "@type" => &entry.type_map,
                _ => &entry.any,
            };

            if let Some(term) = preferred_values.iter().find_map(|v| values.get(*v)) {
                return Some(term.as_str());
            }
        }

        None
    }
}

/// Term choices for one IRI and container combination.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InverseEntry {
    pub language: HashMap<String, String>,
    pub type_map: HashMap<String, String>,
    pub any: HashMap<String, String>,
}

/// IRI, then container key, then the term choices. Used to pick terms when
/// compacting.
#[derive(Clone, Debug, Default)]
pub struct InverseContext {
    pub entries: HashMap<String, HashMap<String, InverseEntry>>,
}

fn container_key(term: &Term) -> String {
    let key: String = term
        .container_mapping
        .iter()
        .filter(|c| **c != Container::Null)
        .map(|c| c.as_str())
        .collect();

    if key.is_empty() {
        "@none".to_owned()
    } else {
        key
    }
}

fn claim(map: &mut HashMap<String, String>, key: impl Into<String>, term: &str) {
    map.entry(key.into()).or_insert_with(|| term.to_owned());
}

impl InverseContext {
    fn build(context: &Context) -> InverseContext {
        let mut inverse = InverseContext::default();
        let default_language = context.language.as_deref().unwrap_or("@none");

        let mut terms: Vec<(&String, &Arc<Term>)> = context.terms.iter().collect();
        terms.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(b.0)));

        for (term, definition) in terms {
            let iri = match &definition.iri_mapping {
                Some(iri) => iri,
                None => continue,
            };

            let entry = inverse
                .entries
                .entry(iri.clone())
                .or_default()
                .entry(container_key(definition))
                .or_insert_with(|| {
                    let mut entry = InverseEntry::default();
                    claim(&mut entry.any, "@none", term);
                    entry
                });

            if definition.reverse {
                claim(&mut entry.type_map, "@reverse", term);
            } else if definition.type_mapping.as_deref() == Some("@none") {
                claim(&mut entry.language, "@any", term);
                claim(&mut entry.type_map, "@any", term);
            } else if let Some(type_mapping) = &definition.type_mapping {
                claim(&mut entry.type_map, type_mapping.as_str(), term);
            } else if definition.language_mapping.is_set() && definition.direction_mapping.is_set()
            {
                let key = match (&definition.language_mapping, &definition.direction_mapping) {
                    (Tristate::Value(l), Tristate::Value(d)) => format!("{}_{}", l, d),
                    (Tristate::Value(l), _) => l.clone(),
                    (_, Tristate::Value(d)) => format!("_{}", d),
                    _ => "@null".to_owned(),
                };
                claim(&mut entry.language, key, term);
            } else if definition.language_mapping.is_set() {
                let key = match &definition.language_mapping {
                    Tristate::Value(l) => l.as_str(),
                    _ => "@null",
                };
                claim(&mut entry.language, key, term);
            } else if definition.direction_mapping.is_set() {
                let key = match &definition.direction_mapping {
                    Tristate::Value(d) => format!("_{}", d),
                    _ => "@none".to_owned(),
                };
                claim(&mut entry.language, key, term);
            } else if let Some(direction) = context.direction {
                let language = context.language.as_deref().unwrap_or("");
                claim(&mut entry.language, format!("{}_{}", language, direction), term);
                claim(&mut entry.language, "@none", term);
                claim(&mut entry.type_map, "@none", term);
            } else {
                claim(&mut entry.language, default_language, term);
                claim(&mut entry.language, "@none", term);
                claim(&mut entry.type_map, "@none", term);
            }
        }

        inverse
    }
}
