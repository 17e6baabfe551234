use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use oxiri::Iri;
use tracing::{debug, trace};
use url::Url;

use crate::api::JsonLdProcessor;
use crate::context::{Container, Context, Direction, ProcessingMode, Term, Tristate};
use crate::error::{ErrorCode, JsonLdError, Result};
use crate::helper::as_values;
use crate::iri::{
    ends_with_gen_delim, is_absolute_iri, is_blank_node, is_iri_or_blank, is_relative_iri,
    is_well_formed_language_tag, resolve, split_compact_iri,
};
use crate::keywords::{is_keyword, is_keyword_form, CONTEXT_KEYWORDS, TERM_DEFINITION_KEYS};
use crate::{BoxFuture, DocumentLoader};

static NULL: Value = Value::Null;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DefineStatus {
    Defining,
    Defined,
}

/// Switches for one invocation of context processing.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ContextFlags {
    /// Allow redefining protected terms, as property-scoped contexts do.
    pub override_protected: bool,
    pub propagate: bool,
    /// When false, remote contexts already on the dereference chain are
    /// skipped instead of rejected.
    pub validate_scoped: bool,
}

impl Default for ContextFlags {
    fn default() -> Self {
        ContextFlags {
            override_protected: false,
            propagate: true,
            validate_scoped: true,
        }
    }
}

/// Everything term creation needs to know about the local context it is
/// working through.
#[derive(Clone, Copy)]
struct TermScope<'a> {
    local_context: &'a Map<String, Value>,
    base_url: Option<&'a Url>,
    protected: bool,
    override_protected: bool,
    remote_contexts: &'a [Url],
}

fn error(code: ErrorCode, message: impl Into<String>) -> JsonLdError {
    JsonLdError::new(code, message)
}

/// Resolves a context reference against the URL of the document holding it,
/// giving the URL to load it from.
fn reference_url(base_url: Option<&Url>, reference: &str, code: ErrorCode) -> Result<Url> {
    let resolved = match base_url.and_then(|base| Iri::parse(base.as_str()).ok()) {
        Some(base) => base.resolve(reference).map(Iri::into_inner).map_err(|e| {
            JsonLdError::with_cause(code, format!("cannot resolve '{}'", reference), e)
        })?,
        None => reference.to_owned(),
    };

    Url::parse(&resolved)
        .map_err(|e| JsonLdError::with_cause(code, format!("cannot load '{}'", resolved), e))
}

/// A colon anywhere but the first or last character.
fn has_inner_colon(term: &str) -> bool {
    term.char_indices()
        .skip(1)
        .any(|(i, c)| c == ':' && i + 1 < term.len())
}

fn split_after_first_char(term: &str) -> Option<(&str, &str)> {
    let (idx, _) = term.char_indices().skip(1).find(|(_, c)| *c == ':')?;
    Some((&term[..idx], &term[idx + 1..]))
}

fn single_id(id: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("@id".to_owned(), id);
    map
}

fn parse_container(value: &Value, mode: ProcessingMode) -> Result<BTreeSet<Container>> {
    let invalid = || {
        error(
            ErrorCode::InvalidContainerMapping,
            format!("{} is not a valid container mapping", value),
        )
    };

    let entries: &[Value] = match value {
        Value::Array(items) if mode == ProcessingMode::JsonLd11 => items,
        Value::String(_) => std::slice::from_ref(value),
        _ => return Err(invalid()),
    };

    let mut containers = BTreeSet::new();
    for entry in entries {
        let container = entry.as_str().and_then(Container::parse).ok_or_else(invalid)?;
        if mode == ProcessingMode::JsonLd10
            && matches!(container, Container::Graph | Container::Id | Container::Type)
        {
            return Err(invalid());
        }

        containers.insert(container);
    }

    let has = |c: Container| containers.contains(&c);
    let graph_combination = has(Container::Graph)
        && (has(Container::Id) != has(Container::Index))
        && containers.iter().all(|c| {
            matches!(
                c,
                Container::Graph | Container::Id | Container::Index | Container::Set
            )
        });
    let set_combination = has(Container::Set) && !has(Container::List);

    if containers.len() == 1 || graph_combination || set_combination {
        Ok(containers)
    } else {
        Err(invalid())
    }
}

impl Context {
    /// IRI expansion against a finished context. `None` stands for a value
    /// that has no IRI, such as a term mapped to null.
    pub fn expand_iri(&self, value: &str, document_relative: bool, vocab: bool) -> Option<String> {
        if is_keyword(value) {
            return Some(value.to_owned());
        }

        if is_keyword_form(value) {
            return None;
        }

        if let Some(term) = self.terms.get(value) {
            if vocab || term.iri_mapping.as_deref().map_or(false, is_keyword) {
                return term.iri_mapping.clone();
            }
        }

        if let Some((prefix, suffix)) = split_compact_iri(value) {
            if prefix == "_" || suffix.starts_with("//") {
                return Some(value.to_owned());
            }

            if let Some(term) = self.terms.get(prefix) {
                if let (true, Some(iri)) = (term.prefix, &term.iri_mapping) {
                    return Some(format!("{}{}", iri, suffix));
                }
            }

            if is_absolute_iri(value) {
                return Some(value.to_owned());
            }
        }

        if vocab {
            if let Some(vocabulary) = &self.vocabulary_mapping {
                return Some(format!("{}{}", vocabulary, value));
            }
        }

        if document_relative {
            if let Some(base) = &self.base_iri {
                return Some(resolve(base, value));
            }
        }

        Some(value.to_owned())
    }
}

impl<'l, L: DocumentLoader> JsonLdProcessor<'l, L> {
    /// IRI expansion during expansion. Keyword-like values are dropped with
    /// a warning carrying `code`, which names the kind of value expanded.
    pub(crate) fn expand_iri(
        &mut self,
        active_context: &Context,
        value: &str,
        document_relative: bool,
        vocab: bool,
        code: ErrorCode,
    ) -> Option<String> {
        if !is_keyword(value) && is_keyword_form(value) {
            self.warn(
                code,
                format!("'{}' has the form of a keyword and is ignored", value),
            );
            return None;
        }

        active_context.expand_iri(value, document_relative, vocab)
    }

    async fn load_remote_context(&mut self, url: &Url) -> Result<(Url, Value)> {
        if let Some(cached) = self.remote_cache.get(url) {
            debug!(%url, "remote context served from cache");
            return Ok(cached.clone());
        }

        debug!(%url, "dereferencing remote context");
        let remote = self.loader.load_document(url).await.map_err(|e| {
            JsonLdError::with_cause(
                ErrorCode::LoadingRemoteContextFailed,
                format!("failed to load remote context '{}'", url),
                e,
            )
        })?;

        let context = match &remote.document {
            Value::Object(map) => map.get("@context").cloned(),
            _ => None,
        }
        .ok_or_else(|| {
            error(
                ErrorCode::InvalidRemoteContext,
                format!("'{}' has no top-level @context entry", url),
            )
        })?;

        self.remote_cache
            .insert(url.clone(), (remote.document_url.clone(), context.clone()));
        Ok((remote.document_url, context))
    }

    pub(crate) fn process_context_with<'a>(
        &'a mut self,
        active_context: &'a Context,
        local_context: &'a Value,
        base_url: Option<&'a Url>,
        remote_contexts: Vec<Url>,
        flags: ContextFlags,
    ) -> BoxFuture<'a, Result<Context>> {
        Box::pin(async move {
            let mode = self.options.processing_mode;
            let mut result = active_context.clone();

            // 2
            let mut propagate = flags.propagate;
            if let Some(value) = local_context.get("@propagate") {
                propagate = value.as_bool().ok_or_else(|| {
                    error(ErrorCode::InvalidPropagateValue, "@propagate must be a boolean")
                })?;
            }

            // 3
            if !propagate && result.previous_context.is_none() {
                result.previous_context = Some(Arc::new(active_context.clone()));
            }

            for context in as_values(local_context) {
                match context {
                    // 5.1
                    Value::Null => {
                        if !flags.override_protected && result.has_protected_terms() {
                            return Err(error(
                                ErrorCode::InvalidContextNullification,
                                "cannot nullify a context containing protected terms",
                            ));
                        }

                        let fresh = Context::new(active_context.original_base.clone());
                        let previous = std::mem::replace(&mut result, fresh);
                        if !propagate {
                            result.previous_context = Some(Arc::new(previous));
                        }
                    }

                    // 5.2
                    Value::String(reference) => {
                        let url =
                            reference_url(base_url, reference, ErrorCode::LoadingDocumentFailed)?;

                        if remote_contexts.contains(&url) {
                            if !flags.validate_scoped {
                                continue;
                            }

                            return Err(error(
                                ErrorCode::RecursiveContextInclusion,
                                format!("context '{}' includes itself", url),
                            ));
                        }

                        if let Some(limit) = self.options.remote_context_limit {
                            if remote_contexts.len() >= limit {
                                return Err(error(
                                    ErrorCode::ContextOverflow,
                                    format!("more than {} nested remote contexts", limit),
                                ));
                            }
                        }

                        let (document_url, loaded) = self.load_remote_context(&url).await?;
                        let mut chain = remote_contexts.clone();
                        chain.push(url);

                        let nested_flags = ContextFlags {
                            propagate: true,
                            ..flags
                        };
                        let processed = self
                            .process_context_with(
                                &result,
                                &loaded,
                                Some(&document_url),
                                chain,
                                nested_flags,
                            )
                            .await?;
                        result = processed;
                    }

                    // 5.4
                    Value::Object(map) => {
                        let mut merged: Cow<Map<String, Value>> = Cow::Borrowed(map);

                        // 5.5
                        if let Some(version) = map.get("@version") {
                            if version.as_f64() != Some(1.1) {
                                return Err(error(
                                    ErrorCode::InvalidVersionValue,
                                    format!("unsupported @version {}", version),
                                ));
                            }

                            if mode == ProcessingMode::JsonLd10 {
                                return Err(error(
                                    ErrorCode::ProcessingModeConflict,
                                    "@version 1.1 in json-ld-1.0 processing mode",
                                ));
                            }
                        }

                        // 5.6
                        if let Some(import) = map.get("@import") {
                            if mode == ProcessingMode::JsonLd10 {
                                return Err(error(
                                    ErrorCode::InvalidContextEntry,
                                    "@import is not supported in json-ld-1.0",
                                ));
                            }

                            let reference = import.as_str().ok_or_else(|| {
                                error(ErrorCode::InvalidImportValue, "@import must be a string")
                            })?;
                            let url =
                                reference_url(base_url, reference, ErrorCode::InvalidImportValue)?;

                            let (_, imported) = self.load_remote_context(&url).await?;
                            let mut imported = match imported {
                                Value::Object(imported) => imported,
                                _ => {
                                    return Err(error(
                                        ErrorCode::InvalidRemoteContext,
                                        format!("imported context '{}' is not an object", url),
                                    ))
                                }
                            };

                            if imported.contains_key("@import") {
                                return Err(error(
                                    ErrorCode::InvalidContextEntry,
                                    format!("imported context '{}' has its own @import", url),
                                ));
                            }

                            for (key, value) in map {
                                imported.insert(key.clone(), value.clone());
                            }
                            merged = Cow::Owned(imported);
                        }

                        let definition: &Map<String, Value> = &merged;

                        // 5.7
                        if let (Some(base), true) =
                            (definition.get("@base"), remote_contexts.is_empty())
                        {
                            result.base_iri = match base {
                                Value::Null => None,
                                Value::String(iri) if is_absolute_iri(iri) => {
                                    Some(Iri::parse(iri.clone()).map_err(|e| {
                                        JsonLdError::with_cause(
                                            ErrorCode::InvalidBaseIri,
                                            format!("invalid @base '{}'", iri),
                                            e,
                                        )
                                    })?)
                                }
                                Value::String(iri) if is_relative_iri(iri) => {
                                    let current = result.base_iri.as_ref().ok_or_else(|| {
                                        error(
                                            ErrorCode::InvalidBaseIri,
                                            format!("relative @base '{}' without a base IRI", iri),
                                        )
                                    })?;
                                    Some(current.resolve(iri).map_err(|e| {
                                        JsonLdError::with_cause(
                                            ErrorCode::InvalidBaseIri,
                                            format!("cannot resolve @base '{}'", iri),
                                            e,
                                        )
                                    })?)
                                }
                                _ => {
                                    return Err(error(
                                        ErrorCode::InvalidBaseIri,
                                        format!("invalid @base {}", base),
                                    ))
                                }
                            };
                        }

                        // 5.8
                        if let Some(vocab) = definition.get("@vocab") {
                            result.vocabulary_mapping = match vocab {
                                Value::Null => None,
                                Value::String(iri)
                                    if mode == ProcessingMode::JsonLd10
                                        && !(is_absolute_iri(iri) || is_blank_node(iri)) =>
                                {
                                    return Err(error(
                                        ErrorCode::InvalidVocabMapping,
                                        "@vocab must be an absolute IRI in json-ld-1.0",
                                    ))
                                }
                                Value::String(iri) if is_iri_or_blank(iri) => {
                                    let expanded = self.expand_iri(&result, iri, true, true, ErrorCode::InvalidVocabMapping);
                                    Some(expanded.ok_or_else(|| {
                                        error(
                                            ErrorCode::InvalidVocabMapping,
                                            format!("invalid @vocab '{}'", iri),
                                        )
                                    })?)
                                }
                                _ => {
                                    return Err(error(
                                        ErrorCode::InvalidVocabMapping,
                                        format!("invalid @vocab {}", vocab),
                                    ))
                                }
                            };
                        }

                        // 5.9
                        if let Some(language) = definition.get("@language") {
                            result.language = match language {
                                Value::Null => None,
                                Value::String(tag) => {
                                    if !is_well_formed_language_tag(tag) {
                                        self.warn(
                                            ErrorCode::MalformedLanguageTag,
                                            format!("'{}' is not a well-formed language tag", tag),
                                        );
                                    }
                                    Some(tag.to_lowercase())
                                }
                                _ => {
                                    return Err(error(
                                        ErrorCode::InvalidDefaultLanguage,
                                        format!("invalid @language {}", language),
                                    ))
                                }
                            };
                        }

                        // 5.10
                        if let Some(direction) = definition.get("@direction") {
                            if mode == ProcessingMode::JsonLd10 {
                                return Err(error(
                                    ErrorCode::InvalidContextEntry,
                                    "@direction is not supported in json-ld-1.0",
                                ));
                            }

                            result.direction = match direction {
                                Value::Null => None,
                                Value::String(d) => Some(Direction::parse(d).ok_or_else(|| {
                                    error(
                                        ErrorCode::InvalidBaseDirection,
                                        format!("invalid @direction '{}'", d),
                                    )
                                })?),
                                _ => {
                                    return Err(error(
                                        ErrorCode::InvalidBaseDirection,
                                        format!("invalid @direction {}", direction),
                                    ))
                                }
                            };
                        }

                        // 5.11
                        if let Some(propagate) = definition.get("@propagate") {
                            if mode == ProcessingMode::JsonLd10 {
                                return Err(error(
                                    ErrorCode::InvalidContextEntry,
                                    "@propagate is not supported in json-ld-1.0",
                                ));
                            }

                            if !propagate.is_boolean() {
                                return Err(error(
                                    ErrorCode::InvalidPropagateValue,
                                    "@propagate must be a boolean",
                                ));
                            }
                        }

                        let protected = match definition.get("@protected") {
                            None => false,
                            Some(Value::Bool(protected)) => *protected,
                            Some(_) => {
                                return Err(error(
                                    ErrorCode::InvalidProtectedValue,
                                    "@protected must be a boolean",
                                ))
                            }
                        };

                        // 5.13
                        let scope = TermScope {
                            local_context: definition,
                            base_url,
                            protected,
                            override_protected: flags.override_protected,
                            remote_contexts: &remote_contexts,
                        };

                        let mut defined = HashMap::new();
                        for term in definition.keys() {
                            if CONTEXT_KEYWORDS.contains(term.as_str()) {
                                continue;
                            }

                            self.create_term(&mut result, term, &mut defined, scope)
                                .await?;
                        }
                    }

                    _ => {
                        return Err(error(
                            ErrorCode::InvalidLocalContext,
                            format!("{} is not a valid local context", context),
                        ))
                    }
                }
            }

            Ok(result)
        })
    }

    // Only used while a local context is being processed; `defined` tracks
    // the terms already created from it.
    fn expand_iri_mut<'a>(
        &'a mut self,
        active_context: &'a mut Context,
        value: &'a str,
        document_relative: bool,
        vocab: bool,
        code: ErrorCode,
        defined: &'a mut HashMap<String, DefineStatus>,
        scope: TermScope<'a>,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            if is_keyword(value) {
                return Ok(Some(value.to_owned()));
            }

            if is_keyword_form(value) {
                self.warn(
                    code,
                    format!("'{}' has the form of a keyword and is ignored", value),
                );
                return Ok(None);
            }

            // 3
            if scope.local_context.contains_key(value)
                && defined.get(value) != Some(&DefineStatus::Defined)
            {
                self.create_term(active_context, value, defined, scope)
                    .await?;
            }

            // 4, 5
            if let Some(term) = active_context.terms.get(value) {
                if vocab || term.iri_mapping.as_deref().map_or(false, is_keyword) {
                    return Ok(term.iri_mapping.clone());
                }
            }

            // 6.3
            if let Some((prefix, suffix)) = split_compact_iri(value) {
                if prefix != "_"
                    && !suffix.starts_with("//")
                    && scope.local_context.contains_key(prefix)
                    && defined.get(prefix) != Some(&DefineStatus::Defined)
                {
                    self.create_term(active_context, prefix, defined, scope)
                        .await?;
                }
            }

            Ok(active_context.expand_iri(value, document_relative, vocab))
        })
    }

    fn create_term<'a>(
        &'a mut self,
        active_context: &'a mut Context,
        term: &'a str,
        defined: &'a mut HashMap<String, DefineStatus>,
        scope: TermScope<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            // 1
            match defined.get(term) {
                Some(DefineStatus::Defined) => return Ok(()),
                Some(DefineStatus::Defining) => {
                    return Err(error(
                        ErrorCode::CyclicIriMapping,
                        format!("term '{}' is defined in terms of itself", term),
                    ))
                }
                None => (),
            }

            // 2
            if term.is_empty() {
                return Err(error(
                    ErrorCode::InvalidTermDefinition,
                    "the empty string is not a valid term",
                ));
            }

            defined.insert(term.to_owned(), DefineStatus::Defining);
            let mode = self.options.processing_mode;
            let value = scope.local_context.get(term).unwrap_or(&NULL);

            // 4
            if term == "@type" {
                if mode == ProcessingMode::JsonLd10 {
                    return Err(error(
                        ErrorCode::KeywordRedefinition,
                        "@type cannot be redefined in json-ld-1.0",
                    ));
                }

                let allowed = match value {
                    Value::Object(map) => {
                        !map.is_empty()
                            && map.iter().all(|(key, v)| match key.as_str() {
                                "@container" => v.as_str() == Some("@set"),
                                "@protected" => true,
                                _ => false,
                            })
                    }
                    _ => false,
                };

                if !allowed {
                    return Err(error(
                        ErrorCode::KeywordRedefinition,
                        "@type may only be given @container: @set or @protected",
                    ));
                }
            } else if is_keyword(term) {
                return Err(error(
                    ErrorCode::KeywordRedefinition,
                    format!("keyword {} cannot be redefined", term),
                ));
            } else if is_keyword_form(term) {
                self.warn(
                    ErrorCode::InvalidTermDefinition,
                    format!("term '{}' has the form of a keyword and is ignored", term),
                );
                defined.insert(term.to_owned(), DefineStatus::Defined);
                return Ok(());
            }

            // 5
            let previous = active_context.terms.remove(term);

            // 6-9
            let mut simple_term = false;
            let map: Cow<Map<String, Value>> = match value {
                Value::Null => Cow::Owned(single_id(Value::Null)),
                Value::String(id) => {
                    simple_term = true;
                    Cow::Owned(single_id(Value::String(id.clone())))
                }
                Value::Object(map) => Cow::Borrowed(map),
                _ => {
                    return Err(error(
                        ErrorCode::InvalidTermDefinition,
                        format!("definition of '{}' must be a string, object or null", term),
                    ))
                }
            };

            let mut definition = Term {
                protected: scope.protected,
                ..Term::default()
            };

            // 11
            if let Some(protected) = map.get("@protected") {
                if mode == ProcessingMode::JsonLd10 {
                    return Err(error(
                        ErrorCode::InvalidTermDefinition,
                        "@protected is not supported in json-ld-1.0",
                    ));
                }

                definition.protected = protected.as_bool().ok_or_else(|| {
                    error(ErrorCode::InvalidProtectedValue, "@protected must be a boolean")
                })?;
            }

            // 12
            if let Some(type_value) = map.get("@type") {
                let type_value = type_value.as_str().ok_or_else(|| {
                    error(
                        ErrorCode::InvalidTypeMapping,
                        format!("@type of '{}' must be a string", term),
                    )
                })?;

                let expanded = self
                    .expand_iri_mut(active_context, type_value, false, true, ErrorCode::InvalidTypeMapping, defined, scope)
                    .await?;

                definition.type_mapping = Some(match expanded {
                    Some(t) if mode == ProcessingMode::JsonLd10 && (t == "@json" || t == "@none") => {
                        return Err(error(
                            ErrorCode::InvalidTypeMapping,
                            format!("{} type mapping requires json-ld-1.1", t),
                        ))
                    }
                    Some(t)
                        if matches!(t.as_str(), "@id" | "@json" | "@none" | "@vocab")
                            || is_absolute_iri(&t) =>
                    {
                        t
                    }
                    _ => {
                        return Err(error(
                            ErrorCode::InvalidTypeMapping,
                            format!("invalid type mapping '{}'", type_value),
                        ))
                    }
                });
            }

            // 13
            if let Some(reverse) = map.get("@reverse") {
                if map.contains_key("@id") || map.contains_key("@nest") {
                    return Err(error(
                        ErrorCode::InvalidReverseProperty,
                        format!("'{}' combines @reverse with @id or @nest", term),
                    ));
                }

                let reverse = reverse.as_str().ok_or_else(|| {
                    error(ErrorCode::InvalidIriMapping, "@reverse must be a string")
                })?;

                if is_keyword_form(reverse) {
                    self.warn(
                        ErrorCode::InvalidIriMapping,
                        format!("@reverse '{}' has the form of a keyword and is ignored", reverse),
                    );
                    defined.insert(term.to_owned(), DefineStatus::Defined);
                    return Ok(());
                }

                let iri = self
                    .expand_iri_mut(active_context, reverse, false, true, ErrorCode::InvalidIriMapping, defined, scope)
                    .await?;
                definition.iri_mapping = match iri {
                    Some(iri) if is_absolute_iri(&iri) || is_blank_node(&iri) => Some(iri),
                    _ => {
                        return Err(error(
                            ErrorCode::InvalidIriMapping,
                            format!("@reverse '{}' is not an IRI", reverse),
                        ))
                    }
                };

                if let Some(container) = map.get("@container") {
                    let container = match container {
                        Value::Null => Container::Null,
                        Value::String(c) if c == "@set" => Container::Set,
                        Value::String(c) if c == "@index" => Container::Index,
                        _ => {
                            return Err(error(
                                ErrorCode::InvalidReverseProperty,
                                format!("invalid container {} on a reverse property", container),
                            ))
                        }
                    };
                    definition.container_mapping.insert(container);
                }

                definition.reverse = true;
                trace!(term, iri = ?definition.iri_mapping, "defined reverse term");
                active_context
                    .terms
                    .insert(term.to_owned(), Arc::new(definition));
                defined.insert(term.to_owned(), DefineStatus::Defined);
                return Ok(());
            }

            // 14
            let id = map.get("@id").filter(|id| id.as_str() != Some(term));
            if let Some(id) = id {
                match id {
                    Value::Null => {}
                    Value::String(id) => {
                        if !is_keyword(id) && is_keyword_form(id) {
                            self.warn(
                                ErrorCode::InvalidIdValue,
                                format!("@id '{}' has the form of a keyword and is ignored", id),
                            );
                            defined.insert(term.to_owned(), DefineStatus::Defined);
                            return Ok(());
                        }

                        let iri = self
                            .expand_iri_mut(active_context, id, false, true, ErrorCode::InvalidIriMapping, defined, scope)
                            .await?;
                        let iri = match iri {
                            Some(iri) if is_keyword(&iri) || is_absolute_iri(&iri) || is_blank_node(&iri) => iri,
                            _ => {
                                return Err(error(
                                    ErrorCode::InvalidIriMapping,
                                    format!("'{}' does not expand to an IRI", id),
                                ))
                            }
                        };

                        if iri == "@context" {
                            return Err(error(
                                ErrorCode::InvalidKeywordAlias,
                                format!("'{}' cannot alias @context", term),
                            ));
                        }

                        // 14.2.4
                        if has_inner_colon(term) || term.contains('/') {
                            defined.insert(term.to_owned(), DefineStatus::Defined);
                            let expanded_term = self
                                .expand_iri_mut(active_context, term, false, true, ErrorCode::InvalidIriMapping, defined, scope)
                                .await?;
                            if expanded_term.as_deref() != Some(iri.as_str()) {
                                return Err(error(
                                    ErrorCode::InvalidIriMapping,
                                    format!("'{}' would expand to a different IRI than {}", term, iri),
                                ));
                            }
                        }

                        // 14.2.5
                        if !term.contains(':')
                            && !term.contains('/')
                            && simple_term
                            && (ends_with_gen_delim(&iri) || is_blank_node(&iri))
                        {
                            definition.prefix = true;
                        }

                        definition.iri_mapping = Some(iri);
                    }
                    _ => {
                        return Err(error(
                            ErrorCode::InvalidIriMapping,
                            format!("@id of '{}' must be a string or null", term),
                        ))
                    }
                }
            } else if let Some((prefix, suffix)) = split_after_first_char(term) {
                // 15
                if scope.local_context.contains_key(prefix) {
                    self.create_term(active_context, prefix, defined, scope)
                        .await?;
                }

                let prefix_iri = active_context
                    .terms
                    .get(prefix)
                    .and_then(|t| t.iri_mapping.as_deref());
                definition.iri_mapping = Some(match prefix_iri {
                    Some(iri) => format!("{}{}", iri, suffix),
                    None => term.to_owned(),
                });
            } else if term.contains('/') {
                // 16
                definition.iri_mapping = match active_context.expand_iri(term, false, true) {
                    Some(iri) if is_absolute_iri(&iri) => Some(iri),
                    _ => {
                        return Err(error(
                            ErrorCode::InvalidIriMapping,
                            format!("'{}' does not expand to an absolute IRI", term),
                        ))
                    }
                };
            } else if term == "@type" {
                definition.iri_mapping = Some("@type".to_owned());
            } else if let Some(vocab) = &active_context.vocabulary_mapping {
                definition.iri_mapping = Some(format!("{}{}", vocab, term));
            } else {
                return Err(error(
                    ErrorCode::InvalidIriMapping,
                    format!("no IRI mapping for '{}' and no @vocab", term),
                ));
            }

            // 19
            if let Some(container) = map.get("@container") {
                definition.container_mapping = parse_container(container, mode)?;

                if definition.has_container(Container::Type) {
                    if definition.type_mapping.is_none() {
                        definition.type_mapping = Some("@id".to_owned());
                    } else if !matches!(definition.type_mapping.as_deref(), Some("@id" | "@vocab")) {
                        return Err(error(
                            ErrorCode::InvalidTypeMapping,
                            "a @type container requires @type to be @id or @vocab",
                        ));
                    }
                }
            }

            // 20
            if let Some(index) = map.get("@index") {
                if mode == ProcessingMode::JsonLd10 || !definition.has_container(Container::Index) {
                    return Err(error(
                        ErrorCode::InvalidTermDefinition,
                        format!("@index on '{}' requires an @index container", term),
                    ));
                }

                let index = index
                    .as_str()
                    .filter(|index| {
                        active_context
                            .expand_iri(index, false, true)
                            .map_or(false, |iri| is_absolute_iri(&iri))
                    })
                    .ok_or_else(|| {
                        error(
                            ErrorCode::InvalidTermDefinition,
                            format!("@index of '{}' must expand to an IRI", term),
                        )
                    })?;
                definition.index_mapping = Some(index.to_owned());
            }

            // 21
            if let Some(context) = map.get("@context") {
                if mode == ProcessingMode::JsonLd10 {
                    return Err(error(
                        ErrorCode::InvalidTermDefinition,
                        "scoped contexts are not supported in json-ld-1.0",
                    ));
                }

                let flags = ContextFlags {
                    override_protected: true,
                    propagate: true,
                    validate_scoped: false,
                };
                self.process_context_with(
                    active_context,
                    context,
                    scope.base_url,
                    scope.remote_contexts.to_vec(),
                    flags,
                )
                .await
                .map_err(|e| {
                    JsonLdError::with_cause(
                        ErrorCode::InvalidScopedContext,
                        format!("invalid scoped context for '{}'", term),
                        e,
                    )
                })?;

                definition.local_context = Some(context.clone());
                definition.base_url = scope.base_url.cloned();
            }

            if !map.contains_key("@type") {
                // 22
                if let Some(language) = map.get("@language") {
                    definition.language_mapping = match language {
                        Value::Null => Tristate::Null,
                        Value::String(tag) => {
                            if !is_well_formed_language_tag(tag) {
                                self.warn(
                                    ErrorCode::MalformedLanguageTag,
                                    format!("'{}' is not a well-formed language tag", tag),
                                );
                            }
                            Tristate::Value(tag.to_lowercase())
                        }
                        _ => {
                            return Err(error(
                                ErrorCode::InvalidLanguageMapping,
                                format!("invalid @language {} on '{}'", language, term),
                            ))
                        }
                    };
                }

                // 23
                if let Some(direction) = map.get("@direction") {
                    definition.direction_mapping = match direction {
                        Value::Null => Tristate::Null,
                        Value::String(d) => match Direction::parse(d) {
                            Some(d) => Tristate::Value(d),
                            None => {
                                return Err(error(
                                    ErrorCode::InvalidBaseDirection,
                                    format!("invalid @direction '{}' on '{}'", d, term),
                                ))
                            }
                        },
                        _ => {
                            return Err(error(
                                ErrorCode::InvalidBaseDirection,
                                format!("invalid @direction {} on '{}'", direction, term),
                            ))
                        }
                    };
                }
            }

            // 24
            if let Some(nest) = map.get("@nest") {
                if mode == ProcessingMode::JsonLd10 {
                    return Err(error(
                        ErrorCode::InvalidTermDefinition,
                        "@nest is not supported in json-ld-1.0",
                    ));
                }

                let nest = nest
                    .as_str()
                    .filter(|n| *n == "@nest" || !is_keyword(n))
                    .ok_or_else(|| {
                        error(
                            ErrorCode::InvalidNestValue,
                            format!("invalid @nest {} on '{}'", nest, term),
                        )
                    })?;
                definition.nest_value = Some(nest.to_owned());
            }

            // 25
            if let Some(prefix) = map.get("@prefix") {
                if mode == ProcessingMode::JsonLd10 || term.contains(':') || term.contains('/') {
                    return Err(error(
                        ErrorCode::InvalidTermDefinition,
                        format!("'{}' cannot carry @prefix", term),
                    ));
                }

                definition.prefix = prefix.as_bool().ok_or_else(|| {
                    error(ErrorCode::InvalidPrefixValue, "@prefix must be a boolean")
                })?;

                if definition.prefix && definition.iri_mapping.as_deref().map_or(false, is_keyword) {
                    return Err(error(
                        ErrorCode::InvalidTermDefinition,
                        format!("keyword alias '{}' cannot be a prefix", term),
                    ));
                }
            }

            // 26
            if let Some(key) = map.keys().find(|k| !TERM_DEFINITION_KEYS.contains(k.as_str())) {
                return Err(error(
                    ErrorCode::InvalidTermDefinition,
                    format!("unexpected {} in definition of '{}'", key, term),
                ));
            }

            // 27
            if let (false, Some(previous)) = (scope.override_protected, previous) {
                if previous.protected {
                    if !definition.same_as(&previous) {
                        return Err(error(
                            ErrorCode::ProtectedTermRedefinition,
                            format!("protected term '{}' cannot be redefined", term),
                        ));
                    }

                    active_context.terms.insert(term.to_owned(), previous);
                    defined.insert(term.to_owned(), DefineStatus::Defined);
                    return Ok(());
                }
            }

            trace!(term, iri = ?definition.iri_mapping, "defined term");
            active_context
                .terms
                .insert(term.to_owned(), Arc::new(definition));
            defined.insert(term.to_owned(), DefineStatus::Defined);
            Ok(())
        })
    }
}
