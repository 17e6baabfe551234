use oxiri::Iri;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use url::Url;

use crate::context::{Context, ProcessingMode};
use crate::creation::ContextFlags;
use crate::error::{ErrorCode, JsonLdError, Result, Warning};
use crate::expand::ExpandFlags;
use crate::helper::into_array;
use crate::DocumentLoader;

/// Options that may be passed to `expand` or `process_context`.
///
/// Deserializes from the `option` blocks of the W3C test manifests.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JsonLdOptions {
    /// The base IRI of the document. Used to resolve relative references.
    pub base: Option<String>,

    /// `json-ld-1.1` unless set otherwise.
    pub processing_mode: ProcessingMode,

    /// A context applied before the document's own. May be a context, or
    /// an object holding one under `@context`.
    pub expand_context: Option<Value>,

    /// Process map entries in lexicographical order.
    pub ordered: bool,

    /// Accept the relaxed forms used by frames.
    pub frame_expansion: bool,

    /// Upper bound on nested remote context dereferences. `None` means no
    /// limit.
    pub remote_context_limit: Option<usize>,

    /// Warn about every entry dropped during expansion.
    pub safe_mode: bool,
}

impl Default for JsonLdOptions {
    fn default() -> Self {
        JsonLdOptions {
            base: None,
            processing_mode: ProcessingMode::JsonLd11,
            expand_context: None,
            ordered: false,
            frame_expansion: false,
            remote_context_limit: None,
            safe_mode: false,
        }
    }
}

/// Holds the state of one top-level operation: the options, the loader,
/// the remote context cache and the warnings collected so far.
pub struct JsonLdProcessor<'l, L> {
    pub(crate) options: &'l JsonLdOptions,
    pub(crate) loader: &'l L,
    pub(crate) remote_cache: HashMap<Url, (Url, Value)>,
    pub(crate) warnings: Vec<Warning>,
}

impl<'l, L: DocumentLoader> JsonLdProcessor<'l, L> {
    pub fn new(options: &'l JsonLdOptions, loader: &'l L) -> Self {
        JsonLdProcessor {
            options,
            loader,
            remote_cache: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }

    pub(crate) fn warn(&mut self, code: ErrorCode, message: String) {
        warn!(%code, "{}", message);
        self.warnings.push(Warning { code, message });
    }

    /// Expands an already loaded document.
    pub async fn expand(&mut self, input: &Value) -> Result<Value> {
        self.expand_loaded(input, None, None).await
    }

    /// Loads `url` through the document loader and expands it.
    pub async fn expand_document(&mut self, url: &str) -> Result<Value> {
        let url = Url::parse(url).map_err(|e| {
            JsonLdError::with_cause(
                ErrorCode::LoadingDocumentFailed,
                format!("cannot load '{}'", url),
                e,
            )
        })?;

        let remote = self.loader.load_document(&url).await.map_err(|e| {
            JsonLdError::with_cause(
                ErrorCode::LoadingDocumentFailed,
                format!("failed to load '{}'", url),
                e,
            )
        })?;

        self.expand_loaded(&remote.document, Some(remote.document_url), remote.context_url)
            .await
    }

    /// Processes `local_context` on top of `active_context`.
    pub async fn process_context(
        &mut self,
        active_context: &Context,
        local_context: &Value,
        base_url: Option<&Url>,
    ) -> Result<Context> {
        self.process_context_with(
            active_context,
            local_context,
            base_url,
            vec![],
            ContextFlags::default(),
        )
        .await
    }

    /// A fresh context carrying the configured base IRI, or the document URL.
    pub(crate) fn initial_context(&self, document_url: Option<&Url>) -> Result<Context> {
        let base = match &self.options.base {
            Some(base) => Some(Iri::parse(base.clone()).map_err(|e| {
                JsonLdError::with_cause(
                    ErrorCode::InvalidBaseIri,
                    format!("'{}' is not an absolute IRI", base),
                    e,
                )
            })?),
            None => document_url.and_then(|url| Iri::parse(url.to_string()).ok()),
        };

        Ok(Context::new(base))
    }

    async fn expand_loaded(
        &mut self,
        document: &Value,
        document_url: Option<Url>,
        context_url: Option<Url>,
    ) -> Result<Value> {
        let mut active_context = self.initial_context(document_url.as_ref())?;
        let base_url = document_url.or_else(|| {
            active_context
                .base_iri
                .as_ref()
                .and_then(|iri| Url::parse(iri.as_str()).ok())
        });

        if let Some(expand_context) = &self.options.expand_context {
            let local_context = match expand_context {
                Value::Object(map) => map.get("@context").unwrap_or(expand_context),
                _ => expand_context,
            };

            let processed = self
                .process_context_with(
                    &active_context,
                    local_context,
                    base_url.as_ref(),
                    vec![],
                    ContextFlags::default(),
                )
                .await?;
            active_context = processed;
        }

        if let Some(context_url) = context_url {
            let reference = Value::String(context_url.to_string());
            let processed = self
                .process_context_with(
                    &active_context,
                    &reference,
                    Some(&context_url),
                    vec![],
                    ContextFlags::default(),
                )
                .await?;
            active_context = processed;
        }

        let flags = ExpandFlags {
            frame_expansion: self.options.frame_expansion,
            ordered: self.options.ordered,
            from_map: false,
            inside_list: false,
        };

        let expanded = self
            .expand_element(
                Arc::new(active_context),
                None,
                document,
                base_url.as_ref(),
                flags,
            )
            .await?;

        let expanded = match expanded {
            Value::Object(map) if map.len() == 1 && map.contains_key("@graph") => {
                map.into_iter()
                    .next()
                    .map(|(_, graph)| into_array(graph))
                    .unwrap_or_default()
            }
            other => into_array(other),
        };

        Ok(Value::Array(expanded))
    }
}

/// Expands a JSON-LD document, as the JSON-LD 1.1 API `expand()` method does.
pub async fn expand<L: DocumentLoader>(
    input: &Value,
    options: &JsonLdOptions,
    loader: &L,
) -> Result<Value> {
    JsonLdProcessor::new(options, loader).expand(input).await
}

/// Like [`expand`], also returning the warnings raised on the way.
pub async fn expand_with_warnings<L: DocumentLoader>(
    input: &Value,
    options: &JsonLdOptions,
    loader: &L,
) -> Result<(Value, Vec<Warning>)> {
    let mut processor = JsonLdProcessor::new(options, loader);
    let expanded = processor.expand(input).await?;
    Ok((expanded, processor.into_warnings()))
}

/// Loads the document at `url` and expands it. The document URL serves as
/// base IRI unless `options.base` is set, and a context linked from the
/// response is applied after `options.expand_context`.
pub async fn expand_document<L: DocumentLoader>(
    url: &str,
    options: &JsonLdOptions,
    loader: &L,
) -> Result<Value> {
    JsonLdProcessor::new(options, loader)
        .expand_document(url)
        .await
}

/// Processes a local context against an active context, returning the new
/// active context.
pub async fn process_context<L: DocumentLoader>(
    active_context: &Context,
    local_context: &Value,
    base_url: Option<&Url>,
    options: &JsonLdOptions,
    loader: &L,
) -> Result<Context> {
    JsonLdProcessor::new(options, loader)
        .process_context(active_context, local_context, base_url)
        .await
}
