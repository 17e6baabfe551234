//! Document loaders that never touch the network.

use serde_json::Value;
use std::collections::HashMap;
use url::Url;

use crate::{BoxFuture, DocumentLoader, RemoteDocument};

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("no document available for {0}")]
    NotFound(Url),

    #[error("loading {0} is not supported")]
    Unsupported(Url),
}

/// Refuses every request. For documents without remote contexts.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLoader;

impl DocumentLoader for NoLoader {
    type Error = LoaderError;

    fn load_document<'a>(
        &'a self,
        url: &'a Url,
    ) -> BoxFuture<'a, Result<RemoteDocument, LoaderError>> {
        Box::pin(async move { Err(LoaderError::Unsupported(url.clone())) })
    }
}

/// Serves documents registered up front, keyed by URL.
#[derive(Clone, Debug, Default)]
pub struct StaticLoader {
    documents: HashMap<String, RemoteDocument>,
}

impl StaticLoader {
    pub fn new() -> Self {
        StaticLoader::default()
    }

    /// Registers `document` under `url`. Unparseable URLs are ignored.
    pub fn with_document(mut self, url: &str, document: Value) -> Self {
        self.insert(url, document, None);
        self
    }

    /// Registers a document whose response links to a context, as an HTTP
    /// `Link` header would.
    pub fn with_linked_document(mut self, url: &str, document: Value, context_url: &str) -> Self {
        let context_url = Url::parse(context_url).ok();
        self.insert(url, document, context_url);
        self
    }

    pub fn insert(&mut self, url: &str, document: Value, context_url: Option<Url>) {
        if let Ok(document_url) = Url::parse(url) {
            self.documents.insert(
                document_url.to_string(),
                RemoteDocument {
                    document_url,
                    context_url,
                    document,
                },
            );
        }
    }
}

impl DocumentLoader for StaticLoader {
    type Error = LoaderError;

    fn load_document<'a>(
        &'a self,
        url: &'a Url,
    ) -> BoxFuture<'a, Result<RemoteDocument, LoaderError>> {
        Box::pin(async move {
            self.documents
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| LoaderError::NotFound(url.clone()))
        })
    }
}
