//! JSON-LD 1.1 context processing and expansion.
//!
//! The entry points are [`expand`], [`expand_document`] and
//! [`process_context`]; remote documents and contexts are fetched through a
//! caller-supplied [`DocumentLoader`].

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use url::Url;

mod api;
mod context;
mod creation;
pub mod error;
mod expand;
mod helper;
pub mod iri;
pub mod keywords;
pub mod loader;

pub use api::*;
pub use context::{
    Container, Context, Direction, InverseContext, InverseEntry, ProcessingMode, Term, Tristate,
};
pub use error::{ErrorCode, JsonLdError, Result, Warning};
pub use helper::NodeKind;
pub use oxiri::Iri;

/// A boxed future, as returned by [`DocumentLoader`] and the recursive
/// algorithms.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A document retrieved by a [`DocumentLoader`].
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteDocument {
    /// The final URL of the document, after redirects.
    pub document_url: Url,

    /// The context referenced through an HTTP `Link` header, if any.
    pub context_url: Option<Url>,

    pub document: Value,
}

/// This trait is implemented by consumers of the API, to provide remote
/// documents and contexts.
pub trait DocumentLoader: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads a remote JSON-LD document into memory.
    fn load_document<'a>(&'a self, url: &'a Url)
        -> BoxFuture<'a, std::result::Result<RemoteDocument, Self::Error>>;
}
