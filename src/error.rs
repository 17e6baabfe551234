use std::error::Error as StdError;
use std::fmt;

/// The error codes defined by the JSON-LD 1.1 API, plus the warning-only
/// `MalformedLanguageTag`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    CollidingKeywords,
    ConflictingIndexes,
    ContextOverflow,
    CyclicIriMapping,
    InvalidIdValue,
    InvalidImportValue,
    InvalidIncludedValue,
    InvalidIndexValue,
    InvalidNestValue,
    InvalidPrefixValue,
    InvalidPropagateValue,
    InvalidProtectedValue,
    InvalidReverseValue,
    InvalidVersionValue,
    InvalidBaseDirection,
    InvalidBaseIri,
    InvalidContainerMapping,
    InvalidContextEntry,
    InvalidContextNullification,
    InvalidDefaultLanguage,
    InvalidIriMapping,
    InvalidJsonLiteral,
    InvalidKeywordAlias,
    InvalidLanguageMapValue,
    InvalidLanguageMapping,
    InvalidLanguageTaggedString,
    InvalidLanguageTaggedValue,
    InvalidLocalContext,
    InvalidRemoteContext,
    InvalidReverseProperty,
    InvalidReversePropertyMap,
    InvalidReversePropertyValue,
    InvalidScopedContext,
    InvalidSetOrListObject,
    InvalidTermDefinition,
    InvalidTypeMapping,
    InvalidTypeValue,
    InvalidTypedValue,
    InvalidValueObject,
    InvalidValueObjectValue,
    InvalidVocabMapping,
    IriConfusedWithPrefix,
    KeywordRedefinition,
    ListOfLists,
    LoadingDocumentFailed,
    LoadingRemoteContextFailed,
    MultipleContextLinkHeaders,
    ProcessingModeConflict,
    ProtectedTermRedefinition,
    RecursiveContextInclusion,

    /// Not a W3C error; only ever reported as a warning.
    MalformedLanguageTag,
}

impl ErrorCode {
    /// The code exactly as it appears in the W3C test manifests.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::CollidingKeywords => "colliding keywords",
            ErrorCode::ConflictingIndexes => "conflicting indexes",
            ErrorCode::ContextOverflow => "context overflow",
            ErrorCode::CyclicIriMapping => "cyclic IRI mapping",
            ErrorCode::InvalidIdValue => "invalid @id value",
            ErrorCode::InvalidImportValue => "invalid @import value",
            ErrorCode::InvalidIncludedValue => "invalid @included value",
            ErrorCode::InvalidIndexValue => "invalid @index value",
            ErrorCode::InvalidNestValue => "invalid @nest value",
            ErrorCode::InvalidPrefixValue => "invalid @prefix value",
            ErrorCode::InvalidPropagateValue => "invalid @propagate value",
            ErrorCode::InvalidProtectedValue => "invalid @protected value",
            ErrorCode::InvalidReverseValue => "invalid @reverse value",
            ErrorCode::InvalidVersionValue => "invalid @version value",
            ErrorCode::InvalidBaseDirection => "invalid base direction",
            ErrorCode::InvalidBaseIri => "invalid base IRI",
            ErrorCode::InvalidContainerMapping => "invalid container mapping",
            ErrorCode::InvalidContextEntry => "invalid context entry",
            ErrorCode::InvalidContextNullification => "invalid context nullification",
            ErrorCode::InvalidDefaultLanguage => "invalid default language",
            ErrorCode::InvalidIriMapping => "invalid IRI mapping",
            ErrorCode::InvalidJsonLiteral => "invalid JSON literal",
            ErrorCode::InvalidKeywordAlias => "invalid keyword alias",
            ErrorCode::InvalidLanguageMapValue => "invalid language map value",
            ErrorCode::InvalidLanguageMapping => "invalid language mapping",
            ErrorCode::InvalidLanguageTaggedString => "invalid language-tagged string",
            ErrorCode::InvalidLanguageTaggedValue => "invalid language-tagged value",
            ErrorCode::InvalidLocalContext => "invalid local context",
            ErrorCode::InvalidRemoteContext => "invalid remote context",
            ErrorCode::InvalidReverseProperty => "invalid reverse property",
            ErrorCode::InvalidReversePropertyMap => "invalid reverse property map",
            ErrorCode::InvalidReversePropertyValue => "invalid reverse property value",
            ErrorCode::InvalidScopedContext => "invalid scoped context",
            ErrorCode::InvalidSetOrListObject => "invalid set or list object",
            ErrorCode::InvalidTermDefinition => "invalid term definition",
            ErrorCode::InvalidTypeMapping => "invalid type mapping",
            ErrorCode::InvalidTypeValue => "invalid type value",
            ErrorCode::InvalidTypedValue => "invalid typed value",
            ErrorCode::InvalidValueObject => "invalid value object",
            ErrorCode::InvalidValueObjectValue => "invalid value object value",
            ErrorCode::InvalidVocabMapping => "invalid vocab mapping",
            ErrorCode::IriConfusedWithPrefix => "IRI confused with prefix",
            ErrorCode::KeywordRedefinition => "keyword redefinition",
            ErrorCode::ListOfLists => "list of lists",
            ErrorCode::LoadingDocumentFailed => "loading document failed",
            ErrorCode::LoadingRemoteContextFailed => "loading remote context failed",
            ErrorCode::MultipleContextLinkHeaders => "multiple context link headers",
            ErrorCode::ProcessingModeConflict => "processing mode conflict",
            ErrorCode::ProtectedTermRedefinition => "protected term redefinition",
            ErrorCode::RecursiveContextInclusion => "recursive context inclusion",
            ErrorCode::MalformedLanguageTag => "malformed language tag",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised while processing a context or expanding a document.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct JsonLdError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn StdError + Send + Sync>>,
}

impl JsonLdError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        JsonLdError {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Wraps another error, keeping it reachable through `source()`.
    pub fn with_cause<E>(code: ErrorCode, message: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        JsonLdError {
            code,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }
}

pub type Result<T> = std::result::Result<T, JsonLdError>;

/// A non-fatal problem noticed while processing. The offending input was
/// ignored and processing continued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Warning {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn display_uses_the_w3c_code() {
        let err = JsonLdError::new(ErrorCode::CyclicIriMapping, "term 'a' refers to itself");
        assert_eq!(err.to_string(), "cyclic IRI mapping: term 'a' refers to itself");
        assert!(err.source().is_none());
    }

    #[test]
    fn cause_is_exposed_as_source() {
        let inner = JsonLdError::new(ErrorCode::InvalidIriMapping, "bad");
        let err = JsonLdError::with_cause(ErrorCode::InvalidScopedContext, "scoped", inner);
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("invalid IRI mapping: bad"));
    }
}
