//! Error types for coursemind.
//!
//! Every failure is sorted into one [`ErrorClass`], which is what the HTTP
//! surface turns into a status code. Finding nothing is not an error: retrieval
//! returns an empty list and generation reports a "no relevant content" answer.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for coursemind operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing credentials, index names or other required settings
    #[error("config error: {0}")]
    Config(String),

    /// Request rejected before any remote call
    #[error("invalid request: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Another ingestion run holds this material
    #[error("material {0} is already being indexed")]
    IndexingInProgress(Uuid),

    /// Document parsing failed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Chunking failed
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// Vector index or relational store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Language model call failed
    #[error("generation error: {0}")]
    Generation(#[from] GenerateError),

    /// Chunks were persisted but vectors were not; the material stays unindexed
    #[error(
        "indexing of material {material_id} incomplete ({chunks_persisted} chunks persisted, re-index to recover): {source}"
    )]
    PartialIngestion {
        material_id: Uuid,
        chunks_persisted: usize,
        #[source]
        source: Box<Error>,
    },

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Coarse error classification shared by the CLI and the HTTP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Validation,
    NotFound,
    Conflict,
    Transport,
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_) => ErrorClass::Configuration,
            Self::Validation(_) => ErrorClass::Validation,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::IndexingInProgress(_) => ErrorClass::Conflict,
            Self::Parse(e) => e.class(),
            Self::Chunking(ChunkError::InvalidConfig(_)) => ErrorClass::Configuration,
            Self::Chunking(_) => ErrorClass::Internal,
            Self::Embedding(e) => e.class(),
            Self::Store(StoreError::DimensionMismatch { .. }) => ErrorClass::Internal,
            Self::Store(_) => ErrorClass::Transport,
            Self::Generation(e) => e.class(),
            Self::PartialIngestion { source, .. } => source.class(),
            Self::Io(_) | Self::Serialization(_) | Self::Other(_) => ErrorClass::Internal,
        }
    }
}

/// Document parsing errors.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("failed to fetch source file: {0}")]
    Fetch(String),

    #[error("parsing service error: {0}")]
    Remote(String),

    #[error("parsing failed: {0}")]
    Failed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::UnsupportedType(_) => ErrorClass::Validation,
            Self::Fetch(_) | Self::Remote(_) => ErrorClass::Transport,
            Self::Failed(_) | Self::Io(_) => ErrorClass::Internal,
        }
    }
}

/// Chunking errors.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("chunking failed: {0}")]
    Failed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding provider not configured: {0}")]
    NotConfigured(String),

    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::NotConfigured(_) => ErrorClass::Configuration,
            Self::Request(_) | Self::InvalidResponse(_) => ErrorClass::Transport,
            Self::DimensionMismatch { .. } => ErrorClass::Internal,
        }
    }
}

/// Vector index and relational store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store initialization failed: {0}")]
    Init(String),

    #[error("insert failed: {0}")]
    Insert(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Language model errors.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("language model not configured: {0}")]
    NotConfigured(String),

    #[error("language model request failed: {0}")]
    Request(String),

    #[error("language model output rejected: {0}")]
    InvalidOutput(String),
}

impl GenerateError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::NotConfigured(_) => ErrorClass::Configuration,
            Self::Request(_) => ErrorClass::Transport,
            Self::InvalidOutput(_) => ErrorClass::Internal,
        }
    }
}

/// Result type alias for coursemind operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    // ========== Display Tests ==========

    #[test]
    fn test_parse_error_unsupported_type_display() {
        let err = ParseError::UnsupportedType("application/zip".to_string());
        assert_eq!(err.to_string(), "unsupported file type: application/zip");
    }

    #[test]
    fn test_embed_error_dimension_mismatch_display() {
        let err = EmbedError::DimensionMismatch {
            expected: 1024,
            actual: 1536,
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch: expected 1024, got 1536"
        );
    }

    #[test]
    fn test_partial_ingestion_display_mentions_recovery() {
        let id = Uuid::nil();
        let err = Error::PartialIngestion {
            material_id: id,
            chunks_persisted: 12,
            source: Box::new(Error::Embedding(EmbedError::Request("timeout".into()))),
        };
        let msg = err.to_string();
        assert!(msg.contains("12 chunks persisted"));
        assert!(msg.contains("re-index"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn test_from_store_error() {
        let err: Error = StoreError::Query("boom".into()).into();
        assert!(matches!(err, Error::Store(_)));
    }

    // ========== Classification Tests ==========

    #[test]
    fn test_class_configuration() {
        assert_eq!(
            Error::Config("missing key".into()).class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            Error::Embedding(EmbedError::NotConfigured("OPENAI_API_KEY".into())).class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            Error::Generation(GenerateError::NotConfigured("key".into())).class(),
            ErrorClass::Configuration
        );
    }

    #[test]
    fn test_class_transport() {
        assert_eq!(
            Error::Parse(ParseError::Fetch("dns".into())).class(),
            ErrorClass::Transport
        );
        assert_eq!(
            Error::Store(StoreError::Insert("down".into())).class(),
            ErrorClass::Transport
        );
        assert_eq!(
            Error::Generation(GenerateError::Request("503".into())).class(),
            ErrorClass::Transport
        );
    }

    #[test]
    fn test_class_validation_for_unsupported_type() {
        assert_eq!(
            Error::Parse(ParseError::UnsupportedType("zip".into())).class(),
            ErrorClass::Validation
        );
    }

    #[test]
    fn test_class_partial_ingestion_follows_source() {
        let err = Error::PartialIngestion {
            material_id: Uuid::nil(),
            chunks_persisted: 3,
            source: Box::new(Error::Store(StoreError::Insert("x".into()))),
        };
        assert_eq!(err.class(), ErrorClass::Transport);
    }

    #[test]
    fn test_class_conflict() {
        assert_eq!(
            Error::IndexingInProgress(Uuid::nil()).class(),
            ErrorClass::Conflict
        );
    }
}
