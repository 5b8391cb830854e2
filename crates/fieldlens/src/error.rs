//! Error types shared across the crate.
//!
//! Two layers exist:
//! - `GrammarError` is what a grammar node reports while parsing or
//!   building (short input, mismatching constants, bad expressions, ...).
//! - `EditorError` is what the editing core reports to its callers. Parse
//!   and build failures wrap a `GrammarError`; the remaining variants cover
//!   configuration problems (unsupported node kinds) and navigation problems
//!   (paths that no longer resolve against the current value).
use thiserror::Error;

/// Failure reported by a grammar node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GrammarError {
    /// The stream ended before the node could read what it needed.
    #[error("unexpected end of stream at offset {offset}: needed {needed}, available {available}")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A length, condition, key or selector expression could not be evaluated.
    #[error("expression error: {0}")]
    Expression(String),

    /// A value did not have the shape a node expected.
    #[error("type error: expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: String,
    },

    /// A value was outside the range the node can represent.
    #[error("value out of range: {0}")]
    Range(String),

    /// A constant field read something else.
    #[error("constant mismatch: expected {expected}, found {found}")]
    Const { expected: String, found: String },

    /// A checksum field did not match the recomputed checksum.
    #[error("checksum mismatch: expected {expected:#x}, found {found:#x}")]
    Checksum { expected: i128, found: i128 },

    /// None of the alternatives of a selection matched.
    #[error("no alternative matched")]
    NoAlternative,

    /// Padding or framing constraints were violated.
    #[error("framing error: {0}")]
    Framing(String),

    /// Decompression or compression failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// A custom stream transform failed.
    #[error("transform error: {0}")]
    Transform(String),

    /// The operation was cancelled through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Anything else, with a human-readable message.
    #[error("{0}")]
    Other(String),
}

impl GrammarError {
    /// Short classification string, used as the "kind" of an error state.
    pub fn kind(&self) -> &'static str {
        match self {
            GrammarError::UnexpectedEof { .. } => "StreamError",
            GrammarError::Expression(_) => "ExpressionError",
            GrammarError::Type { .. } => "TypeError",
            GrammarError::Range(_) => "RangeError",
            GrammarError::Const { .. } => "ConstError",
            GrammarError::Checksum { .. } => "ChecksumError",
            GrammarError::NoAlternative => "SelectError",
            GrammarError::Framing(_) => "PaddingError",
            GrammarError::Compression(_) => "CompressionError",
            GrammarError::Transform(_) => "TransformError",
            GrammarError::Cancelled => "Cancelled",
            GrammarError::Other(_) => "GrammarError",
        }
    }
}

/// Failure reported by the editing core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditorError {
    /// The preprocessor has no policy for a node kind.
    #[error("unsupported construct: {0}")]
    GrammarUnsupported(String),

    /// The entry factory has no variant for a node kind.
    #[error("unimplemented node kind: {0}")]
    UnimplementedNode(String),

    /// The grammar rejected the buffer.
    #[error("parse failed: {0}")]
    ParseFailure(GrammarError),

    /// The grammar could not serialize the current value.
    #[error("build failed: {0}")]
    BuildFailure(GrammarError),

    /// A path no longer resolves against the current value.
    #[error("path '{path}' does not resolve: {reason}")]
    PathResolution { path: String, reason: String },

    /// No grammar has been set on the editor.
    #[error("no grammar loaded")]
    NoGrammar,

    /// There is no parsed value to operate on.
    #[error("no value loaded")]
    NoValue,

    /// User input could not be converted into a value.
    #[error("invalid input for {kind}: {message}")]
    InvalidInput { kind: &'static str, message: String },

    /// A history command refused to run.
    #[error("command '{name}' failed: {message}")]
    CommandFailed { name: String, message: String },
}

impl EditorError {
    /// Whether the error is recoverable by the user (as opposed to a grammar
    /// configuration problem).
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            EditorError::GrammarUnsupported(_) | EditorError::UnimplementedNode(_)
        )
    }
}
