// This module defines the error types for isel using the thiserror crate. CodegenError
// is the single error enum shared by the token model, the instruction model, the
// selection engine and the assembler. The three selection-time failures named by the
// design (EncodingRange, NoApplicablePattern, UnimplementedEncoding) are kept as
// separate variants so that grammar authors get a precise diagnostic; malformed
// architecture descriptions surface as MalformedRegistration when the token layouts,
// instruction descriptors or grammar are built, never later. Every variant aborts
// the current compilation unit. CodegenResult<T> is the convenience alias.

//! Error types for code generation.
//!
//! Using thiserror for idiomatic error handling.

use thiserror::Error;

/// Main error type for instruction encoding and selection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    /// An operand value does not fit the field (or operand range) it is encoded into.
    #[error("value {value} does not fit `{field}` ({constraint})")]
    EncodingRange {
        field: String,
        value: i64,
        constraint: String,
    },

    /// No rule covers the operator as the requested nonterminal.
    #[error("no applicable pattern for {operator} as `{nonterminal}`")]
    NoApplicablePattern {
        operator: String,
        nonterminal: String,
    },

    /// The matching rule exists but deliberately has no encoding.
    #[error("encoding not implemented: {what}")]
    UnimplementedEncoding { what: String },

    /// Token layouts, instructions or grammar rules are inconsistent.
    #[error("malformed architecture description: {reason}")]
    MalformedRegistration { reason: String },

    /// Operand of the wrong kind, or the wrong number of operands.
    #[error("invalid operand for `{instruction}`: {reason}")]
    InvalidOperand { instruction: String, reason: String },

    /// A virtual register reached encoding without a physical assignment.
    #[error("virtual register {register} has no physical assignment")]
    UnassignedRegister { register: String },

    /// A label was referenced but never placed or pooled.
    #[error("unknown label `{name}`")]
    UnknownLabel { name: String },

    /// Emitter returned a value of the wrong shape for its nonterminal.
    #[error("rule for `{nonterminal}` produced {found}")]
    UnexpectedResult { nonterminal: String, found: String },

    /// Textual IR could not be read.
    #[error("parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Object file generation failed.
    #[error("object emission failed: {reason}")]
    Object { reason: String },
}

impl CodegenError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        CodegenError::MalformedRegistration {
            reason: reason.into(),
        }
    }

    pub(crate) fn unimplemented(what: impl Into<String>) -> Self {
        CodegenError::UnimplementedEncoding { what: what.into() }
    }
}

/// Result type alias for code generation.
pub type CodegenResult<T> = Result<T, CodegenError>;
