//! Error types with rich diagnostics using miette
//!
//! Every formula error carries the offending formula and a span at the
//! failing offset, so a caller can highlight the character that broke.

use std::fmt;

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Which stage of formula processing rejected the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Lex,
    Parse,
    Eval,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Lex => write!(f, "lex"),
            ErrorKind::Parse => write!(f, "parse"),
            ErrorKind::Eval => write!(f, "eval"),
        }
    }
}

// ============================================================================
// Formula Errors
// ============================================================================

/// Errors raised while tokenizing, parsing or evaluating a formula
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum FormulaError {
    /// Malformed token stream: unterminated string, stray character
    #[error("{message}")]
    #[diagnostic(code(draftsman::lex))]
    Lex {
        message: String,
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
    },

    /// Unbalanced brackets, unknown identifiers, wrong arity
    #[error("{message}")]
    #[diagnostic(code(draftsman::parse))]
    Parse {
        message: String,
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
    },

    /// Operator, member or method not applicable to the runtime kinds present
    #[error("{message}")]
    #[diagnostic(code(draftsman::eval))]
    Eval {
        message: String,
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
    },
}

impl FormulaError {
    pub fn lex(offset: usize, message: impl Into<String>) -> Self {
        FormulaError::Lex {
            message: message.into(),
            src: String::new(),
            span: offset.into(),
        }
    }

    pub fn parse(offset: usize, message: impl Into<String>) -> Self {
        FormulaError::Parse {
            message: message.into(),
            src: String::new(),
            span: offset.into(),
        }
    }

    pub fn eval(offset: usize, message: impl Into<String>) -> Self {
        FormulaError::Eval {
            message: message.into(),
            src: String::new(),
            span: offset.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FormulaError::Lex { .. } => ErrorKind::Lex,
            FormulaError::Parse { .. } => ErrorKind::Parse,
            FormulaError::Eval { .. } => ErrorKind::Eval,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            FormulaError::Lex { message, .. }
            | FormulaError::Parse { message, .. }
            | FormulaError::Eval { message, .. } => message,
        }
    }

    /// Byte offset into the formula where the failure was detected
    pub fn offset(&self) -> usize {
        self.span().offset()
    }

    /// The formula text the offset refers to (empty if never attached)
    pub fn formula(&self) -> &str {
        match self {
            FormulaError::Lex { src, .. }
            | FormulaError::Parse { src, .. }
            | FormulaError::Eval { src, .. } => src,
        }
    }

    fn span(&self) -> SourceSpan {
        match self {
            FormulaError::Lex { span, .. }
            | FormulaError::Parse { span, .. }
            | FormulaError::Eval { span, .. } => *span,
        }
    }

    /// Attach the formula text, unless an inner formula already claimed it.
    ///
    /// Errors bubbling out of a referenced expression keep pointing into that
    /// expression's own formula.
    pub fn with_formula(mut self, text: &str) -> Self {
        let (src, span) = match &mut self {
            FormulaError::Lex { src, span, .. }
            | FormulaError::Parse { src, span, .. }
            | FormulaError::Eval { src, span, .. } => (src, span),
        };
        if src.is_empty() {
            *src = text.to_string();
            // Label the whole token where possible.
            let offset = span.offset().min(text.len());
            let len = text[offset..]
                .char_indices()
                .find(|&(i, c)| i > 0 && !(c.is_alphanumeric() || c == '_'))
                .map(|(i, _)| i)
                .unwrap_or(text.len() - offset);
            *span = (offset, len).into();
        }
        self
    }
}

// ============================================================================
// Value Errors
// ============================================================================

/// A value-level failure (kind mismatch, unit mismatch, bad argument).
///
/// Carries no position; the graph lifts it into [`FormulaError::Eval`] at the
/// offset of the node that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValueError(pub String);

impl ValueError {
    pub fn new(message: impl Into<String>) -> Self {
        ValueError(message.into())
    }

    pub fn at(self, offset: usize) -> FormulaError {
        FormulaError::eval(offset, self.0)
    }
}

// ============================================================================
// Graph Errors
// ============================================================================

/// Misuse of a property handle, or a rejected edit
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum PropError {
    #[error("property is not formula-backed")]
    #[diagnostic(code(draftsman::prop::not_expression))]
    NotAnExpression,

    #[error("property is not a variable")]
    #[diagnostic(code(draftsman::prop::not_variable))]
    NotAVariable,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Formula(#[from] FormulaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kind_and_offset() {
        let e = FormulaError::parse(4, "unknown identifier 'Foo'");
        assert_eq!(e.kind(), ErrorKind::Parse);
        assert_eq!(e.offset(), 4);
        assert_eq!(e.message(), "unknown identifier 'Foo'");
        assert_eq!(e.to_string(), "unknown identifier 'Foo'");
    }

    #[test]
    fn with_formula_spans_identifier() {
        let e = FormulaError::parse(4, "unknown identifier 'Foo'").with_formula("1 + Foo * 2");
        assert_eq!(e.formula(), "1 + Foo * 2");
        assert_eq!(e.offset(), 4);
        let FormulaError::Parse { span, .. } = e else {
            panic!("expected parse error");
        };
        assert_eq!(span.len(), 3);
    }

    #[test]
    fn with_formula_keeps_inner_source() {
        let inner = FormulaError::eval(0, "cyclic reference").with_formula("Width");
        let outer = inner.with_formula("Height + 1");
        assert_eq!(outer.formula(), "Width");
    }

    #[test]
    fn value_error_lifts_to_eval() {
        let e = ValueError::new("cannot apply + to Point and Scalar").at(22);
        assert_eq!(e.kind(), ErrorKind::Eval);
        assert_eq!(e.offset(), 22);
    }
}
