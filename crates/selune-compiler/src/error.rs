//! Compilation error taxonomy
//!
//! Every user-visible failure is a `CompileError` variant carrying an
//! optional source span. Bugs in the compiler itself (violated internal
//! invariants) are not part of this taxonomy: they panic with an
//! `internal compiler error:` prefix and are surfaced by the driver with a
//! backtrace.

use crate::span::Span;
use thiserror::Error;

/// A user-visible compilation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Malformed source rejected by the lexer or parser
    #[error("syntax error: {message}")]
    Syntax { message: String, span: Span },

    /// Invalid escape sequence or unterminated string literal
    #[error("malformed string: {message}")]
    MalformedString { message: String, span: Span },

    /// Write to a name bound `<const>`
    #[error("cannot reassign constant variable '{name}'")]
    ConstReassignment { name: String, span: Span },

    /// More than one `<close>` attribute in a single declaration
    #[error("multiple to-be-closed variables in a single declaration")]
    TbcDuplication { span: Span },

    /// Attribute other than `<const>` or `<close>`
    #[error("unknown attribute '<{attribute}>'")]
    UnknownAttribute { attribute: String, span: Span },

    /// `break` with no enclosing loop in the same function
    #[error("break outside of a loop")]
    BreakOutsideLoop { span: Span },

    /// Two labels with the same name visible in the same block chain
    #[error("label '{name}' is already defined")]
    LabelDuplicate { name: String, span: Span },

    /// `goto` whose target label is not visible from its block
    #[error("no visible label '{name}' for goto")]
    LabelNotVisible { name: String, span: Span },

    /// `goto` that would enter the scope of a local declared after it
    #[error("goto '{name}' jumps into the scope of a local variable")]
    JumpIntoLocalScope { name: String, span: Span },

    /// `...` used inside a function that does not declare `...`
    #[error("cannot use '...' outside a variadic function")]
    VarargsOutsideVariadic { span: Span },

    /// Source file could not be read
    #[error("cannot read '{path}': {message}")]
    Io { path: String, message: String },
}

impl CompileError {
    /// The source location this error points at, if it has one
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Syntax { span, .. }
            | Self::MalformedString { span, .. }
            | Self::ConstReassignment { span, .. }
            | Self::TbcDuplication { span }
            | Self::UnknownAttribute { span, .. }
            | Self::BreakOutsideLoop { span }
            | Self::LabelDuplicate { span, .. }
            | Self::LabelNotVisible { span, .. }
            | Self::JumpIntoLocalScope { span, .. }
            | Self::VarargsOutsideVariadic { span } => Some(*span),
            Self::Io { .. } => None,
        }
    }

    /// Render as `file:line: message`, the driver's diagnostic format
    pub fn report(&self, file: &str) -> String {
        match self.span() {
            Some(span) if span.line > 0 => format!("{}:{}: {}", file, span.line, self),
            _ => format!("{}: {}", file, self),
        }
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_includes_line() {
        let err = CompileError::BreakOutsideLoop {
            span: Span::new(4, 2, 31),
        };
        assert_eq!(err.report("scratch.sel"), "scratch.sel:4: break outside of a loop");
    }

    #[test]
    fn test_report_without_span() {
        let err = CompileError::Io {
            path: "missing.sel".into(),
            message: "not found".into(),
        };
        assert_eq!(
            err.report("missing.sel"),
            "missing.sel: cannot read 'missing.sel': not found"
        );
    }
}
