pub mod ansi;
pub mod json;
pub mod registry;

use crate::ast::Span;

/// How serious a message is. `OptError` is a legacy-downgraded error: it
/// reads as a warning unless strict checking is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    DebugLog,
    Warning,
    OptError,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::DebugLog => "debug-log",
            Severity::Warning => "warning",
            Severity::OptError => "opt-error",
            Severity::Error => "error",
        }
    }
}

/// The one place in the source a diagnostic points at.
#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub label: Option<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            code: None,
            message: message.into(),
            label: None,
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Warning, message)
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    /// Points the diagnostic at `span`, replacing any earlier location.
    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.label = Some(Label { span, message: label.into() });
        self
    }

    pub fn span(&self) -> Option<Span> {
        self.label.as_ref().map(|l| l.span)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// True when this diagnostic fails the compilation under the given mode.
    pub fn is_fatal(&self, strict: bool) -> bool {
        match self.severity {
            Severity::Error => true,
            Severity::OptError => strict,
            _ => false,
        }
    }
}

// ---- From impls for error types ----

impl From<&crate::lexer::LexError> for Diagnostic {
    fn from(e: &crate::lexer::LexError) -> Self {
        let span = Span {
            start: e.position,
            end: e.position + e.snippet.len().max(1),
        };
        let mut d = Diagnostic::error(format!("unexpected character(s) '{}'", e.snippet))
            .with_code("ACT-L001")
            .with_span(span, "here");
        if !e.suggestion.is_empty() {
            d = d.with_suggestion(e.suggestion.clone());
        }
        d
    }
}

impl From<&crate::parser::ParseError> for Diagnostic {
    fn from(e: &crate::parser::ParseError) -> Self {
        Diagnostic::error(&e.message).with_code(e.code).with_span(e.span, "here")
    }
}

impl From<&crate::compiler::CompileError> for Diagnostic {
    fn from(e: &crate::compiler::CompileError) -> Self {
        let mut d = Diagnostic::error(&e.message).with_code(e.code).with_span(e.span, "here");
        if let Some(hint) = &e.hint {
            d = d.with_suggestion(hint.clone());
        }
        d
    }
}

impl From<&crate::emit::EmitError> for Diagnostic {
    fn from(e: &crate::emit::EmitError) -> Self {
        Diagnostic::error(e.to_string())
            .with_code("ACT-E001")
            .with_note("this is an internal limit of the code generator")
    }
}

impl From<&crate::types::EnvError> for Diagnostic {
    fn from(e: &crate::types::EnvError) -> Self {
        Diagnostic::error(e.to_string()).with_code("ACT-V001")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    #[test]
    fn diagnostic_error_builder() {
        let d = Diagnostic::error("something went wrong");
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "something went wrong");
        assert!(d.label.is_none());
        assert!(d.notes.is_empty());
        assert!(d.suggestion.is_none());
        assert!(d.code.is_none());
    }

    #[test]
    fn diagnostic_with_span_and_code() {
        let d = Diagnostic::warning("truncation")
            .with_code("ACT-T004")
            .with_span(Span { start: 5, end: 8 }, "here");
        assert_eq!(d.code, Some("ACT-T004"));
        assert_eq!(d.span(), Some(Span { start: 5, end: 8 }));

        let moved = d.with_span(Span { start: 9, end: 10 }, "");
        assert_eq!(moved.span(), Some(Span { start: 9, end: 10 }));
    }

    #[test]
    fn opt_error_is_fatal_only_when_strict() {
        let d = Diagnostic::new(Severity::OptError, "legacy");
        assert!(!d.is_fatal(false));
        assert!(d.is_fatal(true));
        assert!(Diagnostic::error("x").is_fatal(false));
        assert!(!Diagnostic::warning("x").is_fatal(true));
    }

    #[test]
    fn from_lex_error() {
        let e = crate::lexer::LexError {
            position: 3,
            snippet: "@".to_string(),
            suggestion: "remove it".to_string(),
        };
        let d = Diagnostic::from(&e);
        assert_eq!(d.severity, Severity::Error);
        assert!(d.message.contains('@'));
        assert_eq!(d.span(), Some(Span { start: 3, end: 4 }));
        assert!(d.suggestion.is_some());
    }

    #[test]
    fn from_parse_error() {
        let e = crate::parser::ParseError {
            code: "ACT-P001",
            position: 2,
            span: Span { start: 10, end: 15 },
            message: "expected ';'".to_string(),
        };
        let d = Diagnostic::from(&e);
        assert!(d.message.contains("expected ';'"));
        assert_eq!(d.code, Some("ACT-P001"));
        assert_eq!(d.span(), Some(Span { start: 10, end: 15 }));
    }

    #[test]
    fn from_compile_error() {
        let e = crate::compiler::CompileError {
            code: "ACT-R001",
            span: Span { start: 0, end: 3 },
            message: "Unknown identifier 'hp'".to_string(),
            hint: Some("did you mean 'health'?".to_string()),
        };
        let d = Diagnostic::from(&e);
        assert!(d.message.contains("hp"));
        assert_eq!(d.suggestion.as_deref(), Some("did you mean 'health'?"));
    }

    #[test]
    fn from_emit_error() {
        let e = crate::emit::EmitError::RegisterOverflow(crate::types::RegClass::Int);
        let d = Diagnostic::from(&e);
        assert!(d.message.contains("registers"));
    }
}
