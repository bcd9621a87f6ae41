use serde::Serialize;

use crate::ast::SourceMap;
use super::{Diagnostic, registry};

#[derive(Serialize)]
struct Record<'a> {
    severity: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'static str>,
    message: &'a str,
    span: Option<SpanRecord<'a>>,
    notes: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
}

#[derive(Serialize)]
struct SpanRecord<'a> {
    start: usize,
    end: usize,
    #[serde(skip_serializing_if = "str::is_empty")]
    label: &'a str,
    /// Present only when the diagnostic carries its source text.
    #[serde(flatten)]
    position: Option<Position>,
}

#[derive(Serialize)]
struct Position {
    line: usize,
    col: usize,
    end_line: usize,
    end_col: usize,
}

fn record(d: &Diagnostic) -> Record<'_> {
    let map = d.source.as_deref().map(SourceMap::new);
    let span = d.label.as_ref().map(|label| SpanRecord {
        start: label.span.start,
        end: label.span.end,
        label: &label.message,
        position: map.as_ref().map(|map| {
            let (from, to) = (map.location(label.span.start), map.location(label.span.end));
            Position { line: from.line, col: from.col, end_line: to.line, end_col: to.col }
        }),
    });
    Record {
        severity: d.severity.as_str(),
        code: d.code,
        summary: d.code.and_then(registry::lookup).map(|entry| entry.short),
        message: &d.message,
        span,
        notes: &d.notes,
        suggestion: d.suggestion.as_deref(),
    }
}

/// One diagnostic as a JSON object.
pub fn to_value(d: &Diagnostic) -> serde_json::Value {
    serde_json::to_value(record(d)).unwrap_or_else(|e| {
        serde_json::json!({ "severity": "error", "message": format!("cannot serialize diagnostic: {e}") })
    })
}

pub fn render(d: &Diagnostic) -> String {
    to_value(d).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::diagnostic::Severity;

    #[test]
    fn bare_error() {
        let v = to_value(&Diagnostic::error("Numeric type expected"));
        assert_eq!(
            v,
            serde_json::json!({
                "severity": "error",
                "message": "Numeric type expected",
                "span": null,
                "notes": []
            })
        );
    }

    #[test]
    fn span_with_source_has_positions() {
        let d = Diagnostic::error("Unknown identifier 'hp'")
            .with_span(Span { start: 9, end: 11 }, "")
            .with_source("health = hp;\n".to_string());
        let v = to_value(&d);
        assert_eq!(
            v["span"],
            serde_json::json!({ "start": 9, "end": 11, "line": 1, "col": 10, "end_line": 1, "end_col": 12 })
        );
    }

    #[test]
    fn span_crossing_lines() {
        let d = Diagnostic::error("bad")
            .with_span(Span { start: 4, end: 14 }, "here")
            .with_source("a = (1 +\n 'b');".to_string());
        let v = to_value(&d);
        let span = &v["span"];
        assert_eq!(span["label"], "here");
        assert_eq!((span["line"].as_u64(), span["end_line"].as_u64()), (Some(1), Some(2)));
        assert_eq!(span["end_col"], 6);
    }

    #[test]
    fn span_without_source_has_offsets_only() {
        let d = Diagnostic::error("bad").with_span(Span { start: 5, end: 8 }, "here");
        let v = to_value(&d);
        let span = &v["span"];
        assert_eq!(span["start"], 5);
        assert!(span.get("line").is_none());
    }

    #[test]
    fn registered_codes_carry_a_summary() {
        let v = to_value(&Diagnostic::error("Division by 0").with_code("ACT-T005"));
        assert_eq!(v["code"], "ACT-T005");
        assert_eq!(v["summary"], "division by zero");

        let v = to_value(&Diagnostic::error("x").with_code("ACT-Z999"));
        assert!(v.get("summary").is_none());
    }

    #[test]
    fn render_is_one_line_of_json() {
        let d = Diagnostic::error("bad")
            .with_suggestion("did you mean 'health'?")
            .with_note("in function 'Test'");
        let text = render(&d);
        assert!(!text.contains('\n'));
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["suggestion"], "did you mean 'health'?");
        assert_eq!(v["notes"][0], "in function 'Test'");
    }

    #[test]
    fn every_severity_has_a_name() {
        for (severity, name) in [
            (Severity::Debug, "debug"),
            (Severity::DebugLog, "debug-log"),
            (Severity::Warning, "warning"),
            (Severity::OptError, "opt-error"),
            (Severity::Error, "error"),
        ] {
            let v = to_value(&Diagnostic::new(severity, "x"));
            assert_eq!(v["severity"], name);
        }
    }
}
