use std::fmt::Write;

use crate::ast::{Location, SourceMap};
use super::{Diagnostic, Label, Severity};

#[derive(Clone, Copy)]
enum Style {
    Strong,
    Fatal,
    Caution,
    Frame,
    Faint,
}

impl Style {
    fn sgr(self) -> &'static str {
        match self {
            Style::Strong => "1",
            Style::Fatal => "1;31",
            Style::Caution => "1;33",
            Style::Frame => "36",
            Style::Faint => "2",
        }
    }

    fn of(severity: Severity) -> Style {
        match severity {
            Severity::Error => Style::Fatal,
            Severity::Warning | Severity::OptError => Style::Caution,
            Severity::Debug | Severity::DebugLog => Style::Faint,
        }
    }
}

/// The source line under a label, plus the line before it for context.
struct Excerpt<'a> {
    at: Location,
    before: Option<&'a str>,
    text: &'a str,
    width: usize,
    /// The span carries on onto later lines.
    continues: bool,
}

impl<'a> Excerpt<'a> {
    fn new(map: &SourceMap<'a>, label: &Label) -> Self {
        let span = label.span;
        let at = map.location(span.start);
        let last = map.location(span.end.max(span.start + 1) - 1);
        let before = Some(map.line(at.line - 1)).filter(|l| at.line > 1 && !l.trim().is_empty());
        Excerpt {
            at,
            before,
            text: map.line(at.line),
            width: map.width_on_line(span),
            continues: last.line > at.line,
        }
    }

    /// Whitespace up to the label's column; tabs are kept so carets line up
    /// with tab-indented scripts.
    fn indent(&self) -> String {
        self.text
            .chars()
            .take(self.at.col - 1)
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect()
    }
}

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn paint(&self, style: Style, s: &str) -> String {
        if self.use_color { format!("\x1b[{}m{s}\x1b[0m", style.sgr()) } else { s.to_string() }
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let accent = Style::of(d.severity);
        let mut out = String::new();

        let head = match d.code {
            Some(code) => format!("{}[{code}]", d.severity.as_str()),
            None => d.severity.as_str().to_string(),
        };
        let _ = writeln!(out, "{}: {}", self.paint(accent, &head), self.paint(Style::Strong, &d.message));

        let mut gutter = 1;
        if let (Some(label), Some(source)) = (&d.label, &d.source) {
            let map = SourceMap::new(source);
            let excerpt = Excerpt::new(&map, label);
            gutter = excerpt.at.line.to_string().len();
            self.excerpt(&mut out, &excerpt, &label.message, accent, gutter);
        }

        let margin = format!("{} {}", " ".repeat(gutter), self.paint(Style::Frame, "="));
        for note in &d.notes {
            let _ = writeln!(out, "{margin} note: {note}");
        }
        if let Some(help) = &d.suggestion {
            let _ = writeln!(out, "{margin} help: {help}");
        }
        out
    }

    fn excerpt(&self, out: &mut String, e: &Excerpt<'_>, message: &str, accent: Style, gutter: usize) {
        let bar = self.paint(Style::Frame, "|");
        let blank = " ".repeat(gutter);

        let _ = writeln!(out, "{blank} {} {}:{}", self.paint(Style::Frame, "-->"), e.at.line, e.at.col);
        if let Some(before) = e.before {
            let n = format!("{:>gutter$}", e.at.line - 1);
            let _ = writeln!(out, "{} {bar} {}", self.paint(Style::Faint, &n), self.paint(Style::Faint, before));
        }
        let n = format!("{:>gutter$}", e.at.line);
        let _ = writeln!(out, "{} {bar} {}", self.paint(Style::Frame, &n), e.text);

        let mut marks = "^".repeat(e.width);
        if e.continues {
            marks.push_str("...");
        }
        let _ = write!(out, "{blank} {bar} {}{}", e.indent(), self.paint(accent, &marks));
        if !message.is_empty() {
            let _ = write!(out, " {}", self.paint(accent, message));
        }
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn plain() -> AnsiRenderer {
        AnsiRenderer { use_color: false }
    }

    fn numeric_expected(source: &str, start: usize, end: usize) -> Diagnostic {
        Diagnostic::error("Numeric type expected")
            .with_code("ACT-T002")
            .with_span(Span { start, end }, "here")
            .with_source(source.to_string())
    }

    #[test]
    fn single_line_layout() {
        let out = plain().render(&numeric_expected("x = 'a' + 1;", 4, 7));
        let expected = "\
error[ACT-T002]: Numeric type expected
  --> 1:5
1 | x = 'a' + 1;
  |     ^^^ here
";
        assert_eq!(out, expected);
    }

    #[test]
    fn previous_line_gives_context() {
        let source = "int a = 1;\nbool b = a++;";
        let out = plain().render(&numeric_expected(source, 20, 23));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "  --> 2:10");
        assert_eq!(lines[2], "1 | int a = 1;");
        assert_eq!(lines[3], "2 | bool b = a++;");
        assert_eq!(lines[4], "  |          ^^^ here");
    }

    #[test]
    fn blank_previous_line_is_skipped() {
        let out = plain().render(&numeric_expected("\nhealth = 'x';", 10, 13));
        assert!(!out.contains("1 |"), "{out}");
        assert!(out.contains("2 | health = 'x';"), "{out}");
    }

    #[test]
    fn spans_over_several_lines_are_marked() {
        let out = plain().render(&numeric_expected("a = (1 +\n 'b');", 4, 14));
        assert!(out.contains("  |     ^^^^... here"), "{out}");
    }

    #[test]
    fn carets_follow_tabs() {
        let out = plain().render(&numeric_expected("\treturn 'a' * 2;", 8, 15));
        assert!(out.contains("  | \t       ^^^^^^^ here"), "{out}");
    }

    #[test]
    fn wide_gutter_for_later_lines() {
        let source = format!("{}hp = 1;", "\n".repeat(11));
        let out = plain().render(&numeric_expected(&source, 11, 13));
        assert!(out.contains("   --> 12:1"), "{out}");
        assert!(out.contains("12 | hp = 1;"), "{out}");
        assert!(out.contains("   | ^^ here"), "{out}");
    }

    #[test]
    fn notes_and_help_share_the_margin() {
        let d = numeric_expected("x", 0, 1)
            .with_note("in function 'Actor.Test'")
            .with_suggestion("cast the operand to int");
        let out = plain().render(&d);
        assert!(out.contains("  = note: in function 'Actor.Test'\n"), "{out}");
        assert!(out.ends_with("  = help: cast the operand to int\n"), "{out}");
    }

    #[test]
    fn headers_name_the_severity() {
        assert_eq!(plain().render(&Diagnostic::warning("Infinite empty loop")), "warning: Infinite empty loop\n");
        let o = Diagnostic::new(Severity::OptError, "Unknown class name").with_code("ACT-T012");
        assert!(plain().render(&o).starts_with("opt-error[ACT-T012]:"));
    }

    #[test]
    fn without_source_only_the_header() {
        let d = Diagnostic::error("something bad").with_span(Span { start: 0, end: 3 }, "here");
        assert_eq!(plain().render(&d), "error: something bad\n");
    }

    #[test]
    fn colour_toggle() {
        let d = numeric_expected("x", 0, 1);
        let coloured = AnsiRenderer { use_color: true }.render(&d);
        assert!(coloured.starts_with("\x1b[1;31merror[ACT-T002]\x1b[0m"));
        assert!(!plain().render(&d).contains("\x1b["));
    }
}
