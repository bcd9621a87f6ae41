use super::Span;

/// 1-based position of a byte offset. Columns count characters, so a
/// caret under a name after a non-ASCII string literal still lines up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

/// Line index over one source text.
pub struct SourceMap<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceMap<'a> {
    pub fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        SourceMap { source, line_starts }
    }

    fn line_index(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset).saturating_sub(1)
    }

    pub fn location(&self, offset: usize) -> Location {
        let offset = offset.min(self.source.len());
        let line = self.line_index(offset);
        let start = self.line_starts[line];
        let col = self.source.get(start..offset).map_or(offset - start, |s| s.chars().count());
        Location { line: line + 1, col: col + 1 }
    }

    /// Text of a 1-based line without its line ending; empty past the end.
    pub fn line(&self, line: usize) -> &'a str {
        let Some(&start) = line.checked_sub(1).and_then(|i| self.line_starts.get(i)) else {
            return "";
        };
        let end = self.line_starts.get(line).map_or(self.source.len(), |&next| next - 1);
        self.source.get(start..end).unwrap_or("").trim_end_matches('\r')
    }

    /// Characters of `span` that fall on its first line, at least one.
    pub fn width_on_line(&self, span: Span) -> usize {
        let line = self.line_index(span.start.min(self.source.len()));
        let line_end = self.line_starts.get(line + 1).map_or(self.source.len(), |&next| next - 1);
        let end = span.end.min(line_end).max(span.start);
        self.source.get(span.start..end).map_or(0, |s| s.chars().count()).max(1)
    }
}
