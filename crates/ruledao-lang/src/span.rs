//! Source location tracking for error reporting.

/// A byte range in a query or template string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset.
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width span at the end of `source`.
    pub fn eof(source: &str) -> Self {
        Self::new(source.len(), source.len())
    }

    /// Create a span covering two spans.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Get the length of the span.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if the span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

// logos::Span is std::ops::Range<usize>, so this covers lexer spans too.
impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Span {
            start: range.start,
            end: range.end,
        }
    }
}

/// A value with an associated source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    /// The value.
    pub value: T,
    /// The source span.
    pub span: Span,
}

impl<T> Spanned<T> {
    /// Create a new spanned value.
    pub fn new(value: T, span: Span) -> Self {
        Self { value, span }
    }
}

/// Convert byte offset to 1-based line/column.
pub fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;

    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }

        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

/// Render a caret diagram pointing at `span` in `source`.
pub(crate) fn render_snippet(source: &str, span: Span) -> String {
    let (line, col) = offset_to_line_col(source, span.start);
    let mut result = format!("  --> line {}:{}\n", line, col);

    if let Some(source_line) = source.lines().nth(line - 1) {
        result.push_str(&format!("   |\n{:3}| {}\n   |", line, source_line));
        result.push_str(&" ".repeat(col));
        result.push('^');

        let width = span.len().min(source_line.len().saturating_sub(col - 1));
        if width > 1 {
            result.push_str(&"~".repeat(width - 1));
        }
        result.push('\n');
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let merged = Span::new(5, 10).merge(Span::new(8, 15));
        assert_eq!(merged, Span::new(5, 15));
    }

    #[test]
    fn test_offset_to_line_col() {
        let source = "find Country\nwhere code = :var0";

        assert_eq!(offset_to_line_col(source, 0), (1, 1));
        assert_eq!(offset_to_line_col(source, 5), (1, 6));
        assert_eq!(offset_to_line_col(source, 13), (2, 1));
    }

    #[test]
    fn test_render_snippet_underlines_span() {
        let source = "find Country where code ~ 1";
        let rendered = render_snippet(source, Span::new(24, 25));
        assert!(rendered.contains("line 1:25"));
        assert!(rendered.ends_with("^\n"));
    }
}
