use crate::parser::Span;

/// Source position of a token: the body line it came from and its character
/// column within that line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

impl SourcePos {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Position of the start of a span, on body line `line`
    pub fn from_span(line: usize, span: Span<'_>) -> Self {
        Self {
            line,
            column: span.get_utf8_column() - 1,
        }
    }

    /// Use a pair of positions on the same line to pretty-print that range
    /// within the line's text
    pub fn range(text: &str, from: SourcePos, upto: SourcePos) -> String {
        let gutter = format!("{}", upto.line).len();
        let mut res = String::new();
        res.push_str(&format!("{}▼\n", " ".repeat(gutter + 3 + from.column)));
        res.push_str(&format!("{: >gutter$} | {}\n", from.line, text));
        res.push_str(&format!("{}▲", " ".repeat(gutter + 3 + upto.column)));
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn range_rendering() {
        let rendered = SourcePos::range("A←1+÷0", SourcePos::new(3, 3), SourcePos::new(3, 5));
        expect![[r#"
                   ▼
            3 | A←1+÷0
                     ▲"#]]
        .assert_eq(&rendered);
    }

    #[test]
    fn columns_count_characters() {
        let span = Span::new("⍳⍴ X");
        let (rest, _) = nom::bytes::complete::tag::<_, _, nom::error::Error<Span<'_>>>("⍳⍴ ")(span)
            .unwrap();
        assert_eq!(SourcePos::from_span(0, rest).column, 3);
    }
}
