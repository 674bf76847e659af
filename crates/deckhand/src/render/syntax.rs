use std::sync::LazyLock;

use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Style, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use super::{HighlightedCode, Highlighter, PlainHighlighter, StyledSpan};
use crate::theme::Rgb;

static SYNTAXES: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEMES: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// Highlighter backed by syntect's bundled syntaxes and themes.
#[derive(Debug, Clone)]
pub struct SyntectHighlighter {
    theme: String,
}

impl SyntectHighlighter {
    pub fn new(theme: &str) -> Self {
        Self {
            theme: theme.to_string(),
        }
    }
}

impl Highlighter for SyntectHighlighter {
    fn id(&self) -> &'static str {
        "syntect"
    }

    fn highlight(&self, code: &str, language: Option<&str>) -> HighlightedCode {
        let Some(theme) = THEMES.themes.get(&self.theme) else {
            tracing::warn!(theme = %self.theme, "unknown syntax theme, code left unstyled");
            return PlainHighlighter.highlight(code, language);
        };
        let syntax = language
            .and_then(|lang| SYNTAXES.find_syntax_by_token(lang))
            .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());

        let mut highlighter = HighlightLines::new(syntax, theme);
        let mut lines = Vec::new();
        for line in LinesWithEndings::from(code) {
            let spans = match highlighter.highlight_line(line, &SYNTAXES) {
                Ok(ranges) => ranges
                    .into_iter()
                    .map(|(style, text)| span(style, text.trim_end_matches(['\n', '\r'])))
                    .filter(|s| !s.text.is_empty())
                    .collect(),
                Err(e) => {
                    tracing::debug!(error = %e, "highlighting failed, line left unstyled");
                    vec![StyledSpan::plain(line.trim_end_matches(['\n', '\r']))]
                }
            };
            lines.push(spans);
        }

        HighlightedCode {
            language: language.map(str::to_string),
            lines,
        }
    }
}

fn span(style: Style, text: &str) -> StyledSpan {
    let fg = style.foreground;
    StyledSpan {
        text: text.to_string(),
        color: Some(Rgb(fg.r, fg.g, fg.b)),
        bold: style.font_style.contains(FontStyle::BOLD),
        italic: style.font_style.contains(FontStyle::ITALIC),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: &str = "fn main() {\n\n    println!(\"hi\");\n}";

    #[test]
    fn test_text_is_preserved() {
        let highlighted =
            SyntectHighlighter::new("base16-ocean.dark").highlight(CODE, Some("rust"));
        assert_eq!(highlighted.text(), CODE);
        assert_eq!(highlighted.lines.len(), 4);
        assert_eq!(highlighted.language.as_deref(), Some("rust"));
    }

    #[test]
    fn test_rust_gets_coloured() {
        let highlighted =
            SyntectHighlighter::new("base16-ocean.dark").highlight(CODE, Some("rust"));
        let colours: std::collections::HashSet<_> = highlighted
            .lines
            .iter()
            .flatten()
            .filter_map(|s| s.color)
            .collect();
        assert!(colours.len() > 1);
    }

    #[test]
    fn test_unknown_language_and_theme() {
        let code = "just text";
        let unknown_lang = SyntectHighlighter::new("InspiredGitHub").highlight(code, Some("nope"));
        assert_eq!(unknown_lang.text(), code);

        let unknown_theme = SyntectHighlighter::new("no-such-theme").highlight(code, None);
        assert_eq!(unknown_theme.lines, vec![vec![StyledSpan::plain(code)]]);
    }
}
