//! Rendering backends.
//!
//! A [`Renderer`] turns one slide at a given reveal step into output; code
//! regions go through a [`Highlighter`]. Both are picked by identifier when a
//! session starts, so the core never depends on a particular backend.

pub mod syntax;
pub mod terminal;

use thiserror::Error;

use crate::parser::{ResolvedConfig, Segment, Slide};
use crate::theme::{Rgb, Theme};

pub const HIGHLIGHTERS: &[&str] = &["plain", "syntect"];
pub const RENDERERS: &[&str] = &["terminal", "plain"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("slide {slide} has {steps} steps, cannot reveal {reveal}")]
    RevealOutOfRange {
        slide: usize,
        reveal: usize,
        steps: usize,
    },
}

/// A run of code text sharing one style.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledSpan {
    pub text: String,
    pub color: Option<Rgb>,
    pub bold: bool,
    pub italic: bool,
}

impl StyledSpan {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
            bold: false,
            italic: false,
        }
    }
}

/// Highlighted code, one entry per source line.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightedCode {
    pub language: Option<String>,
    pub lines: Vec<Vec<StyledSpan>>,
}

impl HighlightedCode {
    /// The code text with styling dropped.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.iter().map(|s| s.text.as_str()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub trait Highlighter: Send + Sync {
    fn id(&self) -> &'static str;
    fn highlight(&self, code: &str, language: Option<&str>) -> HighlightedCode;
}

/// Output of rendering one slide.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSlide {
    pub index: usize,
    pub reveal: usize,
    pub step_count: usize,
    pub layout: String,
    pub body: String,
}

pub trait Renderer: Send + Sync {
    fn id(&self) -> &'static str;
    fn render(
        &self,
        slide: &Slide,
        config: &ResolvedConfig,
        highlighter: &dyn Highlighter,
        reveal: usize,
    ) -> Result<RenderedSlide, RenderError>;
}

/// Leaves code untouched, one unstyled span per line.
#[derive(Debug, Default)]
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn id(&self) -> &'static str {
        "plain"
    }

    fn highlight(&self, code: &str, language: Option<&str>) -> HighlightedCode {
        HighlightedCode {
            language: language.map(str::to_string),
            lines: code.lines().map(|l| vec![StyledSpan::plain(l)]).collect(),
        }
    }
}

/// Renders the revealed markdown as-is, fences and language tags included.
#[derive(Debug, Default)]
pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn id(&self) -> &'static str {
        "plain"
    }

    fn render(
        &self,
        slide: &Slide,
        _config: &ResolvedConfig,
        highlighter: &dyn Highlighter,
        reveal: usize,
    ) -> Result<RenderedSlide, RenderError> {
        check_reveal(slide, reveal)?;
        let visible = slide.visible_content(reveal);
        let mut out = Vec::new();
        for segment in crate::parser::segments(&visible) {
            match segment {
                Segment::Line(line) => out.push(line.to_string()),
                Segment::Code(region) => {
                    let code = highlighter.highlight(&region.code, region.language.as_deref());
                    out.push(format!("```{}", region.language.unwrap_or_default()));
                    out.push(code.text());
                    out.push("```".to_string());
                }
            }
        }
        Ok(RenderedSlide {
            index: slide.index,
            reveal,
            step_count: slide.step_count(),
            layout: slide.layout.clone(),
            body: out.join("\n"),
        })
    }
}

pub(crate) fn check_reveal(slide: &Slide, reveal: usize) -> Result<(), RenderError> {
    if reveal > slide.step_count() {
        return Err(RenderError::RevealOutOfRange {
            slide: slide.index,
            reveal,
            steps: slide.step_count(),
        });
    }
    Ok(())
}

/// Look up a highlighter by identifier, falling back to `plain`.
pub fn highlighter_for(id: &str, theme: &Theme) -> Box<dyn Highlighter> {
    match id {
        "syntect" => Box::new(syntax::SyntectHighlighter::new(theme.syntect_theme_name())),
        "plain" => Box::new(PlainHighlighter),
        other => {
            tracing::warn!(highlighter = other, "unknown highlighter, using plain");
            Box::new(PlainHighlighter)
        }
    }
}

/// Look up a renderer by identifier, falling back to `plain`.
pub fn renderer_for(id: &str) -> Box<dyn Renderer> {
    match id {
        "terminal" => Box::new(terminal::TerminalRenderer),
        "plain" => Box::new(PlainRenderer),
        other => {
            tracing::warn!(renderer = other, "unknown renderer, using plain");
            Box::new(PlainRenderer)
        }
    }
}

/// The renderer and highlighter a session draws with.
pub struct Backends {
    renderer: Box<dyn Renderer>,
    highlighter: Box<dyn Highlighter>,
    theme: String,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("renderer", &self.renderer.id())
            .field("highlighter", &self.highlighter.id())
            .field("theme", &self.theme)
            .finish()
    }
}

impl Backends {
    pub fn select(renderer: &str, highlighter: &str, theme: &str) -> Self {
        Self {
            renderer: renderer_for(renderer),
            highlighter: highlighter_for(highlighter, &Theme::from_name(theme)),
            theme: theme.to_string(),
        }
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    pub fn highlighter(&self) -> &dyn Highlighter {
        self.highlighter.as_ref()
    }

    /// Swap the highlighter when a reloaded deck asks for a different one.
    pub fn refresh(&mut self, highlighter: &str, theme: &str) {
        if self.highlighter.id() != highlighter || self.theme != theme {
            self.highlighter = highlighter_for(highlighter, &Theme::from_name(theme));
            self.theme = theme.to_string();
        }
    }

    pub fn render(
        &self,
        slide: &Slide,
        config: &ResolvedConfig,
        reveal: usize,
    ) -> Result<RenderedSlide, RenderError> {
        self.renderer
            .render(slide, config, self.highlighter.as_ref(), reveal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOptions, parse};

    #[test]
    fn test_unknown_backends_fall_back_to_plain() {
        let backends = Backends::select("canvas", "prism", "dark");
        assert_eq!(backends.renderer().id(), "plain");
        assert_eq!(backends.highlighter().id(), "plain");
    }

    #[test]
    fn test_known_backends() {
        let backends = Backends::select("terminal", "syntect", "dark");
        assert_eq!(backends.renderer().id(), "terminal");
        assert_eq!(backends.highlighter().id(), "syntect");
    }

    #[test]
    fn test_plain_render_keeps_code_and_language() {
        let deck = parse(
            "# Code\n\n```rust\nfn main() {}\n```",
            &ParseOptions::default(),
        )
        .unwrap();
        let config = deck.resolved(0).unwrap();
        let rendered = PlainRenderer
            .render(&deck.slides[0], &config, &PlainHighlighter, 0)
            .unwrap();
        assert_eq!(rendered.body, "# Code\n\n```rust\nfn main() {}\n```");
    }

    #[test]
    fn test_plain_render_respects_reveal() {
        let deck = parse("# List\n\n+ one\n+ two", &ParseOptions::default()).unwrap();
        let slide = &deck.slides[0];
        let config = deck.resolved(0).unwrap();
        let body = |reveal| {
            PlainRenderer
                .render(slide, &config, &PlainHighlighter, reveal)
                .unwrap()
                .body
        };
        assert!(!body(0).contains("one"));
        assert!(body(1).contains("one") && !body(1).contains("two"));
        assert!(body(2).contains("two"));
        assert_eq!(
            PlainRenderer.render(slide, &config, &PlainHighlighter, 3),
            Err(RenderError::RevealOutOfRange {
                slide: 0,
                reveal: 3,
                steps: 2
            })
        );
    }
}
