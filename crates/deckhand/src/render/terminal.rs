use colored::{ColoredString, Colorize};

use super::{HighlightedCode, Highlighter, RenderError, RenderedSlide, Renderer, check_reveal};
use crate::parser::{ResolvedConfig, Segment, Slide, segments};
use crate::theme::{Rgb, Theme};

const RULE_WIDTH: usize = 48;

/// Renders slides as ANSI-styled text for a terminal.
#[derive(Debug, Default)]
pub struct TerminalRenderer;

impl Renderer for TerminalRenderer {
    fn id(&self) -> &'static str {
        "terminal"
    }

    fn render(
        &self,
        slide: &Slide,
        config: &ResolvedConfig,
        highlighter: &dyn Highlighter,
        reveal: usize,
    ) -> Result<RenderedSlide, RenderError> {
        check_reveal(slide, reveal)?;
        let theme = Theme::from_name(&config.theme);
        let centered = matches!(slide.layout.as_str(), "title" | "section");
        let visible = slide.visible_content(reveal);

        let mut out = Vec::new();
        for segment in segments(&visible) {
            match segment {
                Segment::Line(line) => out.push(style_line(line, &theme, centered)),
                Segment::Code(region) => {
                    let code = highlighter.highlight(&region.code, region.language.as_deref());
                    out.extend(code_block(&code, &theme));
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

fn paint(text: &str, color: Rgb) -> ColoredString {
    text.truecolor(color.0, color.1, color.2)
}

fn style_line(line: &str, theme: &Theme, centered: bool) -> String {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];
    let pad = if centered { "    " } else { "" };

    if let Some((level, text)) = heading(trimmed) {
        let styled = paint(text, theme.heading).bold();
        let styled = if level == 1 { styled.underline() } else { styled };
        return format!("{pad}{styled}");
    }
    if trimmed == "+++" {
        return paint(&"─".repeat(RULE_WIDTH), theme.muted).to_string();
    }
    if let Some(quoted) = trimmed.strip_prefix('>') {
        return format!(
            "{indent}{} {}",
            paint("│", theme.accent),
            paint(quoted.trim_start(), theme.muted).italic()
        );
    }
    if let Some(item) = bullet(trimmed) {
        return format!(
            "{indent}{} {}",
            paint("•", theme.accent),
            paint(item, theme.foreground)
        );
    }
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{pad}{}", paint(line, theme.foreground))
}

/// `## Title` -> `(2, "Title")`.
fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|&c| c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    line[level..].strip_prefix(' ').map(|text| (level, text.trim()))
}

fn bullet(line: &str) -> Option<&str> {
    ["- ", "* ", "+ "]
        .iter()
        .find_map(|prefix| line.strip_prefix(prefix))
}

fn code_block(code: &HighlightedCode, theme: &Theme) -> Vec<String> {
    let label = code.language.as_deref().unwrap_or("code");
    let mut out = vec![format!("  {}", paint(&format!("┌─ {label}"), theme.muted))];
    for line in &code.lines {
        let mut rendered = String::new();
        for span in line {
            let mut styled = paint(&span.text, span.color.unwrap_or(theme.code_foreground));
            if span.bold {
                styled = styled.bold();
            }
            if span.italic {
                styled = styled.italic();
            }
            rendered.push_str(&styled.to_string());
        }
        out.push(format!("  {} {rendered}", paint("│", theme.muted)));
    }
    out.push(format!("  {}", paint("└─", theme.muted)));
    out
}
