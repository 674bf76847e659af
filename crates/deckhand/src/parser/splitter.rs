/// Split deck source into raw slide blocks.
///
/// A delimiter line is any line whose trimmed text equals `delimiter`. Delimiter
/// lines inside fenced code blocks never split, so the number of returned blocks
/// is always the number of effective delimiter lines plus one. Blocks keep their
/// inner text verbatim apart from leading and trailing blank lines.
pub fn split(source: &str, delimiter: &str) -> Vec<String> {
    // Normalize line endings
    let source = source.replace("\r\n", "\n");

    let mut blocks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut fence = FenceTracker::default();

    for line in source.split('\n') {
        let in_code = fence.observe(line);
        if !in_code && line.trim() == delimiter {
            blocks.push(finish_block(&current));
            current.clear();
            continue;
        }
        current.push(line);
    }
    blocks.push(finish_block(&current));

    blocks
}

/// Join block lines, dropping blank lines at either end.
fn finish_block(lines: &[&str]) -> String {
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end].join("\n")
}

/// Tracks fenced code blocks (``` or ~~~) across a line-by-line scan.
#[derive(Debug, Default)]
pub(crate) struct FenceTracker {
    open: Option<(char, usize)>,
}

impl FenceTracker {
    pub(crate) fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Feed the next line. Returns `true` when the line belongs to a fenced
    /// block, including the opening and closing fence lines themselves.
    pub(crate) fn observe(&mut self, line: &str) -> bool {
        let trimmed = line.trim();

        if let Some((fence_char, fence_len)) = self.open {
            let closing_count = trimmed.chars().take_while(|&c| c == fence_char).count();
            if closing_count >= fence_len
                && trimmed
                    .chars()
                    .skip(closing_count)
                    .all(|c| c.is_whitespace())
            {
                self.open = None;
            }
            return true;
        }

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            let fence_char = if trimmed.starts_with('`') { '`' } else { '~' };
            let fence_len = trimmed.chars().take_while(|&c| c == fence_char).count();
            self.open = Some((fence_char, fence_len));
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dash_separator() {
        let slides = split("Slide one\n\n---\n\nSlide two", "---");
        assert_eq!(slides, vec!["Slide one", "Slide two"]);
    }

    #[test]
    fn test_separator_without_blank_lines() {
        let slides = split("# A\n---\n# B\n---\n# C", "---");
        assert_eq!(slides, vec!["# A", "# B", "# C"]);
    }

    #[test]
    fn test_longer_dash_run_is_not_the_delimiter() {
        let slides = split("Above\n\n-----\n\nBelow", "---");
        assert_eq!(slides.len(), 1);
    }

    #[test]
    fn test_custom_delimiter() {
        let slides = split("One\n===\nTwo\n---\nStill two", "===");
        assert_eq!(slides.len(), 2);
        assert_eq!(slides[1], "Two\n---\nStill two");
    }

    #[test]
    fn test_empty_blocks_are_kept() {
        let slides = split("One\n---\n---\nThree\n---", "---");
        assert_eq!(slides, vec!["One", "", "Three", ""]);
    }

    #[test]
    fn test_delimiter_in_code_block_no_split() {
        let body = "# YAML\n\n```yaml\nkey: value\n---\nother: doc\n```\n---\n# Next";
        let slides = split(body, "---");
        assert_eq!(slides.len(), 2, "Delimiter inside code fence should not split");
        assert!(slides[0].contains("other: doc"));
    }

    #[test]
    fn test_tilde_fence_needs_matching_close() {
        let body = "~~~~\n```\n---\n~~~\n---\n~~~~\n---\nafter";
        let slides = split(body, "---");
        assert_eq!(slides.len(), 2);
        assert_eq!(slides[1], "after");
    }

    #[test]
    fn test_crlf_line_endings() {
        let slides = split("One\r\n---\r\nTwo", "---");
        assert_eq!(slides, vec!["One", "Two"]);
    }

    #[test]
    fn test_indentation_inside_block_is_preserved() {
        let slides = split("\n\n    indented code\n  tail  \n\n", "---");
        assert_eq!(slides, vec!["    indented code\n  tail  "]);
    }
}
