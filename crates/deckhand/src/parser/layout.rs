use super::splitter::FenceTracker;

#[derive(Debug, Default)]
struct Counts {
    headings: Vec<u8>,
    paragraphs: usize,
    short_paragraphs: usize,
    lists: usize,
    images: usize,
    code_blocks: usize,
    quotes: usize,
    column_separators: usize,
}

/// Infer a layout class from slide content when no `@layout` is declared.
pub fn infer(content: &str) -> &'static str {
    let counts = count(content);
    let total = counts.headings.len()
        + counts.paragraphs
        + counts.lists
        + counts.images
        + counts.code_blocks
        + counts.quotes;

    if counts.column_separators > 0 {
        return "two-column";
    }

    // Title: H1 plus at most one short line
    if counts.headings.first() == Some(&1) && counts.headings.len() <= 2 {
        let others = total - counts.headings.len();
        if counts.headings.len() == 1 && others == 0 {
            return "section";
        }
        let subtitle_heading = counts.headings.get(1) == Some(&2) && others == 0;
        let short_line = counts.headings.len() == 1 && others == 1 && counts.short_paragraphs == 1;
        if subtitle_heading || short_line {
            return "title";
        }
    }

    if counts.headings.len() == 1 && total == 1 {
        return "section";
    }

    let no_rich = counts.lists == 0 && counts.code_blocks == 0 && counts.quotes == 0;

    if counts.images == 1 && no_rich && total - counts.images - counts.headings.len() <= 1 {
        return "image";
    }
    if counts.images >= 2 && no_rich && counts.paragraphs == 0 {
        return "gallery";
    }
    if counts.quotes > 0 && counts.lists == 0 && counts.code_blocks == 0 && counts.images == 0 {
        return "quote";
    }
    if counts.code_blocks > 0 && counts.lists == 0 && counts.images == 0 && counts.quotes == 0 {
        return "code";
    }
    if !counts.headings.is_empty() && counts.lists > 0 && counts.code_blocks == 0 {
        return "bullets";
    }
    "content"
}

fn count(content: &str) -> Counts {
    let mut counts = Counts::default();
    let mut fence = FenceTracker::default();
    let mut in_code = false;
    let mut in_list = false;
    let mut in_paragraph = false;
    let mut in_quote = false;

    for line in content.lines() {
        if fence.observe(line) {
            if !in_code {
                counts.code_blocks += 1;
                in_code = true;
            }
            in_list = false;
            in_paragraph = false;
            in_quote = false;
            continue;
        }
        in_code = false;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            in_paragraph = false;
            in_quote = false;
            continue;
        }

        if trimmed == "+++" {
            counts.column_separators += 1;
        } else if let Some(level) = heading_level(trimmed) {
            counts.headings.push(level);
            in_list = false;
        } else if trimmed.starts_with("![") {
            counts.images += 1;
        } else if trimmed.starts_with('>') {
            if !in_quote {
                counts.quotes += 1;
                in_quote = true;
            }
        } else if is_list_item(trimmed) {
            if !in_list {
                counts.lists += 1;
                in_list = true;
            }
        } else if !in_paragraph && !in_list {
            counts.paragraphs += 1;
            if trimmed.len() < 120 {
                counts.short_paragraphs += 1;
            }
            in_paragraph = true;
        }
    }
    counts
}

fn heading_level(line: &str) -> Option<u8> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes) && line[hashes..].starts_with(' ') {
        Some(hashes as u8)
    } else {
        None
    }
}

fn is_list_item(line: &str) -> bool {
    let marker = line.starts_with("- ") || line.starts_with("* ") || line.starts_with("+ ");
    let ordered = line
        .split_once(". ")
        .is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
    marker || ordered
}
