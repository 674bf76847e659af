use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::config::Config;
use crate::parser::{Deck, parse};

/// One line of the check report.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// 1-indexed, like `--slide`.
    pub number: usize,
    pub key: String,
    pub layout: String,
    pub steps: usize,
    pub warnings: Vec<String>,
}

pub fn rows(deck: &Deck) -> Vec<Row> {
    deck.slides
        .iter()
        .map(|slide| Row {
            number: slide.index + 1,
            key: slide.key.to_string(),
            layout: slide.layout.clone(),
            steps: slide.step_count(),
            warnings: slide.warnings.iter().map(ToString::to_string).collect(),
        })
        .collect()
}

pub fn run(file: &Path) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let options = Config::load_or_default().session_options("plain");
    let deck = parse(&source, &options.parse)
        .with_context(|| format!("{} does not parse", file.display()))?;

    let rows = rows(&deck);
    let key_width = rows.iter().map(|r| r.key.len()).max().unwrap_or(3).max(3);

    println!(
        "{}",
        format!("{:>3}  {:<key_width$}  {:<10}  {:>5}", "#", "key", "layout", "steps").bold()
    );
    for row in &rows {
        println!(
            "{:>3}  {:<key_width$}  {:<10}  {:>5}",
            row.number, row.key, row.layout, row.steps
        );
        for warning in &row.warnings {
            println!("     {} {warning}", "warning:".yellow().bold());
        }
    }

    let warnings: usize = rows.iter().map(|r| r.warnings.len()).sum();
    let summary = format!("{} slides, {} warnings", deck.len(), warnings);
    if warnings == 0 {
        println!("\n{}", summary.green());
    } else {
        println!("\n{}", summary.yellow());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParseOptions;

    #[test]
    fn test_rows_for_sample_deck() {
        let content = include_str!("../../../../sample-presentations/rust-in-production.md");
        let deck = parse(content, &ParseOptions::default()).unwrap();
        let rows = rows(&deck);
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0].number, 1);
        assert_eq!(rows[0].key, "id:cover");
        assert_eq!(rows[1].key, "id:agenda");
        assert_eq!(rows[1].steps, 3);
        assert_eq!(rows[3].layout, "code");
        assert!(rows.iter().all(|r| r.warnings.is_empty()));
    }

    #[test]
    fn test_run_fails_on_unparsable_deck() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.md");
        std::fs::write(&path, "\n\n").unwrap();
        assert!(run(&path).is_err());
        assert!(run(&dir.path().join("missing.md")).is_err());
    }
}
