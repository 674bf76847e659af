//! Step marker scanning.
//!
//! Two marker forms reveal content one step at a time:
//!
//! - `<step>` ... `</step>` wraps a span; `<step at="3">` pins it to an explicit
//!   reveal index.
//! - a list item introduced with `+ ` instead of `-`/`*`.
//!
//! Markers inside fenced code blocks are ignored.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::splitter::FenceTracker;

static STEP_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<step(?:\s+at\s*=\s*"?(\d+)"?)?\s*>|</step\s*>"#).expect("step pattern is valid")
});

/// An explicit reveal index is zero or claimed by two markers on one slide.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("slide {slide}: step index {index} is zero or used more than once")]
pub struct FragmentIndexError {
    pub slide: usize,
    pub index: usize,
}

/// How a slide's markers map onto navigation steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentPlan {
    /// Number of addressable steps; 0 means the slide shows in full at once.
    pub step_count: usize,
    /// For each marker in document order, the 1-based step that reveals it.
    pub reveal_at: Vec<usize>,
}

impl FragmentPlan {
    /// Plan that reveals markers strictly in document order.
    fn in_document_order(markers: usize) -> Self {
        Self {
            step_count: markers,
            reveal_at: (1..=markers).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Marker {
    Span(Option<usize>),
    Close,
    ListItem,
}

/// Compute the fragment plan for one slide's content.
///
/// Explicit indices win; unlabeled markers take the lowest positive indices not
/// claimed explicitly, in document order. Gaps between the resulting indices
/// collapse, so the step count always equals the number of markers.
pub fn index(slide: usize, content: &str) -> Result<FragmentPlan, FragmentIndexError> {
    let labels: Vec<Option<usize>> = scan(content)
        .into_iter()
        .filter_map(|m| match m {
            Marker::Span(at) => Some(at),
            Marker::ListItem => Some(None),
            Marker::Close => None,
        })
        .collect();

    let mut explicit = BTreeSet::new();
    for at in labels.iter().flatten() {
        if *at == 0 || !explicit.insert(*at) {
            return Err(FragmentIndexError { slide, index: *at });
        }
    }

    let mut next_free = 1;
    let assigned: Vec<usize> = labels
        .iter()
        .map(|label| match label {
            Some(at) => *at,
            None => {
                while explicit.contains(&next_free) {
                    next_free += 1;
                }
                let at = next_free;
                next_free += 1;
                at
            }
        })
        .collect();

    let ranks: Vec<usize> = assigned
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let reveal_at = assigned
        .iter()
        .map(|at| ranks.binary_search(at).map_or(0, |r| r + 1))
        .collect();

    Ok(FragmentPlan {
        step_count: labels.len(),
        reveal_at,
    })
}

/// Like [`index`], but falls back to document order when explicit indices clash.
pub fn index_or_fallback(
    slide: usize,
    content: &str,
) -> (FragmentPlan, Option<FragmentIndexError>) {
    match index(slide, content) {
        Ok(plan) => (plan, None),
        Err(e) => {
            tracing::warn!(slide, index = e.index, "bad step index, using document order");
            let markers = scan(content)
                .into_iter()
                .filter(|m| !matches!(m, Marker::Close))
                .count();
            (FragmentPlan::in_document_order(markers), Some(e))
        }
    }
}

fn scan(content: &str) -> Vec<Marker> {
    let mut fence = FenceTracker::default();
    let mut markers = Vec::new();
    for line in content.lines() {
        if fence.observe(line) {
            continue;
        }
        if is_step_list_item(line) {
            markers.push(Marker::ListItem);
        }
        for caps in STEP_TAG.captures_iter(line) {
            if caps[0].starts_with("</") {
                markers.push(Marker::Close);
            } else {
                let at = caps.get(1).and_then(|m| m.as_str().parse().ok());
                markers.push(Marker::Span(at));
            }
        }
    }
    markers
}

fn is_step_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("+ ") || trimmed == "+"
}

/// Strip content that is not yet revealed at `reveal` steps.
///
/// Step tags themselves are removed; list items and spans whose step is greater
/// than `reveal` are dropped. Code fences pass through untouched.
pub fn visible_content(content: &str, plan: &FragmentPlan, reveal: usize) -> String {
    let mut fence = FenceTracker::default();
    let mut marker = 0usize;
    // Visibility of each open `<step>` span, innermost last.
    let mut open: Vec<bool> = Vec::new();
    let mut out: Vec<String> = Vec::new();

    for line in content.lines() {
        let hidden_by_span = open.iter().any(|visible| !visible);
        if fence.observe(line) {
            if !hidden_by_span {
                out.push(line.to_string());
            }
            continue;
        }

        let mut line_hidden = false;
        if is_step_list_item(line) {
            let step = plan.reveal_at.get(marker).copied().unwrap_or(0);
            marker += 1;
            line_hidden = step > reveal;
        }

        let mut text = String::new();
        let mut last = 0;
        for m in STEP_TAG.find_iter(line) {
            if !open.iter().any(|visible| !visible) {
                text.push_str(&line[last..m.start()]);
            }
            if m.as_str().starts_with("</") {
                open.pop();
            } else {
                let step = plan.reveal_at.get(marker).copied().unwrap_or(0);
                marker += 1;
                open.push(step <= reveal);
            }
            last = m.end();
        }
        if !open.iter().any(|visible| !visible) {
            text.push_str(&line[last..]);
        }

        let had_tags = last > 0;
        if line_hidden || (hidden_by_span && !had_tags) {
            continue;
        }
        if had_tags && text.trim().is_empty() {
            continue;
        }
        out.push(text);
    }

    out.join("\n")
}
