pub mod directives;
pub mod fragments;
pub mod layout;
pub mod splitter;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::drawing::PersistPolicy;
use fragments::{FragmentIndexError, FragmentPlan};

pub const DEFAULT_DELIMITER: &str = "---";

/// Keys that only ever describe a single slide, even in the first block.
const SLIDE_ONLY_KEYS: &[&str] = &["layout", "id"];

/// A parsed presentation. Immutable once built; a reload builds a new one.
#[derive(Debug, Clone)]
pub struct Deck {
    pub config: DeckConfig,
    pub slides: Vec<Slide>,
    defaults: Defaults,
}

/// Deck-wide settings declared in the first block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeckConfig {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub transition: Option<String>,
    #[serde(default)]
    pub highlighter: Option<String>,
    #[serde(default)]
    pub canvas_width: Option<u32>,
    #[serde(default)]
    pub drawings_persist: Option<bool>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub fonts: Vec<String>,
    /// Keys the core does not interpret, handed to the renderer as-is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Slide-local settings that override the deck defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SlideConfig {
    #[serde(default)]
    pub transition: Option<String>,
    #[serde(default)]
    pub drawings_persist: Option<bool>,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct Slide {
    pub index: usize,
    /// Slide body with the configuration section removed.
    pub raw_content: String,
    pub front_matter: SlideConfig,
    pub fragments: FragmentPlan,
    pub key: SlideKey,
    /// `@layout` if declared, otherwise inferred from the content.
    pub layout: String,
    pub warnings: Vec<FragmentIndexError>,
}

impl Slide {
    pub fn step_count(&self) -> usize {
        self.fragments.step_count
    }

    /// Content as it should appear with `reveal` steps shown.
    pub fn visible_content(&self, reveal: usize) -> String {
        fragments::visible_content(&self.raw_content, &self.fragments, reveal)
    }

    /// Fenced code regions with their declared language, in document order.
    pub fn code_regions(&self) -> Vec<CodeRegion> {
        code_regions(&self.raw_content)
    }
}

/// Stable identity of a slide across reloads and sessions.
///
/// Declared `@id`s are used verbatim; other slides are identified by a digest of
/// their content plus an occurrence counter so identical slides stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlideKey {
    Id { id: String },
    Content { digest: String, occurrence: usize },
}

impl fmt::Display for SlideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id { id } => write!(f, "id:{id}"),
            Self::Content { digest, occurrence } => write!(f, "sha256:{digest}#{occurrence}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRegion {
    pub language: Option<String>,
    pub code: String,
}

/// Fallback values used when neither the deck nor the slide sets a key.
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub theme: String,
    pub transition: String,
    pub highlighter: String,
    pub canvas_width: u32,
    pub drawings_persist: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            theme: "default".to_string(),
            transition: "slide".to_string(),
            highlighter: "syntect".to_string(),
            canvas_width: 980,
            drawings_persist: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub delimiter: String,
    pub defaults: Defaults,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            defaults: Defaults::default(),
        }
    }
}

/// Effective configuration for one slide, as handed to the rendering backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub theme: String,
    pub transition: String,
    pub highlighter: String,
    pub canvas_width: u32,
    pub drawings_persist: bool,
    pub layout: String,
    pub fonts: Vec<String>,
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("block {block}: {reason}")]
pub struct ParseError {
    pub block: usize,
    pub reason: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("malformed configuration: {0}")]
    MalformedConfig(String),
    #[error("deck has no slides")]
    EmptyDeck,
    #[error("slide id `{0}` is declared more than once")]
    DuplicateId(String),
}

impl ParseError {
    fn malformed(block: usize, message: impl fmt::Display) -> Self {
        Self {
            block,
            reason: ParseErrorKind::MalformedConfig(message.to_string()),
        }
    }
}

impl Deck {
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Always false for a parsed deck; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn slide(&self, index: usize) -> Option<&Slide> {
        self.slides.get(index)
    }

    pub fn step_counts(&self) -> Vec<usize> {
        self.slides.iter().map(Slide::step_count).collect()
    }

    pub fn index_of(&self, key: &SlideKey) -> Option<usize> {
        self.slides.iter().position(|s| &s.key == key)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &FragmentIndexError> {
        self.slides.iter().flat_map(|s| s.warnings.iter())
    }

    /// Drawing policy for a slide: slide override, then deck default, then the
    /// built-in default.
    pub fn persist_policy(&self, index: usize) -> PersistPolicy {
        let persist = self
            .slides
            .get(index)
            .and_then(|s| s.front_matter.drawings_persist)
            .or(self.config.drawings_persist)
            .unwrap_or(self.defaults.drawings_persist);
        PersistPolicy::from_flag(persist)
    }

    pub fn resolved(&self, index: usize) -> Option<ResolvedConfig> {
        let slide = self.slides.get(index)?;
        let deck = &self.config;
        let local = &slide.front_matter;

        let mut extra = deck.extra.clone();
        extra.extend(local.extra.clone());

        Some(ResolvedConfig {
            theme: deck
                .theme
                .clone()
                .unwrap_or_else(|| self.defaults.theme.clone()),
            transition: local
                .transition
                .clone()
                .or_else(|| deck.transition.clone())
                .unwrap_or_else(|| self.defaults.transition.clone()),
            highlighter: deck
                .highlighter
                .clone()
                .unwrap_or_else(|| self.defaults.highlighter.clone()),
            canvas_width: deck.canvas_width.unwrap_or(self.defaults.canvas_width),
            drawings_persist: self.persist_policy(index).is_persistent(),
            layout: slide.layout.clone(),
            fonts: deck.fonts.clone(),
            extra,
        })
    }
}

/// Parse deck source into a [`Deck`].
///
/// The source is split on delimiter lines; every block becomes exactly one slide.
/// Each block may open with `@key: value` directives. Directives of the first
/// block configure the whole deck (`layout` and `id` there still only apply to
/// the first slide). No I/O happens here.
pub fn parse(source: &str, options: &ParseOptions) -> Result<Deck, ParseError> {
    if source.trim().is_empty() {
        return Err(ParseError {
            block: 0,
            reason: ParseErrorKind::EmptyDeck,
        });
    }

    let blocks = splitter::split(source, &options.delimiter);
    let mut sections = blocks
        .iter()
        .enumerate()
        .map(|(i, block)| directives::extract(block).map_err(|e| ParseError::malformed(i, e)))
        .collect::<Result<Vec<_>, _>>()?;

    let (deck_entries, first_slide_entries) =
        partition_first_block(std::mem::take(&mut sections[0].entries));
    sections[0].entries = first_slide_entries;
    let config: DeckConfig = serde_yaml::from_value(Value::Mapping(deck_entries))
        .map_err(|e| ParseError::malformed(0, e))?;

    let mut front_matters = Vec::with_capacity(sections.len());
    let mut seen_ids = HashSet::new();
    for (i, section) in sections.iter().enumerate() {
        let front_matter: SlideConfig =
            serde_yaml::from_value(Value::Mapping(section.entries.clone()))
                .map_err(|e| ParseError::malformed(i, e))?;
        if let Some(id) = &front_matter.id {
            if !seen_ids.insert(id.clone()) {
                return Err(ParseError {
                    block: i,
                    reason: ParseErrorKind::DuplicateId(id.clone()),
                });
            }
        }
        front_matters.push(front_matter);
    }

    // Content analysis is independent per slide.
    let analyses: Vec<_> = sections
        .par_iter()
        .enumerate()
        .map(|(i, section)| {
            let (plan, warning) = fragments::index_or_fallback(i, &section.body);
            (content_digest(&section.body), plan, warning, layout::infer(&section.body))
        })
        .collect();

    let mut occurrences: HashMap<String, usize> = HashMap::new();
    let slides = sections
        .into_iter()
        .zip(front_matters)
        .zip(analyses)
        .enumerate()
        .map(|(index, ((section, front_matter), (digest, fragments, warning, inferred)))| {
            let key = match &front_matter.id {
                Some(id) => SlideKey::Id { id: id.clone() },
                None => {
                    let seen = occurrences.entry(digest.clone()).or_insert(0);
                    let occurrence = *seen;
                    *seen += 1;
                    SlideKey::Content { digest, occurrence }
                }
            };
            let layout = front_matter
                .layout
                .clone()
                .unwrap_or_else(|| inferred.to_string());
            Slide {
                index,
                raw_content: section.body,
                front_matter,
                fragments,
                key,
                layout,
                warnings: warning.into_iter().collect(),
            }
        })
        .collect();

    Ok(Deck {
        config,
        slides,
        defaults: options.defaults.clone(),
    })
}

/// Split first-block directives into deck-level and slide-only entries.
fn partition_first_block(entries: Mapping) -> (Mapping, Mapping) {
    let mut deck = Mapping::new();
    let mut slide = Mapping::new();
    for (key, value) in entries {
        let slide_only = key
            .as_str()
            .is_some_and(|k| SLIDE_ONLY_KEYS.contains(&k));
        if slide_only {
            slide.insert(key, value);
        } else {
            deck.insert(key, value);
        }
    }
    (deck, slide)
}

/// First 16 hex digits of the SHA-256 of a slide's content.
fn content_digest(content: &str) -> String {
    Sha256::digest(content.as_bytes())
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn code_regions(content: &str) -> Vec<CodeRegion> {
    segments(content)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Code(region) => Some(region),
            Segment::Line(_) => None,
        })
        .collect()
}

/// A piece of slide content: either a prose line or a whole fenced code region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Line(&'a str),
    Code(CodeRegion),
}

/// Split content into prose lines and fenced code regions, in document order.
pub fn segments(content: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut fence = splitter::FenceTracker::default();
    let mut language: Option<String> = None;
    let mut lines: Vec<&str> = Vec::new();

    for line in content.lines() {
        let was_open = fence.is_open();
        fence.observe(line);
        match (was_open, fence.is_open()) {
            (false, true) => {
                let info = line.trim().trim_start_matches(['`', '~']).trim();
                language = info
                    .split_whitespace()
                    .next()
                    .map(|s| s.trim_matches(['{', '}']).to_string())
                    .filter(|s| !s.is_empty());
                lines.clear();
            }
            (true, true) => lines.push(line),
            (true, false) => out.push(Segment::Code(CodeRegion {
                language: language.take(),
                code: lines.join("\n"),
            })),
            (false, false) => out.push(Segment::Line(line)),
        }
    }
    // An unclosed fence runs to the end of the slide.
    if fence.is_open() {
        out.push(Segment::Code(CodeRegion {
            language,
            code: lines.join("\n"),
        }));
    }
    out
}

fn string_or_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Fonts {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Fonts>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Fonts::One(list)) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Fonts::Many(fonts)) => fonts,
    })
}

fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
    }

    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|s| match s {
        Scalar::Text(s) => s,
        Scalar::Int(n) => n.to_string(),
    }))
}
