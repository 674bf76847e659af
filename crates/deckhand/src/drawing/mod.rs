pub mod persist;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parser::{Deck, SlideKey};
use crate::sync::SyncEvent;

/// Minimum number of points in a stroke.
const MIN_STROKE_POINTS: usize = 2;

/// Whether a slide's annotations outlive navigation and the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistPolicy {
    Persist,
    Ephemeral,
}

impl PersistPolicy {
    pub fn from_flag(persist: bool) -> Self {
        if persist { Self::Persist } else { Self::Ephemeral }
    }

    pub fn is_persistent(self) -> bool {
        self == Self::Persist
    }
}

/// Point in slide-local canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrokeKind {
    /// Freehand pen line through every point.
    #[default]
    Pen,
    /// Arrow from the first point to the last.
    Arrow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub kind: StrokeKind,
    /// CSS-style colour, e.g. `#1e50c8`.
    pub color: String,
    pub width: f32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            kind: StrokeKind::Pen,
            color: "#1e50c8".to_string(),
            width: 6.0,
        }
    }
}

impl StrokeStyle {
    pub fn arrow() -> Self {
        Self {
            kind: StrokeKind::Arrow,
            color: "#dc2828".to_string(),
            width: 6.0,
        }
    }
}

/// One continuous annotation input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Point>,
    pub style: StrokeStyle,
}

impl Stroke {
    pub fn pen(points: Vec<Point>) -> Self {
        Self {
            points,
            style: StrokeStyle::default(),
        }
    }

    pub fn arrow(from: Point, to: Point) -> Self {
        Self {
            points: vec![from, to],
            style: StrokeStyle::arrow(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DrawError {
    #[error("slide {slide} is out of range (deck has {len} slides)")]
    SlideOutOfRange { slide: usize, len: usize },
    #[error("a stroke needs at least 2 points, got {0}")]
    TooFewPoints(usize),
}

#[derive(Debug, Clone)]
struct Layer {
    policy: PersistPolicy,
    strokes: Vec<Stroke>,
}

/// Annotation layers for every slide of one session.
///
/// Layers are keyed by [`SlideKey`] rather than position, so a reload that
/// inserts or removes other slides leaves drawings attached to the right slide.
#[derive(Debug, Default)]
pub struct OverlayStore {
    layers: HashMap<SlideKey, Layer>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stroke to a slide's layer, creating the layer on first use.
    pub fn add_stroke(
        &mut self,
        deck: &Deck,
        slide: usize,
        stroke: Stroke,
    ) -> Result<SyncEvent, DrawError> {
        let key = slide_key(deck, slide)?;
        if stroke.points.len() < MIN_STROKE_POINTS {
            return Err(DrawError::TooFewPoints(stroke.points.len()));
        }
        let policy = deck.persist_policy(slide);
        let layer = self.layers.entry(key).or_insert_with(|| Layer {
            policy,
            strokes: Vec::new(),
        });
        layer.policy = policy;
        layer.strokes.push(stroke.clone());
        tracing::debug!(slide, strokes = layer.strokes.len(), "stroke added");
        Ok(SyncEvent::StrokeAdded { slide, stroke })
    }

    /// Empty a slide's layer.
    pub fn clear(&mut self, deck: &Deck, slide: usize) -> Result<SyncEvent, DrawError> {
        let key = slide_key(deck, slide)?;
        self.layers.remove(&key);
        Ok(SyncEvent::LayerCleared { slide })
    }

    pub fn strokes(&self, deck: &Deck, slide: usize) -> &[Stroke] {
        deck.slide(slide)
            .and_then(|s| self.layers.get(&s.key))
            .map_or(&[], |layer| layer.strokes.as_slice())
    }

    /// Called when navigation moves away from `slide`. Ephemeral layers are
    /// discarded; an event is only produced when there was something to clear.
    pub fn on_slide_left(&mut self, deck: &Deck, slide: usize) -> Option<SyncEvent> {
        if deck.persist_policy(slide).is_persistent() {
            return None;
        }
        let key = &deck.slide(slide)?.key;
        let removed = self.layers.remove(key)?;
        tracing::debug!(slide, strokes = removed.strokes.len(), "ephemeral layer cleared");
        Some(SyncEvent::LayerCleared { slide })
    }

    /// Move layers onto a freshly parsed deck.
    ///
    /// Layers whose slide still exists keep their strokes and adopt the slide's
    /// current policy. Layers whose slide disappeared survive only if they were
    /// persistent, so they can reattach if the slide comes back.
    pub fn rebind(&mut self, deck: &Deck) {
        self.layers.retain(|key, layer| match deck.index_of(key) {
            Some(index) => {
                layer.policy = deck.persist_policy(index);
                true
            }
            None => layer.policy.is_persistent(),
        });
    }

    /// End of session: drop every ephemeral layer and return the slides (by
    /// index in `deck`) whose layers were cleared.
    pub fn on_session_end(&mut self, deck: &Deck) -> Vec<usize> {
        let mut cleared: Vec<usize> = self
            .layers
            .iter()
            .filter(|(_, layer)| !layer.policy.is_persistent())
            .filter_map(|(key, _)| deck.index_of(key))
            .collect();
        cleared.sort_unstable();
        self.layers.retain(|_, layer| layer.policy.is_persistent());
        cleared
    }

    /// Persistent layers, ready to be saved for the next session.
    pub fn snapshot(&self) -> persist::DrawingSnapshot {
        let mut layers: Vec<persist::PersistedLayer> = self
            .layers
            .iter()
            .filter(|(_, layer)| layer.policy.is_persistent() && !layer.strokes.is_empty())
            .map(|(key, layer)| persist::PersistedLayer {
                key: key.clone(),
                strokes: layer.strokes.clone(),
            })
            .collect();
        layers.sort_by(|a, b| a.key.cmp(&b.key));
        persist::DrawingSnapshot::new(layers)
    }

    /// Load layers saved by a previous session. Restored strokes come before
    /// anything drawn since.
    pub fn restore(&mut self, snapshot: persist::DrawingSnapshot) {
        for saved in snapshot.layers {
            let layer = self.layers.entry(saved.key).or_insert_with(|| Layer {
                policy: PersistPolicy::Persist,
                strokes: Vec::new(),
            });
            let drawn_since = std::mem::take(&mut layer.strokes);
            layer.strokes = saved.strokes;
            layer.strokes.extend(drawn_since);
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

fn slide_key(deck: &Deck, slide: usize) -> Result<SlideKey, DrawError> {
    deck.slide(slide)
        .map(|s| s.key.clone())
        .ok_or(DrawError::SlideOutOfRange {
            slide,
            len: deck.len(),
        })
}
