use serde::{Deserialize, Serialize};

use crate::parser::Deck;

/// What is currently shown: a slide and how many of its steps are revealed.
///
/// `fragment == step_count` means every step of the slide is visible.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub slide: usize,
    pub fragment: usize,
}

impl Position {
    pub fn new(slide: usize, fragment: usize) -> Self {
        Self { slide, fragment }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.slide, self.fragment)
    }
}

/// Why a transition did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    AtDeckStart,
    AtDeckEnd,
}

/// Result of a navigation command. Never an error: running off either end of
/// the deck is reported through `boundary` with the position unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Position,
    pub to: Position,
    pub boundary: Option<Boundary>,
}

impl Transition {
    fn moved(from: Position, to: Position) -> Self {
        Self {
            from,
            to,
            boundary: None,
        }
    }

    fn blocked(at: Position, boundary: Boundary) -> Self {
        Self {
            from: at,
            to: at,
            boundary: Some(boundary),
        }
    }

    pub fn is_boundary(&self) -> bool {
        self.boundary.is_some()
    }

    /// The slide navigation moved away from, if the slide changed.
    pub fn left_slide(&self) -> Option<usize> {
        (self.from.slide != self.to.slide).then_some(self.from.slide)
    }
}

/// Owns the current position and enforces the deck's bounds.
#[derive(Debug, Clone)]
pub struct Navigator {
    position: Position,
    step_counts: Vec<usize>,
}

impl Navigator {
    /// Start at the first slide of `deck`, nothing revealed.
    pub fn new(deck: &Deck) -> Self {
        Self {
            position: Position::default(),
            step_counts: deck.step_counts(),
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn slide_count(&self) -> usize {
        self.step_counts.len()
    }

    fn steps(&self, slide: usize) -> usize {
        self.step_counts.get(slide).copied().unwrap_or(0)
    }

    fn last_slide(&self) -> usize {
        self.step_counts.len().saturating_sub(1)
    }

    /// Reveal the next step, or advance to the next slide with nothing revealed.
    pub fn next(&mut self) -> Transition {
        let from = self.position;
        let to = if from.fragment < self.steps(from.slide) {
            Position::new(from.slide, from.fragment + 1)
        } else if from.slide < self.last_slide() {
            Position::new(from.slide + 1, 0)
        } else {
            return Transition::blocked(from, Boundary::AtDeckEnd);
        };
        self.position = to;
        Transition::moved(from, to)
    }

    /// Hide the last revealed step, or go back to the previous slide fully
    /// revealed so backward navigation never shows anything new.
    pub fn previous(&mut self) -> Transition {
        let from = self.position;
        let to = if from.fragment > 0 {
            Position::new(from.slide, from.fragment - 1)
        } else if from.slide > 0 {
            let prev = from.slide - 1;
            Position::new(prev, self.steps(prev))
        } else {
            return Transition::blocked(from, Boundary::AtDeckStart);
        };
        self.position = to;
        Transition::moved(from, to)
    }

    /// Jump straight to a position, clamping both coordinates into range.
    pub fn go_to(&mut self, slide: usize, fragment: Option<usize>) -> Transition {
        let from = self.position;
        let slide = slide.min(self.last_slide());
        let fragment = fragment.unwrap_or(0).min(self.steps(slide));
        self.position = Position::new(slide, fragment);
        Transition::moved(from, self.position)
    }

    /// Adopt a new deck. The slide index survives when still in range; the
    /// fragment always resets because step boundaries may have moved.
    pub fn reload(&mut self, deck: &Deck) -> Transition {
        let from = self.position;
        self.step_counts = deck.step_counts();
        self.position = Position::new(from.slide.min(self.last_slide()), 0);
        Transition::moved(from, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOptions, parse};

    fn navigator(source: &str) -> Navigator {
        Navigator::new(&parse(source, &ParseOptions::default()).unwrap())
    }

    const PLAIN: &str = "# A\n---\n# B\n---\n# C";
    const STEPPED: &str = "# A\n---\n# B\n\n+ one\n+ two\n---\n# C";

    #[test]
    fn test_next_through_plain_deck() {
        let mut nav = navigator(PLAIN);
        assert_eq!(nav.next().to, Position::new(1, 0));
        assert_eq!(nav.next().to, Position::new(2, 0));
        let end = nav.next();
        assert_eq!(end.boundary, Some(Boundary::AtDeckEnd));
        assert_eq!(nav.position(), Position::new(2, 0));
    }

    #[test]
    fn test_next_reveals_steps_first() {
        let mut nav = navigator(STEPPED);
        nav.go_to(1, None);
        assert_eq!(nav.next().to, Position::new(1, 1));
        assert_eq!(nav.next().to, Position::new(1, 2));
        assert_eq!(nav.next().to, Position::new(2, 0));
    }

    #[test]
    fn test_previous_lands_fully_revealed() {
        let mut nav = navigator(STEPPED);
        nav.go_to(2, None);
        let t = nav.previous();
        assert_eq!(t.to, Position::new(1, 2));
        assert_eq!(t.left_slide(), Some(2));
        assert_eq!(nav.previous().to, Position::new(1, 1));
    }

    #[test]
    fn test_previous_at_start() {
        let mut nav = navigator(PLAIN);
        let t = nav.previous();
        assert_eq!(t.boundary, Some(Boundary::AtDeckStart));
        assert_eq!(t.from, t.to);
        assert_eq!(t.left_slide(), None);
    }

    #[test]
    fn test_next_then_previous_round_trips() {
        let mut nav = navigator(STEPPED);
        for start in [
            Position::new(0, 0),
            Position::new(1, 0),
            Position::new(1, 1),
            Position::new(1, 2),
        ] {
            nav.go_to(start.slide, Some(start.fragment));
            nav.next();
            nav.previous();
            assert_eq!(nav.position(), start, "round trip from {start}");
        }
    }

    #[test]
    fn test_next_visits_every_position_in_order() {
        let mut nav = navigator("+ a\n---\n# B\n---\n<step>x</step><step>y</step>\n+ z");
        let mut visited = vec![nav.position()];
        loop {
            let t = nav.next();
            if t.is_boundary() {
                assert_eq!(t.boundary, Some(Boundary::AtDeckEnd));
                break;
            }
            visited.push(t.to);
        }
        let expected: Vec<Position> = [(0, 0), (0, 1), (1, 0), (2, 0), (2, 1), (2, 2), (2, 3)]
            .into_iter()
            .map(|(s, f)| Position::new(s, f))
            .collect();
        assert_eq!(visited, expected);
        assert!(visited.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_go_to_clamps() {
        let mut nav = navigator(STEPPED);
        assert_eq!(nav.go_to(1, Some(99)).to, Position::new(1, 2));
        assert_eq!(nav.go_to(42, Some(3)).to, Position::new(2, 0));
        assert_eq!(nav.go_to(1, None).to, Position::new(1, 0));
    }

    #[test]
    fn test_reload_keeps_slide_resets_fragment() {
        let mut nav = navigator(STEPPED);
        nav.go_to(1, Some(2));
        let deck = parse("# A\n---\n# B\n\n+ only", &ParseOptions::default()).unwrap();
        let t = nav.reload(&deck);
        assert_eq!(t.to, Position::new(1, 0));
        assert_eq!(nav.slide_count(), 2);
    }

    #[test]
    fn test_reload_clamps_slide() {
        let mut nav = navigator(PLAIN);
        nav.go_to(2, None);
        let deck = parse("# Only", &ParseOptions::default()).unwrap();
        assert_eq!(nav.reload(&deck).to, Position::new(0, 0));
    }
}
