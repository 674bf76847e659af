//! One live presentation: deck, position, drawings and attached clients.
//!
//! [`Session`] is the single writer for all of that state. Commands are applied
//! one at a time and every resulting event is published before the next
//! command runs, which is what gives all clients the same total order.
//! [`server`] puts a session on its own task for concurrent callers.

pub mod server;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drawing::persist::DrawingSnapshot;
use crate::drawing::{DrawError, OverlayStore, Stroke};
use crate::navigation::{Boundary, Navigator, Position, Transition};
use crate::parser::{Deck, ParseError, ParseOptions, parse};
use crate::render::{Backends, RenderError, RenderedSlide};
use crate::sync::{
    ClientId, ClientInfo, ClientOptions, DetachReason, HubSettings, Origin, Role, Subscription,
    SyncEvent, SyncHub,
};

/// Whether audience clients may drive the presentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudiencePolicy {
    /// The presenter is authoritative; audience commands are ignored.
    #[default]
    Follow,
    /// Audience commands are accepted into the same order as everyone else's.
    Shared,
}

impl std::str::FromStr for AudiencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "follow" => Ok(Self::Follow),
            "shared" => Ok(Self::Shared),
            other => Err(format!("unknown audience policy '{other}' (expected follow or shared)")),
        }
    }
}

impl std::fmt::Display for AudiencePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Follow => write!(f, "follow"),
            Self::Shared => write!(f, "shared"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub parse: ParseOptions,
    pub hub: HubSettings,
    pub audience_policy: AudiencePolicy,
    pub renderer: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            hub: HubSettings::default(),
            audience_policy: AudiencePolicy::default(),
            renderer: "plain".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Next,
    Previous,
    GoTo { slide: usize, fragment: Option<usize> },
    Reload { source: String },
    Draw { slide: usize, stroke: Stroke },
    ClearDrawing { slide: usize },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Previous => "previous",
            Self::GoTo { .. } => "go_to",
            Self::Reload { .. } => "reload",
            Self::Draw { .. } => "draw",
            Self::ClearDrawing { .. } => "clear_drawing",
        }
    }
}

/// What a successfully applied command did.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Moved(Position),
    /// Navigation ran off the deck; nothing changed and nothing was published.
    Boundary {
        position: Position,
        boundary: Boundary,
    },
    Drawn { slide: usize, strokes: usize },
    Cleared { slide: usize },
    Reloaded {
        slide_count: usize,
        position: Position,
        warnings: usize,
    },
    /// The command came from an audience client while the presenter leads.
    Ignored,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("reload failed, keeping the previous deck: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Draw(#[from] DrawError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("{0} is not attached to this session")]
    UnknownClient(ClientId),
    #[error("{client} submitted #{seq} after #{last}")]
    OutOfOrder { client: ClientId, seq: u64, last: u64 },
    #[error("session has ended")]
    Closed,
}

/// The current slide as rendered, with its annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub position: Position,
    pub slide_count: usize,
    pub rendered: RenderedSlide,
    pub strokes: Vec<Stroke>,
}

#[derive(Debug)]
pub struct Session {
    deck: Deck,
    options: SessionOptions,
    navigator: Navigator,
    overlays: OverlayStore,
    hub: SyncHub,
    backends: Backends,
}

impl Session {
    pub fn new(source: &str, options: SessionOptions) -> Result<Self, ParseError> {
        let deck = parse(source, &options.parse)?;
        let backends = select_backends(&deck, &options.renderer);
        tracing::info!(
            slides = deck.len(),
            renderer = backends.renderer().id(),
            highlighter = backends.highlighter().id(),
            "session started"
        );
        Ok(Self {
            navigator: Navigator::new(&deck),
            overlays: OverlayStore::new(),
            hub: SyncHub::new(options.hub.clone()),
            deck,
            options,
            backends,
        })
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn position(&self) -> Position {
        self.navigator.position()
    }

    pub fn strokes(&self, slide: usize) -> &[Stroke] {
        self.overlays.strokes(&self.deck, slide)
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.hub.clients()
    }

    /// Attach a client. It first receives the current position and the current
    /// slide's strokes (flagged as replay), then every later event.
    pub fn attach(&mut self, role: Role, options: ClientOptions) -> (ClientId, Subscription) {
        let replay = self.replay();
        self.hub.attach(role, options, replay)
    }

    pub fn detach(&mut self, id: ClientId) -> Result<(), SessionError> {
        if self.hub.detach(id, DetachReason::Requested) {
            Ok(())
        } else {
            Err(SessionError::UnknownClient(id))
        }
    }

    fn replay(&self) -> Vec<SyncEvent> {
        let position = self.position();
        std::iter::once(SyncEvent::NavigationChanged { position })
            .chain(
                self.strokes(position.slide)
                    .iter()
                    .map(|stroke| SyncEvent::StrokeAdded {
                        slide: position.slide,
                        stroke: stroke.clone(),
                    }),
            )
            .collect()
    }

    /// Apply a command on behalf of an attached client.
    pub fn submit(&mut self, client: ClientId, command: Command) -> Result<Outcome, SessionError> {
        let role = self
            .hub
            .role_of(client)
            .ok_or(SessionError::UnknownClient(client))?;
        if role == Role::Audience && self.options.audience_policy == AudiencePolicy::Follow {
            tracing::debug!(%client, command = command.name(), "audience command ignored");
            return Ok(Outcome::Ignored);
        }
        self.apply(command, Origin::Client { id: client, role })
    }

    /// Apply a command. Errors leave every piece of state as it was.
    pub fn apply(&mut self, command: Command, origin: Origin) -> Result<Outcome, SessionError> {
        match command {
            Command::Next => {
                let transition = self.navigator.next();
                Ok(self.navigated(transition, origin))
            }
            Command::Previous => {
                let transition = self.navigator.previous();
                Ok(self.navigated(transition, origin))
            }
            Command::GoTo { slide, fragment } => {
                let transition = self.navigator.go_to(slide, fragment);
                Ok(self.navigated(transition, origin))
            }
            Command::Reload { source } => self.reload(&source, origin),
            Command::Draw { slide, stroke } => {
                let event = self.overlays.add_stroke(&self.deck, slide, stroke)?;
                self.publish(event, origin);
                Ok(Outcome::Drawn {
                    slide,
                    strokes: self.strokes(slide).len(),
                })
            }
            Command::ClearDrawing { slide } => {
                let event = self.overlays.clear(&self.deck, slide)?;
                self.publish(event, origin);
                Ok(Outcome::Cleared { slide })
            }
        }
    }

    fn navigated(&mut self, transition: Transition, origin: Origin) -> Outcome {
        if let Some(boundary) = transition.boundary {
            tracing::debug!(position = %transition.to, ?boundary, "navigation at boundary");
            return Outcome::Boundary {
                position: transition.to,
                boundary,
            };
        }
        if let Some(event) = transition
            .left_slide()
            .and_then(|left| self.overlays.on_slide_left(&self.deck, left))
        {
            self.publish(event, origin);
        }
        tracing::debug!(from = %transition.from, to = %transition.to, "navigated");
        self.publish(
            SyncEvent::NavigationChanged {
                position: transition.to,
            },
            origin,
        );
        Outcome::Moved(transition.to)
    }

    /// Replace the deck. Clients receive `DeckReloaded`, which invalidates any
    /// per-slide state they hold, followed by the new position and the strokes
    /// of every slide that still has a layer.
    fn reload(&mut self, source: &str, origin: Origin) -> Result<Outcome, SessionError> {
        let deck = parse(source, &self.options.parse)?;

        let old = self.position().slide;
        let old_key = self.deck.slide(old).map(|s| s.key.clone());
        let landing = old.min(deck.len().saturating_sub(1));
        if deck.slide(landing).map(|s| &s.key) != old_key.as_ref() {
            // The current slide is gone or replaced, which counts as leaving it.
            self.overlays.on_slide_left(&self.deck, old);
        }
        self.overlays.rebind(&deck);
        self.deck = deck;
        if let Some(config) = self.deck.resolved(0) {
            self.backends.refresh(&config.highlighter, &config.theme);
        }
        let transition = self.navigator.reload(&self.deck);

        let warnings = self.deck.warnings().count();
        tracing::info!(slides = self.deck.len(), warnings, "deck reloaded");

        self.publish(
            SyncEvent::DeckReloaded {
                slide_count: self.deck.len(),
            },
            origin,
        );
        self.publish(
            SyncEvent::NavigationChanged {
                position: transition.to,
            },
            origin,
        );
        for slide in 0..self.deck.len() {
            let strokes = self.strokes(slide).to_vec();
            for stroke in strokes {
                self.publish(SyncEvent::StrokeAdded { slide, stroke }, origin);
            }
        }

        Ok(Outcome::Reloaded {
            slide_count: self.deck.len(),
            position: transition.to,
            warnings,
        })
    }

    fn publish(&mut self, event: SyncEvent, origin: Origin) {
        for (id, reason) in self.hub.publish(event, origin) {
            tracing::debug!(%id, %reason, "client dropped during publish");
        }
    }

    /// Flush client backlogs and drop clients that stopped reading.
    pub fn sweep(&mut self) -> Vec<(ClientId, DetachReason)> {
        self.hub.sweep()
    }

    pub fn render_current(&self) -> Result<Frame, SessionError> {
        let position = self.position();
        let slide = self
            .deck
            .slide(position.slide)
            .ok_or(SessionError::Closed)?;
        let config = self
            .deck
            .resolved(position.slide)
            .ok_or(SessionError::Closed)?;
        let rendered = self.backends.render(slide, &config, position.fragment)?;
        Ok(Frame {
            position,
            slide_count: self.deck.len(),
            rendered,
            strokes: self.strokes(position.slide).to_vec(),
        })
    }

    /// Bring back drawings saved by an earlier session of this deck.
    pub fn restore(&mut self, snapshot: DrawingSnapshot) {
        let layers = snapshot.layers.len();
        self.overlays.restore(snapshot);
        self.overlays.rebind(&self.deck);
        tracing::info!(layers, "drawings restored");
    }

    /// End the session: ephemeral layers are cleared (and announced), every
    /// client is detached, and the persistent layers are returned for saving.
    pub fn end(&mut self) -> DrawingSnapshot {
        for slide in self.overlays.on_session_end(&self.deck) {
            self.publish(SyncEvent::LayerCleared { slide }, Origin::Session);
        }
        self.hub.detach_all(DetachReason::SessionEnded);
        let snapshot = self.overlays.snapshot();
        tracing::info!(layers = snapshot.layers.len(), "session ended");
        snapshot
    }
}

fn select_backends(deck: &Deck, renderer: &str) -> Backends {
    let config = deck.resolved(0);
    let (highlighter, theme) = config
        .as_ref()
        .map_or(("plain", "default"), |c| (c.highlighter.as_str(), c.theme.as_str()));
    Backends::select(renderer, highlighter, theme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::Point;

    const THREE: &str = "# A\n---\n# B\n---\n# C";

    fn session(source: &str) -> Session {
        Session::new(source, SessionOptions::default()).unwrap()
    }

    fn stroke(x: f32) -> Stroke {
        Stroke::pen(vec![Point::new(x, 0.0), Point::new(x, 5.0)])
    }

    fn draw(slide: usize, x: f32) -> Command {
        Command::Draw {
            slide,
            stroke: stroke(x),
        }
    }

    fn go_to(slide: usize, fragment: Option<usize>) -> Command {
        Command::GoTo { slide, fragment }
    }

    fn reload(source: &str) -> Command {
        Command::Reload {
            source: source.to_string(),
        }
    }

    fn stroke_added(slide: usize, x: f32) -> SyncEvent {
        SyncEvent::StrokeAdded {
            slide,
            stroke: stroke(x),
        }
    }

    fn moved_to(slide: usize) -> SyncEvent {
        SyncEvent::NavigationChanged {
            position: Position::new(slide, 0),
        }
    }

    fn events(sub: &mut Subscription) -> Vec<SyncEvent> {
        sub.drain().into_iter().map(|d| d.event).collect()
    }

    #[test]
    fn test_three_slide_walk() {
        let mut s = session(THREE);
        let (_, mut sub) = s.attach(Role::Presenter, ClientOptions::default());
        sub.drain();

        let outcome = s.apply(Command::Next, Origin::Session).unwrap();
        assert_eq!(outcome, Outcome::Moved(Position::new(1, 0)));
        let outcome = s.apply(Command::Next, Origin::Session).unwrap();
        assert_eq!(outcome, Outcome::Moved(Position::new(2, 0)));
        assert_eq!(
            s.apply(Command::Next, Origin::Session).unwrap(),
            Outcome::Boundary {
                position: Position::new(2, 0),
                boundary: Boundary::AtDeckEnd
            }
        );
        assert_eq!(events(&mut sub).len(), 2, "boundary publishes nothing");
    }

    #[test]
    fn test_attach_replays_position_and_current_layer() {
        let mut s = session(THREE);
        s.apply(go_to(1, None), Origin::Session).unwrap();
        s.apply(draw(1, 1.0), Origin::Session).unwrap();
        s.apply(draw(1, 2.0), Origin::Session).unwrap();

        let (_, mut sub) = s.attach(Role::Audience, ClientOptions::default());
        let replay = sub.drain();
        assert!(replay.iter().all(|d| d.replay));
        assert_eq!(
            replay.into_iter().map(|d| d.event).collect::<Vec<_>>(),
            vec![moved_to(1), stroke_added(1, 1.0), stroke_added(1, 2.0)]
        );

        s.apply(Command::Next, Origin::Session).unwrap();
        let live = sub.drain();
        assert_eq!(live.len(), 2, "ephemeral layer cleared, then navigation");
        assert!(live.iter().all(|d| !d.replay));
    }

    #[test]
    fn test_late_client_joins_a_crowded_slide() {
        let options = SessionOptions {
            hub: HubSettings {
                queue_capacity: 2,
                max_backlog: 2,
                ..HubSettings::default()
            },
            ..SessionOptions::default()
        };
        let mut s = Session::new(THREE, options).unwrap();
        for i in 0..10 {
            s.apply(draw(0, i as f32), Origin::Session).unwrap();
        }

        let (id, mut sub) = s.attach(Role::Audience, ClientOptions::default());
        s.apply(draw(0, 10.0), Origin::Session).unwrap();
        assert!(s.clients().iter().any(|c| c.id == id));

        let replayed = sub.drain();
        assert_eq!(replayed.len(), 11, "position plus ten strokes");
        assert!(replayed.iter().all(|d| d.replay));

        s.sweep();
        assert_eq!(events(&mut sub), vec![stroke_added(0, 10.0)]);
    }

    #[test]
    fn test_ephemeral_layer_cleared_on_leave() {
        let source = "@drawings-persist: false\n# A\n---\n@drawings-persist: true\n# B\n---\n# C";
        let mut s = session(source);
        s.apply(draw(0, 1.0), Origin::Session).unwrap();
        s.apply(go_to(1, None), Origin::Session).unwrap();
        assert!(s.strokes(0).is_empty());

        s.apply(draw(1, 2.0), Origin::Session).unwrap();
        s.apply(Command::Next, Origin::Session).unwrap();
        assert_eq!(s.strokes(1).len(), 1);
    }

    #[test]
    fn test_reload_keeps_persistent_drawing() {
        let source = "# A\n---\n@drawings-persist: true\n# B\n---\n# C";
        let mut s = session(source);
        s.apply(draw(1, 1.0), Origin::Session).unwrap();

        let edited = "# A, edited\n---\n@drawings-persist: true\n# B\n---\n# C";
        let outcome = s.apply(reload(edited), Origin::Session).unwrap();
        assert!(matches!(outcome, Outcome::Reloaded { slide_count: 3, .. }));
        assert_eq!(s.strokes(1), &[stroke(1.0)]);
    }

    #[test]
    fn test_reload_follows_slide_identity() {
        let mut s = session("@drawings-persist: true\n# A\n---\n# B");
        s.apply(draw(1, 1.0), Origin::Session).unwrap();
        let edited = "@drawings-persist: true\n# A\n---\n# New\n---\n# B";
        s.apply(reload(edited), Origin::Session).unwrap();
        assert!(s.strokes(1).is_empty());
        assert_eq!(s.strokes(2).len(), 1);
    }

    #[test]
    fn test_failed_reload_keeps_previous_deck() {
        let mut s = session(THREE);
        s.apply(go_to(2, None), Origin::Session).unwrap();
        let err = s.apply(reload("   "), Origin::Session).unwrap_err();
        assert!(matches!(err, SessionError::Parse(_)));
        assert_eq!(s.deck().len(), 3);
        assert_eq!(s.position(), Position::new(2, 0));
    }

    #[test]
    fn test_reload_events() {
        let mut s = session("@drawings-persist: true\n# A\n---\n# B");
        s.apply(draw(1, 1.0), Origin::Session).unwrap();
        let (_, mut sub) = s.attach(Role::Audience, ClientOptions::default());
        sub.drain();

        let edited = "@drawings-persist: true\n# A\n---\n# B\n---\n# C";
        s.apply(reload(edited), Origin::Session).unwrap();
        assert_eq!(
            events(&mut sub),
            vec![
                SyncEvent::DeckReloaded { slide_count: 3 },
                moved_to(0),
                stroke_added(1, 1.0),
            ]
        );
    }

    #[test]
    fn test_follow_policy_ignores_audience() {
        let mut s = session(THREE);
        let (audience, _sub) = s.attach(Role::Audience, ClientOptions::default());
        assert_eq!(s.submit(audience, Command::Next).unwrap(), Outcome::Ignored);
        assert_eq!(s.position(), Position::new(0, 0));
    }

    #[test]
    fn test_shared_policy_accepts_audience() {
        let options = SessionOptions {
            audience_policy: AudiencePolicy::Shared,
            ..SessionOptions::default()
        };
        let mut s = Session::new(THREE, options).unwrap();
        let (_, mut presenter) =
            s.attach(Role::Presenter, ClientOptions::for_role(Role::Presenter));
        let (audience, mut mirror) =
            s.attach(Role::Audience, ClientOptions::for_role(Role::Audience));
        presenter.drain();
        mirror.drain();

        let outcome = s.submit(audience, Command::Next).unwrap();
        assert_eq!(outcome, Outcome::Moved(Position::new(1, 0)));
        assert!(events(&mut presenter).is_empty(), "presenter opted out of audience navigation");
        assert_eq!(events(&mut mirror).len(), 1);
    }

    #[test]
    fn test_unknown_client() {
        let mut s = session(THREE);
        let err = s.submit(ClientId(99), Command::Next).unwrap_err();
        assert!(matches!(err, SessionError::UnknownClient(ClientId(99))));
        assert!(matches!(s.detach(ClientId(99)), Err(SessionError::UnknownClient(_))));
    }

    #[test]
    fn test_rejected_stroke_publishes_nothing() {
        let mut s = session(THREE);
        let (_, mut sub) = s.attach(Role::Presenter, ClientOptions::default());
        sub.drain();
        let err = s.apply(draw(7, 1.0), Origin::Session).unwrap_err();
        assert!(matches!(err, SessionError::Draw(DrawError::SlideOutOfRange { .. })));
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn test_render_current() {
        let mut s = session("# A\n---\n## B\n\n+ one\n+ two");
        s.apply(go_to(1, Some(1)), Origin::Session).unwrap();
        let frame = s.render_current().unwrap();
        assert_eq!(frame.position, Position::new(1, 1));
        assert_eq!(frame.slide_count, 2);
        assert!(frame.rendered.body.contains("one"));
        assert!(!frame.rendered.body.contains("two"));
    }

    #[test]
    fn test_end_keeps_only_persistent_layers() {
        let mut s = session("# A\n---\n@drawings-persist: true\n# B");
        s.apply(draw(0, 1.0), Origin::Session).unwrap();
        s.apply(draw(1, 2.0), Origin::Session).unwrap();
        let (_, mut sub) = s.attach(Role::Audience, ClientOptions::default());
        sub.drain();

        let snapshot = s.end();
        assert_eq!(snapshot.stroke_count(), 1);
        assert_eq!(events(&mut sub), vec![SyncEvent::LayerCleared { slide: 0 }]);
        assert!(sub.try_recv().is_none());

        let mut next = session("# A\n---\n@drawings-persist: true\n# B");
        next.restore(snapshot);
        assert_eq!(next.strokes(1), &[stroke(2.0)]);
    }
}
