use serde::{Deserialize, Serialize};

use crate::drawing::Stroke;
use crate::navigation::Position;

/// Identifier of an attached client, unique within one session. Ids are handed
/// out in attach order, so comparing ids compares attach order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Presenter,
    Audience,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Presenter => write!(f, "presenter"),
            Self::Audience => write!(f, "audience"),
        }
    }
}

/// A state change shared with every attached client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    NavigationChanged { position: Position },
    StrokeAdded { slide: usize, stroke: Stroke },
    LayerCleared { slide: usize },
    DeckReloaded { slide_count: usize },
}

/// Who caused an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Origin {
    /// The session itself (replays, session end, local commands without a client).
    Session,
    Client { id: ClientId, role: Role },
}

impl Origin {
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Session => None,
            Self::Client { role, .. } => Some(*role),
        }
    }
}

/// An event as delivered to one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Hub-wide sequence number. Replayed deliveries carry the sequence number
    /// of the last event generated before the client attached; live events
    /// continue from there without gaps.
    pub seq: u64,
    pub replay: bool,
    pub origin: Origin,
    pub event: SyncEvent,
}
