//! Fan-out of session state changes to attached clients.
//!
//! Every client gets its own bounded channel. Publishing never blocks: when a
//! client's channel is full, deliveries wait in a per-client backlog and are
//! flushed on the next publish or [`SyncHub::sweep`]. A client that makes no
//! progress for longer than the configured timeout, or whose backlog grows past
//! its limit, is detached and has to attach again (which replays the current
//! state).

pub mod event;
pub mod subscription;

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;

pub use event::{ClientId, Delivery, Origin, Role, SyncEvent};
pub use subscription::Subscription;

use crate::navigation::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct HubSettings {
    /// Capacity of each client's channel.
    pub queue_capacity: usize,
    /// How long a client may make no progress before it is detached.
    pub client_timeout: Duration,
    /// Deliveries allowed to wait beyond the channel before the client is detached.
    pub max_backlog: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            client_timeout: Duration::from_millis(2000),
            max_backlog: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Skip navigation events that audience clients caused.
    pub ignore_audience_navigation: bool,
}

impl ClientOptions {
    /// Presenters ignore audience navigation by default; audience clients see it.
    pub fn for_role(role: Role) -> Self {
        Self {
            ignore_audience_navigation: role == Role::Presenter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    Requested,
    Disconnected,
    ClientTimeout,
    SessionEnded,
}

impl std::fmt::Display for DetachReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Requested => "requested",
            Self::Disconnected => "disconnected",
            Self::ClientTimeout => "client timeout",
            Self::SessionEnded => "session ended",
        };
        f.write_str(s)
    }
}

/// Public view of an attached client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub role: Role,
    pub options: ClientOptions,
    /// Last position that made it into the client's channel.
    pub last_position: Option<Position>,
    /// Deliveries waiting in the backlog.
    pub backlog: usize,
}

#[derive(Debug)]
struct ClientSlot {
    role: Role,
    options: ClientOptions,
    tx: mpsc::Sender<Delivery>,
    backlog: VecDeque<Delivery>,
    stalled_since: Option<Instant>,
    last_position: Option<Position>,
}

impl ClientSlot {
    fn wants(&self, event: &SyncEvent, origin: Origin) -> bool {
        let audience_navigation = matches!(event, SyncEvent::NavigationChanged { .. })
            && origin.role() == Some(Role::Audience);
        !(audience_navigation && self.options.ignore_audience_navigation)
    }

    fn offer(
        &mut self,
        delivery: Delivery,
        now: Instant,
        settings: &HubSettings,
    ) -> Result<(), DetachReason> {
        self.flush(now)?;
        if self.backlog.is_empty() {
            let position = delivered_position(&delivery);
            match self.tx.try_send(delivery) {
                Ok(()) => {
                    self.last_position = position.or(self.last_position);
                    return Ok(());
                }
                Err(TrySendError::Full(delivery)) => {
                    self.backlog.push_back(delivery);
                    self.stalled_since.get_or_insert(now);
                }
                Err(TrySendError::Closed(_)) => return Err(DetachReason::Disconnected),
            }
        } else {
            self.backlog.push_back(delivery);
        }
        self.check(now, settings)
    }

    /// Move as much of the backlog into the channel as fits.
    fn flush(&mut self, now: Instant) -> Result<(), DetachReason> {
        let mut progressed = false;
        while let Some(delivery) = self.backlog.pop_front() {
            let position = delivered_position(&delivery);
            match self.tx.try_send(delivery) {
                Ok(()) => {
                    self.last_position = position.or(self.last_position);
                    progressed = true;
                }
                Err(TrySendError::Full(delivery)) => {
                    self.backlog.push_front(delivery);
                    break;
                }
                Err(TrySendError::Closed(_)) => return Err(DetachReason::Disconnected),
            }
        }
        if self.backlog.is_empty() {
            self.stalled_since = None;
        } else if progressed {
            self.stalled_since = Some(now);
        }
        Ok(())
    }

    fn check(&self, now: Instant, settings: &HubSettings) -> Result<(), DetachReason> {
        if self.backlog.len() > settings.max_backlog {
            return Err(DetachReason::ClientTimeout);
        }
        match self.stalled_since {
            Some(since) if now.duration_since(since) >= settings.client_timeout => {
                Err(DetachReason::ClientTimeout)
            }
            _ => Ok(()),
        }
    }
}

fn delivered_position(delivery: &Delivery) -> Option<Position> {
    match delivery.event {
        SyncEvent::NavigationChanged { position } => Some(position),
        _ => None,
    }
}

/// The set of clients attached to one session.
#[derive(Debug)]
pub struct SyncHub {
    clients: BTreeMap<ClientId, ClientSlot>,
    next_id: u64,
    seq: u64,
    settings: HubSettings,
}

impl SyncHub {
    pub fn new(settings: HubSettings) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_id: 1,
            seq: 0,
            settings,
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Register a client and queue `replay` ahead of any live event.
    ///
    /// The hub is only ever mutated by its owner, one call at a time, so
    /// nothing can be published between the replay and the subscription.
    /// The channel is sized to hold the whole replay, so the backlog of a new
    /// client starts empty whatever the size of the current layer.
    pub fn attach(
        &mut self,
        role: Role,
        options: ClientOptions,
        replay: Vec<SyncEvent>,
    ) -> (ClientId, Subscription) {
        let id = ClientId(self.next_id);
        self.next_id += 1;

        let capacity = self.settings.queue_capacity.max(replay.len()).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let mut slot = ClientSlot {
            role,
            options,
            tx,
            backlog: VecDeque::new(),
            stalled_since: None,
            last_position: None,
        };

        let replayed = replay.len();
        for event in replay {
            let delivery = Delivery {
                seq: self.seq,
                replay: true,
                origin: Origin::Session,
                event,
            };
            let position = delivered_position(&delivery);
            if slot.tx.try_send(delivery).is_ok() {
                slot.last_position = position.or(slot.last_position);
            }
        }

        self.clients.insert(id, slot);
        tracing::info!(%id, %role, replayed, "client attached");
        (id, Subscription::new(id, rx))
    }

    /// Remove a client. Returns false if it was not attached.
    pub fn detach(&mut self, id: ClientId, reason: DetachReason) -> bool {
        let removed = self.clients.remove(&id).is_some();
        if removed {
            match reason {
                DetachReason::ClientTimeout => {
                    tracing::warn!(%id, "client too slow, detached");
                }
                _ => tracing::info!(%id, %reason, "client detached"),
            }
        }
        removed
    }

    pub fn detach_all(&mut self, reason: DetachReason) {
        let ids: Vec<ClientId> = self.clients.keys().copied().collect();
        for id in ids {
            self.detach(id, reason);
        }
    }

    /// Fan an event out to every interested client, in attach order.
    ///
    /// Returns the clients that had to be detached while doing so.
    pub fn publish(&mut self, event: SyncEvent, origin: Origin) -> Vec<(ClientId, DetachReason)> {
        self.seq += 1;
        let seq = self.seq;
        let now = Instant::now();
        let mut dropped = Vec::new();

        for (id, slot) in self.clients.iter_mut() {
            if !slot.wants(&event, origin) {
                continue;
            }
            let delivery = Delivery {
                seq,
                replay: false,
                origin,
                event: event.clone(),
            };
            if let Err(reason) = slot.offer(delivery, now, &self.settings) {
                dropped.push((*id, reason));
            }
        }

        for (id, reason) in &dropped {
            self.detach(*id, *reason);
        }
        dropped
    }

    /// Flush backlogs and detach clients that timed out or went away.
    pub fn sweep(&mut self) -> Vec<(ClientId, DetachReason)> {
        let now = Instant::now();
        let mut dropped = Vec::new();
        for (id, slot) in self.clients.iter_mut() {
            if slot.tx.is_closed() {
                dropped.push((*id, DetachReason::Disconnected));
                continue;
            }
            let result = slot
                .flush(now)
                .and_then(|()| slot.check(now, &self.settings));
            if let Err(reason) = result {
                dropped.push((*id, reason));
            }
        }
        for (id, reason) in &dropped {
            self.detach(*id, *reason);
        }
        dropped
    }

    pub fn client(&self, id: ClientId) -> Option<ClientInfo> {
        self.clients.get(&id).map(|slot| info(id, slot))
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.clients
            .iter()
            .map(|(id, slot)| info(*id, slot))
            .collect()
    }

    pub fn role_of(&self, id: ClientId) -> Option<Role> {
        self.clients.get(&id).map(|slot| slot.role)
    }
}

fn info(id: ClientId, slot: &ClientSlot) -> ClientInfo {
    ClientInfo {
        id,
        role: slot.role,
        options: slot.options,
        last_position: slot.last_position,
        backlog: slot.backlog.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nav(slide: usize) -> SyncEvent {
        SyncEvent::NavigationChanged {
            position: Position::new(slide, 0),
        }
    }

    fn audience(id: u64) -> Origin {
        Origin::Client {
            id: ClientId(id),
            role: Role::Audience,
        }
    }

    fn slides(deliveries: &[Delivery]) -> Vec<usize> {
        deliveries
            .iter()
            .filter_map(|d| match d.event {
                SyncEvent::NavigationChanged { position } => Some(position.slide),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_replay_precedes_live_events() {
        let mut hub = SyncHub::new(HubSettings::default());
        hub.publish(nav(7), Origin::Session);
        let (_, mut sub) = hub.attach(Role::Audience, ClientOptions::default(), vec![nav(1)]);
        hub.publish(nav(2), Origin::Session);

        let got = sub.drain();
        assert_eq!(slides(&got), vec![1, 2]);
        assert!(got[0].replay);
        assert_eq!(got[0].seq, 1);
        assert!(!got[1].replay);
        assert_eq!(got[1].seq, 2);
    }

    #[test]
    fn test_fan_out_preserves_per_client_order() {
        let mut hub = SyncHub::new(HubSettings::default());
        let (_, mut a) = hub.attach(Role::Presenter, ClientOptions::default(), vec![]);
        let (_, mut b) = hub.attach(Role::Audience, ClientOptions::default(), vec![]);
        for slide in 0..5 {
            hub.publish(nav(slide), Origin::Session);
        }
        assert_eq!(slides(&a.drain()), vec![0, 1, 2, 3, 4]);
        assert_eq!(slides(&b.drain()), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_detached_client_gets_nothing_more() {
        let mut hub = SyncHub::new(HubSettings::default());
        let (id, mut sub) = hub.attach(Role::Audience, ClientOptions::default(), vec![]);
        hub.publish(nav(1), Origin::Session);
        assert!(hub.detach(id, DetachReason::Requested));
        assert!(!hub.detach(id, DetachReason::Requested));
        hub.publish(nav(2), Origin::Session);
        assert_eq!(slides(&sub.drain()), vec![1]);
        assert!(hub.is_empty());
    }

    #[test]
    fn test_audience_navigation_filter() {
        let mut hub = SyncHub::new(HubSettings::default());
        let (_, mut presenter) =
            hub.attach(Role::Presenter, ClientOptions::for_role(Role::Presenter), vec![]);
        let (_, mut mirror) =
            hub.attach(Role::Audience, ClientOptions::for_role(Role::Audience), vec![]);

        hub.publish(nav(3), audience(2));
        hub.publish(SyncEvent::LayerCleared { slide: 3 }, audience(2));

        assert_eq!(presenter.drain().len(), 1, "only the layer event");
        assert_eq!(mirror.drain().len(), 2);
    }

    #[test]
    fn test_dropped_receiver_is_detached() {
        let mut hub = SyncHub::new(HubSettings::default());
        let (id, sub) = hub.attach(Role::Audience, ClientOptions::default(), vec![]);
        drop(sub);
        let dropped = hub.publish(nav(1), Origin::Session);
        assert_eq!(dropped, vec![(id, DetachReason::Disconnected)]);
        assert!(hub.client(id).is_none());
    }

    #[test]
    fn test_backlog_overflow_detaches_slow_client() {
        let settings = HubSettings {
            queue_capacity: 2,
            client_timeout: Duration::from_secs(60),
            max_backlog: 3,
        };
        let mut hub = SyncHub::new(settings);
        let (slow, _slow_sub) = hub.attach(Role::Audience, ClientOptions::default(), vec![]);
        let (_, mut fast) = hub.attach(Role::Audience, ClientOptions::default(), vec![]);

        let mut dropped = Vec::new();
        for slide in 0..6 {
            dropped.extend(hub.publish(nav(slide), Origin::Session));
            fast.drain();
        }
        assert_eq!(dropped, vec![(slow, DetachReason::ClientTimeout)]);
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn test_backlog_flushes_in_order_when_client_catches_up() {
        let settings = HubSettings {
            queue_capacity: 1,
            ..HubSettings::default()
        };
        let mut hub = SyncHub::new(settings);
        let (id, mut sub) = hub.attach(Role::Audience, ClientOptions::default(), vec![]);
        for slide in 0..4 {
            hub.publish(nav(slide), Origin::Session);
        }
        assert_eq!(hub.client(id).unwrap().backlog, 3);

        let mut seen = Vec::new();
        while let Some(delivery) = sub.try_recv() {
            seen.push(delivery);
            hub.sweep();
        }
        assert_eq!(slides(&seen), vec![0, 1, 2, 3]);
        assert_eq!(hub.client(id).unwrap().last_position, Some(Position::new(3, 0)));
    }

    #[test]
    fn test_large_replay_does_not_count_against_backlog() {
        let settings = HubSettings {
            queue_capacity: 2,
            client_timeout: Duration::from_secs(60),
            max_backlog: 2,
        };
        let mut hub = SyncHub::new(settings);
        let replay: Vec<SyncEvent> = (0..10).map(nav).collect();
        let (id, mut sub) = hub.attach(Role::Audience, ClientOptions::default(), replay);
        assert_eq!(hub.client(id).unwrap().backlog, 0);

        assert!(hub.publish(nav(10), Origin::Session).is_empty());
        assert!(hub.client(id).is_some());
        let replayed = sub.drain();
        assert_eq!(replayed.len(), 10);
        assert!(replayed.iter().all(|d| d.replay));

        assert!(hub.sweep().is_empty());
        let live = sub.drain();
        assert_eq!(slides(&live), vec![10]);
        assert!(!live[0].replay);
    }

    #[test]
    fn test_last_position_tracks_what_left_the_backlog() {
        let settings = HubSettings {
            queue_capacity: 1,
            ..HubSettings::default()
        };
        let mut hub = SyncHub::new(settings);
        let (id, mut sub) = hub.attach(Role::Audience, ClientOptions::default(), vec![]);
        hub.publish(nav(1), Origin::Session);
        hub.publish(nav(2), Origin::Session);
        let info = hub.client(id).unwrap();
        assert_eq!(info.backlog, 1);
        assert_eq!(info.last_position, Some(Position::new(1, 0)));

        sub.try_recv();
        hub.sweep();
        assert_eq!(hub.client(id).unwrap().last_position, Some(Position::new(2, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_client_times_out() {
        let settings = HubSettings {
            queue_capacity: 1,
            client_timeout: Duration::from_millis(500),
            max_backlog: 100,
        };
        let mut hub = SyncHub::new(settings);
        let (id, _sub) = hub.attach(Role::Audience, ClientOptions::default(), vec![]);
        hub.publish(nav(0), Origin::Session);
        hub.publish(nav(1), Origin::Session);
        assert!(hub.sweep().is_empty());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(hub.sweep(), vec![(id, DetachReason::ClientTimeout)]);
    }
}
