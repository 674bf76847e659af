use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::event::{ClientId, Delivery};

/// Receiving end of one client's event feed.
///
/// The feed ends (yields `None`) once the client is detached and every event
/// queued before the detach has been received.
#[derive(Debug)]
pub struct Subscription {
    id: ClientId,
    rx: mpsc::Receiver<Delivery>,
}

impl Subscription {
    pub(crate) fn new(id: ClientId, rx: mpsc::Receiver<Delivery>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Next delivery if one is already queued.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now, in delivery order.
    pub fn drain(&mut self) -> Vec<Delivery> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Stream for Subscription {
    type Item = Delivery;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Delivery>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
