//! Runs a [`Session`] on its own tokio task.
//!
//! All callers talk to the task through one mpsc queue, so the order in which
//! requests arrive is the order in which they are applied. Each client stamps
//! its commands with a submission number; the task rejects anything that
//! arrives out of order for that client.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};

use super::{Command, Frame, Outcome, Session, SessionError};
use crate::drawing::Stroke;
use crate::drawing::persist::DrawingSnapshot;
use crate::sync::{ClientId, ClientInfo, ClientOptions, Origin, Role, Subscription};

const REQUEST_QUEUE: usize = 256;

/// How often client backlogs are flushed and timeouts enforced.
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

type Reply<T> = oneshot::Sender<T>;

enum Request {
    Attach {
        role: Role,
        options: ClientOptions,
        reply: Reply<(ClientId, Subscription)>,
    },
    Detach {
        client: ClientId,
        reply: Reply<Result<(), SessionError>>,
    },
    Submit {
        client: ClientId,
        seq: u64,
        command: Command,
        reply: Reply<Result<Outcome, SessionError>>,
    },
    Apply {
        command: Command,
        reply: Reply<Result<Outcome, SessionError>>,
    },
    Render {
        reply: Reply<Result<Frame, SessionError>>,
    },
    Clients {
        reply: Reply<Vec<ClientInfo>>,
    },
    End {
        reply: Reply<DrawingSnapshot>,
    },
}

/// Cheap, cloneable access to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Request>,
}

/// Start `session` on a new task. Must be called inside a tokio runtime.
pub fn spawn(session: Session) -> SessionHandle {
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
    tokio::spawn(run(session, rx));
    SessionHandle { tx }
}

async fn run(mut session: Session, mut rx: mpsc::Receiver<Request>) {
    let mut sweep = interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut submitted: HashMap<ClientId, u64> = HashMap::new();

    loop {
        tokio::select! {
            request = rx.recv() => {
                match request {
                    Some(request) => {
                        if let Some(reply) = handle(&mut session, &mut submitted, request) {
                            let _ = reply.send(session.end());
                            break;
                        }
                    }
                    None => {
                        let snapshot = session.end();
                        tracing::warn!(
                            layers = snapshot.layers.len(),
                            "all session handles dropped, unsaved drawings discarded"
                        );
                        break;
                    }
                }
            }
            _ = sweep.tick() => {
                for (id, reason) in session.sweep() {
                    submitted.remove(&id);
                    tracing::debug!(%id, %reason, "client swept");
                }
            }
        }
    }
    tracing::info!("session task finished");
}

/// Apply one request. Returns the reply channel when the request ends the session.
fn handle(
    session: &mut Session,
    submitted: &mut HashMap<ClientId, u64>,
    request: Request,
) -> Option<Reply<DrawingSnapshot>> {
    match request {
        Request::Attach {
            role,
            options,
            reply,
        } => {
            let (id, subscription) = session.attach(role, options);
            if reply.send((id, subscription)).is_err() {
                // Caller went away before receiving its subscription.
                let _ = session.detach(id);
            }
        }
        Request::Detach { client, reply } => {
            submitted.remove(&client);
            let _ = reply.send(session.detach(client));
        }
        Request::Submit {
            client,
            seq,
            command,
            reply,
        } => {
            let result = match submitted.get(&client) {
                Some(&last) if seq <= last => Err(SessionError::OutOfOrder { client, seq, last }),
                _ => {
                    let result = session.submit(client, command);
                    if !matches!(result, Err(SessionError::UnknownClient(_))) {
                        submitted.insert(client, seq);
                    }
                    result
                }
            };
            if let Err(e) = &result {
                tracing::debug!(%client, seq, error = %e, "command rejected");
            }
            let _ = reply.send(result);
        }
        Request::Apply { command, reply } => {
            let _ = reply.send(session.apply(command, Origin::Session));
        }
        Request::Render { reply } => {
            let _ = reply.send(session.render_current());
        }
        Request::Clients { reply } => {
            let _ = reply.send(session.clients());
        }
        Request::End { reply } => return Some(reply),
    }
    None
}

impl SessionHandle {
    async fn call<T>(&self, request: impl FnOnce(Reply<T>) -> Request) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(request(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }

    /// Attach with the default options for `role`.
    pub async fn attach(&self, role: Role) -> Result<(ClientHandle, Subscription), SessionError> {
        self.attach_with(role, ClientOptions::for_role(role)).await
    }

    pub async fn attach_with(
        &self,
        role: Role,
        options: ClientOptions,
    ) -> Result<(ClientHandle, Subscription), SessionError> {
        let (id, subscription) = self
            .call(|reply| Request::Attach {
                role,
                options,
                reply,
            })
            .await?;
        let client = ClientHandle {
            id,
            seq: 0,
            session: self.clone(),
        };
        Ok((client, subscription))
    }

    /// Apply a command as the session itself (local presenter, file watcher).
    pub async fn apply(&self, command: Command) -> Result<Outcome, SessionError> {
        self.call(|reply| Request::Apply { command, reply }).await?
    }

    pub async fn render(&self) -> Result<Frame, SessionError> {
        self.call(|reply| Request::Render { reply }).await?
    }

    pub async fn clients(&self) -> Result<Vec<ClientInfo>, SessionError> {
        self.call(|reply| Request::Clients { reply }).await
    }

    /// Stop the session. Returns the drawings that should be saved.
    pub async fn end(&self) -> Result<DrawingSnapshot, SessionError> {
        self.call(|reply| Request::End { reply }).await
    }
}

/// One attached client's command surface.
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    seq: u64,
    session: SessionHandle,
}

impl ClientHandle {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub async fn submit(&mut self, command: Command) -> Result<Outcome, SessionError> {
        self.seq += 1;
        let (client, seq) = (self.id, self.seq);
        self.session
            .call(|reply| Request::Submit {
                client,
                seq,
                command,
                reply,
            })
            .await?
    }

    pub async fn next(&mut self) -> Result<Outcome, SessionError> {
        self.submit(Command::Next).await
    }

    pub async fn previous(&mut self) -> Result<Outcome, SessionError> {
        self.submit(Command::Previous).await
    }

    pub async fn go_to(
        &mut self,
        slide: usize,
        fragment: Option<usize>,
    ) -> Result<Outcome, SessionError> {
        self.submit(Command::GoTo { slide, fragment }).await
    }

    pub async fn reload(&mut self, source: impl Into<String>) -> Result<Outcome, SessionError> {
        self.submit(Command::Reload {
            source: source.into(),
        })
        .await
    }

    pub async fn draw(&mut self, slide: usize, stroke: Stroke) -> Result<Outcome, SessionError> {
        self.submit(Command::Draw { slide, stroke }).await
    }

    pub async fn clear_drawing(&mut self, slide: usize) -> Result<Outcome, SessionError> {
        self.submit(Command::ClearDrawing { slide }).await
    }

    pub async fn detach(self) -> Result<(), SessionError> {
        let client = self.id;
        self.session
            .call(|reply| Request::Detach { client, reply })
            .await?
    }
}
