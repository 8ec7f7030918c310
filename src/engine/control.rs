//! Director runtime: drives one [`Director`] on a single tokio task.
//!
//! Enqueue messages, timer deadlines and shutdown are multiplexed with
//! `select!`, so each trigger runs to completion before the next one is
//! looked at. No locks; the director is owned by the task.

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info};
use uuid::Uuid;

use crate::config::DirectorConfig;
use crate::error::{Error, Result};
use crate::event::DirectorEvent;
use crate::model::{DirectorState, NormalizedEvent};

use super::director::Director;

/// Journal capacity per subscriber before slow readers start lagging.
const JOURNAL_CAPACITY: usize = 256;

/// Messages from handles to the director task.
enum Command {
    Enqueue(NormalizedEvent),
    /// Reply once nothing is on screen, queued, or scheduled.
    WhenIdle(oneshot::Sender<()>),
}

/// Cheap, cloneable handle to a running director.
#[derive(Clone)]
pub struct DirectorHandle {
    session: Uuid,
    tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<DirectorState>,
    journal_tx: broadcast::Sender<DirectorEvent>,
    shutdown: CancellationToken,
}

impl DirectorHandle {
    /// Session this director belongs to.
    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Hand one event to the director.
    pub fn enqueue(&self, event: NormalizedEvent) -> Result<()> {
        self.tx
            .send(Command::Enqueue(event))
            .map_err(|_| Error::DirectorClosed)
    }

    /// Wait until the director has nothing left to narrate.
    pub async fn idle(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(Command::WhenIdle(reply))
            .map_err(|_| Error::DirectorClosed)?;
        done.await.map_err(|_| Error::DirectorClosed)
    }

    /// Snapshot of the current on-screen state.
    pub fn state(&self) -> DirectorState {
        self.state_rx.borrow().clone()
    }

    /// Receiver that wakes on every state change.
    pub fn subscribe(&self) -> watch::Receiver<DirectorState> {
        self.state_rx.clone()
    }

    /// Receiver for the decision journal.
    pub fn journal(&self) -> broadcast::Receiver<DirectorEvent> {
        self.journal_tx.subscribe()
    }

    /// Signal the director task to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Start a director for one dashboard session.
pub fn spawn(config: DirectorConfig) -> (DirectorHandle, JoinHandle<()>) {
    let session = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(DirectorState::default());
    let (journal_tx, _) = broadcast::channel(JOURNAL_CAPACITY);
    let shutdown = CancellationToken::new();

    let runner = Runner {
        director: Director::new(config),
        rx,
        state_tx,
        journal_tx: journal_tx.clone(),
        shutdown: shutdown.clone(),
        idle_waiters: Vec::new(),
    };
    let span = tracing::info_span!("director", "director.session" = %session);
    let task = tokio::spawn(runner.run().instrument(span));

    let handle = DirectorHandle {
        session,
        tx,
        state_rx,
        journal_tx,
        shutdown,
    };
    (handle, task)
}

struct Runner {
    director: Director,
    rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<DirectorState>,
    journal_tx: broadcast::Sender<DirectorEvent>,
    shutdown: CancellationToken,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl Runner {
    async fn run(mut self) {
        info!("director started");

        loop {
            let deadline = self.director.next_deadline();

            // Messages drain before timers so that events arriving together
            // are ordered by priority before anything starts.
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("director shutting down");
                    break;
                }
                msg = self.rx.recv() => {
                    match msg {
                        Some(Command::Enqueue(event)) => {
                            self.director.enqueue(event, Instant::now());
                        }
                        Some(Command::WhenIdle(reply)) => {
                            self.idle_waiters.push(reply);
                        }
                        None => {
                            info!("all handles dropped, director stopping");
                            break;
                        }
                    }
                }
                _ = sleep_until(deadline) => {
                    self.director.poll(Instant::now());
                }
            }

            self.publish();
        }
    }

    fn publish(&mut self) {
        let next = self.director.state();
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == *next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        if changed {
            debug!(
                presenter_state = %next.presenter_state,
                speaking = next.is_speaking,
                "state published"
            );
        }

        for event in self.director.drain_events() {
            // Err only means nobody is listening.
            let _ = self.journal_tx.send(event);
        }

        if self.director.is_quiescent() {
            for reply in self.idle_waiters.drain(..) {
                let _ = reply.send(());
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
