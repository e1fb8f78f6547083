use std::collections::VecDeque;

use longpoll_core::{Credential, Message, PollId, SessionName};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::oneshot;

/// Server-side state for one configured client.
///
/// Name and credential are fixed for the process lifetime; everything else lives behind
/// the session's own lock, so sessions never contend with each other.
pub struct Session {
    name: SessionName,
    credential: Credential,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(name: SessionName, credential: Credential) -> Self {
        Self {
            name,
            credential,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn name(&self) -> &SessionName {
        &self.name
    }

    pub(crate) fn credential(&self) -> &Credential {
        &self.credential
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    /// Copy of the pending queue.
    pub fn pending(&self) -> Vec<Message> {
        self.state.lock().queue.iter().cloned().collect()
    }

    /// Whether a poll is currently waiting on this session.
    pub fn is_held(&self) -> bool {
        self.state.lock().held.is_some()
    }

    /// Whether the session is inside a reported lost episode.
    pub fn is_lost(&self) -> bool {
        self.state.lock().lost
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A poll waiting for its answer.
pub(crate) struct HeldPoll {
    pub(crate) id: PollId,
    tx: oneshot::Sender<Vec<Message>>,
}

/// Result of pushing into a mailbox.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Nobody was waiting; the message stays queued.
    Queued,
    /// The queue was handed to the held poll.
    Delivered { poll_id: PollId, count: usize },
}

/// What one liveness sweep did to a session.
#[derive(Debug)]
pub(crate) struct SweepOutcome {
    pub(crate) probe_added: bool,
    pub(crate) delivery: Delivery,
    pub(crate) newly_lost: bool,
}

pub(crate) struct SessionState {
    /// Acknowledged since the last sweep.
    alive: bool,
    /// A lost report has gone out for the current episode.
    lost: bool,
    queue: VecDeque<Message>,
    /// Only ever set while `queue` is empty.
    held: Option<HeldPoll>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            alive: true,
            lost: false,
            queue: VecDeque::new(),
            held: None,
        }
    }
}

impl SessionState {
    pub(crate) fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub(crate) fn drain(&mut self) -> Vec<Message> {
        self.queue.drain(..).collect()
    }

    /// Park a poll. Returns the poll it displaced, if any.
    pub(crate) fn hold(
        &mut self,
        id: PollId,
        tx: oneshot::Sender<Vec<Message>>,
    ) -> Option<HeldPoll> {
        debug_assert!(self.queue.is_empty());
        self.held.replace(HeldPoll { id, tx })
    }

    /// Clear the held slot if it still belongs to `id`. Whoever clears it owns the answer.
    pub(crate) fn release(&mut self, id: &PollId) -> bool {
        if self.held.as_ref().is_some_and(|held| &held.id == id) {
            self.held = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn take_held(&mut self) -> Option<HeldPoll> {
        self.held.take()
    }

    pub(crate) fn push(&mut self, message: Message) -> Delivery {
        self.queue.push_back(message);
        self.flush_held()
    }

    /// Hand the whole queue to the held poll, if there is one.
    ///
    /// If the poll's receiver is already gone the batch goes back into the queue untouched.
    fn flush_held(&mut self) -> Delivery {
        let Some(held) = self.held.take() else {
            return Delivery::Queued;
        };
        let batch = self.drain();
        let count = batch.len();
        match held.tx.send(batch) {
            Ok(()) => Delivery::Delivered {
                poll_id: held.id,
                count,
            },
            Err(batch) => {
                tracing::debug!(poll_id = %held.id, count, "held poll receiver gone, requeueing");
                self.queue = batch.into();
                Delivery::Queued
            }
        }
    }

    /// Put an undelivered batch back at the head of the queue.
    ///
    /// Keeps a single probe marker and hands everything to a newer held poll if one
    /// arrived in the meantime.
    pub(crate) fn restore(&mut self, batch: Vec<Message>) -> Delivery {
        let mut seen_probe = false;
        let mut restored = VecDeque::with_capacity(batch.len() + self.queue.len());
        for message in batch.into_iter().chain(self.queue.drain(..)) {
            if message.is_probe() {
                if seen_probe {
                    continue;
                }
                seen_probe = true;
            }
            restored.push_back(message);
        }
        self.queue = restored;
        if self.queue.is_empty() {
            Delivery::Queued
        } else {
            self.flush_held()
        }
    }

    pub(crate) fn acknowledge(&mut self) {
        self.alive = true;
        self.lost = false;
    }

    /// One liveness tick: inject the probe once, decide lost, reset the alive flag.
    pub(crate) fn sweep(&mut self) -> SweepOutcome {
        let probe_added = !self.queue.iter().any(Message::is_probe);
        let delivery = if probe_added {
            self.push(Message::Probe)
        } else {
            Delivery::Queued
        };

        let newly_lost = !self.alive && !self.lost;
        if newly_lost {
            self.lost = true;
        }
        self.alive = false;

        SweepOutcome {
            probe_added,
            delivery,
            newly_lost,
        }
    }
}

impl HeldPoll {
    /// Answer a displaced or released poll with an empty batch.
    pub(crate) fn answer_empty(self) -> PollId {
        let _ = self.tx.send(Vec::new());
        self.id
    }
}
