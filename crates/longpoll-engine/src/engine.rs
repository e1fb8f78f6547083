use std::future::Future;
use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use longpoll_core::{
    AccessError, InboundMessage, Message, PollId, PostBody, PostKind, SessionName,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::guard::AccessGuard;
use crate::registry::SessionRegistry;
use crate::session::{Delivery, Session};
use crate::sink::EventSink;
use crate::stats::DeliveryStats;

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3);

/// Timing knobs for the engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long an empty-queue poll is held before it is answered with `[]`.
    pub poll_timeout: Duration,
    /// Period of the liveness sweep.
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Mailboxes, held polls and liveness state for every configured client.
pub struct DeliveryEngine {
    registry: Arc<SessionRegistry>,
    guard: AccessGuard,
    sink: Arc<dyn EventSink>,
    config: EngineConfig,
    stats: DeliveryStats,
    /// Set by [`DeliveryEngine::release_all`]; polls from then on are answered at once.
    closing: AtomicBool,
}

impl DeliveryEngine {
    pub fn new(registry: SessionRegistry, sink: Arc<dyn EventSink>, config: EngineConfig) -> Self {
        let registry = Arc::new(registry);
        Self {
            guard: AccessGuard::new(Arc::clone(&registry)),
            registry,
            sink,
            config,
            stats: DeliveryStats::new(),
            closing: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Resolve a request's origin and token to a session.
    pub fn authorize(
        &self,
        origin: IpAddr,
        token: Option<&str>,
    ) -> Result<Arc<Session>, AccessError> {
        self.guard.authorize(origin, token)
    }

    /// Pull pending messages, waiting up to the poll timeout if there are none.
    ///
    /// Returns immediately with the drained queue when it is non-empty. Otherwise the
    /// poll is held until a delivery flushes it or the deadline answers it with `[]`,
    /// whichever comes first. A newer poll on the same session displaces this one,
    /// which then returns `[]` at once.
    pub async fn poll(&self, session: &Session) -> Vec<Message> {
        let poll_id = PollId::new();
        let rx = {
            let mut state = session.lock();
            if state.has_pending() {
                let batch = state.drain();
                drop(state);
                self.stats.record_poll(false);
                self.stats.record_delivered(batch.len());
                debug!(session = %session.name(), count = batch.len(), "poll answered immediately");
                return batch;
            }
            if self.closing.load(Ordering::Acquire) {
                drop(state);
                self.stats.record_poll(false);
                return Vec::new();
            }
            let (tx, rx) = oneshot::channel();
            if let Some(displaced) = state.hold(poll_id.clone(), tx) {
                let displaced_id = displaced.answer_empty();
                self.stats.record_superseded();
                debug!(
                    session = %session.name(),
                    displaced = %displaced_id,
                    "newer poll displaced held poll"
                );
            }
            rx
        };
        self.stats.record_poll(true);
        debug!(session = %session.name(), poll_id = %poll_id, "poll held");

        let mut pending = PendingPoll {
            session,
            poll_id: &poll_id,
            rx,
            armed: true,
        };

        let outcome = tokio::time::timeout(self.config.poll_timeout, &mut pending.rx).await;
        let batch = match outcome {
            Ok(Ok(batch)) => {
                self.stats.record_delivered(batch.len());
                batch
            }
            // Sender dropped without answering; treat like a timeout.
            Ok(Err(_)) => Vec::new(),
            Err(_) => self.finish_after_deadline(session, &poll_id, &mut pending.rx),
        };
        pending.armed = false;
        batch
    }

    /// Deadline path of a held poll. Answers `[]` if it still owns the held slot, otherwise
    /// picks up whatever the winning delivery already sent.
    fn finish_after_deadline(
        &self,
        session: &Session,
        poll_id: &PollId,
        rx: &mut oneshot::Receiver<Vec<Message>>,
    ) -> Vec<Message> {
        let released = session.lock().release(poll_id);
        if released {
            self.stats.record_timeout();
            debug!(session = %session.name(), poll_id = %poll_id, "poll deadline elapsed");
            Vec::new()
        } else {
            // The slot was taken under the same lock that sent the batch, so it is here.
            let batch = rx.try_recv().unwrap_or_default();
            self.stats.record_delivered(batch.len());
            batch
        }
    }

    /// Handle a client post. Only a missing type is an error; sink failures are logged.
    pub async fn post(&self, session: &Session, body: PostBody) -> Result<(), AccessError> {
        let name = session.name();
        match body.classify()? {
            PostKind::CheckStatus => {
                session.lock().acknowledge();
                debug!(session = %name, "liveness acknowledged");
            }
            PostKind::Connect => {
                info!(session = %name, "client connected");
                self.notify("connect", name, self.sink.on_connect_client(name))
                    .await;
            }
            PostKind::Application { kind, data } => {
                debug!(session = %name, kind = %kind, "inbound message");
                let message = InboundMessage::new(name.clone(), kind, data);
                self.notify("message", name, self.sink.on_message(message))
                    .await;
            }
        }
        Ok(())
    }

    /// Queue a payload for a session, flushing it straight to a held poll if one is waiting.
    pub fn send(
        &self,
        name: &SessionName,
        payload: serde_json::Value,
    ) -> Result<Delivery, EngineError> {
        let session = self
            .registry
            .get(name)
            .ok_or_else(|| AccessError::UnknownSession(name.to_string()))?;
        let delivery = session.lock().push(Message::Application(payload));
        if let Delivery::Delivered { poll_id, count } = &delivery {
            debug!(session = %name, poll_id = %poll_id, count, "flushed to held poll");
        } else {
            debug!(session = %name, "message queued");
        }
        Ok(delivery)
    }

    /// One liveness tick across all sessions.
    ///
    /// Probe injection and flag updates happen under each session's lock; lost-client
    /// callbacks run afterwards, outside any lock.
    pub async fn sweep(&self) {
        let mut lost = Vec::new();
        for session in self.registry.iter() {
            let outcome = session.lock().sweep();
            if outcome.probe_added {
                self.stats.record_probe();
            }
            if outcome.newly_lost {
                lost.push(session.name().clone());
            }
        }

        for name in lost {
            self.stats.record_lost();
            warn!(session = %name, "client lost: no liveness acknowledgment");
            self.notify("lost_client", &name, self.sink.on_lost_client(&name))
                .await;
        }
    }

    /// Answer every held poll with `[]` and stop holding new ones.
    ///
    /// Used at shutdown so graceful connection draining does not wait out poll deadlines.
    /// Queued messages stay queued. Returns how many polls were released.
    pub fn release_all(&self) -> usize {
        self.closing.store(true, Ordering::Release);
        let mut released = 0;
        for session in self.registry.iter() {
            let held = session.lock().take_held();
            if let Some(held) = held {
                let poll_id = held.answer_empty();
                debug!(session = %session.name(), poll_id = %poll_id, "held poll released for shutdown");
                released += 1;
            }
        }
        if released > 0 {
            info!(released, "released held polls");
        }
        released
    }

    /// Run a sink callback, logging errors and panics instead of propagating them.
    async fn notify<F>(&self, event: &'static str, session: &SessionName, fut: F)
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(session = %session, event, error = %e, "event handler failed");
            }
            Err(_) => {
                warn!(session = %session, event, "event handler panicked");
            }
        }
    }
}

/// Drop guard for a held poll whose future may be cancelled (client went away).
///
/// Frees the held slot, or puts back a batch that was sent but never read.
struct PendingPoll<'a> {
    session: &'a Session,
    poll_id: &'a PollId,
    rx: oneshot::Receiver<Vec<Message>>,
    armed: bool,
}

impl Drop for PendingPoll<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.session.lock();
        if state.release(self.poll_id) {
            debug!(session = %self.session.name(), poll_id = %self.poll_id, "held poll abandoned");
        } else if let Ok(batch) = self.rx.try_recv() {
            debug!(
                session = %self.session.name(),
                poll_id = %self.poll_id,
                count = batch.len(),
                "held poll abandoned after delivery, requeueing"
            );
            let _ = state.restore(batch);
        }
    }
}
