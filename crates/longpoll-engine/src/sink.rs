use std::sync::Arc;

use async_trait::async_trait;
use longpoll_core::{InboundMessage, SessionName};

/// Where the engine reports what clients do. Supplied by the embedding application.
///
/// Errors returned from any of these are logged by the engine and never reach the client.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// A client posted an application message.
    async fn on_message(&self, message: InboundMessage) -> anyhow::Result<()>;

    /// A client missed a full liveness period. Reported once per lost episode.
    async fn on_lost_client(&self, session: &SessionName) -> anyhow::Result<()>;

    /// A client announced a fresh start.
    async fn on_connect_client(&self, session: &SessionName) -> anyhow::Result<()>;
}

type MessageHandler = Arc<dyn Fn(InboundMessage) -> anyhow::Result<()> + Send + Sync>;
type SessionHandler = Arc<dyn Fn(&SessionName) -> anyhow::Result<()> + Send + Sync>;

/// [`EventSink`] built from plain closures, one per slot.
///
/// Slots left unregistered are no-ops.
#[derive(Clone, Default)]
pub struct CallbackSink {
    message: Option<MessageHandler>,
    lost: Option<SessionHandler>,
    connect: Option<SessionHandler>,
}

impl CallbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message_handler(
        mut self,
        handler: impl Fn(InboundMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.message = Some(Arc::new(handler));
        self
    }

    pub fn with_lost_client_handler(
        mut self,
        handler: impl Fn(&SessionName) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.lost = Some(Arc::new(handler));
        self
    }

    pub fn with_connect_handler(
        mut self,
        handler: impl Fn(&SessionName) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.connect = Some(Arc::new(handler));
        self
    }
}

#[async_trait]
impl EventSink for CallbackSink {
    async fn on_message(&self, message: InboundMessage) -> anyhow::Result<()> {
        match &self.message {
            Some(handler) => handler(message),
            None => {
                tracing::debug!(session = %message.session, kind = %message.kind, "no message handler registered");
                Ok(())
            }
        }
    }

    async fn on_lost_client(&self, session: &SessionName) -> anyhow::Result<()> {
        match &self.lost {
            Some(handler) => handler(session),
            None => {
                tracing::debug!(session = %session, "no lost-client handler registered");
                Ok(())
            }
        }
    }

    async fn on_connect_client(&self, session: &SessionName) -> anyhow::Result<()> {
        match &self.connect {
            Some(handler) => handler(session),
            None => {
                tracing::debug!(session = %session, "no connect handler registered");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn unregistered_slots_are_noops() {
        let sink = CallbackSink::new();
        let name = SessionName::new("a");
        assert!(sink.on_lost_client(&name).await.is_ok());
        assert!(sink.on_connect_client(&name).await.is_ok());
        let msg = InboundMessage::new(name, "chat".into(), serde_json::json!(1));
        assert!(sink.on_message(msg).await.is_ok());
    }

    #[tokio::test]
    async fn registered_handlers_receive_events() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let (m, l, c) = (seen.clone(), seen.clone(), seen.clone());
        let sink = CallbackSink::new()
            .with_message_handler(move |msg| {
                m.lock().push(format!("message:{}:{}", msg.session, msg.kind));
                Ok(())
            })
            .with_lost_client_handler(move |name| {
                l.lock().push(format!("lost:{name}"));
                Ok(())
            })
            .with_connect_handler(move |name| {
                c.lock().push(format!("connect:{name}"));
                Ok(())
            });

        let name = SessionName::new("A");
        sink.on_message(InboundMessage::new(name.clone(), "chat".into(), serde_json::json!({})))
            .await
            .unwrap();
        sink.on_lost_client(&name).await.unwrap();
        sink.on_connect_client(&name).await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec!["message:A:chat", "lost:A", "connect:A"]
        );
    }

    #[tokio::test]
    async fn handler_errors_are_returned() {
        let sink = CallbackSink::new().with_message_handler(|_| Err(anyhow::anyhow!("boom")));
        let msg = InboundMessage::new(SessionName::new("A"), "chat".into(), serde_json::json!(null));
        let err = sink.on_message(msg).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
