use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use longpoll_engine::{start_monitor, DeliveryEngine};
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Route serving poll (GET) and post (POST).
    pub path: String,
    /// Hard cap on any request, held polls included.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 13921,
            path: "/longpoll".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DeliveryEngine>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route(
            &config.path,
            get(handlers::poll_handler).post(handlers::post_handler),
        )
        .route("/health", get(handlers::health_handler))
        .with_state(state)
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener, start the liveness monitor, and serve until shut down.
pub async fn start(
    config: ServerConfig,
    engine: Arc<DeliveryEngine>,
) -> Result<ServerHandle, std::io::Error> {
    let cancel = CancellationToken::new();
    let monitor = start_monitor(Arc::clone(&engine), cancel.child_token());

    let router = build_router(
        AppState {
            engine: Arc::clone(&engine),
        },
        &config,
    );
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        addr = %local_addr,
        path = %config.path,
        sessions = engine.registry().len(),
        "longpoll server started"
    );

    let shutdown = cancel.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server terminated with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        addr: local_addr,
        engine,
        cancel,
        server,
        monitor,
    })
}

/// Handle returned by `start()`. Dropping it leaves the server running; call `shutdown`.
pub struct ServerHandle {
    pub port: u16,
    pub addr: SocketAddr,
    engine: Arc<DeliveryEngine>,
    cancel: CancellationToken,
    server: tokio::task::JoinHandle<()>,
    monitor: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// The engine behind this server, for outbound delivery.
    pub fn engine(&self) -> &Arc<DeliveryEngine> {
        &self.engine
    }

    /// Stop accepting connections and the liveness monitor, then wait for in-flight requests.
    ///
    /// Held polls are answered with `[]` first so draining does not wait out their deadlines.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.engine.release_all();
        let _ = self.monitor.await;
        let _ = self.server.await;
        tracing::info!("longpoll server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use longpoll_core::{InboundMessage, SessionName};
    use longpoll_engine::{CallbackSink, EngineConfig, SessionRegistry};
    use parking_lot::Mutex;
    use serde_json::json;

    struct Harness {
        handle: ServerHandle,
        inbound: Arc<Mutex<Vec<InboundMessage>>>,
        connects: Arc<Mutex<Vec<String>>>,
        client: reqwest::Client,
    }

    impl Harness {
        fn url(&self, token: &str) -> String {
            format!("http://127.0.0.1:{}/longpoll?token={token}", self.handle.port)
        }

        fn send(&self, name: &str, payload: serde_json::Value) {
            self.handle
                .engine()
                .send(&SessionName::new(name), payload)
                .unwrap();
        }
    }

    async fn harness(poll_timeout: Duration) -> Harness {
        let inbound = Arc::new(Mutex::new(Vec::new()));
        let connects = Arc::new(Mutex::new(Vec::new()));
        let (m, c) = (Arc::clone(&inbound), Arc::clone(&connects));
        let sink = CallbackSink::new()
            .with_message_handler(move |msg| {
                m.lock().push(msg);
                Ok(())
            })
            .with_connect_handler(move |name| {
                c.lock().push(name.to_string());
                Ok(())
            });

        let registry = SessionRegistry::from_pairs([("A", "tok-A"), ("B", "tok-B")]).unwrap();
        let engine = Arc::new(DeliveryEngine::new(
            registry,
            Arc::new(sink),
            EngineConfig {
                poll_timeout,
                // Keep probes out of the way.
                sweep_interval: Duration::from_secs(3600),
            },
        ));
        let config = ServerConfig {
            port: 0, // Random port
            ..Default::default()
        };
        let handle = start(config, engine).await.unwrap();
        Harness {
            handle,
            inbound,
            connects,
            client: reqwest::Client::new(),
        }
    }

    #[tokio::test]
    async fn poll_returns_queued_messages_immediately() {
        let h = harness(Duration::from_secs(30)).await;
        h.send("A", json!({"msg": 1}));

        let resp = h.client.get(h.url("tok-A")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body, json!([{"msg": 1}]));
    }

    #[tokio::test]
    async fn held_poll_resolved_by_delivery() {
        let h = harness(Duration::from_secs(30)).await;
        let request = h.client.get(h.url("tok-A")).send();
        let pending = tokio::spawn(request);

        // Wait until the poll is parked.
        let a = Arc::clone(h.handle.engine().registry().get(&SessionName::new("A")).unwrap());
        for _ in 0..100 {
            if a.is_held() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(a.is_held());

        h.send("A", json!({"msg": 2}));
        let resp = pending.await.unwrap().unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body, json!([{"msg": 2}]));
    }

    #[tokio::test]
    async fn held_poll_times_out_with_empty_array() {
        let h = harness(Duration::from_millis(200)).await;
        let started = std::time::Instant::now();
        let resp = h.client.get(h.url("tok-B")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "[]");
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn poll_with_bad_token_is_forbidden() {
        let h = harness(Duration::from_secs(30)).await;
        let resp = h.client.get(h.url("wrong")).send().await.unwrap();
        assert_eq!(resp.status(), 403);
        assert_eq!(resp.text().await.unwrap(), "Invalid Token");

        let no_token = format!("http://127.0.0.1:{}/longpoll", h.handle.port);
        let resp = h.client.get(no_token).send().await.unwrap();
        assert_eq!(resp.status(), 403);
    }

    #[tokio::test]
    async fn post_with_bad_token_is_bad_request() {
        let h = harness(Duration::from_secs(30)).await;
        let resp = h
            .client
            .post(h.url("wrong"))
            .json(&json!({"type": "chat", "data": 1}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(resp.text().await.unwrap(), "Invalid Token");
        assert!(h.inbound.lock().is_empty());
    }

    #[tokio::test]
    async fn post_without_type_is_bad_request() {
        let h = harness(Duration::from_secs(30)).await;
        let resp = h
            .client
            .post(h.url("tok-A"))
            .json(&json!({"data": 1}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(resp.text().await.unwrap(), "Invalid Type");

        let resp = h
            .client
            .post(h.url("tok-A"))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn post_with_non_string_type_is_bad_request() {
        let h = harness(Duration::from_secs(30)).await;
        let resp = h
            .client
            .post(h.url("tok-A"))
            .json(&json!({"type": 5, "data": 1}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(resp.text().await.unwrap(), "Invalid Type");
        assert!(h.inbound.lock().is_empty());
    }

    #[tokio::test]
    async fn post_checkstatus_acknowledges() {
        let h = harness(Duration::from_secs(30)).await;
        let engine = Arc::clone(h.handle.engine());
        engine.sweep().await;
        engine.sweep().await;
        let a = Arc::clone(engine.registry().get(&SessionName::new("A")).unwrap());
        assert!(a.is_lost());

        let resp = h
            .client
            .post(h.url("tok-A"))
            .json(&json!({"type": "checkstatus"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.text().await.unwrap().is_empty());
        assert!(!a.is_lost());
    }

    #[tokio::test]
    async fn post_application_message_reaches_handler() {
        let h = harness(Duration::from_secs(30)).await;
        let resp = h
            .client
            .post(h.url("tok-B"))
            .json(&json!({"type": "chat", "data": {"text": "hi"}}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let inbound = h.inbound.lock();
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].session.as_str(), "B");
        assert_eq!(inbound[0].kind, "chat");
        assert_eq!(inbound[0].data, json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn post_form_encoded_body() {
        let h = harness(Duration::from_secs(30)).await;
        let resp = h
            .client
            .post(h.url("tok-A"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body("type=chat&data=hello")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let inbound = h.inbound.lock();
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].data, json!("hello"));
    }

    #[tokio::test]
    async fn post_connect_invokes_handler() {
        let h = harness(Duration::from_secs(30)).await;
        let resp = h
            .client
            .post(h.url("tok-A"))
            .json(&json!({"type": "connect"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(*h.connects.lock(), vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn health_reports_sessions_and_stats() {
        let h = harness(Duration::from_secs(30)).await;
        h.send("B", json!(1));

        let url = format!("http://127.0.0.1:{}/health", h.handle.port);
        let resp = h.client.get(url).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["sessions"][0]["name"], "A");
        assert_eq!(body["sessions"][1]["pending"], 1);
        assert_eq!(body["stats"]["polls"], 0);
    }

    #[tokio::test]
    async fn shutdown_stops_serving() {
        let h = harness(Duration::from_secs(30)).await;
        let port = h.handle.port;
        h.handle.shutdown().await;

        let url = format!("http://127.0.0.1:{port}/health");
        assert!(reqwest::get(url).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_answers_held_poll_promptly() {
        let h = harness(Duration::from_secs(30)).await;
        let pending = tokio::spawn(h.client.get(h.url("tok-A")).send());

        let a = Arc::clone(h.handle.engine().registry().get(&SessionName::new("A")).unwrap());
        for _ in 0..100 {
            if a.is_held() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(a.is_held());

        let started = std::time::Instant::now();
        h.handle.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(5));

        let resp = pending.await.unwrap().unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "[]");
    }

    #[test]
    fn build_router_creates_routes() {
        let registry = SessionRegistry::from_pairs([("A", "tok-A")]).unwrap();
        let engine = DeliveryEngine::new(
            registry,
            Arc::new(CallbackSink::new()),
            EngineConfig::default(),
        );
        let state = AppState {
            engine: Arc::new(engine),
        };
        let _router = build_router(state, &ServerConfig::default());
    }
}
