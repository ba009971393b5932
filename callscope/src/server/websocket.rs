//! Websocket broadcast server.
//!
//! ```text
//!  observer ──ws──▶ serve_observer ──text──▶ ServerEvent::Message ──▶ proxy
//!           ◀─ws── (outbox) ◀── ObserverRegistry::broadcast ◀──────── proxy
//!
//!  last observer leaves ──▶ ServerEvent::NoConnections
//! ```
//!
//! Inbound text is parsed as an [`InboundMessage`]; anything else is
//! logged and ignored.

use super::observers::ObserverRegistry;
use super::router::InboundMessage;
use crate::domain::{ObserverId, ServerError};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum ServerEvent {
    Message {
        observer: ObserverId,
        message: InboundMessage,
    },
    /// The observer set went from one or more to zero
    NoConnections,
}

#[derive(Clone)]
struct ServerState {
    registry: Arc<Mutex<ObserverRegistry>>,
    events: mpsc::UnboundedSender<ServerEvent>,
}

fn lock(registry: &Mutex<ObserverRegistry>) -> MutexGuard<'_, ObserverRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct BroadcastServer {
    registry: Arc<Mutex<ObserverRegistry>>,
    local_addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl BroadcastServer {
    /// Server with no listener; broadcasts go nowhere
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            registry: Arc::default(),
            local_addr: None,
            shutdown: None,
            task: None,
        }
    }

    pub async fn bind(
        addr: SocketAddr,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<Self, ServerError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!("Observer server listening on ws://{local_addr}/");

        let registry = Arc::new(Mutex::new(ObserverRegistry::new()));
        let state = ServerState {
            registry: Arc::clone(&registry),
            events,
        };
        let app = Router::new().route("/", get(upgrade)).with_state(state);

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!("Observer server stopped: {e}");
            }
        });

        Ok(Self {
            registry,
            local_addr: Some(local_addr),
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Send `message` to every connected observer
    pub fn broadcast(&self, message: &str) -> usize {
        lock(&self.registry).broadcast(message)
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Disconnect every observer and stop listening
    pub async fn close(mut self) {
        lock(&self.registry).clear();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                debug!("Observer server slow to stop, aborting");
                task.abort();
            }
            info!("Observer server closed");
        }
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| serve_observer(socket, state))
}

async fn serve_observer(socket: WebSocket, state: ServerState) {
    let (id, mut outbox) = lock(&state.registry).register();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outgoing = outbox.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.to_string())).await {
                        warn!("Send to {id} failed: {e}");
                        break;
                    }
                }
                // Server closing, or this observer stopped reading
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => on_text(id, &text, &state),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("{id} connection error: {e}");
                    break;
                }
            },
        }
    }

    let _ = sink.close().await;
    if lock(&state.registry).remove(id) {
        let _ = state.events.send(ServerEvent::NoConnections);
    }
}

fn on_text(observer: ObserverId, text: &str, state: &ServerState) {
    match serde_json::from_str::<InboundMessage>(text) {
        Ok(message) => {
            let _ = state.events.send(ServerEvent::Message { observer, message });
        }
        Err(e) => warn!("Ignoring malformed message from {observer}: {e}"),
    }
}
