//! Self-healing system-state stream client.
//!
//! A [`StateStreamClient`] owns one driver task. The task holds the only
//! connection, runs the [`ConnectionMachine`], and fans every decoded frame out
//! to the subscriber registry before reading the next one.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ClientError, Result};
use crate::machine::{Action, ConnectionMachine, ConnectionState, LinkEvent};
use crate::state::{SystemState, decode_frame};
use crate::subscription::{SubscriberRegistry, SubscriptionHandle};
use crate::transport::{Connector, FrameStream, TransportFrame, WebSocketConnector};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Stream client configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: Url,
    /// Constant wait between losing a connection and the next attempt.
    pub reconnect_delay: Duration,
    /// An attempt that takes longer counts as failed.
    pub connect_timeout: Duration,
}

impl StreamConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

/// Client for the backend's system-state stream.
///
/// Construct one per application and share it by reference. Connecting starts
/// immediately; transport faults are retried forever and never surface through
/// the subscription API.
pub struct StateStreamClient {
    url: Url,
    registry: SubscriberRegistry,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl StateStreamClient {
    /// Spawn the driver on the current tokio runtime and begin connecting.
    pub fn start<C>(config: StreamConfig, connector: C) -> Self
    where
        C: Connector,
    {
        let registry = SubscriberRegistry::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let url = config.url.clone();

        let driver = Driver {
            config,
            connector: Arc::new(connector),
            registry: registry.clone(),
            state_tx,
            shutdown_rx,
            machine: ConnectionMachine::new(),
        };
        let task = tokio::spawn(driver.run());

        Self {
            url,
            registry,
            state_rx,
            shutdown_tx,
            driver: Mutex::new(Some(task)),
        }
    }

    /// Start over WebSocket, optionally carrying a bearer token.
    pub fn start_websocket(config: StreamConfig, bearer_token: Option<String>) -> Self {
        Self::start(
            config,
            WebSocketConnector::new().with_bearer_token(bearer_token),
        )
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionHandle
    where
        F: Fn(&SystemState) + Send + Sync + 'static,
    {
        self.registry.subscribe(observer)
    }

    /// Channel form of [`subscribe`](Self::subscribe). The channel is
    /// unbounded: keep draining the receiver or drop it.
    pub fn subscribe_channel(&self) -> (SubscriptionHandle, mpsc::UnboundedReceiver<SystemState>) {
        self.registry.subscribe_channel()
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.registry.unsubscribe(handle)
    }

    /// Shared handle to the registry, e.g. for observers that unsubscribe
    /// themselves from inside their callback.
    pub fn registry(&self) -> SubscriberRegistry {
        self.registry.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Connectivity feed. Kept apart from `SystemState`; the client never
    /// invents an OFFLINE state on its own.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Close the connection, cancel any pending reconnect and release every
    /// subscriber. Further calls are no-ops.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        if let Some(task) = self.take_driver()
            && let Err(error) = task.await
        {
            warn!("stream driver for {} ended abnormally: {}", self.url, error);
        }
        self.registry.clear();
    }

    fn take_driver(&self) -> Option<JoinHandle<()>> {
        self.driver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl Drop for StateStreamClient {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

enum Opened {
    Stream(FrameStream),
    Failed,
    Shutdown,
}

enum Ended {
    Disconnected,
    Shutdown,
}

struct Driver {
    config: StreamConfig,
    connector: Arc<dyn Connector>,
    registry: SubscriberRegistry,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
    machine: ConnectionMachine,
}

impl Driver {
    async fn run(mut self) {
        let mut shutdown = self.shutdown_rx.clone();
        let mut action = self.apply(LinkEvent::Start);

        loop {
            action = match action {
                Action::Connect { attempt } => match self.open(attempt, &mut shutdown).await {
                    Opened::Stream(frames) => match self.apply(LinkEvent::ConnectSucceeded) {
                        Action::Receive => match self.pump(frames, &mut shutdown).await {
                            Ended::Disconnected => self.apply(LinkEvent::Disconnected),
                            Ended::Shutdown => self.apply(LinkEvent::Shutdown),
                        },
                        other => other,
                    },
                    Opened::Failed => self.apply(LinkEvent::ConnectFailed),
                    Opened::Shutdown => self.apply(LinkEvent::Shutdown),
                },
                Action::ArmTimer { generation } => {
                    debug!(
                        "reconnecting to {} in {:?}",
                        self.config.url, self.config.reconnect_delay
                    );
                    tokio::select! {
                        () = stopped(&mut shutdown) => self.apply(LinkEvent::Shutdown),
                        () = sleep(self.config.reconnect_delay) => {
                            self.apply(LinkEvent::TimerFired { generation })
                        }
                    }
                }
                Action::Receive | Action::Ignore => {
                    warn!(
                        "stream driver for {} has no follow-up for {:?} in {}; idling until shutdown",
                        self.config.url,
                        action,
                        self.machine.state()
                    );
                    stopped(&mut shutdown).await;
                    self.apply(LinkEvent::Shutdown)
                }
                Action::Stop => break,
            };
        }

        debug!("stream driver for {} stopped", self.config.url);
    }

    fn apply(&mut self, event: LinkEvent) -> Action {
        let action = self.machine.handle(event);
        let next = self.machine.state();
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        action
    }

    async fn open(&self, attempt: u64, shutdown: &mut watch::Receiver<bool>) -> Opened {
        info!("connecting to {} (attempt {})", self.config.url, attempt);
        let connect = connect_within(
            self.connector.as_ref(),
            &self.config.url,
            self.config.connect_timeout,
        );

        tokio::select! {
            () = stopped(shutdown) => Opened::Shutdown,
            result = connect => match result {
                Ok(frames) => {
                    info!("connected to {}", self.config.url);
                    Opened::Stream(frames)
                }
                Err(error) => {
                    warn!("connection to {} failed: {}", self.config.url, error);
                    Opened::Failed
                }
            },
        }
    }

    async fn pump(&self, mut frames: FrameStream, shutdown: &mut watch::Receiver<bool>) -> Ended {
        loop {
            let next = tokio::select! {
                () = stopped(shutdown) => return Ended::Shutdown,
                next = frames.next() => next,
            };

            match next {
                Some(Ok(TransportFrame::Text(text))) => self.dispatch(&text),
                Some(Ok(TransportFrame::Control)) => {}
                Some(Ok(TransportFrame::Closed)) => {
                    warn!("stream {} closed by remote; reconnecting", self.config.url);
                    return Ended::Disconnected;
                }
                Some(Err(error)) => {
                    warn!("stream {} read error: {}; reconnecting", self.config.url, error);
                    return Ended::Disconnected;
                }
                None => {
                    warn!("stream {} ended; reconnecting", self.config.url);
                    return Ended::Disconnected;
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match decode_frame(text) {
            Ok(state) => {
                let delivered = self.registry.broadcast(&state);
                debug!("delivered {} frame to {} subscribers", state.status, delivered);
            }
            Err(error) => {
                warn!("dropping malformed frame from {}: {}", self.config.url, error);
            }
        }
    }
}

/// One connection attempt bounded by `limit`.
async fn connect_within(connector: &dyn Connector, url: &Url, limit: Duration) -> Result<FrameStream> {
    timeout(limit, connector.connect(url))
        .await
        .map_err(|_| ClientError::Timeout(limit))?
}

/// Resolves once shutdown is requested or the client is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}
