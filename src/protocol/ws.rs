// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Push channel lifecycle: connect, subscribe, read, reconnect.
//!
//! [`ConnectionManager`] owns a background task that keeps one WebSocket
//! to the cloud push endpoint alive. Reconnection uses a fixed delay and a
//! hard attempt cap; once the cap is exceeded the manager enters the
//! terminal [`ConnectionState::FatallyStopped`] state and never retries
//! again. Inbound frames are classified and handed to the consumer in
//! arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;

use crate::config::{CloudConfig, ReconnectPolicy};
use crate::error::{ProtocolError, Result};
use crate::event::{EventBus, SyncEvent};

use super::frame::{self, PushFrame};

/// State of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none being attempted.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Connected and subscribed.
    Open,
    /// Connection lost; retrying with the numbered attempt.
    Reconnecting {
        /// The attempt about to be made (1-based).
        attempt: u32,
    },
    /// The attempt cap was exceeded. Terminal: no further retries.
    FatallyStopped,
}

impl ConnectionState {
    /// Returns `true` when the channel is connected and subscribed.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` when no further connection attempts will be made.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FatallyStopped)
    }
}

/// A single-purpose restartable timer.
///
/// Spawning a new timer for the slot aborts the one already running, so
/// at most one timer per purpose is ever pending.
#[derive(Debug, Default)]
struct TimerSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerSlot {
    fn spawn_replacing<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.handle.lock();
        if let Some(old) = slot.take() {
            old.abort();
        }
        *slot = Some(tokio::spawn(future));
    }

    fn cancel(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

/// Shared pieces of the connection loop, visible to both the manager and
/// the background task.
#[derive(Debug)]
struct Shared {
    state_tx: watch::Sender<ConnectionState>,
    events: EventBus,
    /// Attempts made since the last successful open.
    attempt: AtomicU32,
    /// Set once any connection has opened; later retries are labeled
    /// reconnects even though the counter restarts from zero.
    ever_opened: AtomicBool,
    /// Set while a fresh connection is inside the post-open grace period.
    settling: AtomicBool,
    grace_timer: TimerSlot,
    cancel: CancellationToken,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let previous = *self.state_tx.borrow();
        if previous == state {
            return;
        }
        tracing::info!(?previous, ?state, "push channel state changed");
        self.state_tx.send_replace(state);
        self.events.publish(SyncEvent::ConnectionChanged { state });
    }
}

/// Manages the lifetime of the push channel.
///
/// Construction hands back the manager plus the receiver carrying
/// classified [`PushFrame`]s in arrival order. [`connect`](Self::connect)
/// spawns the background loop; [`disconnect`](Self::disconnect) tears it
/// down and suppresses any further reconnection.
#[derive(Debug)]
pub struct ConnectionManager {
    websocket_url: String,
    token: String,
    user_id: String,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    post_open_grace: Duration,
    shared: Arc<Shared>,
    frame_tx: mpsc::UnboundedSender<PushFrame>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Creates a manager for the configured endpoint.
    ///
    /// Returns the manager and the frame receiver. Dropping the receiver
    /// does not stop the connection; frames are then discarded.
    #[must_use]
    pub fn new(
        config: &CloudConfig,
        events: EventBus,
    ) -> (Self, mpsc::UnboundedReceiver<PushFrame>) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let manager = Self {
            websocket_url: config.websocket_url().to_string(),
            token: config.token().to_string(),
            user_id: config.user_id().to_string(),
            policy: config.reconnect().clone(),
            connect_timeout: config.connect_timeout(),
            post_open_grace: config.post_open_grace(),
            shared: Arc::new(Shared {
                state_tx,
                events,
                attempt: AtomicU32::new(0),
                ever_opened: AtomicBool::new(false),
                settling: AtomicBool::new(false),
                grace_timer: TimerSlot::default(),
                cancel: CancellationToken::new(),
            }),
            frame_tx,
            task: Mutex::new(None),
        };
        (manager, frame_rx)
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Returns a watch receiver tracking connection state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Returns `true` while a freshly opened channel is inside its grace
    /// period.
    ///
    /// During this window the cloud may still be replaying state, so
    /// consumers that react to flapping (presence toggles, reconnect
    /// banners) can choose to hold off.
    #[must_use]
    pub fn is_settling(&self) -> bool {
        self.shared.settling.load(Ordering::SeqCst)
    }

    /// Starts the connection loop and waits for the channel to open.
    ///
    /// Returns `Ok(true)` once the channel is open and subscribed, or
    /// `Ok(false)` if it did not open within the connect timeout; the
    /// background loop keeps retrying either way, up to the attempt cap.
    /// Calling this while the loop is already running is a no-op that
    /// reports the current state.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidAddress`] if the endpoint URL is
    /// not a valid URI.
    pub async fn connect(&self) -> Result<bool> {
        // Validate eagerly so a bad URL is an error, not an endless retry.
        self.websocket_url
            .parse::<tungstenite::http::Uri>()
            .map_err(|e| ProtocolError::InvalidAddress(e.to_string()))?;

        {
            let mut task = self.task.lock();
            if task.as_ref().is_some_and(|t| !t.is_finished()) {
                return Ok(self.state().is_open());
            }

            let conn_loop = ConnLoop {
                websocket_url: self.websocket_url.clone(),
                token: self.token.clone(),
                user_id: self.user_id.clone(),
                policy: self.policy.clone(),
                connect_timeout: self.connect_timeout,
                post_open_grace: self.post_open_grace,
                shared: Arc::clone(&self.shared),
                frame_tx: self.frame_tx.clone(),
            };
            *task = Some(tokio::spawn(conn_loop.run()));
        }

        let mut state_rx = self.shared.state_tx.subscribe();
        let opened = tokio::time::timeout(
            self.connect_timeout,
            state_rx.wait_for(|s| s.is_open() || s.is_terminal()),
        )
        .await;

        match opened {
            Ok(Ok(state)) => Ok(state.is_open()),
            // Watch channel closed (loop gone) or timeout: not open yet.
            Ok(Err(_)) | Err(_) => Ok(false),
        }
    }

    /// Disconnects and suppresses any further reconnection.
    ///
    /// Safe to call repeatedly and regardless of current state. The order
    /// matters: the reconnect suppression is set before any timer or the
    /// socket is torn down, so no step of the teardown can schedule a new
    /// attempt.
    pub async fn disconnect(&self) {
        self.shared.cancel.cancel();
        self.shared.grace_timer.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await
                && !e.is_cancelled()
            {
                tracing::warn!(error = %e, "connection task ended abnormally");
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
    }
}

/// Owned state moved into the background connection task.
struct ConnLoop {
    websocket_url: String,
    token: String,
    user_id: String,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    post_open_grace: Duration,
    shared: Arc<Shared>,
    frame_tx: mpsc::UnboundedSender<PushFrame>,
}

impl ConnLoop {
    /// Main loop: connect, read until the socket drops, delay, retry.
    async fn run(self) {
        loop {
            if self.shared.cancel.is_cancelled() {
                break;
            }

            let attempt = self.shared.attempt.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > self.policy.max_attempts {
                tracing::error!(
                    max_attempts = self.policy.max_attempts,
                    "reconnection attempt cap exceeded, stopping for good"
                );
                self.shared.set_state(ConnectionState::FatallyStopped);
                return;
            }

            // Once any connection has opened, every later attempt is a
            // reconnect, even with the counter back at one.
            let first_ever =
                attempt == 1 && !self.shared.ever_opened.load(Ordering::SeqCst);
            self.shared.set_state(if first_ever {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting { attempt }
            });

            match self.connect_and_read().await {
                Ok(()) => tracing::info!("push channel closed"),
                Err(e) => tracing::warn!(error = %e, attempt, "push channel error"),
            }

            if self.shared.cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;
                () = self.shared.cancel.cancelled() => break,
                () = tokio::time::sleep(self.policy.delay) => {}
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// One connection lifetime: open, subscribe, read until closed.
    ///
    /// The connect timeout only bounds the handshake; once the channel is
    /// open this future runs until the socket drops or teardown.
    async fn connect_and_read(&self) -> std::result::Result<(), ProtocolError> {
        let uri: tungstenite::http::Uri = self
            .websocket_url
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| {
                ProtocolError::InvalidAddress(e.to_string())
            })?;
        let request = ClientRequestBuilder::new(uri).with_header("Authorization", &self.token);

        tracing::info!(url = %self.websocket_url, "connecting to push endpoint");
        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| {
                    ProtocolError::Timeout(
                        u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX),
                    )
                })??;

        let (mut write, mut read) = ws_stream.split();

        write
            .send(tungstenite::Message::Text(
                frame::subscribe_frame(&self.user_id).into(),
            ))
            .await?;
        tracing::info!("push channel open, device list subscription sent");

        self.shared.set_state(ConnectionState::Open);
        // A successful open restores the full retry budget.
        self.shared.ever_opened.store(true, Ordering::SeqCst);
        self.shared.attempt.store(0, Ordering::SeqCst);
        self.start_grace_timer();

        loop {
            tokio::select! {
                biased;
                () = self.shared.cancel.cancelled() => {
                    let _ = write.send(tungstenite::Message::Close(None)).await;
                    return Ok(());
                }
                message = read.next() => {
                    match message {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            self.dispatch(&text);
                        }
                        Some(Ok(tungstenite::Message::Ping(_))) => {
                            // tungstenite answers pongs itself
                            tracing::trace!("transport ping");
                        }
                        Some(Ok(tungstenite::Message::Close(close))) => {
                            if let Some(ref cf) = close {
                                tracing::info!(code = %cf.code, reason = %cf.reason, "close frame received");
                            } else {
                                tracing::info!("close frame received");
                            }
                            return Ok(());
                        }
                        Some(Err(e)) => return Err(ProtocolError::WebSocket(e)),
                        None => {
                            tracing::info!("push channel stream ended");
                            return Ok(());
                        }
                        // Binary, Pong, raw frames
                        _ => {}
                    }
                }
            }
        }
    }

    /// Classifies a text frame and forwards the results in order.
    fn dispatch(&self, text: &str) {
        match frame::classify(text) {
            Ok(frames) => {
                for f in frames {
                    // A dropped receiver means the consumer is gone;
                    // frames are discarded but the connection stays up.
                    let _ = self.frame_tx.send(f);
                }
            }
            Err(e) => tracing::debug!(error = %e, "discarding malformed push frame"),
        }
    }

    /// Arms the post-open grace timer.
    ///
    /// The settling flag stays set for the grace period after an open;
    /// [`ConnectionManager::is_settling`] lets consumers damp reactions to
    /// state the cloud replays over a just-(re)opened channel.
    fn start_grace_timer(&self) {
        let shared = Arc::clone(&self.shared);
        let grace = self.post_open_grace;
        shared.settling.store(true, Ordering::SeqCst);
        self.shared.grace_timer.spawn_replacing(async move {
            tokio::time::sleep(grace).await;
            shared.settling.store(false, Ordering::SeqCst);
            tracing::debug!("push channel settled");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> CloudConfig {
        CloudConfig::new("tok", "user").with_websocket_url(url)
    }

    #[test]
    fn state_predicates() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Connecting.is_open());
        assert!(ConnectionState::FatallyStopped.is_terminal());
        assert!(!ConnectionState::Reconnecting { attempt: 2 }.is_terminal());
    }

    #[tokio::test]
    async fn invalid_url_is_an_error() {
        let (manager, _rx) = ConnectionManager::new(&config("not a url"), EventBus::new());
        assert!(manager.connect().await.is_err());
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let (manager, _rx) = ConnectionManager::new(
            &config("wss://example.test/cable"),
            EventBus::new(),
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_settling());
    }

    #[tokio::test]
    async fn disconnect_before_connect_is_a_noop() {
        let (manager, _rx) = ConnectionManager::new(
            &config("wss://example.test/cable"),
            EventBus::new(),
        );
        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn attempt_cap_leads_to_fatal_stop() {
        // Nothing listens on this port, so every attempt fails fast.
        let config = CloudConfig::new("tok", "user")
            .with_websocket_url("ws://127.0.0.1:1/cable")
            .with_connect_timeout(Duration::from_millis(200))
            .with_reconnect_policy(ReconnectPolicy {
                delay: Duration::from_millis(10),
                max_attempts: 3,
            });

        let events = EventBus::new();
        let mut event_rx = events.subscribe();
        let (manager, _rx) = ConnectionManager::new(&config, events);
        let mut state_rx = manager.subscribe_state();

        assert!(!manager.connect().await.unwrap());

        let state = tokio::time::timeout(
            Duration::from_secs(5),
            state_rx.wait_for(|s| s.is_terminal()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(*state, ConnectionState::FatallyStopped);

        // The loop task has exited: no retry is scheduled past the cap.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.state(), ConnectionState::FatallyStopped);

        // Every transition was published, ending in the terminal state.
        let mut last = None;
        while let Ok(event) = event_rx.try_recv() {
            if let SyncEvent::ConnectionChanged { state } = event {
                last = Some(state);
            }
        }
        assert_eq!(last, Some(ConnectionState::FatallyStopped));
    }

    #[tokio::test]
    async fn open_sends_subscribe_and_delivers_frames() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            // The subscribe command is the first thing on the wire.
            let subscribe = ws.next().await.unwrap().unwrap().into_text().unwrap();
            let parsed: serde_json::Value = serde_json::from_str(&subscribe).unwrap();
            assert_eq!(parsed["command"], "subscribe");
            let identifier: serde_json::Value =
                serde_json::from_str(parsed["identifier"].as_str().unwrap()).unwrap();
            assert_eq!(identifier["wx_user_id"], "user");

            ws.send(tungstenite::Message::Text(
                r#"{"message":{"device_id":"d-1","act_arr":[{"act":"source","val":"on"}]}}"#
                    .into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        });

        let config = CloudConfig::new("tok", "user")
            .with_websocket_url(format!("ws://{addr}/cable"))
            .with_connect_timeout(Duration::from_secs(5))
            .with_reconnect_policy(ReconnectPolicy {
                delay: Duration::from_secs(60),
                max_attempts: 30,
            });

        let (manager, mut frames) = ConnectionManager::new(&config, EventBus::new());
        let mut state_rx = manager.subscribe_state();

        assert!(manager.connect().await.unwrap());

        let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            frame,
            PushFrame::DeviceUpdate { ref device_id, .. } if device_id == "d-1"
        ));

        // The server-side close is not caller-initiated: the loop goes back
        // into retry, and having opened once it reports a reconnect even
        // though the counter restarted.
        let state = tokio::time::timeout(
            Duration::from_secs(5),
            state_rx.wait_for(|s| matches!(s, ConnectionState::Reconnecting { .. })),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(*state, ConnectionState::Reconnecting { attempt: 1 });

        server.await.unwrap();
        manager.disconnect().await;
    }

    #[tokio::test]
    async fn successful_open_resets_the_attempt_counter() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Complete every handshake, then drop the connection at once.
        let server = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    drop(ws);
                }
            }
        });

        let config = CloudConfig::new("tok", "user")
            .with_websocket_url(format!("ws://{addr}/cable"))
            .with_connect_timeout(Duration::from_secs(5))
            .with_post_open_grace(Duration::from_secs(60))
            .with_reconnect_policy(ReconnectPolicy {
                delay: Duration::from_millis(10),
                max_attempts: 3,
            });

        let (manager, _frames) = ConnectionManager::new(&config, EventBus::new());
        let mut state_rx = manager.subscribe_state();

        assert!(manager.connect().await.unwrap());

        // Far more open/drop cycles than the cap allows in a row. Every
        // open restores the full budget, so the terminal state must never
        // be reached no matter how quickly the server drops us.
        let mut opens = 0;
        while opens < 8 {
            tokio::time::timeout(Duration::from_secs(5), state_rx.changed())
                .await
                .unwrap()
                .unwrap();
            let state = *state_rx.borrow_and_update();
            assert!(
                !state.is_terminal(),
                "attempt cap hit despite successful opens"
            );
            if state.is_open() {
                opens += 1;
            }
        }

        manager.disconnect().await;
        server.abort();
    }

    #[tokio::test]
    async fn disconnect_suppresses_reconnection() {
        let config = CloudConfig::new("tok", "user")
            .with_websocket_url("ws://127.0.0.1:1/cable")
            .with_connect_timeout(Duration::from_millis(200))
            .with_reconnect_policy(ReconnectPolicy {
                delay: Duration::from_secs(60),
                max_attempts: 30,
            });

        let (manager, _rx) = ConnectionManager::new(&config, EventBus::new());
        let _ = manager.connect().await.unwrap();

        // The loop is parked in its retry delay; disconnect must cut it.
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
