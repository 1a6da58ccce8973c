//! Session lifecycle manager — owns the single transport connection.
//!
//! States: `Disconnected → Connecting → Open → Closed → Connecting …`.
//! A closure reported as "logged out" is terminal and parks the manager in
//! `Disconnected`; anything else reconnects after the reconnect policy's
//! delay. Consumers never hold on to the connection: they ask for
//! [`SessionManager::current_session`] on every send.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use comanda_core::bus::{InboundMessage, MessageBus, MessageLog};
use comanda_core::config::schema::SessionConfig;
use comanda_core::config::{ReconnectConfig, ReconnectMode};

use crate::credentials::CredentialStore;
use crate::transport::{CloseReason, SessionHandle, Transport, TransportEvent};

// ─────────────────────────────────────────────
// State
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// The connection currently usable for sends.
#[derive(Clone)]
pub struct ActiveSession {
    /// Increments with every established connection.
    pub generation: u64,
    pub handle: Arc<dyn SessionHandle>,
}

/// Callback for credential changes.
pub type CredentialsHandler = Arc<dyn Fn(&Value) + Send + Sync>;

// ─────────────────────────────────────────────
// Reconnect policy
// ─────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    mode: ReconnectMode,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    min_delay: Duration,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            mode: config.mode,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier.max(1.0),
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_attempts: config.max_attempts,
        }
    }

    /// Wait before the next attempt after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        let delay = match self.mode {
            ReconnectMode::Immediate => Duration::ZERO,
            ReconnectMode::Backoff => {
                let exponent = failures.saturating_sub(1).min(32) as i32;
                let ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
                let capped = ms.min(self.max_delay.as_millis() as f64);
                Duration::from_millis(capped as u64)
            }
        };
        delay.max(self.min_delay)
    }

    pub fn gives_up_after(&self, failures: u32) -> bool {
        self.max_attempts > 0 && failures >= self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

// ─────────────────────────────────────────────
// SessionManager
// ─────────────────────────────────────────────

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    bus: Arc<MessageBus>,
    log: Arc<MessageLog>,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    state: watch::Sender<SessionState>,
    active: Mutex<Option<ActiveSession>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    credential_handlers: Mutex<Vec<CredentialsHandler>>,
    generation: AtomicU64,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        bus: Arc<MessageBus>,
        log: Arc<MessageLog>,
        config: &SessionConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            transport,
            credentials,
            bus,
            log,
            policy: ReconnectPolicy::from_config(&config.reconnect),
            connect_timeout: config.connect_timeout(),
            state,
            active: Mutex::new(None),
            driver: Mutex::new(None),
            credential_handlers: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Start connecting. No-op while a session is connecting or open.
    pub fn connect(self: &Arc<Self>) {
        let mut driver = lock(&self.driver);
        if driver.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!(state = %self.state(), "session already running, connect ignored");
            return;
        }

        self.set_state(SessionState::Connecting);
        let this = Arc::clone(self);
        *driver = Some(tokio::spawn(async move { this.drive().await }));
    }

    /// Register a callback for credential updates. Handlers run in
    /// registration order, once per update, after the store has saved it.
    pub fn on_credentials_changed<F>(&self, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        lock(&self.credential_handlers).push(Arc::new(handler));
    }

    /// The open connection, if any.
    pub fn current_session(&self) -> Option<ActiveSession> {
        if self.state() != SessionState::Open {
            return None;
        }
        lock(&self.active).clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Open
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Wait until the session is open, it gives up, or `timeout` elapses.
    pub async fn wait_until_open(&self, timeout: Duration) -> bool {
        let mut rx = self.subscribe();
        let settled = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| matches!(s, SessionState::Open | SessionState::Disconnected)),
        )
        .await
        .is_ok_and(|r| r.is_ok());
        settled && self.is_connected()
    }

    /// Stop the driver and close the connection.
    pub async fn shutdown(&self) {
        let driver = lock(&self.driver).take();
        if let Some(driver) = driver {
            driver.abort();
        }

        let active = lock(&self.active).take();
        if let Some(session) = active {
            session.handle.close().await;
        }

        self.set_state(SessionState::Disconnected);
        info!(transport = self.transport.name(), "session shut down");
    }

    fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "session state change");
            *current = next;
            true
        });
    }

    /// Connection loop: connect, pump events, classify the closure, wait, repeat.
    async fn drive(self: Arc<Self>) {
        let mut failures: u32 = 0;

        loop {
            self.set_state(SessionState::Connecting);
            let stored = self.credentials.load();

            // Covers both the handshake and the wait for the first `Opened`.
            let deadline = Instant::now() + self.connect_timeout;
            let attempt = tokio::time::timeout_at(deadline, self.transport.connect(stored)).await;

            let (reason, was_open) = match attempt {
                Ok(Ok((handle, events))) => {
                    let outcome = self
                        .run_connection(Arc::clone(&handle), events, deadline, &mut failures)
                        .await;
                    lock(&self.active).take();
                    handle.close().await;
                    outcome
                }
                Ok(Err(e)) => (CloseReason::new(None, e.to_string()), false),
                Err(_) => (
                    CloseReason::new(
                        None,
                        format!("connect timed out after {:?}", self.connect_timeout),
                    ),
                    false,
                ),
            };

            if reason.is_terminal() {
                warn!(
                    transport = self.transport.name(),
                    reason = %reason,
                    "session logged out, not reconnecting"
                );
                self.park();
                return;
            }

            if was_open {
                self.set_state(SessionState::Closed);
            }

            failures = failures.saturating_add(1);
            if self.policy.gives_up_after(failures) {
                error!(
                    transport = self.transport.name(),
                    attempts = failures,
                    reason = %reason,
                    "giving up on reconnecting"
                );
                self.park();
                return;
            }

            let delay = self.policy.delay(failures);
            warn!(
                transport = self.transport.name(),
                reason = %reason,
                attempt = failures,
                delay = ?delay,
                "session unavailable, reconnecting"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Driver exit: forget the driver task and settle in `Disconnected`.
    ///
    /// Both happen under the driver lock so a `connect` that observes
    /// `Disconnected` always starts a new driver.
    fn park(&self) {
        let mut driver = lock(&self.driver);
        driver.take();
        self.set_state(SessionState::Disconnected);
    }

    /// Process one connection's events until it closes. Until the first
    /// `Opened`, events are only awaited up to `deadline`.
    ///
    /// Returns the closure reason and whether the connection ever opened.
    async fn run_connection(
        &self,
        handle: Arc<dyn SessionHandle>,
        mut events: mpsc::Receiver<TransportEvent>,
        deadline: Instant,
        failures: &mut u32,
    ) -> (CloseReason, bool) {
        let mut opened = false;

        loop {
            let next = if opened {
                events.recv().await
            } else {
                match tokio::time::timeout_at(deadline, events.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let message =
                            format!("session did not open within {:?}", self.connect_timeout);
                        return (CloseReason::new(None, message), false);
                    }
                }
            };
            let Some(event) = next else {
                break;
            };

            match event {
                TransportEvent::Opened => {
                    opened = true;
                    *failures = 0;
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                    *lock(&self.active) = Some(ActiveSession {
                        generation,
                        handle: Arc::clone(&handle),
                    });
                    self.set_state(SessionState::Open);
                    info!(transport = self.transport.name(), generation, "session open");
                }
                TransportEvent::Closed(reason) => return (reason, opened),
                TransportEvent::CredentialsUpdated(creds) => self.handle_credentials(&creds),
                TransportEvent::Message(msg) => self.handle_message(msg).await,
                TransportEvent::Qr => {
                    info!("scan the QR code shown by the bridge to link this device");
                }
            }
        }

        (CloseReason::new(None, "event stream ended"), opened)
    }

    fn handle_credentials(&self, creds: &Value) {
        if let Err(e) = self.credentials.save(creds) {
            error!(error = %e, "failed to persist credentials");
        }

        let handlers = lock(&self.credential_handlers).clone();
        for handler in handlers {
            handler(creds);
        }
    }

    async fn handle_message(&self, msg: InboundMessage) {
        self.log.record(msg.clone());
        if let Err(e) = self.bus.publish_inbound(msg).await {
            error!(error = %e, "failed to publish inbound message to bus");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{MockHandle, MockTransport};
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct MemoryStore {
        stored: Mutex<Option<Value>>,
        saved: Mutex<Vec<Value>>,
    }

    impl CredentialStore for MemoryStore {
        fn load(&self) -> Option<Value> {
            self.stored.lock().unwrap().clone()
        }

        fn save(&self, credentials: &Value) -> anyhow::Result<()> {
            *self.stored.lock().unwrap() = Some(credentials.clone());
            self.saved.lock().unwrap().push(credentials.clone());
            Ok(())
        }
    }

    struct Harness {
        manager: Arc<SessionManager>,
        bus: Arc<MessageBus>,
        log: Arc<MessageLog>,
        store: Arc<MemoryStore>,
    }

    fn harness(transport: Arc<dyn Transport>, reconnect: ReconnectConfig) -> Harness {
        let bus = Arc::new(MessageBus::new(16));
        let log = Arc::new(MessageLog::new(16));
        let store = Arc::new(MemoryStore::default());
        let config = SessionConfig {
            reconnect,
            ..SessionConfig::default()
        };
        let manager = Arc::new(SessionManager::new(
            transport,
            store.clone(),
            bus.clone(),
            log.clone(),
            &config,
        ));
        Harness {
            manager,
            bus,
            log,
            store,
        }
    }

    fn closed(code: Option<u16>) -> TransportEvent {
        TransportEvent::Closed(CloseReason::new(code, "connection closed"))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // ── Reconnect policy ──

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(7), Duration::from_secs(60));
        assert_eq!(policy.delay(100), Duration::from_secs(60));
    }

    #[test]
    fn test_immediate_keeps_minimum_delay() {
        let policy = ReconnectPolicy::from_config(&ReconnectConfig {
            mode: ReconnectMode::Immediate,
            ..ReconnectConfig::default()
        });
        assert_eq!(policy.delay(1), Duration::from_millis(250));
        assert_eq!(policy.delay(50), Duration::from_millis(250));
    }

    #[test]
    fn test_backoff_respects_floor() {
        let policy = ReconnectPolicy::from_config(&ReconnectConfig {
            initial_delay_ms: 10,
            ..ReconnectConfig::default()
        });
        assert_eq!(policy.delay(1), Duration::from_millis(250));
    }

    #[test]
    fn test_unlimited_attempts_by_default() {
        let policy = ReconnectPolicy::default();
        assert!(!policy.gives_up_after(1_000));

        let limited = ReconnectPolicy::from_config(&ReconnectConfig {
            max_attempts: 3,
            ..ReconnectConfig::default()
        });
        assert!(!limited.gives_up_after(2));
        assert!(limited.gives_up_after(3));
    }

    // ── Lifecycle ──

    #[tokio::test(start_paused = true)]
    async fn test_initial_state() {
        let h = harness(Arc::new(MockTransport::default()), ReconnectConfig::default());
        assert_eq!(h.manager.state(), SessionState::Disconnected);
        assert!(!h.manager.is_connected());
        assert!(h.manager.current_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_exposes_session() {
        let transport = Arc::new(MockTransport::default());
        let tx = transport.script(Arc::new(MockHandle::default()));
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        assert_eq!(h.manager.state(), SessionState::Connecting);
        assert!(h.manager.current_session().is_none());

        tx.send(TransportEvent::Opened).await.unwrap();
        settle().await;

        assert_eq!(h.manager.state(), SessionState::Open);
        let session = h.manager.current_session().unwrap();
        assert_eq!(session.generation, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let transport = Arc::new(MockTransport::default());
        let tx = transport.script(Arc::new(MockHandle::default()));
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        h.manager.connect();
        tx.send(TransportEvent::Opened).await.unwrap();
        settle().await;
        h.manager.connect();
        settle().await;

        assert_eq!(transport.connects(), 1);
        assert!(h.manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recoverable_closure_reconnects() {
        let transport = Arc::new(MockTransport::default());
        let first = Arc::new(MockHandle::default());
        let tx1 = transport.script(first.clone());
        let tx2 = transport.script(Arc::new(MockHandle::default()));
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        tx1.send(TransportEvent::Opened).await.unwrap();
        settle().await;
        assert!(h.manager.is_connected());

        tx1.send(closed(Some(428))).await.unwrap();
        settle().await;
        assert_eq!(h.manager.state(), SessionState::Closed);
        assert!(h.manager.current_session().is_none());
        assert!(first.closed.load(Ordering::SeqCst));

        tx2.send(TransportEvent::Opened).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(transport.connects(), 2);
        assert!(h.manager.is_connected());
        assert_eq!(h.manager.current_session().unwrap().generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_is_recoverable() {
        let transport = Arc::new(MockTransport::default());
        let tx1 = transport.script(Arc::new(MockHandle::default()));
        let tx2 = transport.script(Arc::new(MockHandle::default()));
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        tx1.send(TransportEvent::Opened).await.unwrap();
        settle().await;

        drop(tx1);
        tx2.send(TransportEvent::Opened).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(transport.connects(), 2);
        assert!(h.manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logged_out_is_terminal() {
        let transport = Arc::new(MockTransport::default());
        let handle = Arc::new(MockHandle::default());
        let tx = transport.script(handle.clone());
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        tx.send(TransportEvent::Opened).await.unwrap();
        settle().await;

        tx.send(closed(Some(401))).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(h.manager.state(), SessionState::Disconnected);
        assert_eq!(transport.connects(), 1);
        assert!(h.manager.current_session().is_none());
        assert!(handle.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_after_terminal_starts_again() {
        let transport = Arc::new(MockTransport::default());
        let tx1 = transport.script(Arc::new(MockHandle::default()));
        let tx2 = transport.script(Arc::new(MockHandle::default()));
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        tx1.send(closed(Some(401))).await.unwrap();
        settle().await;
        assert_eq!(h.manager.state(), SessionState::Disconnected);

        tx2.send(TransportEvent::Opened).await.unwrap();
        h.manager.connect();
        settle().await;

        assert_eq!(transport.connects(), 2);
        assert!(h.manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connects_back_off() {
        let transport = Arc::new(MockTransport::default());
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();

        // Attempts at t=0, 1s, 3s, 7s.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(transport.connects(), 2);
        assert_eq!(h.manager.state(), SessionState::Connecting);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(transport.connects(), 3);

        tokio::time::sleep(Duration::from_millis(4_000)).await;
        assert_eq!(transport.connects(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_mode_reconnects_at_minimum_delay() {
        let transport = Arc::new(MockTransport::default());
        let h = harness(
            transport.clone(),
            ReconnectConfig {
                mode: ReconnectMode::Immediate,
                ..ReconnectConfig::default()
            },
        );

        h.manager.connect();
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        // t=0, 250, 500, 750, 1000 ms
        assert_eq!(transport.connects(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let transport = Arc::new(MockTransport::default());
        let h = harness(
            transport.clone(),
            ReconnectConfig {
                max_attempts: 3,
                ..ReconnectConfig::default()
            },
        );

        h.manager.connect();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.connects(), 3);
        assert_eq!(h.manager.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_bounds_attempt() {
        #[derive(Default)]
        struct HangingTransport {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl Transport for HangingTransport {
            async fn connect(
                &self,
                _credentials: Option<Value>,
            ) -> Result<(Arc<dyn SessionHandle>, mpsc::Receiver<TransportEvent>), TransportError>
            {
                self.calls.fetch_add(1, Ordering::SeqCst);
                std::future::pending().await
            }

            fn name(&self) -> &str {
                "hanging"
            }
        }

        let transport = Arc::new(HangingTransport::default());
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        // Times out at 60s, retries 1s later.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.manager.state(), SessionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_covers_wait_for_open() {
        let transport = Arc::new(MockTransport::default());
        let handle = Arc::new(MockHandle::default());
        // Accepted, but the bridge never reports the session as open.
        let _silent = transport.script(handle.clone());
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(transport.connects(), 1);
        assert!(!handle.closed.load(Ordering::SeqCst));

        // Gives up on the attempt at 60s, retries 1s later.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(handle.closed.load(Ordering::SeqCst));
        assert_eq!(transport.connects(), 2);
        assert_eq!(h.manager.state(), SessionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_does_not_apply_once_open() {
        let transport = Arc::new(MockTransport::default());
        let tx = transport.script(Arc::new(MockHandle::default()));
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        tx.send(TransportEvent::Opened).await.unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(transport.connects(), 1);
        assert!(h.manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closure_before_open_stays_connecting() {
        let transport = Arc::new(MockTransport::default());
        let tx1 = transport.script(Arc::new(MockHandle::default()));
        let tx2 = transport.script(Arc::new(MockHandle::default()));
        let h = harness(transport.clone(), ReconnectConfig::default());

        let mut states = h.manager.subscribe();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                sink.lock().unwrap().push(state);
            }
        });

        h.manager.connect();
        tx1.send(closed(Some(428))).await.unwrap();
        settle().await;
        assert_eq!(h.manager.state(), SessionState::Connecting);

        tx2.send(TransportEvent::Opened).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(h.manager.is_connected());
        assert!(!seen.lock().unwrap().contains(&SessionState::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_right_after_terminal_is_not_ignored() {
        let transport = Arc::new(MockTransport::default());
        let tx1 = transport.script(Arc::new(MockHandle::default()));
        let tx2 = transport.script(Arc::new(MockHandle::default()));
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        let mut states = h.manager.subscribe();
        tx1.send(closed(Some(401))).await.unwrap();
        states
            .wait_for(|s| *s == SessionState::Disconnected)
            .await
            .unwrap();

        // No yield between observing `Disconnected` and reconnecting.
        h.manager.connect();
        assert_eq!(h.manager.state(), SessionState::Connecting);

        tx2.send(TransportEvent::Opened).await.unwrap();
        settle().await;
        assert_eq!(transport.connects(), 2);
        assert!(h.manager.is_connected());
    }

    // ── Events ──

    #[tokio::test(start_paused = true)]
    async fn test_credentials_saved_and_forwarded_in_order() {
        let transport = Arc::new(MockTransport::default());
        let tx = transport.script(Arc::new(MockHandle::default()));
        let h = harness(transport.clone(), ReconnectConfig::default());
        *h.store.stored.lock().unwrap() = Some(json!({ "n": 0 }));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        h.manager
            .on_credentials_changed(move |creds| sink.lock().unwrap().push(creds["n"].clone()));

        h.manager.connect();
        tx.send(TransportEvent::CredentialsUpdated(json!({ "n": 1 })))
            .await
            .unwrap();
        tx.send(TransportEvent::CredentialsUpdated(json!({ "n": 2 })))
            .await
            .unwrap();
        tx.send(TransportEvent::Opened).await.unwrap();
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2)]);
        assert_eq!(
            *h.store.saved.lock().unwrap(),
            vec![json!({ "n": 1 }), json!({ "n": 2 })]
        );
        assert_eq!(
            transport.credentials_seen.lock().unwrap()[0],
            Some(json!({ "n": 0 }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_are_logged_and_published() {
        let transport = Arc::new(MockTransport::default());
        let tx = transport.script(Arc::new(MockHandle::default()));
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        tx.send(TransportEvent::Opened).await.unwrap();
        tx.send(TransportEvent::Message(InboundMessage::text(
            "573001112233@s.whatsapp.net",
            "hola",
        )))
        .await
        .unwrap();
        settle().await;

        let msg = h.bus.consume_inbound().await.unwrap();
        assert_eq!(msg.text, "hola");
        assert_eq!(h.log.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_open() {
        let transport = Arc::new(MockTransport::default());
        let tx = transport.script(Arc::new(MockHandle::default()));
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        let manager = h.manager.clone();
        let waiter =
            tokio::spawn(async move { manager.wait_until_open(Duration::from_secs(5)).await });

        tx.send(TransportEvent::Opened).await.unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_open_times_out() {
        let h = harness(Arc::new(MockTransport::default()), ReconnectConfig::default());
        h.manager.connect();
        assert!(!h.manager.wait_until_open(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_and_stops() {
        let transport = Arc::new(MockTransport::default());
        let handle = Arc::new(MockHandle::default());
        let tx = transport.script(handle.clone());
        let h = harness(transport.clone(), ReconnectConfig::default());

        h.manager.connect();
        tx.send(TransportEvent::Opened).await.unwrap();
        settle().await;

        h.manager.shutdown().await;
        assert_eq!(h.manager.state(), SessionState::Disconnected);
        assert!(h.manager.current_session().is_none());
        assert!(handle.closed.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.connects(), 1);
    }
}
