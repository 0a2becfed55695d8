//! WebSocket session manager.
//!
//! Owns the single push-channel connection to the backend, the
//! reconnect state machine, and fan-out of incoming frames to at most
//! one registered [`SessionListener`] and one injected [`SessionSink`]
//! (the external observable store). The two are independent
//! subscribers, not a chain: the sink sees every parseable frame
//! regardless of what the listener filters.
//!
//! Reconnection uses a fixed delay and a bounded attempt counter. An
//! intentional [`close`](SessionManager::close) is marked on the state
//! machine before the socket is torn down, so the resulting close event
//! can never race into another reconnect.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::auth::AuthStore;
use crate::error::Error;

// ── Configuration ────────────────────────────────────────────────────

/// Reconnection policy for the push channel.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Whether unexpected closes trigger reconnection at all.
    pub reconnection: bool,

    /// Attempt counter ceiling. Once the counter passes it, the next
    /// close takes the exhaustion path instead of another schedule.
    pub attempt_ceiling: u32,

    /// Fixed delay between an unexpected close and the next connect.
    pub reconnect_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnection: true,
            attempt_ceiling: 10,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

// ── Push frame ───────────────────────────────────────────────────────

/// A parsed frame from the push channel.
///
/// The backend sends JSON objects keyed by a numeric `Message`
/// discriminant; `Data` carries the per-message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushFrame {
    /// Numeric message discriminant. See [`MessageCode`].
    pub message: u32,

    /// Message payload, shape depends on the discriminant.
    #[serde(default)]
    pub data: Vec<Value>,

    /// Object or module that emitted the message.
    #[serde(default, rename = "SenderID")]
    pub sender_id: Option<i64>,

    /// Backend-side Unix timestamp.
    #[serde(default)]
    pub time_stamp: Option<i64>,
}

impl PushFrame {
    /// The known message code for this frame, if the discriminant is
    /// one the backend documents.
    pub fn code(&self) -> Option<MessageCode> {
        MessageCode::from_code(self.message)
    }
}

macro_rules! message_codes {
    ($($(#[$meta:meta])* $name:ident = $code:literal,)+) => {
        /// Known numeric discriminants of push-channel frames.
        ///
        /// Grouped by the backend subsystem that emits them; the raw
        /// `u32` stays available on [`PushFrame::message`] for frames
        /// outside this table.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum MessageCode {
            $($(#[$meta])* $name = $code,)+
        }

        impl MessageCode {
            /// Map a wire discriminant to its known message code.
            pub fn from_code(code: u32) -> Option<Self> {
                match code {
                    $($code => Some(Self::$name),)+
                    _ => None,
                }
            }
        }
    };
}

message_codes! {
    // Kernel lifecycle
    KernelCreated = 10101,
    KernelInit = 10102,
    KernelReady = 10103,
    KernelUninit = 10104,
    KernelShutdown = 10105,
    // Kernel log
    LogMessage = 10201,
    LogSuccess = 10202,
    LogNotify = 10203,
    LogWarning = 10204,
    LogError = 10205,
    LogDebug = 10206,
    LogCustom = 10207,
    // Module registry
    ModuleLoaded = 10301,
    ModuleUnloaded = 10302,
    // Object manager
    ObjectRegistered = 10401,
    ObjectUnregistered = 10402,
    ObjectParentChanged = 10403,
    ObjectNameChanged = 10404,
    ObjectInfoChanged = 10405,
    ObjectTypeChanged = 10406,
    ObjectSummaryChanged = 10407,
    ObjectPositionChanged = 10408,
    ObjectReadOnlyChanged = 10409,
    ObjectHiddenChanged = 10410,
    ObjectIconChanged = 10411,
    ObjectChildAdded = 10412,
    ObjectChildRemoved = 10413,
    ObjectIdentChanged = 10414,
    ObjectDisabledChanged = 10415,
    // Instance manager
    InstanceCreated = 10501,
    InstanceDeleted = 10502,
    InstanceConnected = 10503,
    InstanceDisconnected = 10504,
    InstanceStatusChanged = 10505,
    InstanceSettingsChanged = 10506,
    InstanceSearchStarted = 10511,
    InstanceSearchStopped = 10512,
    InstanceSearchUpdated = 10513,
    // Variable manager
    VariableCreated = 10601,
    VariableDeleted = 10602,
    VariableUpdated = 10603,
    VariableProfileNameChanged = 10604,
    VariableProfileActionChanged = 10605,
    // Script manager
    ScriptCreated = 10701,
    ScriptDeleted = 10702,
    ScriptFileChanged = 10703,
    /// Also emitted for plain script updates — the backend reuses the
    /// discriminant for both.
    ScriptBroken = 10704,
    // Event manager
    EventCreated = 10801,
    EventDeleted = 10802,
    EventUpdated = 10803,
    EventActiveChanged = 10804,
    EventLimitChanged = 10805,
    EventScriptChanged = 10806,
    EventTriggerChanged = 10807,
    EventTriggerValueChanged = 10808,
    EventTriggerExecutionChanged = 10809,
    EventCyclicChanged = 10810,
    EventCyclicDateFromChanged = 10811,
    EventCyclicDateToChanged = 10812,
    EventCyclicTimeFromChanged = 10813,
    EventCyclicTimeToChanged = 10814,
    EventScheduleActionAdded = 10815,
    EventScheduleActionRemoved = 10816,
    EventScheduleActionChanged = 10817,
    EventScheduleGroupAdded = 10818,
    EventScheduleGroupRemoved = 10819,
    EventScheduleGroupChanged = 10820,
    EventScheduleGroupPointAdded = 10821,
    EventScheduleGroupPointRemoved = 10822,
    EventScheduleGroupPointChanged = 10823,
    EventConditionAdded = 10824,
    EventConditionRemoved = 10825,
    EventConditionChanged = 10826,
    EventConditionVariableRuleAdded = 10827,
    EventConditionVariableRuleRemoved = 10828,
    EventConditionVariableRuleChanged = 10829,
    EventConditionDateRuleAdded = 10830,
    EventConditionDateRuleRemoved = 10831,
    EventConditionDateRuleChanged = 10832,
    EventConditionTimeRuleAdded = 10833,
    EventConditionTimeRuleRemoved = 10834,
    EventConditionTimeRuleChanged = 10835,
    // Media manager
    MediaCreated = 10901,
    MediaDeleted = 10902,
    MediaFileChanged = 10903,
    MediaAvailableChanged = 10904,
    MediaUpdated = 10905,
    MediaCachedChanged = 10906,
    // Link manager
    LinkCreated = 11001,
    LinkDeleted = 11002,
    LinkTargetChanged = 11003,
    // Instance interface connections
    FlowConnected = 11101,
    FlowDisconnected = 11102,
    FlowChildAdded = 11103,
    FlowChildRemoved = 11104,
    // Script engine
    ScriptEngineReloaded = 11201,
    ScriptExecuted = 11202,
    ScriptRunning = 11203,
    // Profile manager
    ProfileCreated = 11301,
    ProfileDeleted = 11302,
    ProfileTextChanged = 11303,
    ProfileValuesChanged = 11304,
    ProfileDigitsChanged = 11305,
    ProfileIconChanged = 11306,
    ProfileAssociationAdded = 11307,
    ProfileAssociationRemoved = 11308,
    ProfileAssociationChanged = 11309,
    // Timer pool
    TimerRegistered = 11401,
    TimerUnregistered = 11402,
    TimerIntervalChanged = 11403,
}

// ── Subscribers ──────────────────────────────────────────────────────

/// The single registered listener for push-channel events.
///
/// Declare a non-empty set via [`accepted_codes`](Self::accepted_codes)
/// to receive only matching parsed frames through
/// [`on_push`](Self::on_push); frames outside the set are silently
/// dropped for the listener. With no filter declared, raw text frames
/// arrive through [`on_message`](Self::on_message) instead.
pub trait SessionListener: Send + Sync {
    fn on_open(&self) {}

    /// Raw frame delivery when no code filter is declared.
    fn on_message(&self, _raw: &str) {}

    /// Codes this listener wants via `on_push`. Empty slice = no filter.
    fn accepted_codes(&self) -> &[MessageCode] {
        &[]
    }

    /// Filtered frame delivery.
    fn on_push(&self, _frame: &PushFrame) {}

    fn on_error(&self, _error: &Error) {}

    fn on_close(&self) {}

    /// A reconnect has been scheduled; fires before the delay elapses.
    fn on_reconnect(&self, _attempt: u32) {}

    fn on_reconnect_exhausted(&self) {}
}

/// The injected external store sink.
///
/// Receives every parseable frame unconditionally plus the session
/// lifecycle notifications, decoupling the core from any particular
/// state-management pattern on the consumer side.
pub trait SessionSink: Send + Sync {
    fn open(&self);
    fn push(&self, frame: &PushFrame);
    fn error(&self, error: &Error);
    fn closed(&self);
    fn reconnecting(&self, attempt: u32);
    fn exhausted(&self);
}

// ── Reconnect state machine ──────────────────────────────────────────

/// What follows an observed close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseAction {
    /// Terminal: intentional close, reconnection disabled, or nobody
    /// left to observe the session.
    Stop,
    /// Schedule another connect carrying this attempt number.
    Reconnect(u32),
    /// The attempt ceiling has been passed.
    Exhausted,
}

/// Pure reconnect bookkeeping, driven by the session loop.
#[derive(Debug)]
struct ReconnectState {
    attempt: u32,
    ceiling: u32,
    intentional: bool,
}

impl ReconnectState {
    fn new(ceiling: u32) -> Self {
        Self {
            attempt: 0,
            ceiling,
            intentional: false,
        }
    }

    /// A connection opened: the attempt counter always resets.
    fn mark_open(&mut self) {
        self.attempt = 0;
    }

    /// The caller is tearing the session down. Must be recorded before
    /// the close event is processed so the close can never schedule a
    /// reconnect.
    fn mark_intentional(&mut self) {
        self.intentional = true;
    }

    fn on_close(&mut self, reconnection: bool, observed: bool) -> CloseAction {
        if self.intentional || !reconnection || !observed {
            return CloseAction::Stop;
        }
        if self.attempt <= self.ceiling {
            self.attempt += 1;
            CloseAction::Reconnect(self.attempt)
        } else {
            CloseAction::Exhausted
        }
    }
}

// ── Shared fan-out state ─────────────────────────────────────────────

#[derive(Default)]
struct Shared {
    listener: RwLock<Option<Arc<dyn SessionListener>>>,
    sink: RwLock<Option<Arc<dyn SessionSink>>>,
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl Shared {
    fn listener(&self) -> Option<Arc<dyn SessionListener>> {
        self.listener.read().expect("session lock poisoned").clone()
    }

    fn sink(&self) -> Option<Arc<dyn SessionSink>> {
        self.sink.read().expect("session lock poisoned").clone()
    }

    fn has_observer(&self) -> bool {
        self.listener().is_some() || self.sink().is_some()
    }

    fn notify_open(&self) {
        if let Some(listener) = self.listener() {
            listener.on_open();
        }
        if let Some(sink) = self.sink() {
            sink.open();
        }
    }

    fn notify_error(&self, error: &Error) {
        if let Some(listener) = self.listener() {
            listener.on_error(error);
        }
        if let Some(sink) = self.sink() {
            sink.error(error);
        }
    }

    fn notify_close(&self) {
        if let Some(listener) = self.listener() {
            listener.on_close();
        }
        if let Some(sink) = self.sink() {
            sink.closed();
        }
    }

    fn notify_reconnect(&self, attempt: u32) {
        if let Some(listener) = self.listener() {
            listener.on_reconnect(attempt);
        }
        if let Some(sink) = self.sink() {
            sink.reconnecting(attempt);
        }
    }

    fn notify_exhausted(&self) {
        if let Some(listener) = self.listener() {
            listener.on_reconnect_exhausted();
        }
        if let Some(sink) = self.sink() {
            sink.exhausted();
        }
    }

    /// Fan a received text frame out to the listener (respecting its
    /// filter) and, independently, to the store sink.
    fn dispatch_frame(&self, raw: &str) {
        let frame: Option<PushFrame> = match serde_json::from_str(raw) {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!(error = %e, "unparseable push frame");
                None
            }
        };

        if let Some(listener) = self.listener() {
            let accepted = listener.accepted_codes();
            if accepted.is_empty() {
                listener.on_message(raw);
            } else if let Some(frame) = frame.as_ref() {
                if frame.code().is_some_and(|code| accepted.contains(&code)) {
                    listener.on_push(frame);
                }
            }
        }

        if let Some(sink) = self.sink() {
            if let Some(frame) = frame.as_ref() {
                sink.push(frame);
            }
        }
    }
}

// ── SessionManager ───────────────────────────────────────────────────

/// Owns the push-channel WebSocket and its reconnect loop.
///
/// At most one live socket per manager; [`connect`](Self::connect)
/// replaces an existing session rather than failing ("reconnect implies
/// replace"). The socket reference and the pending reconnect timer are
/// exclusively owned by the background loop — no external code ever
/// holds them.
pub struct SessionManager {
    config: SessionConfig,
    auth: Arc<AuthStore>,
    url: RwLock<Option<Url>>,
    cancel: Mutex<Option<CancellationToken>>,
    shared: Arc<Shared>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, auth: Arc<AuthStore>) -> Self {
        Self {
            config,
            auth,
            url: RwLock::new(None),
            cancel: Mutex::new(None),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Set the resolved push-channel URL used by subsequent connects.
    pub fn set_url(&self, url: Url) {
        *self.url.write().expect("session lock poisoned") = Some(url);
    }

    pub fn url(&self) -> Option<Url> {
        self.url.read().expect("session lock poisoned").clone()
    }

    /// Register the single session listener.
    ///
    /// Registering while one is active is a conflict, never a silent
    /// overwrite.
    pub fn set_listener(&self, listener: Arc<dyn SessionListener>) -> Result<(), Error> {
        let mut slot = self.shared.listener.write().expect("session lock poisoned");
        if slot.is_some() {
            return Err(Error::ListenerConflict);
        }
        *slot = Some(listener);
        Ok(())
    }

    pub fn remove_listener(&self) {
        *self.shared.listener.write().expect("session lock poisoned") = None;
    }

    /// Attach the external store sink.
    pub fn set_sink(&self, sink: Arc<dyn SessionSink>) {
        *self.shared.sink.write().expect("session lock poisoned") = Some(sink);
    }

    pub fn remove_sink(&self) {
        *self.shared.sink.write().expect("session lock poisoned") = None;
    }

    /// Open the push channel, replacing any live session.
    ///
    /// An existing session is torn down first and its close is reported
    /// through the normal close callbacks, then a fresh connection loop
    /// starts at the currently resolved URL with the currently stored
    /// subprotocol tokens. Must be called within a tokio runtime.
    pub fn connect(&self) -> Result<(), Error> {
        let url = self
            .url()
            .ok_or_else(|| Error::WebSocketConnect("no push-channel URL resolved".to_owned()))?;

        if let Some(old) = self.cancel.lock().expect("session lock poisoned").take() {
            old.cancel();
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock().expect("session lock poisoned") = Some(cancel.clone());

        let auth = Arc::clone(&self.auth);
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        tokio::spawn(async move {
            if let Err(e) = session_loop(url, auth, shared, config, cancel).await {
                tracing::error!(error = %e, "session loop terminated");
            }
        });

        Ok(())
    }

    /// Tear the session down intentionally.
    ///
    /// Cancels any pending reconnect and discards the socket; the
    /// resulting close event is reported to subscribers but never
    /// schedules another connect.
    pub fn close(&self) {
        if let Some(cancel) = self.cancel.lock().expect("session lock poisoned").take() {
            cancel.cancel();
        }
        *self.shared.sender.lock().expect("session lock poisoned") = None;
    }

    /// Whether a socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.shared
            .sender
            .lock()
            .expect("session lock poisoned")
            .is_some()
    }

    /// Serialize a value and send it over the live socket.
    pub fn send_json(&self, value: &impl Serialize) -> Result<(), Error> {
        let text = serde_json::to_string(value).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;
        let guard = self.shared.sender.lock().expect("session lock poisoned");
        let sender = guard
            .as_ref()
            .ok_or_else(|| Error::WebSocketConnect("no live push-channel connection".to_owned()))?;
        sender
            .send(text)
            .map_err(|_| Error::WebSocketConnect("push channel is shutting down".to_owned()))
    }
}

/// Resolve the push-channel URL for a configurator on the given host.
///
/// Maps `http(s)` to `ws(s)` and scopes the path to the configurator.
pub fn websocket_url(host: &Url, configurator_id: u32) -> Result<Url, Error> {
    let mut ws = host
        .join(&format!("/wfc/{configurator_id}/api/"))
        .map_err(Error::InvalidUrl)?;
    let scheme = match host.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    ws.set_scheme(scheme)
        .map_err(|()| Error::WebSocketConnect(format!("cannot derive ws scheme from {host}")))?;
    Ok(ws)
}

// ── Background session loop ──────────────────────────────────────────

/// One loop per [`SessionManager::connect`] call: connect → read →
/// on unexpected close, notify → fixed delay → connect again, up to the
/// attempt ceiling.
async fn session_loop(
    url: Url,
    auth: Arc<AuthStore>,
    shared: Arc<Shared>,
    config: SessionConfig,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let mut state = ReconnectState::new(config.attempt_ceiling);

    loop {
        // Subprotocols are re-read each attempt so a dashboard
        // credential set after connect() applies to the next socket.
        let subprotocols = auth.subprotocols();

        match run_connection(&url, &subprotocols, &shared, &mut state, &cancel).await {
            Ok(ConnectionEnd::Cancelled) => state.mark_intentional(),
            Ok(ConnectionEnd::Dropped) => {}
            Err(e) => {
                warn!(error = %e, "push-channel connection failed");
                shared.notify_error(&e);
            }
        }

        shared.notify_close();

        if cancel.is_cancelled() {
            state.mark_intentional();
        }

        match state.on_close(config.reconnection, shared.has_observer()) {
            CloseAction::Stop => return Ok(()),
            CloseAction::Reconnect(attempt) => {
                info!(attempt, delay_ms = config.reconnect_delay.as_millis() as u64, "scheduling reconnect");
                shared.notify_reconnect(attempt);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(()),
                    () = tokio::time::sleep(config.reconnect_delay) => {}
                }
            }
            CloseAction::Exhausted => {
                if shared.has_observer() {
                    warn!(attempts = config.attempt_ceiling, "reconnection exhausted");
                    shared.notify_exhausted();
                    return Ok(());
                }
                tracing::error!(
                    attempts = config.attempt_ceiling,
                    "reconnection exhausted with no observer attached"
                );
                return Err(Error::ReconnectExhausted {
                    attempts: config.attempt_ceiling,
                });
            }
        }
    }
}

enum ConnectionEnd {
    /// Torn down through the cancellation token (intentional close or
    /// session replacement).
    Cancelled,
    /// The server closed the socket or the stream ended.
    Dropped,
}

/// Establish a single connection and pump frames until it drops.
async fn run_connection(
    url: &Url,
    subprotocols: &[String],
    shared: &Shared,
    state: &mut ReconnectState,
    cancel: &CancellationToken,
) -> Result<ConnectionEnd, Error> {
    info!(%url, "connecting push channel");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    for protocol in subprotocols {
        request = request.with_sub_protocol(protocol);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    info!("push channel connected");
    state.mark_open();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    *shared.sender.lock().expect("session lock poisoned") = Some(out_tx);
    shared.notify_open();

    let (mut write, mut read) = ws_stream.split();

    let end = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break ConnectionEnd::Cancelled,
            Some(text) = out_rx.recv() => {
                if let Err(e) = write.send(tungstenite::Message::text(text)).await {
                    shared.notify_error(&Error::WebSocketConnect(e.to_string()));
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        shared.dispatch_frame(text.as_str());
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite answers pongs automatically
                        trace!("push channel ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            info!(code = %cf.code, reason = %cf.reason, "close frame received");
                        } else {
                            info!("close frame received (no payload)");
                        }
                        break ConnectionEnd::Dropped;
                    }
                    Some(Err(e)) => {
                        shared.notify_error(&Error::WebSocketConnect(e.to_string()));
                        break ConnectionEnd::Dropped;
                    }
                    None => {
                        info!("push-channel stream ended");
                        break ConnectionEnd::Dropped;
                    }
                    _ => {
                        // Binary, Pong, Frame — ignore
                    }
                }
            }
        }
    };

    *shared.sender.lock().expect("session lock poisoned") = None;
    Ok(end)
}

// ── Tests ────────────────────────────────────────────────────────────
