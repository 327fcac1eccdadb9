//! Streaming analysis sessions.
//!
//! A [`StreamSession`] owns one in-flight streaming request. It opens the
//! stream through a [`StreamTransport`], decodes the body into frames and
//! hands token frames to a [`TokenSink`] in arrival order. Cancellation goes
//! through an [`AbortHandle`] and is observed at every suspension point.
//!
//! [`StreamController`] keeps at most one session active: starting another
//! cancels the current one first.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{ClientError, StreamTransport};
use crate::model::{AnalysisRequest, StreamFrame};
use crate::sse::frames;

/// Event name the backend uses to report a failure mid-stream.
pub const ERROR_EVENT: &str = "error";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Active,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }

    fn to_u8(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Active => 1,
            SessionState::Completed => 2,
            SessionState::Cancelled => 3,
            SessionState::Failed => 4,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SessionState::Active,
            2 => SessionState::Completed,
            3 => SessionState::Cancelled,
            4 => SessionState::Failed,
            _ => SessionState::Idle,
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    Failed(ClientError),
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Completed => SessionState::Completed,
            SessionOutcome::Cancelled => SessionState::Cancelled,
            SessionOutcome::Failed(_) => SessionState::Failed,
        }
    }
}

/// Receiver of everything a session produces.
///
/// The session reaches its sink through an `Arc<Mutex<_>>` shared with the
/// front end. Every callback re-checks the session state after the mutex
/// was acquired, so once [`AbortHandle::cancel`] has returned a later lock
/// never delivers anything. Cancelling never waits for the mutex.
pub trait TokenSink: Send + 'static {
    /// Called once when the session begins, before any token.
    fn reset(&mut self) {}

    /// Append one token to the output.
    fn append_token(&mut self, text: &str);

    /// The stream reported an `error` event. The session keeps going.
    fn stream_error(&mut self, message: &str);

    /// The session completed or failed. Not called on cancellation.
    fn finished(&mut self, _outcome: &SessionOutcome) {}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Which event names carry content tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    token_events: HashSet<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::with_token_events(["token", "chunk", "simplify"])
    }
}

impl StreamConfig {
    pub fn with_token_events<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            token_events: events.into_iter().map(Into::into).collect(),
        }
    }

    /// Register one more token event name.
    pub fn with_token_event(mut self, event: impl Into<String>) -> Self {
        self.token_events.insert(event.into());
        self
    }

    pub fn is_token_event(&self, event: &str) -> bool {
        self.token_events.contains(event)
    }
}

/// Lock-free session state shared by the session task and its handles.
#[derive(Debug)]
struct Status {
    id: u64,
    state: AtomicU8,
}

impl Status {
    fn new(id: u64) -> Self {
        Self {
            id,
            state: AtomicU8::new(SessionState::Active.to_u8()),
        }
    }

    fn get(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn is_active(&self) -> bool {
        self.get() == SessionState::Active
    }

    /// Move from `Active` to `next`. Fails if the session already ended.
    fn leave_active(&self, next: SessionState) -> bool {
        self.state
            .compare_exchange(
                SessionState::Active.to_u8(),
                next.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// The session side of a sink shared with the front end.
struct Delivery<S> {
    status: Arc<Status>,
    sink: Arc<Mutex<S>>,
}

impl<S: TokenSink> Delivery<S> {
    /// Lock the sink, then confirm the session is still active.
    fn active_sink(&self) -> Option<MutexGuard<'_, S>> {
        let sink = lock(&self.sink);
        self.status.is_active().then_some(sink)
    }

    fn reset(&self) -> bool {
        match self.active_sink() {
            Some(mut sink) => {
                sink.reset();
                true
            }
            None => false,
        }
    }

    /// Deliver one frame. Returns `false` once the session is no longer active.
    fn dispatch(&self, frame: &StreamFrame, config: &StreamConfig) -> bool {
        let Some(mut sink) = self.active_sink() else {
            return false;
        };

        let id = self.status.id;
        if config.is_token_event(&frame.event) {
            debug!(session = id, "token frame ({} bytes)", frame.data.len());
            sink.append_token(&frame.data);
        } else if frame.event == ERROR_EVENT {
            warn!(session = id, "stream reported error: {}", frame.data);
            sink.stream_error(&frame.data);
        } else {
            debug!(session = id, "ignoring '{}' frame", frame.event);
        }
        true
    }

    /// Record the end of the session. A session cancelled in the meantime
    /// stays cancelled and its sink hears nothing more.
    fn finish(&self, outcome: SessionOutcome) -> SessionOutcome {
        let mut sink = lock(&self.sink);
        if !self.status.leave_active(outcome.state()) {
            return SessionOutcome::Cancelled;
        }

        let id = self.status.id;
        match &outcome {
            SessionOutcome::Failed(err) => warn!(session = id, "stream failed: {}", err),
            _ => info!(session = id, "stream {:?}", outcome.state()),
        }
        sink.finished(&outcome);
        outcome
    }
}

/// Cloneable handle that can cancel a session from anywhere.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    status: Arc<Status>,
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Cancel the session.
    ///
    /// Returns without waiting on the sink. Once this returns no further
    /// token reaches the sink, even if bytes are still buffered. A no-op on
    /// a session that already ended.
    pub fn cancel(&self) {
        if self.status.leave_active(SessionState::Cancelled) {
            info!(session = self.status.id, "stream cancelled");
            let _ = self.tx.send(true);
        }
    }

    pub fn state(&self) -> SessionState {
        self.status.get()
    }
}

/// Owner handle of a running session.
#[derive(Debug)]
pub struct SessionHandle {
    id: u64,
    abort: AbortHandle,
    task: Option<JoinHandle<SessionOutcome>>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.abort.state()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn cancel(&self) {
        self.abort.cancel();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Wait for the session to end.
    ///
    /// Returns the outcome the first time; later calls report the recorded
    /// state with no error attached.
    pub async fn wait(&mut self) -> SessionOutcome {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(outcome) => outcome,
                Err(e) => SessionOutcome::Failed(ClientError::Stream(format!(
                    "session task ended abnormally: {}",
                    e
                ))),
            },
            None => match self.state() {
                SessionState::Completed => SessionOutcome::Completed,
                SessionState::Failed => {
                    SessionOutcome::Failed(ClientError::Stream("session failed".to_string()))
                }
                _ => SessionOutcome::Cancelled,
            },
        }
    }
}

/// Entry point for starting a single streaming session.
pub struct StreamSession;

impl StreamSession {
    /// Start streaming `request` through `transport` into `sink`.
    ///
    /// The session is `Active` when this returns; the sink is reset by the
    /// session task before the first token. Must be called within a tokio
    /// runtime.
    pub fn start<T, S>(
        transport: Arc<T>,
        request: AnalysisRequest,
        config: StreamConfig,
        sink: Arc<Mutex<S>>,
    ) -> SessionHandle
    where
        T: StreamTransport + ?Sized + 'static,
        S: TokenSink,
    {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let status = Arc::new(Status::new(id));
        let (tx, rx) = watch::channel(false);
        info!(session = id, "stream started");

        let delivery = Delivery {
            status: status.clone(),
            sink,
        };
        let task = tokio::spawn(run_session(transport, request, config, delivery, rx));

        SessionHandle {
            id,
            abort: AbortHandle {
                status,
                tx: Arc::new(tx),
            },
            task: Some(task),
        }
    }
}

/// Resolves once cancellation was requested. Never resolves otherwise.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        let requested = *rx.borrow_and_update();
        if requested {
            return;
        }
        if rx.changed().await.is_err() {
            // Every handle is gone, nobody can cancel any more.
            std::future::pending::<()>().await;
        }
    }
}

async fn run_session<T, S>(
    transport: Arc<T>,
    request: AnalysisRequest,
    config: StreamConfig,
    delivery: Delivery<S>,
    mut abort_rx: watch::Receiver<bool>,
) -> SessionOutcome
where
    T: StreamTransport + ?Sized + 'static,
    S: TokenSink,
{
    if !delivery.reset() {
        return SessionOutcome::Cancelled;
    }

    let opened = tokio::select! {
        biased;
        _ = cancelled(&mut abort_rx) => return SessionOutcome::Cancelled,
        opened = transport.open_stream(&request) => opened,
    };

    let body = match opened {
        Ok(body) => body,
        Err(e) => return delivery.finish(SessionOutcome::Failed(e)),
    };

    let mut stream = Box::pin(frames(body));
    loop {
        let next = tokio::select! {
            biased;
            _ = cancelled(&mut abort_rx) => return SessionOutcome::Cancelled,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(frame)) => {
                if !delivery.dispatch(&frame, &config) {
                    return SessionOutcome::Cancelled;
                }
            }
            Some(Err(e)) => return delivery.finish(SessionOutcome::Failed(e)),
            None => return delivery.finish(SessionOutcome::Completed),
        }
    }
}

/// Keeps at most one session active.
///
/// Starting a session while one is active cancels the active one first, so
/// output of two sessions never interleaves in a shared sink.
pub struct StreamController<T: StreamTransport + ?Sized> {
    transport: Arc<T>,
    config: StreamConfig,
    current: Option<SessionHandle>,
}

impl<T: StreamTransport + ?Sized + 'static> StreamController<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            config: StreamConfig::default(),
            current: None,
        }
    }

    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// State of the current session, `Idle` if none was started.
    pub fn state(&self) -> SessionState {
        self.current
            .as_ref()
            .map_or(SessionState::Idle, SessionHandle::state)
    }

    pub fn current(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }

    /// Cancel any active session and start a new one.
    pub fn start<S: TokenSink>(&mut self, request: AnalysisRequest, sink: Arc<Mutex<S>>) -> AbortHandle {
        self.cancel();
        let handle = StreamSession::start(self.transport.clone(), request, self.config.clone(), sink);
        let abort = handle.abort_handle();
        self.current = Some(handle);
        abort
    }

    /// Stream button semantics: cancel the active session if there is one,
    /// otherwise start a new session.
    pub fn toggle<S: TokenSink>(
        &mut self,
        request: AnalysisRequest,
        sink: Arc<Mutex<S>>,
    ) -> Option<AbortHandle> {
        if self.state() == SessionState::Active {
            self.cancel();
            None
        } else {
            Some(self.start(request, sink))
        }
    }

    /// Cancel the active session. A no-op when idle or already ended.
    pub fn cancel(&mut self) {
        if let Some(handle) = &self.current {
            handle.cancel();
        }
    }

    /// Wait for the current session to end and release it.
    pub async fn finish(&mut self) -> Option<SessionOutcome> {
        let mut handle = self.current.take()?;
        Some(handle.wait().await)
    }
}
