use super::sink::ResponseSink;
use super::snapshot::{snapshot, OriginSnapshot};
use crate::continuation::{Continuation, ContinuationState, HandlerOutcome};
use crate::error::{ContinuationError, Result};
use crate::ids::ExchangeId;
use crate::scheduler::{Task, TimerHandle};
use http::Method;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum inline headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage; names are shared `Arc<str>`.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Parsed request data the connector hands over when it creates an exchange.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// Path within the owning context (the context path already stripped)
    pub path: String,
    pub query_string: Option<String>,
    pub headers: HeaderVec,
}

impl RequestHead {
    #[must_use]
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::GET,
            path: path.to_string(),
            query_string: None,
            headers: HeaderVec::new(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: &str) -> Self {
        self.query_string = Some(query.to_string());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((Arc::from(name), value.to_string()));
        self
    }
}

/// Reject a caller bound to an earlier dispatch cycle. Finished exchanges
/// fall through so the caller sees the plain post-completion error.
fn check_cycle(guarded: &Guarded, cycle: u64, action: &'static str) -> Result<()> {
    let state = guarded.continuation.state();
    if guarded.continuation.cycle() != cycle && !state.is_finishing() {
        return Err(ContinuationError::illegal(action, state));
    }
    Ok(())
}

type CompletionListener = Box<dyn FnOnce(ExchangeId, u16) + Send + 'static>;

/// Everything that changes during the exchange's life, behind one guard.
struct Guarded {
    continuation: Continuation,
    current_path: String,
    path_info: Option<String>,
    query_string: Option<String>,
    origin: Option<OriginSnapshot>,
    attributes: HashMap<String, Value>,
    status: u16,
    /// Tasks submitted while `SUSPENDING`, released once the handler returns
    deferred: Vec<Task>,
    deadline: Option<TimerHandle>,
}

/// One request/response cycle.
pub struct Exchange {
    id: ExchangeId,
    method: Method,
    headers: HeaderVec,
    context_path: String,
    guarded: Mutex<Guarded>,
    completed: Condvar,
    sink: ResponseSink,
    listener: Mutex<Option<CompletionListener>>,
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guarded = self.guarded.lock();
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("context_path", &self.context_path)
            .field("current_path", &guarded.current_path)
            .field("state", &guarded.continuation.state())
            .field("status", &guarded.status)
            .finish_non_exhaustive()
    }
}

/// Canonical context path: a leading `/`, no trailing `/`, and `""` for the
/// root context (given as `""` or `"/"`).
#[must_use]
pub fn normalize_context_path(context_path: &str) -> String {
    let trimmed = context_path.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

impl Exchange {
    /// Create an exchange owned by the context mounted at `context_path`.
    #[must_use]
    pub fn new(head: RequestHead, context_path: &str) -> Arc<Self> {
        let id = ExchangeId::from_header_or_new(
            head.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("x-request-id"))
                .map(|(_, v)| v.as_str()),
        );
        Self::with_id(id, head, context_path)
    }

    #[must_use]
    pub fn with_id(id: ExchangeId, head: RequestHead, context_path: &str) -> Arc<Self> {
        let exchange = Arc::new(Self {
            id,
            method: head.method,
            headers: head.headers,
            context_path: normalize_context_path(context_path),
            guarded: Mutex::new(Guarded {
                continuation: Continuation::new(),
                current_path: head.path,
                path_info: None,
                query_string: head.query_string,
                origin: None,
                attributes: HashMap::new(),
                status: 200,
                deferred: Vec::new(),
                deadline: None,
            }),
            completed: Condvar::new(),
            sink: ResponseSink::new(),
            listener: Mutex::new(None),
        });
        debug!(exchange_id = %exchange.id, method = %exchange.method, "Exchange created");
        exchange
    }

    #[must_use]
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Fixed for the exchange's lifetime; empty for the root context.
    #[must_use]
    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// Header lookup, case-insensitive per RFC 7230.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn state(&self) -> ContinuationState {
        self.guarded.lock().continuation.state()
    }

    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.guarded.lock().continuation.cycle()
    }

    /// Whether `start` succeeded in the current cycle.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.guarded.lock().continuation.started()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state() == ContinuationState::Completed
    }

    /// The path the active dispatch was invoked with.
    #[must_use]
    pub fn current_path(&self) -> String {
        self.guarded.lock().current_path.clone()
    }

    #[must_use]
    pub fn path_info(&self) -> Option<String> {
        self.guarded.lock().path_info.clone()
    }

    #[must_use]
    pub fn query_string(&self) -> Option<String> {
        self.guarded.lock().query_string.clone()
    }

    /// Context path, current path and path info joined.
    #[must_use]
    pub fn request_uri(&self) -> String {
        let guarded = self.guarded.lock();
        snapshot(
            &self.context_path,
            &guarded.current_path,
            guarded.path_info.as_deref(),
            None,
        )
        .request_uri
    }

    #[must_use]
    pub fn origin_snapshot(&self) -> Option<OriginSnapshot> {
        self.guarded.lock().origin.clone()
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.guarded.lock().attributes.get(key).cloned()
    }

    pub fn set_attribute(&self, key: &str, value: Value) {
        self.guarded.lock().attributes.insert(key.to_string(), value);
    }

    pub fn remove_attribute(&self, key: &str) -> Option<Value> {
        self.guarded.lock().attributes.remove(key)
    }

    #[must_use]
    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.guarded.lock().attributes.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.guarded.lock().status
    }

    /// Ignored once the exchange is completing.
    pub fn set_status(&self, status: u16) {
        let mut guarded = self.guarded.lock();
        if !guarded.continuation.state().is_finishing() {
            guarded.status = status;
        }
    }

    #[must_use]
    pub fn sink(&self) -> &ResponseSink {
        &self.sink
    }

    /// Finalize the exchange: flush the sink, move to `COMPLETED` and wake the
    /// connector. Exactly one call succeeds; every later call is rejected.
    pub fn complete(&self) -> Result<()> {
        let mut guarded = self.guarded.lock();
        guarded.continuation.begin_complete()?;
        self.finish_locked(guarded, None, "complete");
        Ok(())
    }

    /// Drive the exchange to `COMPLETED` with a failure status, unless it is
    /// already finishing. Returns whether this call completed it.
    pub fn force_complete(&self, status: u16, reason: &str) -> bool {
        let mut guarded = self.guarded.lock();
        if guarded.continuation.begin_complete().is_err() {
            debug!(exchange_id = %self.id, reason, "Forced completion skipped - already finishing");
            return false;
        }
        warn!(exchange_id = %self.id, status, reason, "Forcing exchange completion");
        self.finish_locked(guarded, Some(status), reason);
        true
    }

    /// Block until the exchange reaches `COMPLETED` or `timeout` elapses.
    pub fn wait_completed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guarded = self.guarded.lock();
        while guarded.continuation.state() != ContinuationState::Completed {
            if self
                .completed
                .wait_until(&mut guarded, deadline)
                .timed_out()
            {
                return guarded.continuation.state() == ContinuationState::Completed;
            }
        }
        true
    }

    /// Register a callback run once, after the exchange reaches `COMPLETED`.
    /// Runs immediately if it already has. Replaces any earlier listener.
    pub fn on_complete<F>(&self, listener: F)
    where
        F: FnOnce(ExchangeId, u16) + Send + 'static,
    {
        let guarded = self.guarded.lock();
        if guarded.continuation.state() == ContinuationState::Completed {
            let status = guarded.status;
            drop(guarded);
            listener(self.id, status);
            return;
        }
        *self.listener.lock() = Some(Box::new(listener));
    }

    fn finish_locked(
        &self,
        mut guarded: MutexGuard<'_, Guarded>,
        status: Option<u16>,
        reason: &str,
    ) {
        if let Some(status) = status {
            guarded.status = status;
        }
        self.sink.close();
        if let Err(e) = guarded.continuation.finish() {
            // begin_complete/expire always precede this call
            warn!(exchange_id = %self.id, error = %e, "Unexpected state while finishing");
        }
        if let Some(timer) = guarded.deadline.take() {
            timer.cancel();
        }
        let abandoned = std::mem::take(&mut guarded.deferred);
        let final_status = guarded.status;
        self.completed.notify_all();
        drop(guarded);

        info!(
            exchange_id = %self.id,
            status = final_status,
            reason,
            abandoned_tasks = abandoned.len(),
            "Exchange completed"
        );
        drop(abandoned);

        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener(self.id, final_status);
        }
    }

    pub(crate) fn start(&self, cycle: u64) -> Result<()> {
        let mut guarded = self.guarded.lock();
        check_cycle(&guarded, cycle, "start a stale cycle")?;
        guarded.continuation.start()?;
        debug!(exchange_id = %self.id, cycle, "IDLE -> SUSPENDING");
        Ok(())
    }

    /// Hold `task` until the handler returns if the exchange is `SUSPENDING`;
    /// hand it back for immediate scheduling if already `SUSPENDED`.
    pub(crate) fn defer_or_release(&self, cycle: u64, task: Task) -> Result<Option<Task>> {
        let mut guarded = self.guarded.lock();
        check_cycle(&guarded, cycle, "submit from a stale cycle")?;
        match guarded.continuation.state() {
            ContinuationState::Suspending => {
                guarded.deferred.push(task);
                Ok(None)
            }
            ContinuationState::Suspended => Ok(Some(task)),
            state => Err(ContinuationError::illegal("submit a task", state)),
        }
    }

    /// The handler returned control to the dispatcher.
    pub(crate) fn handler_returned(&self) -> Result<(HandlerOutcome, Vec<Task>)> {
        let mut guarded = self.guarded.lock();
        let outcome = guarded.continuation.handler_returned()?;
        let released = match outcome {
            HandlerOutcome::Suspended { generation } => {
                debug!(exchange_id = %self.id, generation, "SUSPENDING -> SUSPENDED");
                std::mem::take(&mut guarded.deferred)
            }
            HandlerOutcome::Synchronous | HandlerOutcome::Finished => Vec::new(),
        };
        Ok((outcome, released))
    }

    /// Attach the deadline timer for suspension `generation`. Cancelled at once
    /// if the exchange has already moved on.
    pub(crate) fn arm_deadline(&self, generation: u64, timer: TimerHandle) {
        let mut guarded = self.guarded.lock();
        if guarded.continuation.state() == ContinuationState::Suspended
            && guarded.continuation.generation() == generation
        {
            if let Some(previous) = guarded.deadline.replace(timer) {
                previous.cancel();
            }
        } else {
            timer.cancel();
        }
    }

    /// `SUSPENDED → REDISPATCHING`, capturing the origin snapshot first if this
    /// is the first redispatch out of a suspension.
    pub(crate) fn begin_redispatch(&self, cycle: u64) -> Result<()> {
        let mut guarded = self.guarded.lock();
        check_cycle(&guarded, cycle, "dispatch from a stale cycle")?;
        let state = guarded.continuation.state();
        if state != ContinuationState::Suspended {
            return Err(ContinuationError::illegal("dispatch", state));
        }
        if guarded.origin.is_none() {
            let origin = snapshot(
                &self.context_path,
                &guarded.current_path,
                guarded.path_info.as_deref(),
                guarded.query_string.as_deref(),
            );
            for (key, value) in origin.attributes() {
                guarded.attributes.insert(key.to_string(), value);
            }
            debug!(exchange_id = %self.id, origin_uri = %origin.request_uri, "Origin snapshot captured");
            guarded.origin = Some(origin);
        }
        guarded.continuation.begin_redispatch()?;
        if let Some(timer) = guarded.deadline.take() {
            timer.cancel();
        }
        debug!(exchange_id = %self.id, "SUSPENDED -> REDISPATCHING");
        Ok(())
    }

    /// `REDISPATCHING → IDLE`, pointing the request at the redispatch target.
    pub(crate) fn resume(&self, path: &str, query_string: Option<&str>) -> Result<()> {
        let mut guarded = self.guarded.lock();
        guarded.continuation.resume()?;
        guarded.current_path = path.to_string();
        guarded.path_info = None;
        if let Some(query) = query_string {
            guarded.query_string = Some(query.to_string());
        }
        debug!(
            exchange_id = %self.id,
            path,
            cycle = guarded.continuation.cycle(),
            "REDISPATCHING -> IDLE"
        );
        Ok(())
    }

    /// Deadline fired for suspension `generation`.
    pub(crate) fn expire(&self, generation: u64, status: u16) -> bool {
        let mut guarded = self.guarded.lock();
        if !guarded.continuation.expire(generation) {
            return false;
        }
        guarded.deadline = None;
        warn!(exchange_id = %self.id, generation, "SUSPENDED -> EXPIRED");
        self.finish_locked(guarded, Some(status), "suspension deadline expired");
        true
    }
}
