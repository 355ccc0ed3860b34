use crate::error::{ContinuationError, Result};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Open,
    /// Flushed by completion; no further writes
    Closed,
    /// The connection underneath went away
    Broken,
}

#[derive(Debug)]
struct SinkInner {
    buffer: String,
    state: SinkState,
}

/// Append-only response output.
///
/// Writes are appended in the order they acquire the sink's lock, so output is
/// totally ordered as issued. Once the exchange completes the sink is closed
/// and the connector drains it.
#[derive(Debug)]
pub struct ResponseSink {
    inner: Mutex<SinkInner>,
}

impl Default for ResponseSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SinkInner {
                buffer: String::new(),
                state: SinkState::Open,
            }),
        }
    }

    pub fn write(&self, text: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            SinkState::Open => {
                inner.buffer.push_str(text);
                Ok(())
            }
            SinkState::Closed => Err(ContinuationError::Io {
                reason: "response already completed".to_string(),
            }),
            SinkState::Broken => Err(ContinuationError::Io {
                reason: "connection broken".to_string(),
            }),
        }
    }

    /// Flush: no more writes are accepted. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SinkState::Open {
            inner.state = SinkState::Closed;
        }
    }

    /// Mark the underlying connection as gone; later writes fail.
    pub fn break_connection(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SinkState::Open {
            inner.state = SinkState::Broken;
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.lock().state == SinkState::Open
    }

    /// Copy of everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        self.inner.lock().buffer.clone()
    }

    /// Written output split on `\n`, without the empty trailing piece.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().buffer.lines().map(str::to_string).collect()
    }

    /// Take the buffered output, leaving the sink empty.
    pub fn drain(&self) -> String {
        std::mem::take(&mut self.inner.lock().buffer)
    }
}
