//! In-memory transport for tests and the CLI self-test.
//!
//! Events are injected by the test driver and drained through `poll_event`;
//! everything the relay submits is recorded for inspection. No sockets, no
//! threads of its own.

use super::abstraction::{
    EncapsulatedMessage, SendFlags, SessionId, TransportDriver, TransportError, TransportEvent,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// One outbound submission recorded by [`LocalTransport`].
#[derive(Debug, Clone)]
pub struct RecordedSend {
    pub identifier: SessionId,
    pub message: EncapsulatedMessage,
    pub flags: SendFlags,
}

/// A loopback [`TransportDriver`] with no real peers behind it.
#[derive(Default)]
pub struct LocalTransport {
    pending: Mutex<VecDeque<TransportEvent>>,
    sends: Mutex<Vec<RecordedSend>>,
    closes: Mutex<Vec<(SessionId, String)>>,
    options: Mutex<Vec<(String, String)>>,
    down: AtomicBool,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for the next `poll_event` drain.
    pub fn inject(&self, event: TransportEvent) {
        self.pending.lock().push_back(event);
    }

    /// Everything submitted via `send`, in submission order.
    pub fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().clone()
    }

    /// Administrative closes requested by the relay.
    pub fn closes(&self) -> Vec<(SessionId, String)> {
        self.closes.lock().clone()
    }

    /// Options published by the relay.
    pub fn options(&self) -> Vec<(String, String)> {
        self.options.lock().clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }
}

impl TransportDriver for LocalTransport {
    fn send(
        &self,
        identifier: &str,
        message: EncapsulatedMessage,
        flags: SendFlags,
    ) -> Result<(), TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::Closed);
        }
        self.sends.lock().push(RecordedSend {
            identifier: identifier.to_owned(),
            message,
            flags,
        });
        Ok(())
    }

    fn close_session(&self, identifier: &str, reason: &str) -> Result<(), TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::Closed);
        }
        self.closes
            .lock()
            .push((identifier.to_owned(), reason.to_owned()));
        Ok(())
    }

    fn send_option(&self, name: &str, value: &str) {
        if self.is_shut_down() {
            return;
        }
        self.options.lock().push((name.to_owned(), value.to_owned()));
    }

    fn shutdown(&self) -> Result<(), TransportError> {
        if self.down.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.pending.lock().clear();
        Ok(())
    }

    fn poll_event(&self) -> Option<TransportEvent> {
        if self.is_shut_down() {
            return None;
        }
        self.pending.lock().pop_front()
    }
}
