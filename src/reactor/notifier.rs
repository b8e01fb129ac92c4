//! Cross-thread wake-ups for attached handlers.
//!
//! # Data Flow
//! ```text
//! foreign thread:  request_poll(token) → ReactorMessage::Poll(token) → reactor inbox
//! reactor thread:  request_poll(token) → thread-local queue → drained after the current event
//! reactor:         token still attached? → ConnectionEvent::Poll, else ignored
//! ```
//!
//! # Design Decisions
//! - Tokens carry a generation so a recycled handler slot is never poked by a stale request
//! - Calls from inside the reactor never re-enter the handler currently running

use std::cell::RefCell;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;

use crate::reactor::connection::HandlerToken;
use crate::reactor::ReactorMessage;

thread_local! {
    static LOCAL_POLLS: RefCell<Vec<HandlerToken>> = const { RefCell::new(Vec::new()) };
}

/// Cloneable, `Send` handle used by business logic threads.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<ReactorMessage>,
    reactor_thread: Arc<OnceLock<ThreadId>>,
}

impl Notifier {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ReactorMessage>) -> Self {
        Self {
            tx,
            reactor_thread: Arc::new(OnceLock::new()),
        }
    }

    /// Mark the calling thread as the reactor thread.
    pub(crate) fn bind_current_thread(&self) {
        let _ = self.reactor_thread.set(thread::current().id());
    }

    pub fn on_reactor_thread(&self) -> bool {
        self.reactor_thread.get() == Some(&thread::current().id())
    }

    /// Ask the reactor to run the handler's event logic with a `Poll` event.
    ///
    /// Returns `false` if the reactor is gone.
    pub fn request_poll(&self, token: HandlerToken) -> bool {
        if self.on_reactor_thread() {
            LOCAL_POLLS.with(|polls| polls.borrow_mut().push(token));
            true
        } else {
            self.tx.send(ReactorMessage::Poll(token)).is_ok()
        }
    }

    /// Push tokens through the inbox (used for polls requested while draining).
    pub(crate) fn defer(&self, tokens: Vec<HandlerToken>) {
        for token in tokens {
            let _ = self.tx.send(ReactorMessage::Poll(token));
        }
    }
}

/// Take polls queued on this thread.
pub(crate) fn take_local_polls() -> Vec<HandlerToken> {
    LOCAL_POLLS.with(|polls| std::mem::take(&mut *polls.borrow_mut()))
}
