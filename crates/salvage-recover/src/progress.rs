//! Progress reporting and passphrase prompting.
//!
//! The engine is UI-free: it talks to a [`ProgressSink`] capability and
//! nothing else. [`NullSink`] serves headless runs. [`ProgressChannel`] +
//! [`ChannelSink`] implement the two-thread contract: the worker blocks on
//! [`ProgressChannel::wait_ready`] before its first message, pushes update
//! events as it iterates, and blocks inside
//! [`ProgressSink::request_passphrase`] until the UI thread answers. All
//! waiting is condvar-based; nothing polls.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use salvage_core::SecureBytes;

/// The worker noticed a cancellation request and stopped at an iteration
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

pub trait ProgressSink {
    /// Report progress. Returning `false` asks the worker to stop cleanly
    /// at the next iteration boundary.
    fn update(&self, text: &str) -> bool;

    /// Ask the user for a passphrase; `None` when no prompt is available
    /// or the user declined.
    fn request_passphrase(&self) -> Option<SecureBytes>;
}

/// Headless sink: never cancels, never supplies a passphrase.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn update(&self, _text: &str) -> bool {
        true
    }

    fn request_passphrase(&self) -> Option<SecureBytes> {
        None
    }
}

/// Events delivered to the UI side of a [`ProgressChannel`].
#[derive(Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    Update(String),
    /// The worker is blocked until
    /// [`provide_passphrase`](ProgressChannel::provide_passphrase) is called.
    AskPassphrase,
    Finished,
}

#[derive(Default)]
struct ChannelState {
    ready: bool,
    cancelled: bool,
    finished: bool,
    events: VecDeque<ProgressEvent>,
    passphrase_reply: Option<Option<SecureBytes>>,
}

/// Shared state between the recovery worker and the UI thread.
pub struct ProgressChannel {
    state: Mutex<ChannelState>,
    cond: Condvar,
}

impl ProgressChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ChannelState::default()),
            cond: Condvar::new(),
        })
    }

    /// UI side: release the worker's startup wait.
    pub fn mark_ready(&self) {
        let mut state = self.state.lock().expect("progress lock");
        state.ready = true;
        self.cond.notify_all();
    }

    /// UI side: ask the worker to stop at the next iteration boundary.
    pub fn request_cancel(&self) {
        let mut state = self.state.lock().expect("progress lock");
        state.cancelled = true;
        self.cond.notify_all();
    }

    /// UI side: answer a pending [`ProgressEvent::AskPassphrase`].
    pub fn provide_passphrase(&self, reply: Option<SecureBytes>) {
        let mut state = self.state.lock().expect("progress lock");
        state.passphrase_reply = Some(reply);
        self.cond.notify_all();
    }

    /// UI side: block for the next event. `None` once the worker has
    /// finished and the queue is drained.
    pub fn next_event(&self) -> Option<ProgressEvent> {
        let mut state = self.state.lock().expect("progress lock");
        loop {
            if let Some(event) = state.events.pop_front() {
                return Some(event);
            }
            if state.finished {
                return None;
            }
            state = self.cond.wait(state).expect("progress lock");
        }
    }

    /// Worker side: block until the UI marks itself ready.
    pub fn wait_ready(&self) {
        let mut state = self.state.lock().expect("progress lock");
        while !state.ready {
            state = self.cond.wait(state).expect("progress lock");
        }
    }

    /// Worker side: signal completion and wake the UI.
    pub fn finish(&self) {
        let mut state = self.state.lock().expect("progress lock");
        state.finished = true;
        state.events.push_back(ProgressEvent::Finished);
        self.cond.notify_all();
    }
}

/// The worker-side [`ProgressSink`] over a [`ProgressChannel`].
#[derive(Clone)]
pub struct ChannelSink {
    channel: Arc<ProgressChannel>,
}

impl ChannelSink {
    pub fn new(channel: Arc<ProgressChannel>) -> Self {
        Self { channel }
    }
}

impl ProgressSink for ChannelSink {
    fn update(&self, text: &str) -> bool {
        let mut state = self.channel.state.lock().expect("progress lock");
        state.events.push_back(ProgressEvent::Update(text.to_owned()));
        self.channel.cond.notify_all();
        !state.cancelled
    }

    fn request_passphrase(&self) -> Option<SecureBytes> {
        let mut state = self.channel.state.lock().expect("progress lock");
        state.passphrase_reply = None;
        state.events.push_back(ProgressEvent::AskPassphrase);
        self.channel.cond.notify_all();
        loop {
            if let Some(reply) = state.passphrase_reply.take() {
                return reply;
            }
            if state.cancelled {
                return None;
            }
            state = self.channel.cond.wait(state).expect("progress lock");
        }
    }
}
