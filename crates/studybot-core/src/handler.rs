//! Callback contract and per-session dispatch
//!
//! A [`StreamSession`] owns the session buffer, the poll cursor and the one-shot
//! `finished` latch. Every path that can end a session (parser sentinel,
//! end-of-body, terminal status, transport error, cancellation) goes through
//! [`StreamSession::complete`] or [`StreamSession::fail`], so the handler sees
//! at most one terminal callback.

use crate::{StreamError, frame};
use tracing::debug;

/// Receives the streamed reply
///
/// - `on_chunk` fires zero or more times with non-empty text, in arrival order
/// - `on_done` fires once on graceful completion
/// - `on_error` fires at most once, and never after `on_done`
pub trait StreamHandler: Send {
    fn on_chunk(&mut self, text: &str);
    fn on_done(&mut self);
    fn on_error(&mut self, error: StreamError);
}

/// [`StreamHandler`] built from three closures
pub struct FnHandler<C, D, E> {
    on_chunk: C,
    on_done: D,
    on_error: E,
}

impl<C, D, E> FnHandler<C, D, E>
where
    C: FnMut(&str) + Send,
    D: FnMut() + Send,
    E: FnMut(StreamError) + Send,
{
    pub fn new(on_chunk: C, on_done: D, on_error: E) -> Self {
        Self {
            on_chunk,
            on_done,
            on_error,
        }
    }
}

impl<C, D, E> StreamHandler for FnHandler<C, D, E>
where
    C: FnMut(&str) + Send,
    D: FnMut() + Send,
    E: FnMut(StreamError) + Send,
{
    fn on_chunk(&mut self, text: &str) {
        (self.on_chunk)(text)
    }

    fn on_done(&mut self) {
        (self.on_done)()
    }

    fn on_error(&mut self, error: StreamError) {
        (self.on_error)(error)
    }
}

/// Mutable state of one streaming exchange
#[derive(Debug, Default)]
pub struct SessionState {
    /// Unparsed text carried between deltas
    pub buffer: String,
    /// One-shot latch: set by the first terminal dispatch
    pub finished: bool,
    /// Bytes of the full response buffer already consumed (poll transport only)
    pub cursor: usize,
}

/// Session-scoped dispatcher wrapping a caller's handler
pub struct StreamSession<'h> {
    state: SessionState,
    handler: &'h mut dyn StreamHandler,
    chunks_delivered: usize,
}

impl<'h> StreamSession<'h> {
    pub fn new(handler: &'h mut dyn StreamHandler) -> Self {
        Self {
            state: SessionState::default(),
            handler,
            chunks_delivered: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        self.state.cursor = cursor;
    }

    pub fn chunks_delivered(&self) -> usize {
        self.chunks_delivered
    }

    /// Append a decoded delta and dispatch every complete frame
    ///
    /// Returns `true` once the session is finished.
    pub fn feed(&mut self, delta: &str) -> bool {
        if self.state.finished {
            return true;
        }

        self.state.buffer.push_str(delta);

        let handler = &mut *self.handler;
        let delivered = &mut self.chunks_delivered;
        let outcome = frame::parse_frames(&self.state.buffer, |text| {
            *delivered += 1;
            handler.on_chunk(text);
        });

        self.state.buffer = outcome.remainder;
        if outcome.completed {
            self.complete();
        }
        self.state.finished
    }

    /// Parse the leftover buffer as a terminated frame
    ///
    /// Returns `true` if the flush itself signalled completion.
    pub fn flush(&mut self) -> bool {
        if self.state.finished {
            return false;
        }

        let remainder = std::mem::take(&mut self.state.buffer);
        let handler = &mut *self.handler;
        let delivered = &mut self.chunks_delivered;
        let outcome = frame::finish_frames(&remainder, |text| {
            *delivered += 1;
            handler.on_chunk(text);
        });

        if outcome.completed {
            self.complete();
            return true;
        }
        false
    }

    /// Fire `on_done` unless the session already finished
    pub fn complete(&mut self) -> bool {
        if self.state.finished {
            debug!("Ignoring duplicate completion signal");
            return false;
        }
        self.state.finished = true;
        self.handler.on_done();
        true
    }

    /// Fire `on_error` unless the session already finished
    ///
    /// Errors arriving after completion are discarded.
    pub fn fail(&mut self, error: StreamError) -> bool {
        if self.state.finished {
            debug!("Discarding error after session finished: {}", error);
            return false;
        }
        self.state.finished = true;
        self.handler.on_error(error);
        true
    }
}
