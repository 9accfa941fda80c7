//! Lifecycle coordination for a socket shared by several streams.
//!
//! Every stream bound to an adapter runs its own initialization, reset and
//! shutdown. Only the first initialization opens the socket and only the
//! first shutdown closes it; the rest collapse to no-ops.
//!
//!   Uninitialized → Initializing → Ready → ShuttingDown → Closed
//!
//! A failed open falls back to the state it started from, so the request
//! can be retried. `Closed` accepts a new initialization.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
    Closed,
}

/// Result of a successful `request_init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// This call opened the socket.
    Opened,
    /// Another stream opened it first.
    AlreadyReady,
}

/// Result of a successful `request_shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// This call closed the socket.
    Closed,
    /// Already closed by another stream, or never opened.
    AlreadyDown,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: LinkState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LinkState::Uninitialized,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LinkState::Ready
    }

    /// Run `open` unless the resource is already up.
    pub fn request_init<E>(
        &mut self,
        open: impl FnOnce() -> Result<(), E>,
    ) -> Result<InitOutcome, E> {
        let prior = match self.state {
            LinkState::Ready => return Ok(InitOutcome::AlreadyReady),
            s @ (LinkState::Uninitialized | LinkState::Closed) => s,
            // Only left behind by a request whose callback panicked. Nothing
            // usable is open, so reopen as if from `Closed`.
            LinkState::Initializing | LinkState::ShuttingDown => LinkState::Closed,
        };

        self.state = LinkState::Initializing;
        match open() {
            Ok(()) => {
                self.state = LinkState::Ready;
                Ok(InitOutcome::Opened)
            }
            Err(e) => {
                self.state = prior;
                Err(e)
            }
        }
    }

    /// Run `close` if this is the first shutdown since the resource opened.
    ///
    /// The state ends in `Closed` even if `close` fails: the resource is
    /// released either way and the error is only reported. Any state other
    /// than `Ready`, including an interrupted transition, has nothing to close.
    pub fn request_shutdown<E>(
        &mut self,
        close: impl FnOnce() -> Result<(), E>,
    ) -> Result<ShutdownOutcome, E> {
        if self.state != LinkState::Ready {
            return Ok(ShutdownOutcome::AlreadyDown);
        }

        self.state = LinkState::ShuttingDown;
        let result = close();
        self.state = LinkState::Closed;
        result.map(|()| ShutdownOutcome::Closed)
    }
}
