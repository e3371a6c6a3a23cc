//! A duplex pipe, and a parent/child handshake over it.
//!
//! [`pipe`] creates two connected [`PipeEnd`]s. Each end can send values to the other, receive
//! values from it, and [`poll`](PipeEnd::poll) for a value with a bounded wait.
//!
//! [`run_handshake`] uses a pipe for a single exchange: a parent spawns a child thread, sends it
//! one message, and waits (for a bounded time) for the child's response.
//!
//! ```
//! use taskwait::pipe::pipe;
//! use std::time::Duration;
//!
//! let (mut left, right) = pipe();
//! right.send("ping").unwrap();
//! assert!(left.poll(Duration::from_secs(1)));
//! assert_eq!(left.recv().unwrap(), "ping");
//! ```

use std::{error::Error, fmt, io, thread, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::unit::UnitBuilder;

/// Creates a connected pair of [`PipeEnd`]s.
pub fn pipe<T>() -> (PipeEnd<T>, PipeEnd<T>) {
    let (left_tx, right_rx) = crossbeam_channel::unbounded();
    let (right_tx, left_rx) = crossbeam_channel::unbounded();
    (
        PipeEnd {
            sender: left_tx,
            receiver: left_rx,
            peeked: None,
        },
        PipeEnd {
            sender: right_tx,
            receiver: right_rx,
            peeked: None,
        },
    )
}

/// One end of a duplex pipe created by [`pipe`].
///
/// Sending never blocks. Values sent from one end are received at the other end in the order they
/// were sent.
pub struct PipeEnd<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    /// A value that [`PipeEnd::poll`] has already taken off the channel.
    peeked: Option<T>,
}

impl<T> PipeEnd<T> {
    /// Sends `value` to the other end.
    ///
    /// Fails if the other end has been dropped, in which case `value` is dropped as well.
    pub fn send(&self, value: T) -> Result<(), Disconnected> {
        self.sender.send(value).map_err(|_| Disconnected { _priv: () })
    }

    /// Blocks until a value arrives from the other end.
    ///
    /// Returns [`Disconnected`] if the other end was dropped and no values are left.
    pub fn recv(&mut self) -> Result<T, Disconnected> {
        if let Some(value) = self.peeked.take() {
            return Ok(value);
        }
        self.receiver.recv().map_err(|_| Disconnected { _priv: () })
    }

    /// Waits up to `timeout` for [`PipeEnd::recv`] to become non-blocking.
    ///
    /// Returns `true` if a value is available, or if the other end has hung up (in which case
    /// `recv` will fail right away). Returns `false` if `timeout` elapsed first.
    pub fn poll(&mut self, timeout: Duration) -> bool {
        if self.peeked.is_some() {
            return true;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(value) => {
                self.peeked = Some(value);
                true
            }
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

impl<T> fmt::Debug for PipeEnd<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeEnd")
            .field("queued", &(self.receiver.len() + usize::from(self.peeked.is_some())))
            .finish_non_exhaustive()
    }
}

/// An error indicating that the other end of a pipe was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnected {
    _priv: (),
}

impl Error for Disconnected {}

impl fmt::Display for Disconnected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the other end of the pipe was dropped")
    }
}

impl From<Disconnected> for io::Error {
    fn from(err: Disconnected) -> Self {
        io::Error::new(io::ErrorKind::BrokenPipe, err)
    }
}

/// Parameters of [`run_handshake`].
///
/// The defaults match the demonstration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    message: String,
    settle_delay: Duration,
    processing_delay: Duration,
    response_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            message: "Hello Distributed World!".into(),
            settle_delay: Duration::from_secs(1),
            processing_delay: Duration::from_millis(1500),
            response_timeout: Duration::from_secs(5),
        }
    }
}

impl HandshakeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the message the parent sends.
    pub fn message<M: Into<String>>(self, message: M) -> Self {
        Self {
            message: message.into(),
            ..self
        }
    }

    /// Sets how long the parent waits after spawning the child, before sending.
    pub fn settle_delay(self, settle_delay: Duration) -> Self {
        Self {
            settle_delay,
            ..self
        }
    }

    /// Sets how long the child takes to come up with its response.
    pub fn processing_delay(self, processing_delay: Duration) -> Self {
        Self {
            processing_delay,
            ..self
        }
    }

    /// Sets how long the parent waits for the response.
    pub fn response_timeout(self, response_timeout: Duration) -> Self {
        Self {
            response_timeout,
            ..self
        }
    }
}

/// What happened during [`run_handshake`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// The message the parent sent.
    pub sent: String,
    /// The child's response, or `None` if it didn't arrive within the response timeout.
    pub response: Option<String>,
}

/// Runs the parent side of a handshake with a freshly spawned child thread.
///
/// The parent sends one message and waits up to the response timeout for the child to answer with
/// `Processed '<message>' by <child>`. Either way, the child is joined before returning. A
/// response that arrives too late is discarded.
///
/// Fails if the child thread can't be spawned, if it panics, or if it hangs up without answering.
pub fn run_handshake(config: &HandshakeConfig) -> io::Result<HandshakeOutcome> {
    let (mut parent, child) = pipe::<String>();

    log::debug!("spawning pipe child");
    let processing_delay = config.processing_delay;
    let child = UnitBuilder::new()
        .name("pipe-child")
        .spawn(move || run_child(child, processing_delay))?;

    thread::sleep(config.settle_delay);
    log::debug!("sending {:?} to child", config.message);
    parent.send(config.message.clone())?;

    let response = if parent.poll(config.response_timeout) {
        let response = parent.recv()?;
        log::debug!("received response {response:?}");
        Some(response)
    } else {
        log::warn!(
            "no response from child within {:?}",
            config.response_timeout
        );
        None
    };

    // `parent` stays alive until here, so a late response doesn't fail in the child.
    child.join()??;
    drop(parent);
    log::debug!("child joined");

    Ok(HandshakeOutcome {
        sent: config.message.clone(),
        response,
    })
}

fn run_child(mut conn: PipeEnd<String>, processing_delay: Duration) -> Result<(), Disconnected> {
    let current = thread::current();
    let name = current.name().unwrap_or("child");
    log::trace!("{name} waiting for data");

    let msg = conn.recv()?;
    log::trace!("{name} received {msg:?}");

    thread::sleep(processing_delay);

    let response = format!("Processed '{msg}' by {name}");
    log::trace!("{name} sending {response:?}");
    conn.send(response)
}
