//! Owned threads that run one unit of work to completion.

use std::{
    any::Any,
    error::Error,
    fmt, io,
    thread::{self, JoinHandle},
};

/// A builder object that can be used to configure and spawn a [`Unit`].
#[derive(Debug, Clone, Default)]
pub struct UnitBuilder {
    name: Option<String>,
}

impl UnitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name of the unit's thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Spawns a [`Unit`] thread that runs `f` to completion.
    pub fn spawn<R, F>(self, f: F) -> io::Result<Unit<R>>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let mut builder = thread::Builder::new();
        if let Some(name) = self.name.clone() {
            builder = builder.name(name);
        }
        let handle = builder.spawn(f)?;
        Ok(Unit {
            name: self.name,
            handle: Some(handle),
        })
    }
}

/// An owned thread running a producer, a consumer, or one side of a handshake.
///
/// Unlike a plain [`JoinHandle`], a [`Unit`] is always joined: either explicitly with
/// [`Unit::join`], or when it is dropped. A panic in the unit's thread is never propagated to the
/// owner. [`Unit::join`] returns it as a [`Panicked`] error, and dropping the [`Unit`] logs it.
pub struct Unit<R> {
    name: Option<String>,
    handle: Option<JoinHandle<R>>,
}

impl<R> Drop for Unit<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                let panicked = Panicked::new(self.name.take(), &*payload);
                log::warn!("dropped a unit that {panicked}");
            }
        }
    }
}

impl<R> Unit<R> {
    /// Returns the name the unit's thread was spawned with.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns whether the unit's thread has run to completion (or unwound).
    ///
    /// If this returns `true`, [`Unit::join`] will not block.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Blocks until the unit's thread exits, and returns its result.
    ///
    /// If the thread panicked, its panic message is returned as a [`Panicked`] error.
    pub fn join(mut self) -> Result<R, Panicked> {
        let handle = self
            .handle
            .take()
            .expect("unit handle is only taken by `join` and `drop`");
        handle
            .join()
            .map_err(|payload| Panicked::new(self.name.take(), &*payload))
    }
}

/// An error returned by [`Unit::join`] indicating that the unit's thread panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panicked {
    unit: Option<String>,
    message: Option<String>,
}

impl Panicked {
    fn new(unit: Option<String>, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            Some((*s).to_string())
        } else {
            payload.downcast_ref::<String>().cloned()
        };
        Self { unit, message }
    }

    /// The name of the unit's thread, if it had one.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// The panic message, if the payload was a string.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl Error for Panicked {}

impl fmt::Display for Panicked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "unit '{unit}' panicked")?,
            None => f.write_str("unit panicked")?,
        }
        match &self.message {
            Some(msg) => write!(f, ": {msg}"),
            None => Ok(()),
        }
    }
}

impl From<Panicked> for io::Error {
    fn from(panicked: Panicked) -> Self {
        io::Error::new(io::ErrorKind::Other, panicked)
    }
}
