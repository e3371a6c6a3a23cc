//! Start and exit signals for units of execution.

use std::{fmt, thread};

/// What kind of unit a [`Lifecycle`] guard belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Producer,
    Consumer,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnitKind::Producer => "producer",
            UnitKind::Consumer => "consumer",
        })
    }
}

/// Drop guard that logs a unit's start on creation and its exit on drop.
///
/// Because the exit record is written from `Drop`, it is also emitted when the unit unwinds, in
/// which case it is logged as a warning.
#[must_use = "`Lifecycle` should be assigned to a variable, or it will exit immediately"]
pub struct Lifecycle {
    kind: UnitKind,
    id: usize,
}

impl Lifecycle {
    /// Logs the start of unit `id` of the given kind.
    pub fn start(kind: UnitKind, id: usize) -> Self {
        log::trace!("{kind} {id} started");
        Self { kind, id }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        let (kind, id) = (self.kind, self.id);
        if thread::panicking() {
            log::warn!("{kind} {id} exiting abnormally");
        } else {
            log::trace!("{kind} {id} finished");
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)
    }
}
