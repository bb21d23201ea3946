//! Structured change tracking and diagnostics.
//!
//! Passes record what they did - and why a method fell back - into an
//! [`EventLog`] instead of printing. The surrounding compiler decides what
//! to do with the log (counters, dump tooling, test assertions). Events are
//! built with a short chain:
//!
//! ```rust
//! use miropt::opt::{EventKind, EventLog};
//! use miropt::mir::BlockId;
//!
//! let mut log = EventLog::new();
//! log.record(EventKind::NullCheckEliminated)
//!     .block(BlockId::new(3))
//!     .message("receiver already checked on every path");
//! assert_eq!(log.count(EventKind::NullCheckEliminated), 1);
//! ```

use std::fmt;

use strum::{Display, EnumCount};

use crate::mir::BlockId;

/// What happened.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, EnumCount)]
#[strum(serialize_all = "kebab-case")]
pub enum EventKind {
    /// A null check was proven redundant.
    NullCheckEliminated,
    /// An array-bounds check was proven redundant.
    RangeCheckEliminated,
    /// A class-initialization check was proven redundant.
    ClassInitCheckEliminated,
    /// A method was marked for the unoptimized fallback path.
    FallbackMarked,
    /// One full fixed-point pass of the value-numbering driver completed.
    FixedPointPass,
}

/// One recorded event.
#[derive(Debug, Clone)]
pub struct Event {
    kind: EventKind,
    block: Option<BlockId>,
    instruction: Option<usize>,
    message: Option<String>,
}

impl Event {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            block: None,
            instruction: None,
            message: None,
        }
    }

    /// Attaches the block the event occurred in.
    pub fn block(&mut self, block: BlockId) -> &mut Self {
        self.block = Some(block);
        self
    }

    /// Attaches the instruction index within the block.
    pub fn instruction(&mut self, index: usize) -> &mut Self {
        self.instruction = Some(index);
        self
    }

    /// Attaches a free-form message.
    pub fn message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    /// Returns the event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(block) = self.block {
            write!(f, " @ {block}")?;
            if let Some(instr) = self.instruction {
                write!(f, "[{instr}]")?;
            }
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// An append-only log of [`Event`]s for one pass or one method compile.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new event and returns it for builder-style decoration.
    pub fn record(&mut self, kind: EventKind) -> &mut Event {
        self.events.push(Event::new(kind));
        self.events.last_mut().expect("just pushed")
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns the number of events of one kind.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }

    /// Iterates over the recorded events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Appends all events from `other`.
    pub fn merge(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }
}

impl fmt::Display for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.events {
            writeln!(f, "{event}")?;
        }
        Ok(())
    }
}
