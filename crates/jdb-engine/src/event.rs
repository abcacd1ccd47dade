//! Events reported to the front end.

use std::fmt;

use jdb_proto::{Configuration, Handle};

/// A source position resolved from a `(handle, offset)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub handle: Handle,
    /// Source line of the resolved breakpoint.
    pub line: u32,
    /// Offset of the resolved breakpoint, not the reported one.
    pub offset: u32,
    pub active_index: Option<u32>,
    /// `true` when the reported offset is a breakpoint offset.
    pub exact: bool,
    /// Display text of the breakpoint.
    pub description: String,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.exact { "at " } else { "around " })?;
        if let Some(index) = self.active_index {
            write!(f, "breakpoint:{index} ")?;
        }
        f.write_str(&self.description)
    }
}

/// Why execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    Breakpoint,
    Exception,
}

/// Something the engine learned from a processed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The configuration frame was accepted.
    Configured(Configuration),
    /// A parse unit finished and its functions are registered.
    ParseUnitCompleted {
        source_name: String,
        handles: Vec<Handle>,
    },
    /// The engine reported a parse error; the unit was discarded.
    ParseAborted,
    /// A pending breakpoint matched newly registered code.
    PendingResolved { spec: String, indices: Vec<u32> },
    /// A function was freed and acknowledged.
    FunctionReleased(Handle),
    /// Execution stopped.
    Stopped { kind: StopKind, location: Location },
    /// A complete backtrace, innermost frame first.
    Backtrace(Vec<Location>),
    EvalResult(String),
    EvalError(String),
}
