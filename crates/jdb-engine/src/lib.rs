//! jdb-engine: client-side state of a script-engine debugger connection.
//!
//! This crate rebuilds the remote program structure from parse frames,
//! maps breakpoint requests to `(function, offset)` pairs and back, and
//! drives outbound commands. It is transport agnostic: frames come in
//! through [`ProtocolEngine::process`] and go out through a [`Transport`].

pub mod command;
pub mod engine;
pub mod error;
pub mod event;
pub mod function;
pub mod parser;
pub mod registry;
pub mod session;
pub mod transport;

// Re-export key types for convenience.
pub use command::{Command, DeleteTarget};
pub use engine::{ProtocolEngine, Resume};
pub use error::{CommandError, EngineError};
pub use event::{EngineEvent, Location, StopKind};
pub use function::{BreakpointId, BreakpointRecord, FunctionRecord};
pub use registry::{Activation, BreakpointRegistry, PendingBreakpoint, Resolution};
pub use session::{Session, SessionState};
pub use transport::{MemoryTransport, Transport};
