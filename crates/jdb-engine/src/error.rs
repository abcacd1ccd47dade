//! Engine error types.

use jdb_proto::{Handle, ProtocolError};
use thiserror::Error;

/// Errors that abort the connection.
///
/// Any of these means client and engine no longer agree about program
/// state; the engine closes the transport and resets before returning one.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or unexpected frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The engine released a function the client never registered.
    #[error("release of unknown function {0}")]
    UnknownHandle(Handle),

    /// A stop or backtrace entry names an unknown function.
    #[error("stopped in unknown function {0}")]
    MissingFunction(Handle),

    /// A stop inside a function that has no breakpoint locations.
    #[error("function {0} has no breakpoint locations")]
    NoBreakpoints(Handle),

    /// Line and offset lists of a function differ in length.
    #[error("function {handle} has {lines} breakpoint lines but {offsets} offsets")]
    MismatchedBreakpointLists {
        /// The function being finalized.
        handle: Handle,
        /// Number of line entries.
        lines: usize,
        /// Number of offset entries.
        offsets: usize,
    },

    /// The transport failed to send.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A frame or command arrived while no transport is open.
    #[error("not connected")]
    NotConnected,
}

/// Errors from user commands. None of these touch connection state,
/// except [`CommandError::Fatal`] which wraps an abort raised while sending.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Resume or inspection without an outstanding stop.
    #[error("this command is allowed only if execution is stopped at a breakpoint")]
    NotStopped,

    /// No session is configured.
    #[error("not connected to a debugger")]
    NotConnected,

    /// A required argument is missing.
    #[error("argument required")]
    EmptyArgument,

    /// `exception` takes `1` or `0`.
    #[error("invalid input {0:?}, usage: 1 to enable, 0 to disable")]
    InvalidExceptionFlag(String),

    /// No function matches a breakpoint request.
    #[error("breakpoint not found: {0}")]
    BreakpointNotFound(String),

    /// No active breakpoint has this index.
    #[error("no breakpoint found with index {0}")]
    UnknownIndex(u32),

    /// No pending breakpoint has this index.
    #[error("no pending breakpoint found with index {0}")]
    UnknownPendingIndex(usize),

    /// The console did not recognise the command word.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A command argument failed validation.
    #[error("invalid argument for {command}: {argument:?}")]
    InvalidArgument {
        /// Command word.
        command: String,
        /// The rejected argument.
        argument: String,
    },

    /// The line does not look like a command at all.
    #[error("malformed command: {0:?}")]
    Malformed(String),

    /// Sending failed and the connection was aborted.
    #[error("connection aborted: {0}")]
    Fatal(#[from] EngineError),
}
