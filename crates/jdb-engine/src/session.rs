//! Connection state machine and stop latch.

use jdb_proto::{Configuration, ProtocolError, ServerOpcode};

use crate::error::{CommandError, EngineError};
use crate::event::Location;

/// Where the inbound stream currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing but a configuration frame is acceptable.
    AwaitingConfig,
    /// Between parse units.
    Idle,
    /// Frames belong to an open parse unit.
    InParseUnit,
}

/// Per-connection state shared by all engine operations.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    config: Option<Configuration>,
    stopped_at: Option<Location>,
}

impl Session {
    /// Create a session waiting for its configuration frame.
    pub fn new() -> Self {
        Self {
            state: SessionState::AwaitingConfig,
            config: None,
            stopped_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The session configuration, once received.
    pub fn config(&self) -> Option<&Configuration> {
        self.config.as_ref()
    }

    /// Transition: AwaitingConfig → Idle.
    pub fn configure(&mut self, config: Configuration) -> Result<(), EngineError> {
        if self.state != SessionState::AwaitingConfig {
            return Err(ProtocolError::UnexpectedMessage(ServerOpcode::Configuration as u8).into());
        }
        self.config = Some(config);
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Transition: Idle → InParseUnit.
    pub fn begin_unit(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::InParseUnit;
        }
    }

    /// Transition: InParseUnit → Idle.
    pub fn end_unit(&mut self) {
        if self.state == SessionState::InParseUnit {
            self.state = SessionState::Idle;
        }
    }

    /// Latch a stop.
    pub fn stopped(&mut self, location: Location) {
        self.stopped_at = Some(location);
    }

    /// Where execution is stopped, if it is.
    pub fn stopped_at(&self) -> Option<&Location> {
        self.stopped_at.as_ref()
    }

    /// Check that execution is stopped.
    pub fn require_stopped(&self) -> Result<&Location, CommandError> {
        self.stopped_at.as_ref().ok_or(CommandError::NotStopped)
    }

    /// Clear the latch before a resumption command.
    pub fn resume(&mut self) -> Result<Location, CommandError> {
        self.stopped_at.take().ok_or(CommandError::NotStopped)
    }

    /// Back to AwaitingConfig with nothing latched.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
