//! The protocol engine.
//!
//! [`ProtocolEngine`] owns everything one connection knows: configuration,
//! the function table, breakpoint tables, the open parse unit and partial
//! eval/backtrace responses. Inbound frames go through [`ProtocolEngine::process`]
//! strictly in arrival order; user commands are methods that encode and send
//! outbound messages.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use jdb_proto::{
    cesu8, encode_eval, ClientMessage, Codec, Configuration, Handle, Reassembler, ServerMessage,
    ServerOpcode, TextField,
};
use tracing::{debug, error, info, warn};

use crate::error::{CommandError, EngineError};
use crate::event::{EngineEvent, Location, StopKind};
use crate::function::{BreakpointId, FunctionRecord};
use crate::parser::{ParseStep, ParseUnit};
use crate::registry::{BreakpointRegistry, PendingBreakpoint, Resolution};
use crate::session::{Session, SessionState};
use crate::transport::Transport;

/// Resumption commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Continue,
    /// Step into.
    Step,
    /// Step over.
    Next,
}

/// Client side of one debugger connection.
#[derive(Debug)]
pub struct ProtocolEngine<T: Transport> {
    transport: Option<T>,
    session: Session,
    registry: BreakpointRegistry,
    parse: Option<ParseUnit>,
    eval_output: Reassembler,
    backtrace: Vec<Location>,
}

impl<T: Transport> ProtocolEngine<T> {
    /// Create an engine with no connection.
    pub fn new() -> Self {
        Self {
            transport: None,
            session: Session::new(),
            registry: BreakpointRegistry::new(),
            parse: None,
            eval_output: Reassembler::new(),
            backtrace: Vec::new(),
        }
    }

    /// Attach a fresh connection. An existing one is closed first.
    ///
    /// Pending breakpoints queued while disconnected are kept.
    pub fn open(&mut self, transport: T) {
        if self.transport.is_some() {
            self.close();
        }
        self.transport = Some(transport);
        info!("connection opened, waiting for configuration");
    }

    /// Whether a transport is attached.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Close the transport and drop all session state.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            info!("connection closed");
        }
        self.session.reset();
        self.registry.clear();
        self.parse = None;
        self.eval_output.reset();
        self.backtrace.clear();
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Configuration received from the engine, once there is one.
    pub fn config(&self) -> Option<&Configuration> {
        self.session.config()
    }

    /// Function table and breakpoint bookkeeping.
    pub fn registry(&self) -> &BreakpointRegistry {
        &self.registry
    }

    /// Process one inbound frame.
    ///
    /// # Errors
    ///
    /// Any returned error has already closed the connection and reset the
    /// engine to [`SessionState::AwaitingConfig`].
    pub fn process(&mut self, frame: &[u8]) -> Result<Vec<EngineEvent>, EngineError> {
        if self.transport.is_none() {
            return Err(EngineError::NotConnected);
        }
        debug!(len = frame.len(), opcode = ?frame.first(), "frame received");

        let mut events = Vec::new();
        match self.dispatch(frame, &mut events) {
            Ok(()) => Ok(events),
            Err(err) => {
                self.abort(&err);
                Err(err)
            }
        }
    }

    fn abort(&mut self, err: &EngineError) {
        error!("connection aborted: {err}");
        self.close();
    }

    fn dispatch(&mut self, frame: &[u8], events: &mut Vec<EngineEvent>) -> Result<(), EngineError> {
        let Some(config) = self.session.config().copied() else {
            let config = Configuration::decode(frame)?;
            info!(
                max_message_size = config.max_message_size,
                pointer_width = config.pointer_width.bytes(),
                endianness = ?config.endianness,
                "connection configured"
            );
            self.session.configure(config)?;
            events.push(EngineEvent::Configured(config));
            return Ok(());
        };

        let codec = config.codec();
        let message = ServerMessage::decode(&codec, frame)?;

        if let Some(unit) = self.parse.as_mut() {
            let step = unit.feed(message, frame)?;
            return self.parse_step(step, events);
        }

        let opens_unit = frame
            .first()
            .copied()
            .and_then(ServerOpcode::from_u8)
            .is_some_and(ServerOpcode::starts_parse_unit);
        if opens_unit {
            self.session.begin_unit();
            let mut unit = ParseUnit::new();
            let step = unit.feed(message, frame)?;
            self.parse = Some(unit);
            return self.parse_step(step, events);
        }

        match message {
            ServerMessage::ParseError => {
                warn!("parse error outside of a parse unit");
                events.push(EngineEvent::ParseAborted);
            }
            ServerMessage::ReleaseByteCodeCp(handle) => self.release(handle, events)?,
            ServerMessage::BreakpointHit { handle, offset } => {
                self.handle_stop(StopKind::Breakpoint, handle, offset, events)?;
            }
            ServerMessage::ExceptionHit { handle, offset } => {
                self.handle_stop(StopKind::Exception, handle, offset, events)?;
            }
            ServerMessage::Backtrace { frames, last } => {
                for (handle, offset) in frames {
                    let location = self.registry.resolve_stop(handle, offset)?;
                    self.backtrace.push(location);
                }
                if last {
                    let frames = std::mem::take(&mut self.backtrace);
                    debug!(depth = frames.len(), "backtrace complete");
                    events.push(EngineEvent::Backtrace(frames));
                }
            }
            ServerMessage::Text { field, last } => {
                self.eval_output.push(frame);
                if last {
                    let text = cesu8::decode_string(&self.eval_output.take())?;
                    match field {
                        TextField::EvalError => {
                            info!("eval raised: {text}");
                            events.push(EngineEvent::EvalError(text));
                        }
                        _ => {
                            info!("eval result: {text}");
                            events.push(EngineEvent::EvalResult(text));
                        }
                    }
                }
            }
            _ => return Err(jdb_proto::ProtocolError::UnexpectedMessage(frame[0]).into()),
        }
        Ok(())
    }

    fn parse_step(&mut self, step: ParseStep, events: &mut Vec<EngineEvent>) -> Result<(), EngineError> {
        match step {
            ParseStep::Continue => {}
            ParseStep::Aborted => {
                warn!("parse error, source discarded");
                self.parse = None;
                self.session.end_unit();
                events.push(EngineEvent::ParseAborted);
            }
            ParseStep::Release(handle) => self.release(handle, events)?,
            ParseStep::Completed {
                source_name,
                functions,
            } => {
                self.parse = None;
                self.session.end_unit();
                let handles = self.registry.insert_unit(functions);
                info!(
                    source_name = %source_name,
                    functions = handles.len(),
                    "source parsed"
                );
                events.push(EngineEvent::ParseUnitCompleted {
                    source_name: source_name.clone(),
                    handles,
                });

                for (spec, activations) in self.registry.resolve_pending(&source_name) {
                    for activation in activations.iter().filter(|a| a.newly) {
                        self.transmit(enable_message(activation.id, true))?;
                    }
                    events.push(EngineEvent::PendingResolved {
                        spec,
                        indices: activations.iter().map(|a| a.index).collect(),
                    });
                }
            }
        }
        Ok(())
    }

    fn release(&mut self, handle: Handle, events: &mut Vec<EngineEvent>) -> Result<(), EngineError> {
        self.registry.release(handle)?;
        self.transmit(ClientMessage::FreeByteCodeCp(handle))?;
        events.push(EngineEvent::FunctionReleased(handle));
        Ok(())
    }

    fn handle_stop(
        &mut self,
        kind: StopKind,
        handle: Handle,
        offset: u32,
        events: &mut Vec<EngineEvent>,
    ) -> Result<(), EngineError> {
        let location = self.registry.resolve_stop(handle, offset)?;
        if kind == StopKind::Exception {
            info!("Exception throw detected");
        }
        info!("Stopped {location}");
        self.session.stopped(location.clone());
        events.push(EngineEvent::Stopped { kind, location });
        Ok(())
    }

    fn transmit(&mut self, message: ClientMessage) -> Result<(), EngineError> {
        let codec = self
            .session
            .config()
            .map(Configuration::codec)
            .ok_or(EngineError::NotConnected)?;
        let frame = message.encode(&codec)?;
        self.send_frame(frame)
    }

    fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), EngineError> {
        let transport = self.transport.as_mut().ok_or(EngineError::NotConnected)?;
        debug!(len = frame.len(), opcode = ?frame.first(), "frame sent");
        transport.send(frame)?;
        Ok(())
    }

    /// Send on behalf of a command, aborting the connection on failure.
    fn send_command(&mut self, message: ClientMessage) -> Result<(), CommandError> {
        self.transmit(message).map_err(|err| self.fail(err))
    }

    fn fail(&mut self, err: EngineError) -> CommandError {
        self.abort(&err);
        CommandError::Fatal(err)
    }

    fn codec(&self) -> Result<Codec, CommandError> {
        self.session
            .config()
            .map(Configuration::codec)
            .ok_or(CommandError::NotConnected)
    }

    /// Resume execution. Only valid while stopped.
    pub fn resume(&mut self, kind: Resume) -> Result<(), CommandError> {
        self.codec()?;
        self.session.require_stopped()?;
        let message = match kind {
            Resume::Continue => ClientMessage::Continue,
            Resume::Step => ClientMessage::Step,
            Resume::Next => ClientMessage::Next,
        };
        self.send_command(message)?;
        self.session.resume()?;
        Ok(())
    }

    /// Ask the engine to pause at the next opportunity.
    pub fn stop(&mut self) -> Result<(), CommandError> {
        self.codec()?;
        self.send_command(ClientMessage::Stop)
    }

    /// Request a backtrace; `0` means unlimited.
    pub fn get_backtrace(&mut self, max_depth: u32) -> Result<(), CommandError> {
        self.codec()?;
        self.session.require_stopped()?;
        self.backtrace.clear();
        self.send_command(ClientMessage::GetBacktrace { max_depth })
    }

    /// Evaluate an expression in the stopped frame.
    pub fn eval(&mut self, expression: &str) -> Result<(), CommandError> {
        let codec = self.codec()?;
        self.session.require_stopped()?;
        if expression.is_empty() {
            return Err(CommandError::EmptyArgument);
        }
        let max = self
            .session
            .config()
            .map_or(0, |config| config.max_message_size as usize);
        let frames = encode_eval(&codec, expression, max)
            .map_err(|err| self.fail(EngineError::from(err)))?;
        debug!(frames = frames.len(), "sending eval");
        for frame in frames {
            self.send_frame(frame).map_err(|err| self.fail(err))?;
        }
        Ok(())
    }

    /// Enable or disable stopping on thrown exceptions.
    pub fn exception_config(&mut self, enable: bool) -> Result<(), CommandError> {
        self.codec()?;
        self.send_command(ClientMessage::ExceptionConfig { enable })?;
        if enable {
            info!("Stop at exception enabled");
        } else {
            info!("Stop at exception disabled");
        }
        Ok(())
    }

    /// Set a breakpoint from a `file:line` or function-name spec.
    ///
    /// With `pending`, a spec that matches nothing is queued and resolved
    /// when matching code is parsed.
    pub fn set_breakpoint(&mut self, spec: &str, pending: bool) -> Result<Resolution, CommandError> {
        if spec.is_empty() {
            return Err(CommandError::EmptyArgument);
        }
        let resolution = self.registry.resolve_location(spec, pending);
        match &resolution {
            Resolution::NotFound => return Err(CommandError::BreakpointNotFound(spec.to_string())),
            Resolution::Activated(activations) => {
                let enabled: Vec<BreakpointId> = activations
                    .iter()
                    .filter(|a| a.newly)
                    .map(|a| a.id)
                    .collect();
                for id in enabled {
                    self.send_command(enable_message(id, true))?;
                }
            }
            Resolution::Pending(_) => {}
        }
        Ok(resolution)
    }

    /// Queue a spec as pending without trying to resolve it.
    pub fn add_pending(&mut self, spec: &str) {
        self.registry.add_pending(PendingBreakpoint::from_spec(spec));
    }

    /// Delete the active breakpoint with display index `index`.
    pub fn delete_breakpoint(&mut self, index: u32) -> Result<(), CommandError> {
        let id = self.registry.deactivate(index)?;
        self.send_command(enable_message(id, false))
    }

    /// Delete every active breakpoint, returning how many were deleted.
    pub fn delete_all(&mut self) -> Result<usize, CommandError> {
        let cleared = self.registry.deactivate_all();
        for (_, id) in &cleared {
            self.send_command(enable_message(*id, false))?;
        }
        Ok(cleared.len())
    }

    /// Drop the pending request at `index`. Nothing is sent.
    pub fn delete_pending(&mut self, index: usize) -> Result<PendingBreakpoint, CommandError> {
        self.registry.delete_pending(index)
    }

    /// Every `(source name, line)` that can carry a breakpoint.
    pub fn breakpoint_lines(&self) -> BTreeSet<(String, u32)> {
        self.registry.breakpoint_lines()
    }

    /// Active breakpoints in index order with display text.
    pub fn active_breakpoints(&self) -> Vec<(u32, String)> {
        self.registry.active()
    }

    pub fn pending_breakpoints(&self) -> &[PendingBreakpoint] {
        self.registry.pending()
    }

    pub fn next_breakpoint_index(&self) -> u32 {
        self.registry.next_index()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionRecord> {
        self.registry.functions()
    }

    /// Where execution is stopped, if it is.
    pub fn last_stop(&self) -> Option<&Location> {
        self.session.stopped_at()
    }

    /// Source text of the function execution is stopped in.
    pub fn current_source(&self) -> Option<&str> {
        let location = self.session.stopped_at()?;
        self.registry
            .function(location.handle)
            .map(|func| &*func.source)
    }

    /// Multi-line listing of every function and its breakpoint locations.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for func in self.registry.functions() {
            let source_name = if func.source_name.is_empty() {
                "<unknown>"
            } else {
                func.source_name.as_str()
            };
            let _ = writeln!(
                out,
                "Function {} '{}' at {}:{},{}",
                func.handle, func.name, source_name, func.line, func.column
            );
            for (line, offset) in &func.lines {
                let _ = write!(out, "  Breakpoint line: {line} at memory offset: {offset}");
                if let Some(index) = func.offsets.get(offset).and_then(|bp| bp.active_index) {
                    let _ = write!(out, " (active: {index})");
                }
                out.push('\n');
            }
        }
        out
    }
}

impl<T: Transport> Default for ProtocolEngine<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn enable_message(id: BreakpointId, enable: bool) -> ClientMessage {
    ClientMessage::UpdateBreakpoint {
        enable,
        handle: id.handle,
        offset: id.offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    const CONFIG: [u8; 4] = [1, 64, 2, 1];

    fn connected() -> (ProtocolEngine<MemoryTransport>, MemoryTransport) {
        let recorder = MemoryTransport::new();
        let mut engine = ProtocolEngine::new();
        engine.open(recorder.clone());
        engine.process(&CONFIG).unwrap();
        (engine, recorder)
    }

    fn ints(op: u8, values: &[u32]) -> Vec<u8> {
        let mut frame = vec![op];
        for v in values {
            frame.extend_from_slice(&v.to_le_bytes());
        }
        frame
    }

    /// Top-level `a.js` with breakpoints on lines 1 and 2 at offsets 0 and 10.
    fn load_a_js(engine: &mut ProtocolEngine<MemoryTransport>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        for frame in [
            b"\x08x = 1;\ny = 2;".to_vec(),
            b"\x0aa.js".to_vec(),
            ints(5, &[1, 2]),
            ints(6, &[0, 10]),
            vec![3, 0x10, 0x00],
        ] {
            events.extend(engine.process(&frame).unwrap());
        }
        events
    }

    fn hit(offset: u32) -> Vec<u8> {
        let mut frame = vec![14, 0x10, 0x00];
        frame.extend_from_slice(&offset.to_le_bytes());
        frame
    }

    #[test]
    fn first_frame_must_be_configuration() {
        let recorder = MemoryTransport::new();
        let mut engine = ProtocolEngine::new();
        engine.open(recorder.clone());
        let err = engine.process(&[5, 1, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
        assert!(recorder.is_closed());
        assert!(!engine.is_open());
        assert_eq!(engine.state(), SessionState::AwaitingConfig);
    }

    #[test]
    fn process_without_transport() {
        let mut engine: ProtocolEngine<MemoryTransport> = ProtocolEngine::new();
        assert!(matches!(engine.process(&CONFIG), Err(EngineError::NotConnected)));
    }

    #[test]
    fn configuration_moves_to_idle() {
        let (engine, _) = connected();
        assert_eq!(engine.state(), SessionState::Idle);
        assert_eq!(engine.config().unwrap().max_message_size, 64);
    }

    #[test]
    fn parse_unit_state_tracking() {
        let (mut engine, _) = connected();
        engine.process(b"\x07x").unwrap();
        assert_eq!(engine.state(), SessionState::InParseUnit);
        let events = engine.process(&[2]).unwrap();
        assert_eq!(events, vec![EngineEvent::ParseAborted]);
        assert_eq!(engine.state(), SessionState::Idle);
        assert_eq!(engine.functions().count(), 0);
    }

    #[test]
    fn unit_completion_registers_functions() {
        let (mut engine, _) = connected();
        let events = load_a_js(&mut engine);
        assert_eq!(
            events,
            vec![EngineEvent::ParseUnitCompleted {
                source_name: "a.js".into(),
                handles: vec![Handle(0x10)],
            }]
        );
        assert_eq!(engine.state(), SessionState::Idle);
        assert_eq!(engine.breakpoint_lines().len(), 2);
    }

    #[test]
    fn breakpoint_sends_enable_once() {
        let (mut engine, recorder) = connected();
        load_a_js(&mut engine);
        engine.set_breakpoint("a.js:2", false).unwrap();
        engine.set_breakpoint("a.js:2", false).unwrap();
        assert_eq!(recorder.take_sent(), vec![vec![2, 1, 0x10, 0x00, 10, 0, 0, 0]]);
        assert_eq!(engine.active_breakpoints(), vec![(1, "a.js:2".to_string())]);
    }

    #[test]
    fn breakpoint_not_found() {
        let (mut engine, recorder) = connected();
        load_a_js(&mut engine);
        assert!(matches!(
            engine.set_breakpoint("a.js:9", false),
            Err(CommandError::BreakpointNotFound(_))
        ));
        assert!(matches!(
            engine.set_breakpoint("", true),
            Err(CommandError::EmptyArgument)
        ));
        assert!(recorder.sent().is_empty());
    }

    #[test]
    fn stop_then_resume_once() {
        let (mut engine, recorder) = connected();
        load_a_js(&mut engine);
        assert!(matches!(
            engine.resume(Resume::Continue),
            Err(CommandError::NotStopped)
        ));

        let events = engine.process(&hit(5)).unwrap();
        match &events[0] {
            EngineEvent::Stopped { kind, location } => {
                assert_eq!(*kind, StopKind::Breakpoint);
                assert_eq!(location.line, 1);
                assert!(!location.exact);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(engine.last_stop().is_some());
        assert_eq!(engine.current_source(), Some("x = 1;\ny = 2;"));

        engine.resume(Resume::Next).unwrap();
        assert_eq!(recorder.take_sent(), vec![vec![7]]);
        assert!(matches!(engine.resume(Resume::Step), Err(CommandError::NotStopped)));
        assert!(engine.current_source().is_none());
    }

    #[test]
    fn stop_in_unknown_function_aborts() {
        let (mut engine, recorder) = connected();
        load_a_js(&mut engine);
        let err = engine.process(&[14, 0x99, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, EngineError::MissingFunction(Handle(0x99))));
        assert!(recorder.is_closed());
        assert_eq!(engine.functions().count(), 0);
        assert_eq!(engine.state(), SessionState::AwaitingConfig);
    }

    #[test]
    fn exception_hit_is_reported() {
        let (mut engine, _) = connected();
        load_a_js(&mut engine);
        let mut frame = hit(10);
        frame[0] = 15;
        let events = engine.process(&frame).unwrap();
        assert!(matches!(
            &events[0],
            EngineEvent::Stopped { kind: StopKind::Exception, location } if location.exact
        ));
    }

    #[test]
    fn release_is_acknowledged() {
        let (mut engine, recorder) = connected();
        load_a_js(&mut engine);
        let events = engine.process(&[13, 0x10, 0x00]).unwrap();
        assert_eq!(events, vec![EngineEvent::FunctionReleased(Handle(0x10))]);
        assert_eq!(recorder.take_sent(), vec![vec![1, 0x10, 0x00]]);
        assert_eq!(engine.functions().count(), 0);
    }

    #[test]
    fn release_of_unknown_handle_aborts() {
        let (mut engine, recorder) = connected();
        let err = engine.process(&[13, 0x42, 0x00]).unwrap_err();
        assert!(matches!(err, EngineError::UnknownHandle(Handle(0x42))));
        assert!(recorder.is_closed());
    }

    #[test]
    fn backtrace_collects_until_end() {
        let (mut engine, recorder) = connected();
        load_a_js(&mut engine);
        engine.process(&hit(10)).unwrap();
        engine.get_backtrace(0).unwrap();
        assert_eq!(recorder.take_sent(), vec![vec![8, 0, 0, 0, 0]]);

        let mut first = vec![16, 0x10, 0x00];
        first.extend_from_slice(&10u32.to_le_bytes());
        assert!(engine.process(&first).unwrap().is_empty());

        let mut last = vec![17, 0x10, 0x00];
        last.extend_from_slice(&3u32.to_le_bytes());
        let events = engine.process(&last).unwrap();
        match &events[..] {
            [EngineEvent::Backtrace(frames)] => {
                assert_eq!(frames.len(), 2);
                assert_eq!(frames[0].line, 2);
                assert_eq!(frames[1].line, 1);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn backtrace_requires_stop() {
        let (mut engine, _) = connected();
        assert!(matches!(engine.get_backtrace(3), Err(CommandError::NotStopped)));
    }

    #[test]
    fn eval_roundtrip() {
        let (mut engine, recorder) = connected();
        load_a_js(&mut engine);
        engine.process(&hit(0)).unwrap();

        assert!(matches!(engine.eval(""), Err(CommandError::EmptyArgument)));
        engine.eval("x").unwrap();
        assert_eq!(recorder.take_sent(), vec![vec![9, 1, 0, 0, 0, b'x']]);

        assert!(engine.process(b"\x124").unwrap().is_empty());
        let events = engine.process(b"\x132").unwrap();
        assert_eq!(events, vec![EngineEvent::EvalResult("42".into())]);

        let events = engine.process(b"\x15ReferenceError").unwrap();
        assert_eq!(events, vec![EngineEvent::EvalError("ReferenceError".into())]);
    }

    #[test]
    fn eval_failure_aborts_the_connection() {
        let (mut engine, recorder) = connected();
        load_a_js(&mut engine);
        engine.process(&hit(0)).unwrap();

        recorder.clone().close();
        assert!(matches!(engine.eval("x"), Err(CommandError::Fatal(_))));
        assert!(!engine.is_open());
        assert_eq!(engine.state(), SessionState::AwaitingConfig);
        assert_eq!(engine.functions().count(), 0);
    }

    #[test]
    fn eval_requires_stop() {
        let (mut engine, _) = connected();
        assert!(matches!(engine.eval("1"), Err(CommandError::NotStopped)));
    }

    #[test]
    fn commands_need_connection() {
        let mut engine: ProtocolEngine<MemoryTransport> = ProtocolEngine::new();
        assert!(matches!(engine.stop(), Err(CommandError::NotConnected)));
        assert!(matches!(
            engine.exception_config(true),
            Err(CommandError::NotConnected)
        ));
        assert!(matches!(
            engine.resume(Resume::Continue),
            Err(CommandError::NotConnected)
        ));
    }

    #[test]
    fn stop_and_exception_config_encode() {
        let (mut engine, recorder) = connected();
        engine.stop().unwrap();
        engine.exception_config(true).unwrap();
        assert_eq!(recorder.take_sent(), vec![vec![4], vec![3, 1]]);
    }

    #[test]
    fn delete_breakpoints() {
        let (mut engine, recorder) = connected();
        load_a_js(&mut engine);
        engine.set_breakpoint("a.js:1", false).unwrap();
        engine.set_breakpoint("a.js:2", false).unwrap();
        recorder.take_sent();

        engine.delete_breakpoint(1).unwrap();
        assert_eq!(recorder.take_sent(), vec![vec![2, 0, 0x10, 0x00, 0, 0, 0, 0]]);
        assert!(matches!(
            engine.delete_breakpoint(1),
            Err(CommandError::UnknownIndex(1))
        ));

        assert_eq!(engine.delete_all().unwrap(), 1);
        assert_eq!(recorder.take_sent(), vec![vec![2, 0, 0x10, 0x00, 10, 0, 0, 0]]);
        assert_eq!(engine.delete_all().unwrap(), 0);
        assert_eq!(engine.next_breakpoint_index(), 3);
    }

    #[test]
    fn pending_breakpoint_resolves_on_parse() {
        let (mut engine, recorder) = connected();
        let resolution = engine.set_breakpoint("a.js:2", true).unwrap();
        assert_eq!(resolution, Resolution::Pending(PendingBreakpoint::Line(2)));
        assert_eq!(engine.pending_breakpoints().len(), 1);

        let events = load_a_js(&mut engine);
        assert!(events.contains(&EngineEvent::PendingResolved {
            spec: "a.js:2".into(),
            indices: vec![1],
        }));
        assert!(engine.pending_breakpoints().is_empty());
        assert_eq!(recorder.take_sent(), vec![vec![2, 1, 0x10, 0x00, 10, 0, 0, 0]]);
    }

    #[test]
    fn pending_added_before_connect_survives_open() {
        let recorder = MemoryTransport::new();
        let mut engine = ProtocolEngine::new();
        engine.add_pending("a.js:1");
        engine.open(recorder.clone());
        engine.process(&CONFIG).unwrap();
        load_a_js(&mut engine);
        assert_eq!(engine.active_breakpoints(), vec![(1, "a.js:1".to_string())]);
    }

    #[test]
    fn close_resets_everything() {
        let (mut engine, recorder) = connected();
        load_a_js(&mut engine);
        engine.set_breakpoint("a.js:1", false).unwrap();
        engine.process(&hit(0)).unwrap();
        engine.close();
        assert!(recorder.is_closed());
        assert_eq!(engine.state(), SessionState::AwaitingConfig);
        assert!(engine.config().is_none());
        assert!(engine.last_stop().is_none());
        assert!(engine.active_breakpoints().is_empty());
        assert_eq!(engine.next_breakpoint_index(), 1);
    }

    #[test]
    fn reopen_accepts_new_configuration() {
        let (mut engine, _) = connected();
        load_a_js(&mut engine);
        let second = MemoryTransport::new();
        engine.open(second.clone());
        engine.process(&[1, 32, 4, 0]).unwrap();
        assert_eq!(engine.config().unwrap().max_message_size, 32);
        assert_eq!(engine.functions().count(), 0);
    }

    #[test]
    fn unexpected_message_inside_unit_aborts() {
        let (mut engine, recorder) = connected();
        engine.process(b"\x07partial").unwrap();
        assert!(engine.process(&hit(0)).is_err());
        assert!(recorder.is_closed());
    }

    #[test]
    fn dump_lists_functions() {
        let (mut engine, _) = connected();
        load_a_js(&mut engine);
        engine.set_breakpoint("a.js:2", false).unwrap();
        let dump = engine.dump();
        assert!(dump.starts_with("Function 0x0010 '' at a.js:1,1\n"));
        assert!(dump.contains("  Breakpoint line: 1 at memory offset: 0\n"));
        assert!(dump.contains("  Breakpoint line: 2 at memory offset: 10 (active: 1)\n"));
    }
}
