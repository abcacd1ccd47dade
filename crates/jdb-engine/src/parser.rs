//! Reconstruction of one parse unit.
//!
//! The engine describes a parsed source bottom-up: the source text and
//! name, then for every nested function a declaration position, its
//! breakpoint lines and offsets, and finally its byte-code handle. The
//! top-level scope is the implicit root frame and its handle ends the unit.

use std::collections::BTreeMap;
use std::sync::Arc;

use jdb_proto::{cesu8, Handle, ProtocolError, Reassembler, ServerMessage, TextField};
use tracing::debug;

use crate::error::EngineError;
use crate::function::FunctionRecord;

/// An open function frame.
#[derive(Debug)]
struct FrameBuilder {
    is_function: bool,
    line: u32,
    column: u32,
    name: String,
    source: Arc<str>,
    source_name: String,
    lines: Vec<u32>,
    offsets: Vec<u32>,
}

impl FrameBuilder {
    fn root() -> Self {
        Self {
            is_function: false,
            line: 1,
            column: 1,
            name: String::new(),
            source: Arc::from(""),
            source_name: String::new(),
            lines: Vec::new(),
            offsets: Vec::new(),
        }
    }

    fn finish(self, handle: Handle) -> Result<FunctionRecord, EngineError> {
        if self.lines.len() != self.offsets.len() {
            return Err(EngineError::MismatchedBreakpointLists {
                handle,
                lines: self.lines.len(),
                offsets: self.offsets.len(),
            });
        }
        let mut record = FunctionRecord::new(
            handle,
            self.is_function,
            self.line,
            self.column,
            self.name,
            &self.lines,
            &self.offsets,
        );
        record.source = self.source;
        record.source_name = self.source_name;
        Ok(record)
    }
}

/// What the caller should do after feeding a message.
#[derive(Debug)]
pub enum ParseStep {
    /// The unit is still open.
    Continue,
    /// The engine reported a parse error; discard the unit.
    Aborted,
    /// The outermost handle arrived.
    Completed {
        source_name: String,
        functions: Vec<FunctionRecord>,
    },
    /// A release for a function that is not part of this unit.
    Release(Handle),
}

/// Transient state of one parse unit.
#[derive(Debug)]
pub struct ParseUnit {
    source_chunks: Reassembler,
    source_name_chunks: Reassembler,
    function_name_chunks: Reassembler,
    source: Arc<str>,
    source_name: String,
    stack: Vec<FrameBuilder>,
    completed: BTreeMap<Handle, FunctionRecord>,
}

impl ParseUnit {
    pub fn new() -> Self {
        Self {
            source_chunks: Reassembler::new(),
            source_name_chunks: Reassembler::new(),
            function_name_chunks: Reassembler::new(),
            source: Arc::from(""),
            source_name: String::new(),
            stack: vec![FrameBuilder::root()],
            completed: BTreeMap::new(),
        }
    }

    /// Number of open frames, root included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Feed one decoded message together with its raw frame.
    ///
    /// # Errors
    ///
    /// Messages outside the parse group, undecodable text and breakpoint
    /// lists of different lengths.
    pub fn feed(&mut self, message: ServerMessage, frame: &[u8]) -> Result<ParseStep, EngineError> {
        match message {
            ServerMessage::ParseError => {
                debug!("parse error reported, discarding unit");
                Ok(ParseStep::Aborted)
            }
            ServerMessage::Text {
                field: TextField::SourceCode,
                last,
            } => {
                self.source_chunks.push(frame);
                if last {
                    self.source = Arc::from(cesu8::decode_string(&self.source_chunks.take())?);
                }
                Ok(ParseStep::Continue)
            }
            ServerMessage::Text {
                field: TextField::SourceName,
                last,
            } => {
                self.source_name_chunks.push(frame);
                if last {
                    self.source_name = cesu8::decode_string(&self.source_name_chunks.take())?;
                    debug!(source_name = %self.source_name, "source name received");
                }
                Ok(ParseStep::Continue)
            }
            ServerMessage::Text {
                field: TextField::FunctionName,
                ..
            } => {
                // Decoded when the declaration arrives.
                self.function_name_chunks.push(frame);
                Ok(ParseStep::Continue)
            }
            ServerMessage::ParseFunction { line, column } => {
                let name = cesu8::decode_string(&self.function_name_chunks.take())?;
                debug!(%name, line, column, "function declaration");
                self.stack.push(FrameBuilder {
                    is_function: true,
                    line,
                    column,
                    name,
                    source: Arc::clone(&self.source),
                    source_name: self.source_name.clone(),
                    lines: Vec::new(),
                    offsets: Vec::new(),
                });
                Ok(ParseStep::Continue)
            }
            ServerMessage::BreakpointList(lines) => {
                self.top(frame)?.lines.extend(lines);
                Ok(ParseStep::Continue)
            }
            ServerMessage::BreakpointOffsetList(offsets) => {
                self.top(frame)?.offsets.extend(offsets);
                Ok(ParseStep::Continue)
            }
            ServerMessage::ByteCodeCp(handle) => self.finish_frame(handle, frame),
            ServerMessage::ReleaseByteCodeCp(handle) => {
                if self.completed.remove(&handle).is_some() {
                    debug!(%handle, "released before registration, dropped");
                    Ok(ParseStep::Continue)
                } else {
                    Ok(ParseStep::Release(handle))
                }
            }
            _ => Err(unexpected(frame)),
        }
    }

    fn top(&mut self, frame: &[u8]) -> Result<&mut FrameBuilder, EngineError> {
        let op = frame.first().copied().unwrap_or_default();
        self.stack
            .last_mut()
            .ok_or(EngineError::Protocol(ProtocolError::UnexpectedMessage(op)))
    }

    fn finish_frame(&mut self, handle: Handle, frame: &[u8]) -> Result<ParseStep, EngineError> {
        let builder = self.stack.pop().ok_or_else(|| unexpected(frame))?;
        let mut record = builder.finish(handle)?;
        debug!(%handle, name = %record.name, depth = self.depth(), "function finalized");

        if !self.stack.is_empty() {
            self.completed.insert(handle, record);
            return Ok(ParseStep::Continue);
        }

        record.source = Arc::clone(&self.source);
        record.source_name = self.source_name.clone();
        self.completed.insert(handle, record);

        let functions = std::mem::take(&mut self.completed).into_values().collect();
        Ok(ParseStep::Completed {
            source_name: self.source_name.clone(),
            functions,
        })
    }
}

impl Default for ParseUnit {
    fn default() -> Self {
        Self::new()
    }
}

fn unexpected(frame: &[u8]) -> EngineError {
    let op = frame.first().copied().unwrap_or_default();
    EngineError::Protocol(ProtocolError::UnexpectedMessage(op))
}
