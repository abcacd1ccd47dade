//! Typed protocol messages.
//!
//! Inbound frames decode through [`ServerMessage::decode`] and outbound
//! messages encode through [`ClientMessage::encode`], so field layouts
//! are only spelled out in [`crate::codec::schema`].

use std::fmt;

use crate::cesu8;
use crate::codec::{schema, Codec, Endianness, PointerWidth};
use crate::error::{ProtocolError, Result};
use crate::opcodes::{ClientOpcode, ServerOpcode};

/// Engine-side identifier of a compiled function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u32);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Session parameters announced by the engine in its first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    /// Largest frame either side may send.
    pub max_message_size: u32,
    pub pointer_width: PointerWidth,
    pub endianness: Endianness,
}

impl Configuration {
    /// Decode the mandatory first frame.
    ///
    /// # Errors
    ///
    /// The frame must be exactly four bytes, start with the configuration
    /// opcode, announce a 2 or 4 byte pointer and a message size of at
    /// least 2.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        if frame[0] != ServerOpcode::Configuration as u8 || frame.len() != 4 {
            return Err(ProtocolError::ConfigurationExpected);
        }
        let pointer_width = PointerWidth::try_from(frame[2])?;
        let max_message_size = u32::from(frame[1]);
        if max_message_size < 2 {
            return Err(ProtocolError::InvalidConfiguration(format!(
                "max message size {max_message_size} is too small"
            )));
        }
        Ok(Self {
            max_message_size,
            pointer_width,
            endianness: Endianness::from_flag(frame[3]),
        })
    }

    /// Encode as the engine would send it.
    pub fn encode(&self) -> Vec<u8> {
        vec![
            ServerOpcode::Configuration as u8,
            self.max_message_size.min(u32::from(u8::MAX)) as u8,
            self.pointer_width.bytes() as u8,
            self.endianness.flag(),
        ]
    }

    /// Codec for the rest of the session.
    pub fn codec(&self) -> Codec {
        Codec::new(self.pointer_width, self.endianness)
    }
}

/// Which string a text chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    SourceCode,
    SourceName,
    FunctionName,
    EvalResult,
    EvalError,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// The engine failed to parse the current source.
    ParseError,
    /// Handle assigned to the innermost open function.
    ByteCodeCp(Handle),
    /// A nested function declaration begins.
    ParseFunction { line: u32, column: u32 },
    /// Breakpoint-capable lines of the innermost open function.
    BreakpointList(Vec<u32>),
    /// Byte offsets parallel to the preceding line list.
    BreakpointOffsetList(Vec<u32>),
    /// One chunk of a string. The payload is the frame minus its opcode.
    Text { field: TextField, last: bool },
    /// The engine freed a function.
    ReleaseByteCodeCp(Handle),
    /// Execution stopped at a breakpoint.
    BreakpointHit { handle: Handle, offset: u32 },
    /// Execution stopped on a thrown exception.
    ExceptionHit { handle: Handle, offset: u32 },
    /// Backtrace entries, innermost first.
    Backtrace { frames: Vec<(Handle, u32)>, last: bool },
}

impl ServerMessage {
    /// Decode any frame after the configuration frame.
    ///
    /// # Errors
    ///
    /// Unknown opcodes, a second configuration frame, and frames shorter
    /// than their layout.
    pub fn decode(codec: &Codec, frame: &[u8]) -> Result<Self> {
        let first = *frame.first().ok_or(ProtocolError::EmptyFrame)?;
        let opcode = ServerOpcode::try_from(first)?;

        let message = match opcode {
            ServerOpcode::Configuration => return Err(ProtocolError::UnexpectedMessage(first)),
            ServerOpcode::ParseError => Self::ParseError,
            ServerOpcode::ByteCodeCp => Self::ByteCodeCp(decode_handle(codec, frame)?),
            ServerOpcode::ParseFunction => {
                let v = codec.decode(schema::PARSE_FUNCTION, frame, 1)?;
                Self::ParseFunction {
                    line: v[0],
                    column: v[1],
                }
            }
            ServerOpcode::BreakpointList => Self::BreakpointList(decode_list(codec, frame)?),
            ServerOpcode::BreakpointOffsetList => {
                Self::BreakpointOffsetList(decode_list(codec, frame)?)
            }
            ServerOpcode::SourceCode => text(TextField::SourceCode, false),
            ServerOpcode::SourceCodeEnd => text(TextField::SourceCode, true),
            ServerOpcode::SourceCodeName => text(TextField::SourceName, false),
            ServerOpcode::SourceCodeNameEnd => text(TextField::SourceName, true),
            ServerOpcode::FunctionName => text(TextField::FunctionName, false),
            ServerOpcode::FunctionNameEnd => text(TextField::FunctionName, true),
            ServerOpcode::EvalResult => text(TextField::EvalResult, false),
            ServerOpcode::EvalResultEnd => text(TextField::EvalResult, true),
            ServerOpcode::EvalError => text(TextField::EvalError, false),
            ServerOpcode::EvalErrorEnd => text(TextField::EvalError, true),
            ServerOpcode::ReleaseByteCodeCp => {
                Self::ReleaseByteCodeCp(decode_handle(codec, frame)?)
            }
            ServerOpcode::BreakpointHit => {
                let (handle, offset) = decode_location(codec, frame, 1)?;
                Self::BreakpointHit { handle, offset }
            }
            ServerOpcode::ExceptionHit => {
                let (handle, offset) = decode_location(codec, frame, 1)?;
                Self::ExceptionHit { handle, offset }
            }
            ServerOpcode::Backtrace | ServerOpcode::BacktraceEnd => {
                let step = codec.format_size(schema::LOCATION);
                let mut frames = Vec::new();
                let mut pos = 1;
                while pos < frame.len() {
                    frames.push(decode_location(codec, frame, pos)?);
                    pos += step;
                }
                Self::Backtrace {
                    frames,
                    last: opcode == ServerOpcode::BacktraceEnd,
                }
            }
        };
        Ok(message)
    }
}

fn text(field: TextField, last: bool) -> ServerMessage {
    ServerMessage::Text { field, last }
}

fn decode_handle(codec: &Codec, frame: &[u8]) -> Result<Handle> {
    Ok(Handle(codec.decode(schema::HANDLE, frame, 1)?[0]))
}

fn decode_location(codec: &Codec, frame: &[u8], pos: usize) -> Result<(Handle, u32)> {
    let v = codec.decode(schema::LOCATION, frame, pos)?;
    Ok((Handle(v[0]), v[1]))
}

fn decode_list(codec: &Codec, frame: &[u8]) -> Result<Vec<u32>> {
    if frame.len() < 5 {
        return Err(ProtocolError::MessageTooShort {
            needed: 5,
            actual: frame.len(),
        });
    }
    let mut values = Vec::with_capacity((frame.len() - 1) / 4);
    let mut pos = 1;
    while pos < frame.len() {
        values.push(codec.decode(schema::LIST_ENTRY, frame, pos)?[0]);
        pos += 4;
    }
    Ok(values)
}

/// An outbound message other than eval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    /// Acknowledge a release so the engine can free the byte code.
    FreeByteCodeCp(Handle),
    UpdateBreakpoint {
        enable: bool,
        handle: Handle,
        offset: u32,
    },
    ExceptionConfig { enable: bool },
    Stop,
    Continue,
    Step,
    Next,
    /// Request a backtrace; zero means no depth limit.
    GetBacktrace { max_depth: u32 },
}

impl ClientMessage {
    /// Opcode byte that starts the encoded frame.
    pub fn opcode(&self) -> ClientOpcode {
        match self {
            Self::FreeByteCodeCp(_) => ClientOpcode::FreeByteCodeCp,
            Self::UpdateBreakpoint { .. } => ClientOpcode::UpdateBreakpoint,
            Self::ExceptionConfig { .. } => ClientOpcode::ExceptionConfig,
            Self::Stop => ClientOpcode::Stop,
            Self::Continue => ClientOpcode::Continue,
            Self::Step => ClientOpcode::Step,
            Self::Next => ClientOpcode::Next,
            Self::GetBacktrace { .. } => ClientOpcode::GetBacktrace,
        }
    }

    /// Encode into one frame.
    ///
    /// # Errors
    ///
    /// A handle that does not fit the configured pointer width.
    pub fn encode(&self, codec: &Codec) -> Result<Vec<u8>> {
        let op = u32::from(u8::from(self.opcode()));
        match *self {
            Self::FreeByteCodeCp(handle) => codec.encode(schema::FREE_BYTE_CODE_CP, &[op, handle.0]),
            Self::UpdateBreakpoint {
                enable,
                handle,
                offset,
            } => codec.encode(
                schema::UPDATE_BREAKPOINT,
                &[op, u32::from(enable), handle.0, offset],
            ),
            Self::ExceptionConfig { enable } => {
                codec.encode(schema::EXCEPTION_CONFIG, &[op, u32::from(enable)])
            }
            Self::Stop | Self::Continue | Self::Step | Self::Next => {
                codec.encode(schema::COMMAND, &[op])
            }
            Self::GetBacktrace { max_depth } => {
                codec.encode(schema::GET_BACKTRACE, &[op, max_depth])
            }
        }
    }
}

/// Encode an eval request and split it into frames of at most
/// `max_message_size` bytes.
///
/// # Errors
///
/// [`ProtocolError::EmptyPayload`] for an empty expression.
pub fn encode_eval(codec: &Codec, expression: &str, max_message_size: usize) -> Result<Vec<Vec<u8>>> {
    let text = cesu8::encode_str(expression)?;
    let op = u32::from(u8::from(ClientOpcode::Eval));
    let mut message = codec.encode(schema::EVAL_HEADER, &[op, text.len() as u32])?;
    message.extend_from_slice(&text);
    Ok(split_eval(message, max_message_size))
}

/// Split an encoded eval message.
///
/// Every continuation frame reuses the last byte of the previous window
/// for the eval-part opcode, so windows advance by `max - 1`.
pub fn split_eval(mut message: Vec<u8>, max_message_size: usize) -> Vec<Vec<u8>> {
    // A window of one byte would hold nothing but the opcode.
    let max = max_message_size.max(2);
    let len = message.len();
    if len <= max {
        return vec![message];
    }

    let mut frames = vec![message[..max].to_vec()];
    let mut offset = max - 1;
    while offset + 1 < len {
        message[offset] = u8::from(ClientOpcode::EvalPart);
        frames.push(message[offset..(offset + max).min(len)].to_vec());
        offset += max - 1;
    }
    frames
}
