//! Opcode tables for both directions of the protocol.

use crate::error::ProtocolError;

/// Messages sent by the engine to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerOpcode {
    Configuration = 1,
    ParseError = 2,
    ByteCodeCp = 3,
    ParseFunction = 4,
    BreakpointList = 5,
    BreakpointOffsetList = 6,
    SourceCode = 7,
    SourceCodeEnd = 8,
    SourceCodeName = 9,
    SourceCodeNameEnd = 10,
    FunctionName = 11,
    FunctionNameEnd = 12,
    ReleaseByteCodeCp = 13,
    BreakpointHit = 14,
    ExceptionHit = 15,
    Backtrace = 16,
    BacktraceEnd = 17,
    EvalResult = 18,
    EvalResultEnd = 19,
    EvalError = 20,
    EvalErrorEnd = 21,
}

impl ServerOpcode {
    /// Map a raw opcode byte to its variant.
    pub fn from_u8(byte: u8) -> Option<Self> {
        let op = match byte {
            1 => Self::Configuration,
            2 => Self::ParseError,
            3 => Self::ByteCodeCp,
            4 => Self::ParseFunction,
            5 => Self::BreakpointList,
            6 => Self::BreakpointOffsetList,
            7 => Self::SourceCode,
            8 => Self::SourceCodeEnd,
            9 => Self::SourceCodeName,
            10 => Self::SourceCodeNameEnd,
            11 => Self::FunctionName,
            12 => Self::FunctionNameEnd,
            13 => Self::ReleaseByteCodeCp,
            14 => Self::BreakpointHit,
            15 => Self::ExceptionHit,
            16 => Self::Backtrace,
            17 => Self::BacktraceEnd,
            18 => Self::EvalResult,
            19 => Self::EvalResultEnd,
            20 => Self::EvalError,
            21 => Self::EvalErrorEnd,
            _ => return None,
        };
        Some(op)
    }

    /// Whether this opcode opens a parse unit when no unit is in progress.
    ///
    /// Release and parse-error frames belong to the parse group too, but
    /// they never start a unit on their own.
    pub fn starts_parse_unit(self) -> bool {
        matches!(
            self,
            Self::ByteCodeCp
                | Self::ParseFunction
                | Self::BreakpointList
                | Self::BreakpointOffsetList
                | Self::SourceCode
                | Self::SourceCodeEnd
                | Self::SourceCodeName
                | Self::SourceCodeNameEnd
                | Self::FunctionName
                | Self::FunctionNameEnd
        )
    }
}

impl TryFrom<u8> for ServerOpcode {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_u8(byte).ok_or(ProtocolError::UnknownOpcode(byte))
    }
}

/// Messages sent by the client to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientOpcode {
    FreeByteCodeCp = 1,
    UpdateBreakpoint = 2,
    ExceptionConfig = 3,
    Stop = 4,
    Continue = 5,
    Step = 6,
    Next = 7,
    GetBacktrace = 8,
    Eval = 9,
    EvalPart = 10,
}

impl From<ClientOpcode> for u8 {
    fn from(op: ClientOpcode) -> u8 {
        op as u8
    }
}
