//! Fixed-layout binary codec.
//!
//! A format is a sequence of [`Field`]s. Nothing on the wire describes
//! itself, so every caller passes the layout that matches its opcode (see
//! [`schema`]). Widths of pointer fields and the byte order of all
//! multi-byte fields come from the session configuration.

use crate::error::{ProtocolError, Result};

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Interpret the configuration flag byte (non-zero means little-endian).
    pub fn from_flag(flag: u8) -> Self {
        if flag != 0 {
            Self::Little
        } else {
            Self::Big
        }
    }

    /// The flag byte for this byte order.
    pub fn flag(self) -> u8 {
        match self {
            Self::Little => 1,
            Self::Big => 0,
        }
    }
}

/// Width of the engine's compressed pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    Two,
    Four,
}

impl PointerWidth {
    /// Size in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::Two => 2,
            Self::Four => 4,
        }
    }
}

impl TryFrom<u8> for PointerWidth {
    type Error = ProtocolError;

    fn try_from(width: u8) -> Result<Self> {
        match width {
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            other => Err(ProtocolError::InvalidPointerWidth(other)),
        }
    }
}

/// One field of a fixed layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// `B`: one byte.
    Byte,
    /// `I`: four bytes.
    Int32,
    /// `C`: a compressed pointer, two or four bytes.
    Pointer,
}

/// Per-opcode layouts.
///
/// Inbound layouts start after the opcode byte; outbound layouts include
/// it, matching how each side is read and written.
pub mod schema {
    use super::Field::{self, Byte, Int32, Pointer};

    /// `B B B B`: opcode, max message size, pointer width, endianness flag.
    pub const CONFIGURATION: &[Field] = &[Byte, Byte, Byte, Byte];
    /// Declaration line and column of a parsed function.
    pub const PARSE_FUNCTION: &[Field] = &[Int32, Int32];
    /// One entry of a breakpoint line or offset list.
    pub const LIST_ENTRY: &[Field] = &[Int32];
    /// A byte-code handle (assignment or release).
    pub const HANDLE: &[Field] = &[Pointer];
    /// Handle and byte offset (stops and backtrace entries).
    pub const LOCATION: &[Field] = &[Pointer, Int32];

    /// Free byte-code echo.
    pub const FREE_BYTE_CODE_CP: &[Field] = &[Byte, Pointer];
    /// Enable/disable a breakpoint.
    pub const UPDATE_BREAKPOINT: &[Field] = &[Byte, Byte, Pointer, Int32];
    /// Stop-at-exception switch.
    pub const EXCEPTION_CONFIG: &[Field] = &[Byte, Byte];
    /// Stop, continue, step, next.
    pub const COMMAND: &[Field] = &[Byte];
    /// Backtrace request with maximum depth.
    pub const GET_BACKTRACE: &[Field] = &[Byte, Int32];
    /// Header of an eval message; the text follows.
    pub const EVAL_HEADER: &[Field] = &[Byte, Int32];
}

/// Encoder/decoder bound to one session's pointer width and byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    pointer_width: PointerWidth,
    endianness: Endianness,
}

impl Codec {
    /// Create a codec for the given pointer width and byte order.
    pub fn new(pointer_width: PointerWidth, endianness: Endianness) -> Self {
        Self {
            pointer_width,
            endianness,
        }
    }

    /// Configured pointer width.
    pub fn pointer_width(&self) -> PointerWidth {
        self.pointer_width
    }

    /// Configured byte order.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Size of one field in bytes.
    pub fn field_size(&self, field: Field) -> usize {
        match field {
            Field::Byte => 1,
            Field::Int32 => 4,
            Field::Pointer => self.pointer_width.bytes(),
        }
    }

    /// Total size of a layout in bytes.
    pub fn format_size(&self, format: &[Field]) -> usize {
        format.iter().map(|f| self.field_size(*f)).sum()
    }

    /// Decode `format` from `bytes` starting at `offset`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::MessageTooShort`] when the layout does not fit.
    pub fn decode(&self, format: &[Field], bytes: &[u8], offset: usize) -> Result<Vec<u32>> {
        let needed = offset + self.format_size(format);
        if needed > bytes.len() {
            return Err(ProtocolError::MessageTooShort {
                needed,
                actual: bytes.len(),
            });
        }

        let mut pos = offset;
        let mut values = Vec::with_capacity(format.len());
        for field in format {
            let size = self.field_size(*field);
            values.push(self.read_uint(&bytes[pos..pos + size]));
            pos += size;
        }
        Ok(values)
    }

    /// Encode `values` according to `format`.
    ///
    /// # Errors
    ///
    /// Fails when the value count differs from the layout or a value does
    /// not fit its field.
    pub fn encode(&self, format: &[Field], values: &[u32]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.format_size(format));
        self.encode_into(format, values, &mut out)?;
        Ok(out)
    }

    /// Like [`Codec::encode`], appending to an existing buffer.
    pub fn encode_into(&self, format: &[Field], values: &[u32], out: &mut Vec<u8>) -> Result<()> {
        if format.len() != values.len() {
            return Err(ProtocolError::ValueCountMismatch {
                expected: format.len(),
                actual: values.len(),
            });
        }
        for (field, value) in format.iter().zip(values) {
            let width = self.field_size(*field);
            if width < 4 && u64::from(*value) >> (width * 8) != 0 {
                return Err(ProtocolError::ValueOutOfRange {
                    value: *value,
                    width,
                });
            }
            self.write_uint(*value, width, out);
        }
        Ok(())
    }

    fn read_uint(&self, bytes: &[u8]) -> u32 {
        let fold = |acc: u32, b: &u8| (acc << 8) | u32::from(*b);
        match self.endianness {
            Endianness::Little => bytes.iter().rev().fold(0, fold),
            Endianness::Big => bytes.iter().fold(0, fold),
        }
    }

    fn write_uint(&self, value: u32, width: usize, out: &mut Vec<u8>) {
        match self.endianness {
            Endianness::Little => out.extend_from_slice(&value.to_le_bytes()[..width]),
            Endianness::Big => out.extend_from_slice(&value.to_be_bytes()[4 - width..]),
        }
    }
}
