//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding debugger frames.
///
/// Every variant means client and engine disagree about the wire format,
/// so callers treat them as connection-aborting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A frame is shorter than the layout its opcode requires.
    #[error("received message too short: need {needed} bytes, got {actual}")]
    MessageTooShort {
        /// Bytes required by the layout.
        needed: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// A frame without even an opcode byte.
    #[error("received empty message")]
    EmptyFrame,

    /// The first frame of a session was not a configuration frame.
    #[error("the first message must be configuration")]
    ConfigurationExpected,

    /// The configuration frame is structurally invalid.
    #[error("malformed configuration: {0}")]
    InvalidConfiguration(String),

    /// Pointer width other than 2 or 4 bytes.
    #[error("compressed pointer must be 2 or 4 byte long, got {0}")]
    InvalidPointerWidth(u8),

    /// An opcode byte outside the protocol tables.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// A known opcode that is not valid in the current position.
    #[error("unexpected message with opcode {0}")]
    UnexpectedMessage(u8),

    /// Encoding was given the wrong number of values for its format.
    #[error("format expects {expected} values, got {actual}")]
    ValueCountMismatch {
        /// Number of fields in the format.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A value does not fit the width of its field.
    #[error("value {value} does not fit in a {width}-byte field")]
    ValueOutOfRange {
        /// The offending value.
        value: u32,
        /// Field width in bytes.
        width: usize,
    },

    /// A multi-byte text sequence runs past the end of its buffer.
    #[error("truncated text sequence at byte {0}")]
    TruncatedText(usize),

    /// Text encoding was asked to encode nothing.
    #[error("empty payload")]
    EmptyPayload,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_too_short_display() {
        let err = ProtocolError::MessageTooShort {
            needed: 5,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "received message too short: need 5 bytes, got 3"
        );
    }

    #[test]
    fn error_configuration_expected_display() {
        let err = ProtocolError::ConfigurationExpected;
        assert_eq!(err.to_string(), "the first message must be configuration");
    }

    #[test]
    fn error_invalid_pointer_width_display() {
        let err = ProtocolError::InvalidPointerWidth(3);
        assert_eq!(
            err.to_string(),
            "compressed pointer must be 2 or 4 byte long, got 3"
        );
    }

    #[test]
    fn error_unknown_opcode_display() {
        assert_eq!(ProtocolError::UnknownOpcode(99).to_string(), "unknown opcode 99");
    }

    #[test]
    fn error_unexpected_message_display() {
        assert_eq!(
            ProtocolError::UnexpectedMessage(1).to_string(),
            "unexpected message with opcode 1"
        );
    }

    #[test]
    fn error_value_out_of_range_display() {
        let err = ProtocolError::ValueOutOfRange {
            value: 70000,
            width: 2,
        };
        assert_eq!(err.to_string(), "value 70000 does not fit in a 2-byte field");
    }

    #[test]
    fn error_empty_payload_display() {
        assert_eq!(ProtocolError::EmptyPayload.to_string(), "empty payload");
    }

    #[test]
    fn error_is_comparable() {
        assert_eq!(ProtocolError::TruncatedText(4), ProtocolError::TruncatedText(4));
        assert_ne!(ProtocolError::EmptyFrame, ProtocolError::EmptyPayload);
    }
}
