//! jdb-proto: wire format of the script-engine debugger protocol.
//!
//! This crate knows how frames look on the wire: opcode tables, the
//! fixed-layout binary codec, the CESU-8 style text codec, continuation
//! frame reassembly, and the typed inbound/outbound messages built on top
//! of them. It holds no session state.

pub mod cesu8;
pub mod codec;
pub mod error;
pub mod message;
pub mod opcodes;
pub mod reassembly;

// Re-export key types for convenience.
pub use codec::{Codec, Endianness, Field, PointerWidth};
pub use error::{ProtocolError, Result};
pub use message::{encode_eval, ClientMessage, Configuration, Handle, ServerMessage, TextField};
pub use opcodes::{ClientOpcode, ServerOpcode};
pub use reassembly::Reassembler;
