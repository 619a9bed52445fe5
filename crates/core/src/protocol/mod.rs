//! Wire protocol codec for the control and aux data channels
//!
//! The primary channel speaks two dialects:
//!
//! - viewer → server: compact ASCII ops, `<op>[,<arg>…]` for runtime
//!   controls and `<op>:<arg>:…` for the file-transfer markers
//!   ([`ControlMessage`])
//! - server → viewer: a JSON envelope `{"type": t, "data": d}`
//!   ([`ServerEvent`])
//!
//! The aux channel carries prefix-framed binary file chunks
//! ([`framing`]).

mod control;
mod framing;
mod server;

pub use control::ControlMessage;
pub use framing::{decode_frame, encode_file_chunk, AuxFrame, FILE_CHUNK_PREFIX, MAX_CHUNK_PAYLOAD};
pub use server::{
    ClipboardAssembler, CursorPayload, GpuStats, Hotspot, ServerEvent, SystemAction, SystemStats,
};
